//! Request/reply link to the feb driver
//!
//! Every command is answered by the driver with a 
//! short acknowledgement. A driver which does not 
//! answer would block us forever, so every request
//! has a receive timeout and is repeated a few times
//! before we give up.

use std::thread;
use std::time::Duration;

use feb_dataclasses::DriverCommand;
use feb_dataclasses::constants::ACK_LEN;

use crate::errors::DriverError;

/// Anything which can deliver commands to the driver
pub trait ControlLink {
  /// Send a command and wait for the acknowledgement
  fn request(&mut self, command : &DriverCommand) -> Result<Vec<u8>, DriverError>;
}

pub struct ZmqDriver {
  socket     : zmq::Socket,
  address    : String,
  timeout_ms : i32,
  attempts   : usize,
  /// Wait attempt*backoff between attempts
  backoff    : Duration,
}

impl ZmqDriver {

  /// Connect a REQ socket to the driver
  ///
  /// # Arguments
  ///
  /// * ctx        : 0MQ context
  /// * address    : driver address, e.g. tcp://localhost:5555
  /// * timeout_ms : receive timeout for a single attempt
  /// * attempts   : number of attempts per command
  pub fn connect(ctx        : &zmq::Context,
                 address    : &str,
                 timeout_ms : i32,
                 attempts   : usize) -> Result<Self, DriverError> {
    let socket = ctx.socket(zmq::REQ)?;
    socket.set_rcvtimeo(timeout_ms)?;
    socket.set_sndtimeo(timeout_ms)?;
    socket.set_linger(0)?;
    // allow to send again if a reply never came
    socket.set_req_relaxed(true)?;
    socket.set_req_correlate(true)?;
    match socket.connect(address) {
      Err(err) => {
        error!("Unable to connect to driver at {}! {}", address, err);
        return Err(DriverError::from(err));
      }
      Ok(_) => {
        info!("Connected to driver at {}", address);
      }
    }
    Ok(Self {
      socket,
      address    : String::from(address),
      timeout_ms,
      attempts   : attempts.max(1),
      backoff    : Duration::from_millis(500),
    })
  }
}

impl ControlLink for ZmqDriver {
  fn request(&mut self, command : &DriverCommand) -> Result<Vec<u8>, DriverError> {
    let frame = command.to_frame();
    for attempt in 1..=self.attempts {
      debug!("Sending {} ({} bytes), attempt {}", command, frame.len(), attempt);
      match self.socket.send(&frame, 0) {
        Err(err) => {
          warn!("Unable to send {} to {}! {}", command.name(), self.address, err);
        }
        Ok(_) => {
          match self.socket.recv_bytes(0) {
            Err(zmq::Error::EAGAIN) => {
              warn!("No reply to {} within {} ms (attempt {}/{})",
                    command.name(), self.timeout_ms, attempt, self.attempts);
            }
            Err(err) => {
              warn!("Receiving reply to {} failed! {}", command.name(), err);
            }
            Ok(reply) => {
              if reply.len() != ACK_LEN {
                debug!("Reply to {} has {} bytes instead of {}", command.name(), reply.len(), ACK_LEN);
              }
              return Ok(reply);
            }
          }
        }
      }
      if attempt < self.attempts {
        thread::sleep(self.backoff*attempt as u32);
      }
    }
    Err(DriverError::Unresponsive {command  : String::from(command.name()),
                                   attempts : self.attempts})
  }
}
