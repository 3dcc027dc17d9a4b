//! Event buffers as published by the feb driver

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::errors::AcquisitionError;

pub trait EventSource {
  /// Block until the next buffer arrives
  fn next_buffer(&mut self) -> Result<Vec<u8>, AcquisitionError>;
}

/// Subscribes to everything the driver publishes
pub struct ZmqEventSource {
  socket : zmq::Socket,
  stop   : Arc<AtomicBool>,
}

impl ZmqEventSource {

  /// # Arguments
  ///
  /// * address : PUB socket of the driver 
  /// * stop    : checked every poll_ms while no data 
  ///             arrives. Once set, next_buffer 
  ///             returns Interrupted
  pub fn connect(ctx     : &zmq::Context,
                 address : &str,
                 poll_ms : i32,
                 stop    : Arc<AtomicBool>) -> Result<Self, AcquisitionError> {
    let socket = ctx.socket(zmq::SUB).map_err(|e| AcquisitionError::Source(e.to_string()))?;
    socket.set_rcvtimeo(poll_ms).map_err(|e| AcquisitionError::Source(e.to_string()))?;
    match socket.connect(address) {
      Err(err) => {
        error!("Unable to connect to data (PUB) socket {}! {}", address, err);
        return Err(AcquisitionError::Source(err.to_string()));
      }
      Ok(_) => info!("Connected to event stream at {}", address)
    }
    match socket.set_subscribe(b"") {
      Err(err) => {
        error!("Can not subscribe to the event stream! {err}");
        return Err(AcquisitionError::Source(err.to_string()));
      }
      Ok(_) => ()
    }
    Ok(Self {
      socket,
      stop,
    })
  }
}

/// Sort the outcome of a receive.
///
/// Ok(None) means nothing arrived and we should look 
/// at the stop flag and try again. This is the case for 
/// timeouts, signals (EINTR) and transient transport 
/// errors. Only a terminated context ends the source.
pub fn received(result : Result<Vec<u8>, zmq::Error>) -> Result<Option<Vec<u8>>, AcquisitionError> {
  match result {
    Ok(buffer) => Ok(Some(buffer)),
    Err(zmq::Error::EAGAIN) => {
      trace!("No events...");
      Ok(None)
    }
    Err(zmq::Error::EINTR) => {
      debug!("Receiving events interrupted by a signal");
      Ok(None)
    }
    Err(zmq::Error::ETERM) => {
      error!("0MQ context terminated, no more events!");
      Err(AcquisitionError::Source(zmq::Error::ETERM.to_string()))
    }
    Err(err) => {
      warn!("Receiving events failed! {err}");
      Ok(None)
    }
  }
}

impl EventSource for ZmqEventSource {
  fn next_buffer(&mut self) -> Result<Vec<u8>, AcquisitionError> {
    loop {
      if self.stop.load(Ordering::Relaxed) {
        return Err(AcquisitionError::Interrupted);
      }
      if let Some(buffer) = received(self.socket.recv_bytes(0))? {
        return Ok(buffer);
      }
    }
  }
}
