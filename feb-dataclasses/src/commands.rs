//! Command frames for the feb driver
//!
//! The driver listens on a REQ/REP socket. Every 
//! command is an 8 byte, zero padded ascii name
//! followed by the id of the addressed board. 
//! SETCONF additionally carries the packed slow 
//! control and power amplifier registers.
//!
//! The driver replies with a 3 byte acknowledgement,
//! which is not inspected further.

use std::fmt;

use crate::constants::{BROADCAST_ID,
                       SC_BYTE_LEN,
                       PM_BYTE_LEN};
use crate::errors::SerializationError;

pub const CMD_DAQ_END : &[u8;8] = b"DAQ_END\0";
pub const CMD_DAQ_BEG : &[u8;8] = b"DAQ_BEG\0";
pub const CMD_BIAS_OF : &[u8;8] = b"BIAS_OF\0";
pub const CMD_BIAS_ON : &[u8;8] = b"BIAS_ON\0";
pub const CMD_SETCONF : &[u8;8] = b"SETCONF\0";

/// Size of all frames except SETCONF
pub const CMD_FRAME_LEN     : usize = 9;
/// Size of the SETCONF frame
pub const SETCONF_FRAME_LEN : usize = CMD_FRAME_LEN + SC_BYTE_LEN + PM_BYTE_LEN;

#[derive(Debug, Clone, PartialEq)]
pub enum DriverCommand {
  /// Stop acquisition on all boards
  DaqEnd,
  /// Start acquisition on all boards
  DaqBegin,
  /// Switch the SiPM bias of a board off
  BiasOff(u8),
  /// Switch the SiPM bias of a board on
  BiasOn(u8),
  /// Upload the packed slow control (sc) and 
  /// power amplifier (pm) registers to a board
  SetConf {
    board : u8,
    sc    : Vec<u8>,
    pm    : Vec<u8>,
  },
}

impl DriverCommand {

  pub fn name(&self) -> &'static str {
    match self {
      DriverCommand::DaqEnd         => "DAQ_END",
      DriverCommand::DaqBegin       => "DAQ_BEG",
      DriverCommand::BiasOff(_)     => "BIAS_OF",
      DriverCommand::BiasOn(_)      => "BIAS_ON",
      DriverCommand::SetConf {..}   => "SETCONF",
    }
  }

  /// The board the command is addressed to
  pub fn board(&self) -> u8 {
    match self {
      DriverCommand::DaqEnd
      | DriverCommand::DaqBegin       => BROADCAST_ID,
      DriverCommand::BiasOff(board)
      | DriverCommand::BiasOn(board)  => *board,
      DriverCommand::SetConf {board, ..} => *board,
    }
  }

  /// The bytes as they go over the wire
  pub fn to_frame(&self) -> Vec<u8> {
    let head = match self {
      DriverCommand::DaqEnd         => CMD_DAQ_END,
      DriverCommand::DaqBegin       => CMD_DAQ_BEG,
      DriverCommand::BiasOff(_)     => CMD_BIAS_OF,
      DriverCommand::BiasOn(_)      => CMD_BIAS_ON,
      DriverCommand::SetConf {..}   => CMD_SETCONF,
    };
    let mut frame = Vec::<u8>::with_capacity(SETCONF_FRAME_LEN);
    frame.extend_from_slice(head);
    frame.push(self.board());
    if let DriverCommand::SetConf {sc, pm, ..} = self {
      frame.extend_from_slice(sc);
      frame.extend_from_slice(pm);
    }
    frame
  }

  /// Decode a frame. Used by the test doubles 
  /// standing in for the driver.
  pub fn from_frame(frame : &[u8]) -> Result<Self, SerializationError> {
    if frame.len() < CMD_FRAME_LEN {
      return Err(SerializationError::StreamTooShort);
    }
    let head  = &frame[0..8];
    let board = frame[8];
    if head == CMD_SETCONF {
      if frame.len() != SETCONF_FRAME_LEN {
        return Err(SerializationError::WrongByteSize);
      }
      let sc_end = CMD_FRAME_LEN + SC_BYTE_LEN;
      return Ok(DriverCommand::SetConf {
        board,
        sc : frame[CMD_FRAME_LEN..sc_end].to_vec(),
        pm : frame[sc_end..].to_vec(),
      });
    }
    if frame.len() != CMD_FRAME_LEN {
      return Err(SerializationError::StreamTooLong);
    }
    match head {
      h if h == CMD_DAQ_END => Ok(DriverCommand::DaqEnd),
      h if h == CMD_DAQ_BEG => Ok(DriverCommand::DaqBegin),
      h if h == CMD_BIAS_OF => Ok(DriverCommand::BiasOff(board)),
      h if h == CMD_BIAS_ON => Ok(DriverCommand::BiasOn(board)),
      _ => {
        debug!("Unknown command head {:?}", head);
        Err(SerializationError::WrongByteSize)
      }
    }
  }
}

impl fmt::Display for DriverCommand {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    match self {
      DriverCommand::SetConf {board, sc, pm} => {
        write!(f, "<DriverCommand: SETCONF board {} [sc {} bytes, pm {} bytes]>", board, sc.len(), pm.len())
      }
      _ => write!(f, "<DriverCommand: {} board {}>", self.name(), self.board()),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn broadcast_frames() {
    assert_eq!(DriverCommand::DaqEnd.to_frame(),   b"DAQ_END\0\xff".to_vec());
    assert_eq!(DriverCommand::DaqBegin.to_frame(), b"DAQ_BEG\0\xff".to_vec());
  }

  #[test]
  fn board_frames() {
    assert_eq!(DriverCommand::BiasOff(3).to_frame(), b"BIAS_OF\0\x03".to_vec());
    assert_eq!(DriverCommand::BiasOn(3).to_frame(),  b"BIAS_ON\0\x03".to_vec());
  }

  #[test]
  fn setconf_frame() {
    let cmd = DriverCommand::SetConf {
      board : 7,
      sc    : vec![0xaa;SC_BYTE_LEN],
      pm    : vec![0x55;PM_BYTE_LEN],
    };
    let frame = cmd.to_frame();
    assert_eq!(frame.len(), 180);
    assert_eq!(&frame[0..8], b"SETCONF\0");
    assert_eq!(frame[8], 7);
    assert_eq!(frame[9], 0xaa);
    assert_eq!(frame[9 + SC_BYTE_LEN], 0x55);
    assert_eq!(DriverCommand::from_frame(&frame).unwrap(), cmd);
  }

  #[test]
  fn garbage_frames() {
    assert_eq!(DriverCommand::from_frame(b"DAQ_END"), Err(SerializationError::StreamTooShort));
    assert!(DriverCommand::from_frame(b"NOTHING\0\x01").is_err());
    assert!(DriverCommand::from_frame(b"SETCONF\0\x01\x02").is_err());
  }
}
