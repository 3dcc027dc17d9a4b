//! Event records as published by the feb driver
//!
//! The driver publishes buffers of concatenated 
//! 76 byte records. The last record in a buffer 
//! carries `MAGIC_WORD32` in its second timestamp.

use std::fmt;

use crate::constants::{NCHN,
                       NBINS,
                       EVENT_RECORD_LEN,
                       MAGIC_WORD32};
use crate::serialization::{Serialization,
                           SerializationError,
                           parse_u16,
                           parse_u32};

/// A single readout of all 32 channels of a board
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct EventRecord {
  /// The last byte of the board's mac address
  pub board_id : u16,
  pub flags    : u16,
  pub ts0      : u32,
  pub ts1      : u32,
  pub adc      : [u16;NCHN],
}

impl EventRecord {

  pub fn new() -> Self {
    Self {
      board_id : 0,
      flags    : 0,
      ts0      : 0,
      ts1      : 0,
      adc      : [0;NCHN],
    }
  }

  /// This is the last record in its buffer
  pub fn is_terminator(&self) -> bool {
    self.ts1 == MAGIC_WORD32
  }

  /// All adc values fit into the histograms
  pub fn adc_in_range(&self) -> bool {
    self.adc.iter().all(|x| (*x as usize) < NBINS)
  }

  /// The channel with the highest signal. 
  ///
  /// For equal values, the lower channel wins.
  /// If all channels read 0, this is channel 0.
  pub fn triggered_channel(&self) -> usize {
    let mut max       = 0u16;
    let mut triggered = 0usize;
    for (ch, adc) in self.adc.iter().enumerate() {
      if *adc > max {
        max       = *adc;
        triggered = ch;
      }
    }
    triggered
  }
}

impl Default for EventRecord {
  fn default() -> Self {
    Self::new()
  }
}

impl Serialization for EventRecord {
  const SIZE : usize = EVENT_RECORD_LEN;

  fn from_bytestream(stream : &[u8],
                     pos    : &mut usize)
    -> Result<Self, SerializationError> {
    Self::verify_fixed(stream, *pos)?;
    let mut record  = EventRecord::new();
    record.board_id = parse_u16(stream, pos);
    record.flags    = parse_u16(stream, pos);
    record.ts0      = parse_u32(stream, pos);
    record.ts1      = parse_u32(stream, pos);
    for ch in 0..NCHN {
      record.adc[ch] = parse_u16(stream, pos);
    }
    Ok(record)
  }

  fn to_bytestream(&self) -> Vec<u8> {
    let mut stream = Vec::<u8>::with_capacity(EVENT_RECORD_LEN);
    stream.extend_from_slice(&self.board_id.to_le_bytes());
    stream.extend_from_slice(&self.flags   .to_le_bytes());
    stream.extend_from_slice(&self.ts0     .to_le_bytes());
    stream.extend_from_slice(&self.ts1     .to_le_bytes());
    for adc in self.adc.iter() {
      stream.extend_from_slice(&adc.to_le_bytes());
    }
    stream
  }
}

impl fmt::Display for EventRecord {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    let mut repr = String::from("<EventRecord:");
    repr += &(format!("\n  board  : {:02x}", self.board_id));
    repr += &(format!("\n  flags  : {:#06x}", self.flags));
    repr += &(format!("\n  ts0    : {}", self.ts0));
    repr += &(format!("\n  ts1    : {}", self.ts1));
    repr += &(format!("\n  adc    : {:?}>", self.adc));
    write!(f, "{}", repr)
  }
}

/// Walk through a driver buffer record by record.
///
/// The iteration ends with (and includes) the record 
/// carrying the magic word. Nothing behind it is 
/// looked at. A buffer without terminator ends at 
/// the last complete record.
pub struct EventRecords<'a> {
  buffer   : &'a [u8],
  pos      : usize,
  finished : bool,
}

impl<'a> EventRecords<'a> {
  pub fn new(buffer : &'a [u8]) -> Self {
    Self {
      buffer,
      pos      : 0,
      finished : false,
    }
  }
}

impl<'a> Iterator for EventRecords<'a> {
  type Item = EventRecord;

  fn next(&mut self) -> Option<EventRecord> {
    if self.finished {
      return None;
    }
    match EventRecord::from_bytestream(self.buffer, &mut self.pos) {
      Err(_) => {
        if self.pos != self.buffer.len() {
          debug!("Buffer ends with {} trailing bytes and no terminator", self.buffer.len() - self.pos);
        } else {
          debug!("Buffer without terminating record");
        }
        self.finished = true;
        None
      }
      Ok(record) => {
        if record.is_terminator() {
          self.finished = true;
        }
        Some(record)
      }
    }
  }
}

/// Iterate over the records of a driver buffer
pub fn records(buffer : &[u8]) -> EventRecords<'_> {
  EventRecords::new(buffer)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn record(board_id : u16, ts1 : u32) -> EventRecord {
    let mut rec  = EventRecord::new();
    rec.board_id = board_id;
    rec.ts1      = ts1;
    rec
  }

  #[test]
  fn iteration_stops_at_terminator() {
    let mut buffer = Vec::<u8>::new();
    buffer.extend(record(1, 10).to_bytestream());
    buffer.extend(record(2, 20).to_bytestream());
    buffer.extend(record(3, MAGIC_WORD32).to_bytestream());
    // garbage the driver left behind in the buffer
    buffer.extend(record(4, 40).to_bytestream());
    buffer.extend(record(5, 50).to_bytestream());
    let seen : Vec<u16> = records(&buffer).map(|r| r.board_id).collect();
    assert_eq!(seen, vec![1,2,3]);
  }

  #[test]
  fn iteration_without_terminator_ends_at_buffer() {
    let mut buffer = Vec::<u8>::new();
    buffer.extend(record(1, 10).to_bytestream());
    buffer.extend(record(2, 20).to_bytestream());
    buffer.extend_from_slice(&[0u8;10]);
    assert_eq!(records(&buffer).count(), 2);
  }

  #[test]
  fn triggered_channel_first_wins() {
    let mut rec = EventRecord::new();
    assert_eq!(rec.triggered_channel(), 0);
    rec.adc[7]  = 900;
    rec.adc[12] = 900;
    rec.adc[3]  = 400;
    assert_eq!(rec.triggered_channel(), 7);
  }

  #[test]
  fn record_layout() {
    let mut rec  = record(0x00ab, MAGIC_WORD32);
    rec.adc[31]  = 0x0fff;
    let stream   = rec.to_bytestream();
    assert_eq!(stream.len(), EVENT_RECORD_LEN);
    assert_eq!(&stream[0..2], &[0xab, 0x00]);
    assert_eq!(&stream[8..12], &MAGIC_WORD32.to_le_bytes());
    assert_eq!(&stream[74..76], &[0xff, 0x0f]);
  }
}
