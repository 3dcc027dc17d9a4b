//! Pedestal and gain histograms of a single board
//!
//! This is the message which febcal-histos pushes 
//! out after a full sweep over all channel pairs.
//! On the wire it is the mac5 byte, the packed slow 
//! control register used for the acquisition and
//! the two histogram arrays (little endian, channel
//! by channel).

use std::collections::BTreeMap;
use std::fmt;

use crate::constants::{NCHN,
                       NBINS,
                       SC_BYTE_LEN,
                       HISTOGRAM_SET_LEN};
use crate::serialization::{Serialization,
                           SerializationError,
                           parse_u8,
                           parse_u16,
                           parse_u32};
use crate::calibration::CalibrationRequest;

#[derive(Debug, Clone, PartialEq)]
pub struct HistogramSet {
  pub board_id : u8,
  /// The packed slow control register 
  /// the histograms were taken with
  pub config   : Vec<u8>,
  /// pedestal[channel][bin]
  pub pedestal : Vec<Vec<u32>>,
  /// gain[channel][bin]
  pub gain     : Vec<Vec<u16>>,
}

impl HistogramSet {

  pub fn new(board_id : u8, config : Vec<u8>) -> Self {
    Self {
      board_id,
      config,
      pedestal : vec![vec![0u32;NBINS];NCHN],
      gain     : vec![vec![0u16;NBINS];NCHN],
    }
  }

  /// Clear all bins, keep board and configuration
  pub fn reset(&mut self) {
    for ch in 0..NCHN {
      self.pedestal[ch].iter_mut().for_each(|x| *x = 0);
      self.gain[ch].iter_mut().for_each(|x| *x = 0);
    }
  }

  pub fn fill_pedestal(&mut self, channel : usize, adc : u16) -> Result<(), SerializationError> {
    if adc as usize >= NBINS {
      return Err(SerializationError::AdcOutOfRange);
    }
    let bin = &mut self.pedestal[channel][adc as usize];
    *bin = bin.saturating_add(1);
    Ok(())
  }

  pub fn fill_gain(&mut self, channel : usize, adc : u16) -> Result<(), SerializationError> {
    if adc as usize >= NBINS {
      return Err(SerializationError::AdcOutOfRange);
    }
    let bin = &mut self.gain[channel][adc as usize];
    *bin = bin.saturating_add(1);
    Ok(())
  }

  pub fn pedestal_entries(&self, channel : usize) -> u64 {
    self.pedestal[channel].iter().map(|x| *x as u64).sum()
  }

  pub fn gain_entries(&self, channel : usize) -> u64 {
    self.gain[channel].iter().map(|x| *x as u64).sum()
  }

  /// Prepare the gain histogram of a channel for the 
  /// calibration engine. 
  ///
  /// The key is "<board>:<channel>", the spectrum only
  /// contains non-empty bins.
  pub fn spectrum_request(&self, channel : usize) -> CalibrationRequest {
    let mut spectrum = BTreeMap::<String, f64>::new();
    for (bin, count) in self.gain[channel].iter().enumerate() {
      if *count > 0 {
        spectrum.insert(bin.to_string(), *count as f64);
      }
    }
    CalibrationRequest {
      key : serde_json::Value::String(format!("{}:{}", self.board_id, channel)),
      spectrum,
    }
  }

  /// Sum up several histogram sets of the same board.
  ///
  /// Sets of other boards are skipped. The configuration
  /// snapshot is the one of the first set.
  pub fn aggregate(sets : &[HistogramSet]) -> Option<HistogramSet> {
    let first   = sets.first()?;
    let mut sum = first.clone();
    for set in sets.iter().skip(1) {
      if set.board_id != first.board_id {
        warn!("Not adding histograms of board {} to board {}!", set.board_id, first.board_id);
        continue;
      }
      if set.config != first.config {
        debug!("Adding histograms taken with a different configuration!");
      }
      for ch in 0..NCHN {
        for bin in 0..NBINS {
          sum.pedestal[ch][bin] = sum.pedestal[ch][bin].saturating_add(set.pedestal[ch][bin]);
          sum.gain[ch][bin]     = sum.gain[ch][bin].saturating_add(set.gain[ch][bin]);
        }
      }
    }
    Some(sum)
  }
}

impl Serialization for HistogramSet {
  
  const SIZE : usize = HISTOGRAM_SET_LEN;

  fn from_bytestream(stream : &[u8], pos : &mut usize)
    -> Result<Self, SerializationError> {
    Self::verify_fixed(stream, *pos)?;
    let board_id = parse_u8(stream, pos);
    let config   = stream[*pos..*pos + SC_BYTE_LEN].to_vec();
    *pos += SC_BYTE_LEN;
    let mut set  = HistogramSet::new(board_id, config);
    for ch in 0..NCHN {
      for bin in 0..NBINS {
        set.pedestal[ch][bin] = parse_u32(stream, pos);
      }
    }
    for ch in 0..NCHN {
      for bin in 0..NBINS {
        set.gain[ch][bin] = parse_u16(stream, pos);
      }
    }
    Ok(set)
  }

  /// The configuration snapshot is padded/truncated
  /// to the slow control register size
  fn to_bytestream(&self) -> Vec<u8> {
    let mut stream = Vec::<u8>::with_capacity(HISTOGRAM_SET_LEN);
    stream.push(self.board_id);
    let mut config = self.config.clone();
    config.resize(SC_BYTE_LEN, 0);
    stream.extend_from_slice(&config);
    for ch in 0..NCHN {
      for count in self.pedestal[ch].iter() {
        stream.extend_from_slice(&count.to_le_bytes());
      }
    }
    for ch in 0..NCHN {
      for count in self.gain[ch].iter() {
        stream.extend_from_slice(&count.to_le_bytes());
      }
    }
    stream
  }
}

impl fmt::Display for HistogramSet {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    let mut repr = format!("<HistogramSet: board {}", self.board_id);
    for ch in 0..NCHN {
      repr += &(format!("\n  ch {:02} : {} pedestal, {} gain entries",
                        ch, self.pedestal_entries(ch), self.gain_entries(ch)));
    }
    repr += ">";
    write!(f, "{}", repr)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn fill_rejects_overflow() {
    let mut set = HistogramSet::new(1, vec![0;SC_BYTE_LEN]);
    assert!(set.fill_gain(3, 4095).is_ok());
    assert_eq!(set.fill_gain(3, 4096), Err(SerializationError::AdcOutOfRange));
    assert_eq!(set.fill_pedestal(3, 5000), Err(SerializationError::AdcOutOfRange));
    assert_eq!(set.gain_entries(3), 1);
    assert_eq!(set.pedestal_entries(3), 0);
  }

  #[test]
  fn gain_saturates() {
    let mut set = HistogramSet::new(1, vec![0;SC_BYTE_LEN]);
    set.gain[0][10] = u16::MAX;
    set.fill_gain(0, 10).unwrap();
    assert_eq!(set.gain[0][10], u16::MAX);
  }

  #[test]
  fn spectrum_request_is_sparse() {
    let mut set = HistogramSet::new(12, vec![0;SC_BYTE_LEN]);
    set.gain[4][100] = 3;
    set.gain[4][250] = 1;
    set.gain[5][100] = 7;
    let req = set.spectrum_request(4);
    assert_eq!(req.key, serde_json::json!("12:4"));
    assert_eq!(req.spectrum.len(), 2);
    assert_eq!(req.spectrum.get("100"), Some(&3.0));
    assert_eq!(req.spectrum.get("250"), Some(&1.0));
  }

  #[test]
  fn aggregate_same_board() {
    let mut a = HistogramSet::new(2, vec![0;SC_BYTE_LEN]);
    let mut b = HistogramSet::new(2, vec![0;SC_BYTE_LEN]);
    let mut c = HistogramSet::new(3, vec![0;SC_BYTE_LEN]);
    a.pedestal[0][5] = 10;
    b.pedestal[0][5] = 5;
    c.pedestal[0][5] = 100;
    let sum = HistogramSet::aggregate(&[a, b, c]).unwrap();
    assert_eq!(sum.pedestal[0][5], 15);
    assert!(HistogramSet::aggregate(&[]).is_none());
  }

  #[test]
  fn reset_keeps_config() {
    let mut set = HistogramSet::new(9, vec![1;SC_BYTE_LEN]);
    set.fill_pedestal(31, 0).unwrap();
    set.reset();
    assert_eq!(set.pedestal_entries(31), 0);
    assert_eq!(set.config, vec![1;SC_BYTE_LEN]);
  }
}
