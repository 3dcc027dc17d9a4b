//! CITIROC configuration registers
//!
//! The slow control (SC) and power amplifier (PM) 
//! registers are bit sequences. In text files they 
//! are written as '0'/'1' characters, MSB of every 
//! field first. The driver wants them byte packed 
//! in reversed order (see `BitSeq::pack`).
//!
//! On the command line, registers are passed as hex 
//! strings, which are simply the hex representation 
//! of the packed bytes.

use std::fmt;
use std::fs;
use std::path::Path;

use crate::constants::{NCHN,
                       NPAIRS,
                       CONFIG_COMMENT,
                       DAC_OFFSET,
                       DAC_STRIDE,
                       DAC_BITS,
                       TRIGGER_OFFSET,
                       TRIGGER_STRIDE,
                       TIME_THRESHOLD_OFFSET,
                       CHARGE_THRESHOLD_OFFSET,
                       THRESHOLD_BITS,
                       SC_BIT_LEN};
use crate::errors::ConfigError;

/// A register image, one entry per bit
#[derive(Debug, Clone, PartialEq)]
pub struct BitSeq {
  bits : Vec<bool>,
}

/// Number of bytes needed to pack bit_len bits
pub fn packed_len(bit_len : usize) -> usize {
  (bit_len + 7) / 8
}

impl BitSeq {

  /// A register of given length with all bits cleared
  pub fn zeros(bit_len : usize) -> Self {
    Self {
      bits : vec![false;bit_len],
    }
  }

  pub fn from_bits(bits : Vec<bool>) -> Self {
    Self {
      bits
    }
  }

  pub fn len(&self) -> usize {
    self.bits.len()
  }

  pub fn is_empty(&self) -> bool {
    self.bits.is_empty()
  }

  pub fn get(&self, index : usize) -> bool {
    self.bits[index]
  }

  pub fn set(&mut self, index : usize, value : bool) {
    self.bits[index] = value;
  }

  /// Read the content of a configuration file
  ///
  /// Anything after the comment delimiter (') is 
  /// stripped, as well as all whitespace. What 
  /// remains has to be exactly expected_bits 
  /// '0'/'1' characters.
  pub fn decode_text(path : &Path, expected_bits : usize) -> Result<Self, ConfigError> {
    match fs::read_to_string(path) {
      Err(err) => {
        error!("Unable to read config file {}! {}", path.display(), err);
        Err(ConfigError::FileNotFound(path.display().to_string()))
      }
      Ok(content) => {
        Self::parse_text(&content, expected_bits)
      }
    }
  }

  /// Same as decode_text, but for the content
  /// of a file
  pub fn parse_text(content : &str, expected_bits : usize) -> Result<Self, ConfigError> {
    let mut bits = Vec::<bool>::with_capacity(expected_bits);
    for line in content.lines() {
      let payload = line.split(CONFIG_COMMENT).next().unwrap_or("");
      for c in payload.chars().filter(|c| !c.is_whitespace()) {
        match c {
          '0' => bits.push(false),
          '1' => bits.push(true),
          _   => return Err(ConfigError::InvalidCharacter(c)),
        }
      }
    }
    if bits.len() != expected_bits {
      return Err(ConfigError::LengthMismatch {expected : expected_bits,
                                              found    : bits.len()});
    }
    Ok(Self::from_bits(bits))
  }

  /// Read a register from its hex representation
  ///
  /// Every hex digit expands into 4 bits (MSB first),
  /// then the order of the 8bit blocks is mirrored,
  /// since the hex string is the packed (byte reversed)
  /// register.
  pub fn decode_hex(hex : &str, bit_len : usize) -> Result<Self, ConfigError> {
    let hex = hex.trim();
    if hex.len()*4 != bit_len || bit_len % 8 != 0 {
      return Err(ConfigError::LengthMismatch {expected : bit_len,
                                              found    : hex.len()*4});
    }
    let mut expanded = Vec::<bool>::with_capacity(bit_len);
    for c in hex.chars() {
      let nibble = c.to_digit(16).ok_or(ConfigError::InvalidHex(c))?;
      for j in 0..4 {
        expanded.push((nibble >> (3 - j)) & 1 == 1);
      }
    }
    let n_blocks = bit_len/8;
    let mut bits = Vec::<bool>::with_capacity(bit_len);
    for i in 0..n_blocks {
      let block = n_blocks - i - 1;
      bits.extend_from_slice(&expanded[8*block..8*block+8]);
    }
    Ok(Self::from_bits(bits))
  }

  /// Generate the byte string as required by the driver
  ///
  /// Bit i goes into byte (len-1-i)/8 at position
  /// 7 - i%8 (counted from the LSB). The result has
  /// ceil(len/8) bytes.
  pub fn pack(&self) -> Vec<u8> {
    let length   = self.bits.len();
    let mut sink = vec![0u8;packed_len(length)];
    for from in (0..length).rev() {
      if self.bits[from] {
        let to = (length - from - 1) / 8;
        sink[to] |= 1 << (7 - from % 8);
      }
    }
    sink
  }

  /// Restore a register from its packed representation
  pub fn unpack(bytes : &[u8], bit_len : usize) -> Result<Self, ConfigError> {
    if bytes.len() != packed_len(bit_len) {
      return Err(ConfigError::LengthMismatch {expected : packed_len(bit_len)*8,
                                              found    : bytes.len()*8});
    }
    let mut bits = Vec::<bool>::with_capacity(bit_len);
    for i in 0..bit_len {
      let from = (bit_len - i - 1) / 8;
      bits.push((bytes[from] >> (7 - i % 8)) & 1 == 1);
    }
    Ok(Self::from_bits(bits))
  }

  /// Hex representation of the packed register,
  /// as accepted by decode_hex
  pub fn to_hex(&self) -> String {
    self.pack().iter().map(|b| format!("{:02x}", b)).collect()
  }

  /// Overwrite a field of given length with value, 
  /// most significant bit first
  pub fn set_field(&mut self, position : usize, length : usize, value : u32) -> Result<(), ConfigError> {
    if position + length > self.bits.len() || length > 32 {
      return Err(ConfigError::FieldOutOfRange {position, length});
    }
    for j in 0..length {
      self.bits[position + j] = (value >> (length - j - 1)) & 1 == 1;
    }
    Ok(())
  }

  /// Read a field of given length, most significant bit first
  pub fn get_field(&self, position : usize, length : usize) -> Result<u32, ConfigError> {
    if position + length > self.bits.len() || length > 32 {
      return Err(ConfigError::FieldOutOfRange {position, length});
    }
    let mut value = 0u32;
    for j in 0..length {
      value = (value << 1) | self.bits[position + j] as u32;
    }
    Ok(value)
  }
}

impl fmt::Display for BitSeq {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    write!(f, "<BitSeq [{} bits] : {}>", self.len(), self.to_hex())
  }
}

/*************************************/

/// How the trigger enable bits are handled while
/// sweeping through the channel pairs
#[derive(Debug, Copy, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub enum TriggerMode {
  /// Only the active pair triggers
  Pairwise,
  /// All channels trigger
  AllChannels,
  /// Take the trigger bits from the config as they are
  AsIs,
}

impl TriggerMode {
  pub fn from_flags(all : bool, as_is : bool) -> Self {
    if as_is {
      TriggerMode::AsIs
    } else if all {
      TriggerMode::AllChannels
    } else {
      TriggerMode::Pairwise
    }
  }

  /// In the all/as-is modes every pair collects 
  /// only a 16th of the requested events
  pub fn events_per_pair(&self, requested : usize) -> usize {
    match self {
      TriggerMode::Pairwise    => requested,
      TriggerMode::AllChannels 
      | TriggerMode::AsIs      => requested/NPAIRS,
    }
  }
}

impl fmt::Display for TriggerMode {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    let repr = match self {
      TriggerMode::Pairwise    => "Pairwise",
      TriggerMode::AllChannels => "AllChannels",
      TriggerMode::AsIs        => "AsIs",
    };
    write!(f, "<TriggerMode: {}>", repr)
  }
}

/*************************************/

/// The CITIROC slow control register 
#[derive(Debug, Clone, PartialEq)]
pub struct SlowControlConfig {
  pub bits : BitSeq,
}

impl SlowControlConfig {

  pub fn new(bits : BitSeq) -> Result<Self, ConfigError> {
    if bits.len() != SC_BIT_LEN {
      return Err(ConfigError::LengthMismatch {expected : SC_BIT_LEN,
                                              found    : bits.len()});
    }
    Ok(Self {
      bits
    })
  }

  pub fn from_file(path : &Path) -> Result<Self, ConfigError> {
    Self::new(BitSeq::decode_text(path, SC_BIT_LEN)?)
  }

  pub fn from_hex(hex : &str) -> Result<Self, ConfigError> {
    Self::new(BitSeq::decode_hex(hex, SC_BIT_LEN)?)
  }

  pub fn pack(&self) -> Vec<u8> {
    self.bits.pack()
  }

  pub fn to_hex(&self) -> String {
    self.bits.to_hex()
  }

  /// Set the 8bit input DAC of a channel 
  /// (SiPM bias fine tuning)
  pub fn set_dac(&mut self, channel : usize, value : u8) -> Result<(), ConfigError> {
    if channel >= NCHN {
      return Err(ConfigError::ChannelOutOfRange(channel));
    }
    self.bits.set_field(DAC_OFFSET + channel*DAC_STRIDE, DAC_BITS, value as u32)
  }

  pub fn get_dac(&self, channel : usize) -> Result<u8, ConfigError> {
    if channel >= NCHN {
      return Err(ConfigError::ChannelOutOfRange(channel));
    }
    Ok(self.bits.get_field(DAC_OFFSET + channel*DAC_STRIDE, DAC_BITS)? as u8)
  }

  /// Set the input DACs for all channels at once
  pub fn set_dacs(&mut self, values : &[u8;NCHN]) -> Result<(), ConfigError> {
    for (ch, value) in values.iter().enumerate() {
      self.set_dac(ch, *value)?;
    }
    Ok(())
  }

  /// Enable (clear) the trigger bit of a channel if it 
  /// belongs to the active pair or broadcast_all is 
  /// set, otherwise disable it (set).
  pub fn set_trigger_enable(&mut self,
                            channel       : usize,
                            active_pair   : usize,
                            broadcast_all : bool) -> Result<(), ConfigError> {
    if channel >= NCHN {
      return Err(ConfigError::ChannelOutOfRange(channel));
    }
    let enable = channel/2 == active_pair || broadcast_all;
    self.bits.set(TRIGGER_OFFSET + channel*TRIGGER_STRIDE, !enable);
    Ok(())
  }

  pub fn trigger_enabled(&self, channel : usize) -> Result<bool, ConfigError> {
    if channel >= NCHN {
      return Err(ConfigError::ChannelOutOfRange(channel));
    }
    Ok(!self.bits.get(TRIGGER_OFFSET + channel*TRIGGER_STRIDE))
  }

  /// Prepare the trigger bits of all channels for 
  /// acquiring the given pair
  pub fn configure_pair(&mut self, pair : usize, mode : TriggerMode) -> Result<(), ConfigError> {
    match mode {
      TriggerMode::AsIs => (),
      TriggerMode::AllChannels => {
        for ch in 0..NCHN {
          self.set_trigger_enable(ch, pair, true)?;
        }
      }
      TriggerMode::Pairwise => {
        for ch in 0..NCHN {
          self.set_trigger_enable(ch, pair, false)?;
        }
      }
    }
    Ok(())
  }

  /// Set the 10bit time and charge discriminator 
  /// thresholds
  pub fn set_thresholds(&mut self, time : u16, charge : u16) -> Result<(), ConfigError> {
    for value in [time, charge] {
      if value as u32 >= 1 << THRESHOLD_BITS {
        return Err(ConfigError::ValueOutOfRange {value : value as u32, bits : THRESHOLD_BITS});
      }
    }
    self.bits.set_field(TIME_THRESHOLD_OFFSET,   THRESHOLD_BITS, time as u32)?;
    self.bits.set_field(CHARGE_THRESHOLD_OFFSET, THRESHOLD_BITS, charge as u32)?;
    Ok(())
  }

  pub fn get_thresholds(&self) -> Result<(u16, u16), ConfigError> {
    let time   = self.bits.get_field(TIME_THRESHOLD_OFFSET,   THRESHOLD_BITS)? as u16;
    let charge = self.bits.get_field(CHARGE_THRESHOLD_OFFSET, THRESHOLD_BITS)? as u16;
    Ok((time, charge))
  }
}

impl fmt::Display for SlowControlConfig {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    let mut repr = String::from("<SlowControlConfig:");
    let dacs : Vec<u8> = (0..NCHN).map(|ch| self.get_dac(ch).unwrap_or(0)).collect();
    repr += &(format!("\n  DAC  : {:?}", dacs));
    let enabled : Vec<usize> = (0..NCHN).filter(|ch| self.trigger_enabled(*ch).unwrap_or(false)).collect();
    repr += &(format!("\n  TRIG : {:?}", enabled));
    repr += &(format!("\n  HEX  : {}>", self.to_hex()));
    write!(f, "{}", repr)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::constants::{SC_BYTE_LEN, SC_HEX_LEN};

  #[test]
  fn pack_length_is_ceil() {
    for bit_len in 0..70 {
      let seq = BitSeq::zeros(bit_len);
      assert_eq!(seq.pack().len(), (bit_len + 7)/8);
    }
    assert_eq!(BitSeq::zeros(SC_BIT_LEN).pack().len(), SC_BYTE_LEN);
  }

  #[test]
  fn pack_reverses_bytes() {
    // '0101110111101001' = [0xe9, 0x5d]
    let seq = BitSeq::parse_text("01011101 11101001", 16).unwrap();
    assert_eq!(seq.pack(), vec![0xe9, 0x5d]);
    assert_eq!(seq.to_hex(), "e95d");
  }

  #[test]
  fn unpack_odd_lengths() {
    let bits : Vec<bool> = (0..13).map(|i| i % 3 == 0).collect();
    let seq    = BitSeq::from_bits(bits);
    let packed = seq.pack();
    assert_eq!(BitSeq::unpack(&packed, 13).unwrap(), seq);
  }

  #[test]
  fn text_strips_comments_and_whitespace() {
    let content = "0101 ' this is a comment with 1s and 0s\n  11\t00 '\n\n1\n";
    let seq = BitSeq::parse_text(content, 9).unwrap();
    let expected : Vec<bool> = "010111001".chars().map(|c| c == '1').collect();
    assert_eq!(seq, BitSeq::from_bits(expected));
  }

  #[test]
  fn text_length_mismatch() {
    let content = "1".repeat(330);
    match BitSeq::parse_text(&content, 331) {
      Err(ConfigError::LengthMismatch {expected, found}) => {
        assert_eq!(expected, 331);
        assert_eq!(found, 330);
      }
      other => panic!("Expected LengthMismatch, got {:?}", other),
    }
  }

  #[test]
  fn text_invalid_character() {
    assert_eq!(BitSeq::parse_text("0120", 4), Err(ConfigError::InvalidCharacter('2')));
  }

  #[test]
  fn hex_mirrors_blocks() {
    let seq = BitSeq::decode_hex("e95d", 16).unwrap();
    let expected : Vec<bool> = "0101110111101001".chars().map(|c| c == '1').collect();
    assert_eq!(seq, BitSeq::from_bits(expected));
    assert!(BitSeq::decode_hex("e95", 16).is_err());
    assert_eq!(BitSeq::decode_hex("e9zd", 16), Err(ConfigError::InvalidHex('z')));
  }

  #[test]
  fn dac_and_trigger_survive_packing() {
    let mut sc = SlowControlConfig::new(BitSeq::zeros(SC_BIT_LEN)).unwrap();
    for ch in 0..NCHN {
      sc.set_dac(ch, (ch*7 + 3) as u8).unwrap();
    }
    sc.configure_pair(5, TriggerMode::Pairwise).unwrap();
    sc.set_thresholds(250, 1023).unwrap();
    let hex = sc.to_hex();
    assert_eq!(hex.len(), SC_HEX_LEN);
    let restored = SlowControlConfig::new(BitSeq::unpack(&sc.pack(), SC_BIT_LEN).unwrap()).unwrap();
    let from_hex = SlowControlConfig::from_hex(&hex).unwrap();
    for cfg in [restored, from_hex] {
      for ch in 0..NCHN {
        assert_eq!(cfg.get_dac(ch).unwrap(), (ch*7 + 3) as u8);
        assert_eq!(cfg.trigger_enabled(ch).unwrap(), ch/2 == 5);
      }
      assert_eq!(cfg.get_thresholds().unwrap(), (250, 1023));
    }
  }

  #[test]
  fn dac_is_msb_first() {
    let mut sc = SlowControlConfig::new(BitSeq::zeros(SC_BIT_LEN)).unwrap();
    sc.set_dac(1, 0b1000_0001).unwrap();
    assert!(sc.bits.get(340));
    assert!(!sc.bits.get(341));
    assert!(sc.bits.get(347));
    assert_eq!(sc.set_dac(32, 1), Err(ConfigError::ChannelOutOfRange(32)));
  }

  #[test]
  fn trigger_modes() {
    let mut sc = SlowControlConfig::new(BitSeq::zeros(SC_BIT_LEN)).unwrap();
    sc.configure_pair(0, TriggerMode::AllChannels).unwrap();
    assert!((0..NCHN).all(|ch| sc.trigger_enabled(ch).unwrap()));
    sc.configure_pair(3, TriggerMode::Pairwise).unwrap();
    let before = sc.clone();
    sc.configure_pair(7, TriggerMode::AsIs).unwrap();
    assert_eq!(before, sc);
    // bit set means disabled
    assert!(sc.bits.get(TRIGGER_OFFSET));
    assert!(!sc.bits.get(TRIGGER_OFFSET + 6*TRIGGER_STRIDE));
  }

  #[test]
  fn thresholds_are_10bit() {
    let mut sc = SlowControlConfig::new(BitSeq::zeros(SC_BIT_LEN)).unwrap();
    sc.set_thresholds(1023, 250).unwrap();
    assert_eq!(sc.get_thresholds().unwrap(), (1023, 250));
    assert_eq!(sc.set_thresholds(1024, 250),
               Err(ConfigError::ValueOutOfRange {value : 1024, bits : THRESHOLD_BITS}));
    assert_eq!(sc.get_thresholds().unwrap(), (1023, 250));
  }

  #[test]
  fn events_per_pair() {
    assert_eq!(TriggerMode::Pairwise.events_per_pair(5000), 5000);
    assert_eq!(TriggerMode::AllChannels.events_per_pair(5000), 312);
    assert_eq!(TriggerMode::AsIs.events_per_pair(5000), 312);
  }
}
