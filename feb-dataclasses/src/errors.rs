//! Errors which can occur when dealing 
//! with the feb dataclasses

use std::error::Error;
use std::fmt;

/// Indicate issues with (de)serialization
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum SerializationError {
  StreamTooShort,
  StreamTooLong,
  WrongByteSize,
  AdcOutOfRange,
  JsonDecodingError,
  TomlDecodingError,
}

impl SerializationError {
  pub fn to_string(&self) -> String {
    match self {
      SerializationError::StreamTooShort    => {return String::from("StreamTooShort");},
      SerializationError::StreamTooLong     => {return String::from("StreamTooLong");},
      SerializationError::WrongByteSize     => {return String::from("WrongByteSize");},
      SerializationError::AdcOutOfRange     => {return String::from("AdcOutOfRange");},
      SerializationError::JsonDecodingError => {return String::from("JsonDecodingError");},
      SerializationError::TomlDecodingError => {return String::from("TomlDecodingError");},
    }
  }
}

impl fmt::Display for SerializationError {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    let repr = self.to_string();
    write!(f, "<SerializationError : {}>", repr)
  }
}

impl Error for SerializationError {
}

/*************************************/

/// Problems with slow control/power amplifier
/// configurations. 
///
/// These are fatal at startup.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
  FileNotFound(String),
  LengthMismatch {expected : usize, found : usize},
  InvalidCharacter(char),
  InvalidHex(char),
  ChannelOutOfRange(usize),
  FieldOutOfRange {position : usize, length : usize},
  ValueOutOfRange {value : u32, bits : usize},
}

impl fmt::Display for ConfigError {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    let repr : String;
    match self {
      ConfigError::FileNotFound(path) => {
        repr = format!("FileNotFound {}", path);
      }
      ConfigError::LengthMismatch {expected, found} => {
        repr = format!("LengthMismatch {} != {}", found, expected);
      }
      ConfigError::InvalidCharacter(c) => {
        repr = format!("InvalidCharacter '{}'", c);
      }
      ConfigError::InvalidHex(c) => {
        repr = format!("InvalidHex '{}'", c);
      }
      ConfigError::ChannelOutOfRange(ch) => {
        repr = format!("ChannelOutOfRange {}", ch);
      }
      ConfigError::FieldOutOfRange {position, length} => {
        repr = format!("FieldOutOfRange {}+{}", position, length);
      }
      ConfigError::ValueOutOfRange {value, bits} => {
        repr = format!("ValueOutOfRange {} does not fit {} bits", value, bits);
      }
    }
    write!(f, "<ConfigError : {}>", repr)
  }
}

impl Error for ConfigError {
}

/*************************************/

/// Outcome of a calibration request which did 
/// not produce a gain
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum CalibrationError {
  /// No parameter set yielded enough good peaks.
  /// This is an expected outcome for bad spectra.
  Infeasible,
  /// The request could not be interpreted
  InvalidRequest,
  /// The final gaussian fit on the distance histogram failed
  FitFailed,
}

impl fmt::Display for CalibrationError {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    let repr = match self {
      CalibrationError::Infeasible     => "Infeasible",
      CalibrationError::InvalidRequest => "InvalidRequest",
      CalibrationError::FitFailed      => "FitFailed",
    };
    write!(f, "<CalibrationError : {}>", repr)
  }
}

impl Error for CalibrationError {
}
