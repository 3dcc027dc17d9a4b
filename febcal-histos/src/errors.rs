//! Errors of the acquisition controller

use std::error::Error;
use std::fmt;

use feb_dataclasses::errors::{ConfigError,
                              SerializationError};

/// Problems talking to the feb driver
#[derive(Debug, Clone, PartialEq)]
pub enum DriverError {
  /// The driver did not answer a command within 
  /// the configured number of attempts
  Unresponsive {command : String, attempts : usize},
  ZmqError(String),
}

impl fmt::Display for DriverError {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    let repr : String;
    match self {
      DriverError::Unresponsive {command, attempts} => {
        repr = format!("Unresponsive - no reply to {} after {} attempts", command, attempts);
      }
      DriverError::ZmqError(err) => {
        repr = format!("ZmqError - {}", err);
      }
    }
    write!(f, "<DriverError : {}>", repr)
  }
}

impl Error for DriverError {
}

impl From<zmq::Error> for DriverError {
  fn from(err : zmq::Error) -> Self {
    DriverError::ZmqError(err.to_string())
  }
}

/*************************************/

/// Everything which can stop an acquisition
#[derive(Debug, Clone, PartialEq)]
pub enum AcquisitionError {
  Driver(DriverError),
  Config(ConfigError),
  Serialization(SerializationError),
  /// Receiving events failed
  Source(String),
  /// Sending the histograms failed
  Sink(String),
  /// We have been asked to stop
  Interrupted,
}

impl fmt::Display for AcquisitionError {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    let repr : String;
    match self {
      AcquisitionError::Driver(err)        => repr = format!("Driver - {}", err),
      AcquisitionError::Config(err)        => repr = format!("Config - {}", err),
      AcquisitionError::Serialization(err) => repr = format!("Serialization - {}", err),
      AcquisitionError::Source(err)        => repr = format!("Source - {}", err),
      AcquisitionError::Sink(err)          => repr = format!("Sink - {}", err),
      AcquisitionError::Interrupted        => repr = String::from("Interrupted"),
    }
    write!(f, "<AcquisitionError : {}>", repr)
  }
}

impl Error for AcquisitionError {
}

impl From<DriverError> for AcquisitionError {
  fn from(err : DriverError) -> Self {
    AcquisitionError::Driver(err)
  }
}

impl From<ConfigError> for AcquisitionError {
  fn from(err : ConfigError) -> Self {
    AcquisitionError::Config(err)
  }
}

impl From<SerializationError> for AcquisitionError {
  fn from(err : SerializationError) -> Self {
    AcquisitionError::Serialization(err)
  }
}
