//! Dataclasses for the frontend boards (febs)
//!
//! The febs are read out by an external driver, which
//! is talked to over 0MQ. This crate holds everything
//! which goes over the wire between the driver, the
//! histogram builder (febcal-histos) and the calibration
//! engine (febcal-fitter):
//!
//! * `events`      - 76 byte event records as published by the driver
//! * `config`      - the CITIROC slow control register and its bit packing
//! * `commands`    - command frames for the driver's REQ/REP socket
//! * `histograms`  - pedestal/gain histograms for all channels of a board
//! * `calibration` - json encoded calibration requests/results
//!

pub mod constants;
pub mod errors;
pub mod serialization;
pub mod events;
pub mod config;
pub mod commands;
pub mod histograms;
pub mod calibration;

pub use events::EventRecord;
pub use config::{BitSeq,
                 TriggerMode,
                 SlowControlConfig};
pub use commands::DriverCommand;
pub use histograms::HistogramSet;
pub use calibration::{CalibrationRequest,
                      CalibrationResult,
                      GainEstimate,
                      PeakCandidate,
                      PeakSet};

#[macro_use] extern crate log;
