//! Acquisition controller for the feb calibration
//!
//! Talks to the feb driver over 0MQ: a REQ socket
//! for commands and a SUB socket for the event stream.
//! The board is configured pair by pair and the events
//! are sorted into pedestal and gain histograms, which
//! are pushed out once all pairs have been done.
//!
//! The sockets are hidden behind the traits 
//! `ControlLink`, `EventSource` and `HistogramSink`,
//! so the state machine can run without any hardware.

#[macro_use] extern crate log;

pub mod errors;
pub mod driver;
pub mod source;
pub mod demux;
pub mod emitter;
pub mod controller;
pub mod collector;

pub use errors::{DriverError,
                 AcquisitionError};
pub use driver::{ControlLink,
                 ZmqDriver};
pub use source::{EventSource,
                 ZmqEventSource};
pub use demux::{EventDemultiplexer,
                DemuxStats};
pub use emitter::{HistogramSink,
                  ZmqHistogramSink};
pub use controller::{AcquisitionController,
                     AcquisitionState};
pub use collector::{CollectionTally,
                    histogram_filename};

use feb_dataclasses::SlowControlConfig;
use feb_dataclasses::constants::NCHN;
use feb_dataclasses::errors::ConfigError;

/// Expand the DAC values given on the command line
///
/// Either none, a single one for all channels or 
/// exactly one per channel.
pub fn expand_dac_values(values : &[u8]) -> Option<Option<[u8;NCHN]>> {
  match values.len() {
    0    => Some(None),
    1    => Some(Some([values[0];NCHN])),
    NCHN => {
      let mut dacs = [0u8;NCHN];
      dacs.copy_from_slice(values);
      Some(Some(dacs))
    }
    _    => None
  }
}

/// Put the input DACs and discriminator thresholds 
/// given on the command line into the configuration
pub fn apply_overrides(sc         : &mut SlowControlConfig,
                       dacs       : Option<[u8;NCHN]>,
                       thresholds : Option<(u16, u16)>) -> Result<(), ConfigError> {
  if let Some(values) = dacs {
    sc.set_dacs(&values)?;
    info!("Input DACs set to {:?}", values);
  }
  if let Some((time, charge)) = thresholds {
    sc.set_thresholds(time, charge)?;
    info!("Thresholds set to time {} charge {}", time, charge);
  }
  Ok(())
}
