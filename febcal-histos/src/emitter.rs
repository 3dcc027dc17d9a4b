//! Send out completed histogram sets

use feb_dataclasses::HistogramSet;
use feb_dataclasses::serialization::Serialization;

use crate::errors::AcquisitionError;

pub trait HistogramSink {
  fn emit(&mut self, histos : &HistogramSet) -> Result<(), AcquisitionError>;
}

/// Pushes the serialized histograms to a single consumer
pub struct ZmqHistogramSink {
  socket : zmq::Socket,
}

impl ZmqHistogramSink {
  pub fn connect(ctx : &zmq::Context, address : &str) -> Result<Self, AcquisitionError> {
    let socket = ctx.socket(zmq::PUSH).map_err(|e| AcquisitionError::Sink(e.to_string()))?;
    match socket.connect(address) {
      Err(err) => {
        error!("Unable to connect to histogram sink {}! {}", address, err);
        Err(AcquisitionError::Sink(err.to_string()))
      }
      Ok(_) => {
        info!("Histograms will be pushed to {}", address);
        Ok(Self {
          socket
        })
      }
    }
  }
}

impl HistogramSink for ZmqHistogramSink {
  fn emit(&mut self, histos : &HistogramSet) -> Result<(), AcquisitionError> {
    let payload = histos.to_bytestream();
    match self.socket.send(payload, 0) {
      Err(err) => {
        error!("Unable to send histograms of board {}! {}", histos.board_id, err);
        Err(AcquisitionError::Sink(err.to_string()))
      }
      Ok(_) => {
        debug!("Sent histograms of board {}", histos.board_id);
        Ok(())
      }
    }
  }
}
