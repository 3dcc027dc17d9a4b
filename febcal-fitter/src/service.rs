//! Request/result loop of a single fitter

use std::sync::atomic::{AtomicBool,
                        Ordering};

use feb_dataclasses::CalibrationRequest;
use feb_dataclasses::calibration::ERR_SENTINEL;
use febcal_lib::{calibrate,
                 FindPeaks,
                 FitGaussian,
                 FitterSettings,
                 PeakSearch,
                 LevenbergMarquardt};

/// Answer a single request
///
/// Whatever goes wrong - an undecodable request or 
/// a spectrum without usable peaks - the answer 
/// is the failure sentinel.
pub fn handle_request(text     : &str,
                      finder   : &dyn FindPeaks,
                      fitter   : &dyn FitGaussian,
                      settings : &FitterSettings) -> String {
  let request = match CalibrationRequest::from_json(text) {
    Err(err) => {
      warn!("Can not decode request! {}", err);
      return String::from(ERR_SENTINEL);
    }
    Ok(req) => req
  };
  match calibrate(&request, finder, fitter, settings) {
    Err(err) => {
      warn!("Calibration of {} failed! {}", request.key, err);
      String::from(ERR_SENTINEL)
    }
    Ok(result) => {
      match result.to_json() {
        Err(err) => {
          error!("Unable to encode result for {}! {}", request.key, err);
          String::from(ERR_SENTINEL)
        }
        Ok(reply) => reply
      }
    }
  }
}

pub struct CalibrationService {
  input       : zmq::Socket,
  output      : zmq::Socket,
  settings    : FitterSettings,
  finder      : PeakSearch,
  fitter      : LevenbergMarquardt,
  pub n_requests : usize,
  pub n_failed   : usize,
}

impl CalibrationService {

  /// Connect to the request and result endpoints
  /// given in the settings
  pub fn connect(ctx      : &zmq::Context,
                 settings : FitterSettings) -> Result<Self, zmq::Error> {
    let input = ctx.socket(zmq::PULL)?;
    input.set_rcvtimeo(200)?;
    input.connect(&settings.input_address)?;
    info!("Pulling requests from {}", settings.input_address);
    let output = ctx.socket(zmq::PUSH)?;
    output.connect(&settings.output_address)?;
    info!("Pushing results to {}", settings.output_address);
    Ok(Self {
      input,
      output,
      settings,
      finder     : PeakSearch::new(),
      fitter     : LevenbergMarquardt::new(),
      n_requests : 0,
      n_failed   : 0,
    })
  }

  /// Serve requests until stop is set
  ///
  /// Transport problems are logged, the loop 
  /// carries on with the next message.
  pub fn serve(&mut self, stop : &AtomicBool) {
    while !stop.load(Ordering::Relaxed) {
      let message = match self.input.recv_bytes(0) {
        Err(zmq::Error::EAGAIN) => continue,
        Err(err) => {
          error!("Receiving request failed! {err}");
          continue;
        }
        Ok(msg) => msg
      };
      self.n_requests += 1;
      let reply = match String::from_utf8(message) {
        Err(err) => {
          warn!("Request is not valid utf8! {err}");
          String::from(ERR_SENTINEL)
        }
        Ok(text) => handle_request(&text, &self.finder, &self.fitter, &self.settings)
      };
      if reply == ERR_SENTINEL {
        self.n_failed += 1;
      }
      match self.output.send(reply.as_bytes(), 0) {
        Err(err) => error!("Unable to send result! {err}"),
        Ok(_)    => debug!("Request {} done", self.n_requests)
      }
    }
    info!("Served {} requests, {} failed", self.n_requests, self.n_failed);
  }
}
