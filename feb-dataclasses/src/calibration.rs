//! Messages to and from the calibration engine
//!
//! Both directions are json. A request carries an 
//! opaque key, which is handed back unchanged, and
//! a sparse spectrum "bin" -> count. The reply is 
//! either a full result or the literal "ERR".

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::NBINS;
use crate::errors::{SerializationError,
                    CalibrationError};

/// Reply of the calibration engine if no 
/// calibration could be found
pub const ERR_SENTINEL : &str = "ERR";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationRequest {
  pub key      : Value,
  pub spectrum : BTreeMap<String, f64>,
}

impl CalibrationRequest {

  pub fn from_json(text : &str) -> Result<Self, SerializationError> {
    match serde_json::from_str::<CalibrationRequest>(text) {
      Err(err) => {
        error!("Unable to decode calibration request! {err}");
        Err(SerializationError::JsonDecodingError)
      }
      Ok(req) => Ok(req)
    }
  }

  pub fn to_json(&self) -> Result<String, SerializationError> {
    serde_json::to_string(self).map_err(|_| SerializationError::JsonDecodingError)
  }

  /// The spectrum as (bin, count), sorted by bin
  ///
  /// Bins which are not a number or do not fit 
  /// into the 12bit range render the request invalid.
  pub fn bins(&self) -> Result<Vec<(usize, f64)>, CalibrationError> {
    let mut bins = Vec::<(usize, f64)>::with_capacity(self.spectrum.len());
    for (key, count) in self.spectrum.iter() {
      match key.trim().parse::<usize>() {
        Ok(bin) if bin < NBINS => bins.push((bin, *count)),
        _ => {
          warn!("Invalid bin {} in spectrum of {}", key, self.key);
          return Err(CalibrationError::InvalidRequest);
        }
      }
    }
    bins.sort_by_key(|(bin, _)| *bin);
    Ok(bins)
  }
}

/// A peak as it comes out of the gaussian fit
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct PeakCandidate {
  pub center     : f64,
  pub center_err : f64,
  pub amplitude  : f64,
}

impl PeakCandidate {
  /// Relative uncertainty of the center
  pub fn relative_err(&self) -> f64 {
    self.center_err / self.center
  }
}

/// The good peaks found with one set of search 
/// parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeakSet {
  pub threshold  : f64,
  pub peak_width : usize,
  pub bin_size   : usize,
  /// (center, center error) 
  pub fits       : Vec<(f64, f64)>,
}

/// Result of the fit to the distance histogram. 
///
/// On the wire this is [center, sigma, chi2, ndf]
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64;4]", into = "[f64;4]")]
pub struct GainEstimate {
  pub center     : f64,
  /// Never below half a bin of the distance histogram.
  /// At that floor the width is not resolved.
  pub sigma      : f64,
  pub chi_square : f64,
  pub ndf        : usize,
}

impl From<[f64;4]> for GainEstimate {
  fn from(values : [f64;4]) -> Self {
    Self {
      center     : values[0],
      sigma      : values[1],
      chi_square : values[2],
      ndf        : values[3].max(0.0) as usize,
    }
  }
}

impl From<GainEstimate> for [f64;4] {
  fn from(gain : GainEstimate) -> Self {
    [gain.center, gain.sigma, gain.chi_square, gain.ndf as f64]
  }
}

impl fmt::Display for GainEstimate {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    write!(f, "<GainEstimate: {:.3} +- {:.3} (chi2/ndf {:.2}/{})>",
           self.center, self.sigma, self.chi_square, self.ndf)
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationResult {
  pub key       : Value,
  pub peaks     : Vec<PeakSet>,
  /// (distance, uncertainty)
  pub distances : Vec<(f64, f64)>,
  pub gain      : GainEstimate,
}

impl CalibrationResult {

  pub fn to_json(&self) -> Result<String, SerializationError> {
    serde_json::to_string(self).map_err(|_| SerializationError::JsonDecodingError)
  }

  /// Decode a reply of the calibration engine. 
  /// The failure sentinel gives None.
  pub fn from_reply(text : &str) -> Result<Option<Self>, SerializationError> {
    if text.trim() == ERR_SENTINEL {
      return Ok(None);
    }
    match serde_json::from_str::<CalibrationResult>(text) {
      Err(err) => {
        error!("Unable to decode calibration result! {err}");
        Err(SerializationError::JsonDecodingError)
      }
      Ok(result) => Ok(Some(result))
    }
  }
}

impl fmt::Display for CalibrationResult {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    let mut repr = format!("<CalibrationResult: {}", self.key);
    repr += &(format!("\n  peak sets : {}", self.peaks.len()));
    repr += &(format!("\n  distances : {}", self.distances.len()));
    repr += &(format!("\n  gain      : {}>", self.gain));
    write!(f, "{}", repr)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn request_bins() {
    let req = CalibrationRequest::from_json(r#"{"key": [1, "a"], "spectrum": {"12": 4, "3": 1.5}}"#).unwrap();
    assert_eq!(req.key, json!([1, "a"]));
    assert_eq!(req.bins().unwrap(), vec![(3, 1.5), (12, 4.0)]);
  }

  #[test]
  fn request_invalid_bins() {
    let req = CalibrationRequest::from_json(r#"{"key": 0, "spectrum": {"4096": 1}}"#).unwrap();
    assert_eq!(req.bins(), Err(CalibrationError::InvalidRequest));
    let req = CalibrationRequest::from_json(r#"{"key": 0, "spectrum": {"x": 1}}"#).unwrap();
    assert_eq!(req.bins(), Err(CalibrationError::InvalidRequest));
    assert!(CalibrationRequest::from_json("{\"spectrum\": 1}").is_err());
  }

  #[test]
  fn result_wire_format() {
    let result = CalibrationResult {
      key       : json!("7:12"),
      peaks     : vec![PeakSet {threshold : 0.05, peak_width : 3, bin_size : 1, fits : vec![(100.0, 1.0)]}],
      distances : vec![(50.0, 2.0)],
      gain      : GainEstimate {center : 50.0, sigma : 1.5, chi_square : 3.0, ndf : 4},
    };
    let text  = result.to_json().unwrap();
    let value : Value = serde_json::from_str(&text).unwrap();
    assert_eq!(value["gain"], json!([50.0, 1.5, 3.0, 4.0]));
    assert_eq!(value["distances"], json!([[50.0, 2.0]]));
    assert_eq!(value["peaks"][0]["fits"], json!([[100.0, 1.0]]));
    assert_eq!(value["peaks"][0]["peak_width"], json!(3));
    assert_eq!(CalibrationResult::from_reply(&text).unwrap(), Some(result));
    assert_eq!(CalibrationResult::from_reply("ERR").unwrap(), None);
  }
}
