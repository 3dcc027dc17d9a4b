//! Gain vs bias calibration of whole boards
//!
//! For every bias setting the histogram sets written by 
//! febcal-collect are loaded, summed per board and the 
//! gain spectrum of every channel is sent to the fitters.
//! The gains found at the different bias settings give
//! the gain vs bias dependency of each SiPM, from which 
//! the bias settings for a nominal gain are planned.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path,
                PathBuf};

use chrono::{DateTime,
             Utc};
use serde_json::Value;

use feb_dataclasses::{CalibrationRequest,
                      CalibrationResult,
                      HistogramSet};
use feb_dataclasses::constants::NCHN;
use feb_dataclasses::serialization::Serialization;
use febcal_lib::bias::{fit_gain_dependency,
                       GainDependency};

/// Read all .histos files in a directory. 
///
/// Files which can not be read or decoded are skipped.
pub fn load_histogram_sets(dir : &Path) -> Vec<HistogramSet> {
  let mut sets = Vec::<HistogramSet>::new();
  let entries  = match fs::read_dir(dir) {
    Err(err) => {
      error!("Unable to read directory {}! {}", dir.display(), err);
      return sets;
    }
    Ok(entries) => entries
  };
  let mut paths : Vec<PathBuf> = entries
    .filter_map(|e| e.ok())
    .map(|e| e.path())
    .filter(|p| p.extension().map_or(false, |ext| ext == "histos"))
    .collect();
  paths.sort();
  for path in paths {
    match fs::read(&path) {
      Err(err) => {
        error!("Unable to read {}! {}", path.display(), err);
      }
      Ok(bytes) => {
        let mut pos = 0usize;
        match HistogramSet::from_bytestream(&bytes, &mut pos) {
          Err(err) => {
            warn!("{} is not a histogram set! {}", path.display(), err);
          }
          Ok(set) => {
            debug!("Loaded {} (board {})", path.display(), set.board_id);
            sets.push(set);
          }
        }
      }
    }
  }
  sets
}

/// Sort histogram sets by board
pub fn by_board(sets : Vec<HistogramSet>) -> BTreeMap<u8, Vec<HistogramSet>> {
  let mut boards = BTreeMap::<u8, Vec<HistogramSet>>::new();
  for set in sets {
    boards.entry(set.board_id).or_default().push(set);
  }
  boards
}

/// One request per channel of the summed histograms.
/// Channels without gain entries are left out.
pub fn requests_for_board(sets : &[HistogramSet]) -> Vec<CalibrationRequest> {
  let sum = match HistogramSet::aggregate(sets) {
    None => return Vec::<CalibrationRequest>::new(),
    Some(sum) => sum
  };
  (0..NCHN).filter(|ch| sum.gain_entries(*ch) > 0)
           .map(|ch| sum.spectrum_request(ch))
           .collect()
}

/// Board and channel from a "<board>:<channel>" key
pub fn parse_key(key : &Value) -> Option<(u8, usize)> {
  let text     = key.as_str()?;
  let (b, c)   = text.split_once(':')?;
  let board    = b.trim().parse::<u8>().ok()?;
  let channel  = c.trim().parse::<usize>().ok()?;
  if channel >= NCHN {
    return None;
  }
  Some((board, channel))
}

/// Gain and its uncertainty from a calibration result
///
/// The uncertainty is the spread of the distances within
/// 3 sigma of the gain (at least the fitted sigma) over 
/// the square root of their number. Gains with a relative
/// uncertainty of max_rel_err or more are dropped.
pub fn gain_point(result : &CalibrationResult, max_rel_err : f64) -> Option<(f64, f64)> {
  let gain  = result.gain.center;
  let sigma = result.gain.sigma.abs();
  if !gain.is_finite() || gain <= 0.0 {
    return None;
  }
  let close : Vec<f64> = result.distances.iter()
    .map(|(d, _)| *d)
    .filter(|d| (d - gain).abs() <= 3.0*sigma)
    .collect();
  if close.is_empty() {
    return None;
  }
  let n    = close.len() as f64;
  let mean = close.iter().sum::<f64>() / n;
  let rms  = (close.iter().map(|d| (d - mean).powi(2)).sum::<f64>() / n).sqrt();
  let err  = rms.max(sigma) / n.sqrt();
  if err / gain >= max_rel_err {
    debug!("Dropping gain {:.2} +- {:.2}", gain, err);
    return None;
  }
  Some((gain, err))
}

/// Send the requests and wait for as many replies.
///
/// Replies are not matched to the requests, the key 
/// of each result tells where it belongs. Failed 
/// calibrations ("ERR") are logged and left out. If the
/// pull socket has a receive timeout, we stop waiting 
/// once it expires.
pub fn request_calibrations(push     : &zmq::Socket,
                            pull     : &zmq::Socket,
                            requests : &[CalibrationRequest]) -> Vec<CalibrationResult> {
  let mut sent = 0usize;
  for request in requests {
    match request.to_json() {
      Err(err) => {
        error!("Can not encode request {}! {}", request.key, err);
      }
      Ok(text) => {
        match push.send(text.as_bytes(), 0) {
          Err(err) => error!("Unable to send request {}! {}", request.key, err),
          Ok(_)    => sent += 1
        }
      }
    }
  }
  let mut results  = Vec::<CalibrationResult>::with_capacity(sent);
  let mut n_failed = 0usize;
  for _ in 0..sent {
    let reply = match pull.recv_bytes(0) {
      Err(zmq::Error::EAGAIN) => {
        warn!("Timeout waiting for results!");
        break;
      }
      Err(err) => {
        error!("Receiving result failed! {err}");
        continue;
      }
      Ok(reply) => reply
    };
    match CalibrationResult::from_reply(&String::from_utf8_lossy(&reply)) {
      Err(err) => {
        warn!("Can not decode result! {}", err);
        n_failed += 1;
      }
      Ok(None) => {
        n_failed += 1;
      }
      Ok(Some(result)) => results.push(result)
    }
  }
  info!("Sent / Received / Failed : {}/{}/{}", sent, results.len(), n_failed);
  results
}

/// (bias, gain, uncertainty) for every SiPM
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GainTable {
  points : BTreeMap<(u8, usize), Vec<(f64, f64, f64)>>,
}

impl GainTable {
  pub fn new() -> Self {
    Self {
      points : BTreeMap::<(u8, usize), Vec<(f64, f64, f64)>>::new(),
    }
  }

  pub fn add(&mut self, board : u8, channel : usize, bias : f64, gain : f64, err : f64) {
    self.points.entry((board, channel)).or_default().push((bias, gain, err));
  }

  /// Boards with at least one gain
  pub fn boards(&self) -> Vec<u8> {
    let mut boards : Vec<u8> = self.points.keys().map(|(b, _)| *b).collect();
    boards.dedup();
    boards
  }

  /// (channel, gain, uncertainty) of a board at a bias setting
  pub fn gains_at(&self, board : u8, bias : f64) -> Vec<(usize, f64, f64)> {
    let mut gains = Vec::<(usize, f64, f64)>::new();
    for ((b, ch), points) in self.points.iter() {
      if *b != board {
        continue;
      }
      for (x, y, s) in points {
        if *x == bias {
          gains.push((*ch, *y, *s));
        }
      }
    }
    gains
  }

  /// Dependencies of all channels of a board. Channels with 
  /// less than 3 gains have none.
  pub fn dependencies(&self, board : u8) -> Vec<Option<GainDependency>> {
    (0..NCHN).map(|ch| {
      self.points.get(&(board, ch)).and_then(|points| fit_gain_dependency(points))
    }).collect()
  }
}

/// Where to write a result file for a board
pub fn result_filename(dir : &Path, board : u8, extension : &str, when : &DateTime<Utc>) -> PathBuf {
  let stamp = when.format("%Y%m%d_%H%M%S");
  dir.join(format!("{:02x}-{}.{}", board, stamp, extension))
}

pub fn format_gains(gains : &[(usize, f64, f64)]) -> String {
  let mut repr = String::from("");
  for (ch, gain, err) in gains {
    repr += &(format!("{}: {:.2} ({:.2})\n", ch, gain, err));
  }
  repr
}

pub fn format_dependencies(dependencies : &[Option<GainDependency>]) -> String {
  let mut repr = String::from("SiPM\tSlope\tOffset\n");
  for (ch, dep) in dependencies.iter().enumerate() {
    if let Some(dep) = dep {
      repr += &(format!("{}\t{:.2}\t{:.2}\n", ch, dep.slope, dep.offset));
    }
  }
  repr
}

pub fn format_bias_settings(settings : &[u8]) -> String {
  let mut repr = String::from("SiPM\tbias\n");
  for (ch, bias) in settings.iter().enumerate() {
    repr += &(format!("{}\t{}\n", ch, bias));
  }
  repr
}
