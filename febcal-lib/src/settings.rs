//! Aggregate settings for the febcal programs
//!
//! Every program reads its own section, so one
//! file can describe a full calibration setup.
//! Command line arguments override the values 
//! in the file.
//!

use std::fs::File;
use std::io::{
    Write,
    Read,
};
use std::fmt;

extern crate toml;

use feb_dataclasses::serialization::SerializationError;

/// How the pairwise peak distances enter the 
/// distance histogram
#[derive(Debug, Copy, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub enum DistanceWeighting {
  /// Every distance counts once
  Count,
  /// The distance is weighted with its own uncertainty.
  /// Reproduces the results of the legacy fitter.
  Uncertainty,
}

impl fmt::Display for DistanceWeighting {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    let repr = match self {
      DistanceWeighting::Count       => "Count",
      DistanceWeighting::Uncertainty => "Uncertainty",
    };
    write!(f, "<DistanceWeighting: {}>", repr)
  }
}

/// Settings for the acquisition (febcal-histos)
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct HistosSettings {
  /// REQ socket of the feb driver
  pub driver_address     : String,
  /// PUB socket of the feb driver
  pub event_address      : String,
  /// The histograms are pushed here
  pub output_address     : String,
  /// mac5 of the board to calibrate
  pub board              : u8,
  /// Events per channel pair. In all/as-is mode
  /// this is the total for all pairs
  pub events             : usize,
  /// Slow control register, text file
  pub sc_config          : String,
  /// Power amplifier register, text file
  pub pm_config          : String,
  /// Enable the triggers of all channels
  pub all_channels       : bool,
  /// Do not touch the trigger bits
  pub as_is              : bool,
  /// Start over after the histograms have 
  /// been sent
  pub continuous         : bool,
  /// Wait after switching on the bias
  pub settle_delay_ms    : u64,
  /// Receive timeout for every driver request
  pub driver_timeout_ms  : i32,
  /// Give up after that many unanswered requests
  pub driver_attempts    : usize,
}

impl HistosSettings {
  pub fn new() -> Self {
    Self {
      driver_address    : String::from("tcp://localhost:5555"),
      event_address     : String::from("tcp://localhost:5556"),
      output_address    : String::from("tcp://localhost:6000"),
      board             : 255,
      events            : 5000,
      sc_config         : String::from("CONF/SC.txt"),
      pm_config         : String::from("CONF/PM.txt"),
      all_channels      : false,
      as_is             : false,
      continuous        : false,
      settle_delay_ms   : 2000,
      driver_timeout_ms : 5000,
      driver_attempts   : 3,
    }
  }
}

impl Default for HistosSettings {
  fn default() -> Self {
    Self::new()
  }
}

/// The ranges of the peak search scan. 
///
/// All ranges are half open [min, max)
#[derive(Debug, Copy, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct SweepSettings {
  pub threshold_min  : f64,
  pub threshold_max  : f64,
  pub threshold_step : f64,
  pub bin_size_min   : usize,
  pub bin_size_max   : usize,
  pub width_min      : usize,
  pub width_max      : usize,
  /// Proceed with a parameter set only if 
  /// candidates_min < n candidates < candidates_max
  pub candidates_min : usize,
  pub candidates_max : usize,
  /// A parameter set is kept if it has more
  /// good peaks than this
  pub min_good_peaks : usize,
  /// Upper limit for center error/center
  pub max_rel_err    : f64,
  /// The gaussian fit window is peak +- window_scale*width
  pub window_scale   : f64,
}

impl SweepSettings {
  pub fn new() -> Self {
    Self {
      threshold_min  : 0.05,
      threshold_max  : 0.8,
      threshold_step : 0.02,
      bin_size_min   : 1,
      bin_size_max   : 20,
      width_min      : 1,
      width_max      : 50,
      candidates_min : 4,
      candidates_max : 10,
      min_good_peaks : 4,
      max_rel_err    : 0.1,
      window_scale   : 3.0,
    }
  }
}

impl Default for SweepSettings {
  fn default() -> Self {
    Self::new()
  }
}

/// Settings for the calibration engine (febcal-fitter)
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct FitterSettings {
  /// PULL socket for calibration requests
  pub input_address      : String,
  /// PUSH socket for the results
  pub output_address     : String,
  pub sweep              : SweepSettings,
  pub distance_weighting : DistanceWeighting,
  /// Derive the gain fit window from the index 
  /// of the most populated distance bin instead 
  /// of its center
  pub legacy_gain_window : bool,
}

impl FitterSettings {
  pub fn new() -> Self {
    Self {
      input_address      : String::from("tcp://localhost:7000"),
      output_address     : String::from("tcp://localhost:8000"),
      sweep              : SweepSettings::new(),
      distance_weighting : DistanceWeighting::Count,
      legacy_gain_window : false,
    }
  }
}

impl Default for FitterSettings {
  fn default() -> Self {
    Self::new()
  }
}

/// Ports of the work queue between clients 
/// and fitter instances
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct BalancerSettings {
  /// Clients push requests here
  pub task_input_port        : u16,
  /// Fitters pull requests from here
  pub task_output_port       : u16,
  /// Fitters push results here
  pub evaluation_input_port  : u16,
  /// Clients pull results from here
  pub evaluation_output_port : u16,
  /// Start that many fitter processes. 
  /// 0 means they are started elsewhere
  pub n_fitters              : usize,
  pub fitter_binary          : String,
}

impl BalancerSettings {
  pub fn new() -> Self {
    Self {
      task_input_port        : 7000,
      task_output_port       : 7001,
      evaluation_input_port  : 8001,
      evaluation_output_port : 8000,
      n_fitters              : 0,
      fitter_binary          : String::from("febcal-fitter"),
    }
  }
}

impl Default for BalancerSettings {
  fn default() -> Self {
    Self::new()
  }
}

/// Settings for the histogram collector (febcal-collect)
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct CollectorSettings {
  /// The collector binds here
  pub port       : u16,
  /// Histogram sets are written here
  pub output_dir : String,
  /// Stop once every board delivered that many sets
  pub n_sets     : usize,
}

impl CollectorSettings {
  pub fn new() -> Self {
    Self {
      port       : 6000,
      output_dir : String::from("."),
      n_sets     : 1,
    }
  }
}

impl Default for CollectorSettings {
  fn default() -> Self {
    Self::new()
  }
}

/// Settings for the gain vs bias calibration (febcal-calibrate)
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct CalibrateSettings {
  /// Spectra are pushed here (balancer task input)
  pub task_address     : String,
  /// Results are pulled from here (balancer result output)
  pub result_address   : String,
  /// Histograms for bias b are in <data_path>/bias_<b>
  pub data_path        : String,
  /// Input DAC settings the histograms were taken with
  pub bias_settings    : Vec<u8>,
  /// Allowed [min, max] for the planned settings.
  /// Empty means the range of bias_settings
  pub bias_range       : Vec<u8>,
  /// Target gain in adc/p.e.
  pub nominal_gain     : f64,
  /// Give up waiting for the fitters after that long
  pub reply_timeout_ms : i32,
  /// Gains with a larger relative uncertainty are dropped
  pub max_rel_err      : f64,
}

impl CalibrateSettings {
  pub fn new() -> Self {
    Self {
      task_address     : String::from("tcp://localhost:7000"),
      result_address   : String::from("tcp://localhost:8000"),
      data_path        : String::from("data"),
      bias_settings    : vec![180, 185, 190, 195, 200],
      bias_range       : Vec::<u8>::new(),
      nominal_gain     : 75.0,
      reply_timeout_ms : 60000,
      max_rel_err      : 0.1,
    }
  }

  /// The allowed range for the bias plan
  pub fn range(&self) -> Option<(u8, u8)> {
    match self.bias_range.len() {
      2 => Some((self.bias_range[0].min(self.bias_range[1]),
                 self.bias_range[0].max(self.bias_range[1]))),
      0 => {
        let min = self.bias_settings.iter().min()?;
        let max = self.bias_settings.iter().max()?;
        Some((*min, *max))
      }
      _ => None
    }
  }
}

impl Default for CalibrateSettings {
  fn default() -> Self {
    Self::new()
  }
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct FebcalSettings {
  pub histos    : HistosSettings,
  pub fitter    : FitterSettings,
  pub balancer  : BalancerSettings,
  pub collector : CollectorSettings,
  pub calibrate : CalibrateSettings,
}

impl FebcalSettings {
  pub fn new() -> Self {
    Self {
      histos    : HistosSettings::new(),
      fitter    : FitterSettings::new(),
      balancer  : BalancerSettings::new(),
      collector : CollectorSettings::new(),
      calibrate : CalibrateSettings::new(),
    }
  }

  /// Write the settings to a toml file
  pub fn to_toml(&self, mut filename : String) {
    if !filename.ends_with(".toml") {
      filename += ".toml";
    }
    info!("Will write to file {}!", filename);
    match File::create(&filename) {
      Err(err) => {
        error!("Unable to open file {}! {}", filename, err);
      }
      Ok(mut file) => {
        match toml::to_string_pretty(&self) {
          Err(err) => {
            error!("Unable to serialize toml! {err}");
          }
          Ok(toml_string) => {
            match file.write_all(toml_string.as_bytes()) {
              Err(err) => error!("Unable to write to file {}! {}", filename, err),
              Ok(_)    => debug!("Wrote settings to {}!", filename)
            }
          }
        }
      }
    }
  }

  pub fn from_toml_str(toml_string : &str) -> Result<FebcalSettings, SerializationError> {
    match toml::from_str(toml_string) {
      Err(err) => {
        error!("Can't interpret toml! {}", err);
        Err(SerializationError::TomlDecodingError)
      }
      Ok(settings) => {
        Ok(settings)
      }
    }
  }

  /// Load settings from a toml file. Missing 
  /// sections or fields get their defaults.
  pub fn from_toml(filename : String) -> Result<FebcalSettings, SerializationError> {
    match File::open(&filename) {
      Err(err) => {
        error!("Unable to open {}! {}", filename, err);
        Err(SerializationError::TomlDecodingError)
      }
      Ok(mut file) => {
        let mut toml_string = String::from("");
        match file.read_to_string(&mut toml_string) {
          Err(err) => {
            error!("Unable to read {}! {}", filename, err);
            Err(SerializationError::TomlDecodingError)
          }
          Ok(_) => {
            Self::from_toml_str(&toml_string)
          }
        }
      }
    }
  }
}

impl fmt::Display for FebcalSettings {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    let disp : String;
    match toml::to_string(self) {
      Err(err) => {
        error!("Deserialization error! {err}");
        disp = String::from("-- DESERIALIZATION ERROR! --");
      }
      Ok(_disp) => {
        disp = _disp;
      }
    }
    write!(f, "<FebcalSettings :\n{}>", disp)
  }
}

impl Default for FebcalSettings {
  fn default() -> Self {
    Self::new()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn partial_file_gets_defaults() {
    let toml_string = "
[histos]
board  = 12
events = 100

[fitter]
distance_weighting = \"Uncertainty\"

[fitter.sweep]
width_max = 10
";
    let settings = FebcalSettings::from_toml_str(toml_string).unwrap();
    assert_eq!(settings.histos.board, 12);
    assert_eq!(settings.histos.events, 100);
    assert_eq!(settings.histos.driver_address, "tcp://localhost:5555");
    assert_eq!(settings.fitter.distance_weighting, DistanceWeighting::Uncertainty);
    assert_eq!(settings.fitter.sweep.width_max, 10);
    assert_eq!(settings.fitter.sweep.bin_size_max, 20);
    assert_eq!(settings.balancer, BalancerSettings::new());
  }

  #[test]
  fn bias_range_defaults_to_the_sampled_settings() {
    let mut settings = CalibrateSettings::new();
    assert_eq!(settings.range(), Some((180, 200)));
    settings.bias_range = vec![210, 170];
    assert_eq!(settings.range(), Some((170, 210)));
    settings.bias_range = vec![1];
    assert_eq!(settings.range(), None);
    let toml_string = "[calibrate]\nnominal_gain = 60.0\n";
    let restored = FebcalSettings::from_toml_str(toml_string).unwrap();
    assert_eq!(restored.calibrate.nominal_gain, 60.0);
    assert_eq!(restored.calibrate.task_address, "tcp://localhost:7000");
  }

  #[test]
  fn garbage_is_an_error() {
    assert_eq!(FebcalSettings::from_toml_str("[histos]\nboard = \"x\""),
               Err(SerializationError::TomlDecodingError));
  }
}
