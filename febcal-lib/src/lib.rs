//! The febcal runtime, shared by the acquisition 
//! (febcal-histos) and the calibration (febcal-fitter)
//! processes.
//!
//! * settings    - toml configuration for all febcal programs
//! * histogram   - 1d histogram with rebinning, as the peak search sees it
//! * peak_finder - the `FindPeaks` capability and its default implementation
//! * gaussian_fit- the `FitGaussian` capability and its default implementation
//! * sweep       - the 3d scan over threshold, bin size and peak width
//! * gain        - pairwise peak distances and the gain fit
//! * calibration - request -> result, as served by febcal-fitter
//! * bias        - gain vs bias dependency, bias planning
//!

pub mod settings;
pub mod histogram;
pub mod peak_finder;
pub mod gaussian_fit;
pub mod sweep;
pub mod gain;
pub mod calibration;
pub mod bias;

pub use settings::{FebcalSettings,
                   HistosSettings,
                   FitterSettings,
                   SweepSettings,
                   BalancerSettings,
                   CollectorSettings,
                   CalibrateSettings,
                   DistanceWeighting};
pub use histogram::Histogram1D;
pub use peak_finder::{FindPeaks,
                      PeakSearch};
pub use gaussian_fit::{FitGaussian,
                       GaussianFit,
                       LevenbergMarquardt,
                       FitError};
pub use sweep::SweepEngine;
pub use gain::GainSynthesizer;
pub use calibration::calibrate;

use std::io::Write;

use colored::{Colorize, ColoredString};
use log::Level;

#[macro_use] extern crate log;
extern crate env_logger;

pub const FEBCAL_LOGO_SHOW : &str = "
     __       _                _ 
    / _| ___ | |__   ___  __ _| |
   | |_ / _ \\| '_ \\ / __|/ _` | |
   |  _|  __/| |_) | (__| (_| | |
   |_|  \\___||_.__/ \\___|\\__,_|_|

   (febcal - pedestal/gain histograms and SiPM gain calibration for CITIROC febs)

  ";

/// Make sure that the loglevel is in color, even though not using pretty_env logger
pub fn color_log(level : &Level) -> ColoredString {
  match level {
    Level::Error    => String::from(" ERROR!").red(),
    Level::Warn     => String::from(" WARN  ").yellow(),
    Level::Info     => String::from(" Info  ").green(),
    Level::Debug    => String::from(" debug ").blue(),
    Level::Trace    => String::from(" trace ").cyan(),
  }
}

/// Set up the environmental (env) logger
/// with our format
///
/// Ensure that the lines and module paths
/// are printed in the logging output
pub fn init_env_logger() {
  env_logger::builder()
    .format(|buf, record| {
    writeln!( buf, "[{level}][{module_path}:{line}] {args}",
      level = color_log(&record.level()),
      module_path = record.module_path().unwrap_or("<unknown>"),
      line = record.line().unwrap_or(0),
      args = record.args()
      )
    }).init();
}

/// Print the logo together with the program name
pub fn banner(program : &str) {
  println!("{}", FEBCAL_LOGO_SHOW);
  println!("  ==> {} {}", program, env!("CARGO_PKG_VERSION"));
}
