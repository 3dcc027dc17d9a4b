//! FEBCAL-FITTER - SiPM gain calibration service
//!
//! Pulls spectra (json), scans them for the photo 
//! electron peaks and pushes back the gain derived
//! from the peak distances. A spectrum without usable
//! peaks is answered with "ERR".

#[macro_use] extern crate log;
extern crate clap;
extern crate zmq;
extern crate signal_hook;

use std::process::exit;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use clap::Parser;
use signal_hook::consts::{SIGINT,
                          SIGTERM};

use febcal_lib::{FebcalSettings,
                 DistanceWeighting,
                 init_env_logger,
                 banner};
use febcal_fitter::CalibrationService;

#[derive(Parser, Debug)]
#[command(author = "febcal", version, about, long_about = None)]
struct Args {
  /// Requests are pulled from here
  #[arg(short, long)]
  input: Option<String>,
  /// Results are pushed here
  #[arg(short, long)]
  output: Option<String>,
  /// Weight the distance histogram with the 
  /// distance uncertainties instead of counting
  #[arg(long, default_value_t = false)]
  uncertainty_weights: bool,
  /// Fit the gain in a window derived from the
  /// bin index instead of the bin center
  #[arg(long, default_value_t = false)]
  legacy_window: bool,
  /// Settings file (.toml)
  #[arg(long)]
  settings: Option<String>,
}

fn main() {
  init_env_logger();
  banner("febcal-fitter");
  let args = Args::parse();

  let mut settings = FebcalSettings::new().fitter;
  if let Some(fname) = &args.settings {
    match FebcalSettings::from_toml(fname.clone()) {
      Err(err) => {
        error!("Unable to read settings from {}! {}", fname, err);
        exit(1);
      }
      Ok(s) => settings = s.fitter
    }
  }
  if let Some(input) = &args.input {
    settings.input_address = input.clone();
  }
  if let Some(output) = &args.output {
    settings.output_address = output.clone();
  }
  if args.uncertainty_weights {
    settings.distance_weighting = DistanceWeighting::Uncertainty;
  }
  settings.legacy_gain_window |= args.legacy_window;
  debug!("Using {:?}", settings.sweep);

  let stop = Arc::new(AtomicBool::new(false));
  for signal in [SIGINT, SIGTERM] {
    if let Err(err) = signal_hook::flag::register(signal, Arc::clone(&stop)) {
      error!("Unable to register signal handler! {err}");
    }
  }

  let ctx = zmq::Context::new();
  let mut service = match CalibrationService::connect(&ctx, settings) {
    Err(err) => {
      error!("Unable to set up sockets! {err}");
      exit(1);
    }
    Ok(service) => service
  };
  service.serve(&stop);
}
