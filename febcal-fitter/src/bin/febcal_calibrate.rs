//! FEBCAL-CALIBRATE - gain vs bias calibration
//!
//! Expects the histograms of every bias setting in 
//! <path>/bias_<b>/. The gain spectra go to the 
//! fitters (usually through febcal-balancer), the gains
//! are written next to the histograms. From the gains
//! at the different settings the gain dependency of each 
//! SiPM is fitted and the bias settings for the nominal
//! gain are planned.

#[macro_use] extern crate log;
extern crate clap;
extern crate zmq;
extern crate chrono;

use std::fs;
use std::path::{Path,
                PathBuf};
use std::process::exit;

use clap::Parser;

use febcal_lib::{FebcalSettings,
                 init_env_logger,
                 banner};
use febcal_lib::bias::plan_bias_settings;
use febcal_fitter::campaign::{load_histogram_sets,
                              by_board,
                              requests_for_board,
                              request_calibrations,
                              parse_key,
                              gain_point,
                              result_filename,
                              format_gains,
                              format_dependencies,
                              format_bias_settings,
                              GainTable};

#[derive(Parser, Debug)]
#[command(author = "febcal", version, about, long_about = None)]
struct Args {
  /// Only calibrate these boards (all found if none given)
  boards: Vec<u8>,
  /// Bias settings (input DAC) the histograms were taken with
  #[arg(short, long, num_args = 1..)]
  bias: Vec<u8>,
  /// Allowed range of the planned bias settings
  #[arg(long, num_args = 2)]
  bias_range: Vec<u8>,
  /// Target gain (adc/p.e.)
  #[arg(short, long)]
  gain: Option<f64>,
  /// Base directory of the histograms
  #[arg(short, long)]
  path: Option<String>,
  /// Spectra are pushed here
  #[arg(long)]
  fitter_input: Option<String>,
  /// Results are pulled from here
  #[arg(long)]
  fitter_output: Option<String>,
  /// Settings file (.toml)
  #[arg(long)]
  settings: Option<String>,
}

fn write_file(path : &Path, content : &str) {
  match fs::write(path, content) {
    Err(err) => error!("Unable to write {}! {}", path.display(), err),
    Ok(_)    => info!("Wrote {}", path.display())
  }
}

fn main() {
  init_env_logger();
  banner("febcal-calibrate");
  let args = Args::parse();

  let mut settings = FebcalSettings::new().calibrate;
  if let Some(fname) = &args.settings {
    match FebcalSettings::from_toml(fname.clone()) {
      Err(err) => {
        error!("Unable to read settings from {}! {}", fname, err);
        exit(1);
      }
      Ok(s) => settings = s.calibrate
    }
  }
  if !args.bias.is_empty() {
    settings.bias_settings = args.bias.clone();
  }
  if !args.bias_range.is_empty() {
    settings.bias_range = args.bias_range.clone();
  }
  if let Some(gain) = args.gain {
    settings.nominal_gain = gain;
  }
  if let Some(path) = &args.path {
    settings.data_path = path.clone();
  }
  if let Some(address) = &args.fitter_input {
    settings.task_address = address.clone();
  }
  if let Some(address) = &args.fitter_output {
    settings.result_address = address.clone();
  }
  let range = match settings.range() {
    None => {
      error!("Invalid bias range {:?} for settings {:?}!", settings.bias_range, settings.bias_settings);
      exit(1);
    }
    Some(range) => range
  };
  info!("Using {:?}", settings);

  let ctx  = zmq::Context::new();
  let push = match ctx.socket(zmq::PUSH) {
    Err(err) => {
      error!("Unable to create socket! {err}");
      exit(1);
    }
    Ok(s) => s
  };
  let pull = match ctx.socket(zmq::PULL) {
    Err(err) => {
      error!("Unable to create socket! {err}");
      exit(1);
    }
    Ok(s) => s
  };
  if let Err(err) = push.connect(&settings.task_address) {
    error!("Unable to connect to {}! {err}", settings.task_address);
    exit(1);
  }
  if let Err(err) = pull.connect(&settings.result_address) {
    error!("Unable to connect to {}! {err}", settings.result_address);
    exit(1);
  }
  if let Err(err) = pull.set_rcvtimeo(settings.reply_timeout_ms) {
    warn!("Unable to set receive timeout! {err}");
  }

  let now       = chrono::Utc::now();
  let base      = PathBuf::from(&settings.data_path);
  let mut table = GainTable::new();
  for bias in settings.bias_settings.iter() {
    let dir  = base.join(format!("bias_{}", bias));
    let sets = load_histogram_sets(&dir);
    info!("Bias {} : {} histogram sets in {}", bias, sets.len(), dir.display());
    for (board, board_sets) in by_board(sets) {
      if !args.boards.is_empty() && !args.boards.contains(&board) {
        continue;
      }
      let requests = requests_for_board(&board_sets);
      let results  = request_calibrations(&push, &pull, &requests);
      let mut n_gains = 0usize;
      for result in results.iter() {
        let (b, ch) = match parse_key(&result.key) {
          None => {
            warn!("Result with unknown key {}", result.key);
            continue;
          }
          Some(key) => key
        };
        if let Some((gain, err)) = gain_point(result, settings.max_rel_err) {
          table.add(b, ch, *bias as f64, gain, err);
          n_gains += 1;
        }
      }
      info!("Board {:02x}, bias {} : {} of {} channels with a gain", board, bias, n_gains, requests.len());
      let gains = table.gains_at(board, *bias as f64);
      write_file(&result_filename(&dir, board, "gains", &now), &format_gains(&gains));
    }
  }

  for board in table.boards() {
    let dependencies = table.dependencies(board);
    let n_deps = dependencies.iter().filter(|d| d.is_some()).count();
    info!("Board {:02x} : {} channels with a gain dependency", board, n_deps);
    write_file(&result_filename(&base, board, "dependencies", &now),
               &format_dependencies(&dependencies));
    let plan = plan_bias_settings(&dependencies, settings.nominal_gain, range);
    write_file(&result_filename(&base, board, "bias_settings", &now),
               &format_bias_settings(&plan));
    let dacs : Vec<String> = plan.iter().map(|b| b.to_string()).collect();
    println!("Board {:02x} : {}", board, dacs.join(" "));
  }
}
