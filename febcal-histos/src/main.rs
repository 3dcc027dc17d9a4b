//! FEBCAL-HISTOS - take pedestal and gain histograms
//! for a single frontend board
//!
//! The board is reconfigured for each of its 16 
//! channel pairs, so that only the triggers of that
//! pair are enabled. Events of the active pair go 
//! into the gain histograms, everything else into 
//! the pedestals.

#[macro_use] extern crate log;
extern crate clap;
extern crate zmq;
extern crate signal_hook;

use std::path::{Path,
                PathBuf};
use std::process::exit;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use clap::Parser;

use signal_hook::consts::{SIGINT,
                          SIGTERM};

use feb_dataclasses::{BitSeq,
                      SlowControlConfig};
use feb_dataclasses::constants::{PM_BIT_LEN,
                                 PM_HEX_LEN};
use febcal_lib::{FebcalSettings,
                 HistosSettings,
                 init_env_logger,
                 banner};
use febcal_histos::{AcquisitionController,
                    AcquisitionError,
                    ZmqDriver,
                    ZmqEventSource,
                    ZmqHistogramSink,
                    expand_dac_values,
                    apply_overrides};

#[derive(Parser, Debug)]
#[command(author = "febcal", version, about, long_about = None)]
struct Args {
  /// Show a progress bar over the channel pairs
  #[arg(short, long, default_value_t = false)]
  verbose: bool,
  /// Print the configuration which is sent to the board
  #[arg(short, long, default_value_t = false)]
  debug: bool,
  /// Start over after the histograms have been sent
  #[arg(short, long, default_value_t = false)]
  continuous: bool,
  /// Enable the triggers of all channels at once
  #[arg(short, long, default_value_t = false)]
  all: bool,
  /// Leave the trigger bits of the configuration as they are
  #[arg(long, default_value_t = false)]
  as_is: bool,
  /// mac5 of the board
  #[arg(short, long)]
  board: Option<u8>,
  /// Slow control configuration file
  #[arg(short = 'f', long)]
  config: Option<PathBuf>,
  /// Slow control configuration as hex string. 
  /// Takes precedence over --config
  #[arg(short = 's', long)]
  hexstring: Option<String>,
  /// Power amplifier configuration file
  #[arg(long)]
  pm_config: Option<PathBuf>,
  /// Power amplifier configuration as hex string
  #[arg(long)]
  pm_hexstring: Option<String>,
  /// Events per channel pair
  #[arg(short = 'n', long)]
  events: Option<usize>,
  /// REQ socket of the driver
  #[arg(long)]
  driver: Option<String>,
  /// PUB socket of the driver
  #[arg(short, long)]
  input: Option<String>,
  /// The histograms are pushed to this address
  #[arg(short, long)]
  output: Option<String>,
  /// Settings file (.toml)
  #[arg(long)]
  settings: Option<String>,
  /// Time and charge discriminator thresholds (0-1023)
  #[arg(short, long, num_args = 2, value_names = ["TIME", "CHARGE"])]
  thresholds: Vec<u16>,
  /// Input DAC values (0-255). Either one for all 
  /// channels or one for each of the 32 channels
  dac: Vec<u8>,
}

/// Apply the command line on top of the settings
fn merge(args : &Args, mut settings : HistosSettings) -> HistosSettings {
  if let Some(board) = args.board {
    settings.board = board;
  }
  if let Some(events) = args.events {
    settings.events = events;
  }
  if let Some(driver) = &args.driver {
    settings.driver_address = driver.clone();
  }
  if let Some(input) = &args.input {
    settings.event_address = input.clone();
  }
  if let Some(output) = &args.output {
    settings.output_address = output.clone();
  }
  if let Some(config) = &args.config {
    settings.sc_config = config.to_string_lossy().to_string();
  }
  if let Some(pm) = &args.pm_config {
    settings.pm_config = pm.to_string_lossy().to_string();
  }
  settings.all_channels |= args.all;
  settings.as_is        |= args.as_is;
  settings.continuous   |= args.continuous;
  settings
}

fn load_slow_control(hexstring : &Option<String>, path : &str) -> SlowControlConfig {
  let config = match hexstring {
    Some(hex) => {
      info!("Reading slow control configuration from hex string");
      SlowControlConfig::from_hex(hex)
    }
    None => {
      info!("Reading slow control configuration from file {}", path);
      SlowControlConfig::from_file(Path::new(path))
    }
  };
  match config {
    Err(err) => {
      error!("Unable to load slow control configuration! {}", err);
      exit(1);
    }
    Ok(sc) => sc
  }
}

fn load_power_amplifier(hexstring : &Option<String>, path : &str) -> BitSeq {
  let config = match hexstring {
    Some(hex) => {
      info!("Reading power amplifier configuration from hex string");
      if hex.len() != PM_HEX_LEN {
        warn!("Power amplifier hex string has {} characters, expected {}", hex.len(), PM_HEX_LEN);
      }
      BitSeq::decode_hex(hex, PM_BIT_LEN)
    }
    None => {
      info!("Reading power amplifier configuration from file {}", path);
      BitSeq::decode_text(Path::new(path), PM_BIT_LEN)
    }
  };
  match config {
    Err(err) => {
      error!("Unable to load power amplifier configuration! {}", err);
      exit(1);
    }
    Ok(pm) => pm
  }
}

fn main() {
  init_env_logger();
  banner("febcal-histos");

  let args = Args::parse();
  
  let mut settings = FebcalSettings::new();
  if let Some(fname) = &args.settings {
    match FebcalSettings::from_toml(fname.clone()) {
      Err(err) => {
        error!("Unable to read settings from {}! {}", fname, err);
        exit(1);
      }
      Ok(s) => {
        info!("Loaded settings from {}", fname);
        settings = s;
      }
    }
  }
  let histos_settings = merge(&args, settings.histos);

  let dacs = match expand_dac_values(&args.dac) {
    None => {
      error!("Give either no, one or 32 DAC values! Got {}", args.dac.len());
      exit(1);
    }
    Some(dacs) => dacs
  };

  let mut sc = load_slow_control(&args.hexstring, &histos_settings.sc_config);
  let pm     = load_power_amplifier(&args.pm_hexstring, &histos_settings.pm_config);
  let thresholds = match args.thresholds.as_slice() {
    [time, charge] => Some((*time, *charge)),
    _              => None
  };
  if let Err(err) = apply_overrides(&mut sc, dacs, thresholds) {
    error!("Unable to apply DAC values or thresholds! {}", err);
    exit(1);
  }
  if args.debug {
    println!("{}", sc);
    println!("==> SC hex : {}", sc.to_hex());
    println!("==> PM hex : {}", pm.to_hex());
  }

  let stop = Arc::new(AtomicBool::new(false));
  for signal in [SIGINT, SIGTERM] {
    if let Err(err) = signal_hook::flag::register(signal, Arc::clone(&stop)) {
      error!("Unable to register signal handler! {err}");
    }
  }

  let ctx = zmq::Context::new();
  let link = match ZmqDriver::connect(&ctx,
                                      &histos_settings.driver_address,
                                      histos_settings.driver_timeout_ms,
                                      histos_settings.driver_attempts) {
    Err(err) => {
      error!("Can not talk to the driver! {}", err);
      exit(1);
    }
    Ok(link) => link
  };
  let source = match ZmqEventSource::connect(&ctx, &histos_settings.event_address, 100, Arc::clone(&stop)) {
    Err(err) => {
      error!("Can not receive events! {}", err);
      exit(1);
    }
    Ok(source) => source
  };
  let sink = match ZmqHistogramSink::connect(&ctx, &histos_settings.output_address) {
    Err(err) => {
      error!("Can not send histograms! {}", err);
      exit(1);
    }
    Ok(sink) => sink
  };

  let mut controller = AcquisitionController::new(link, source, sink, sc, pm, &histos_settings);
  if args.verbose {
    controller.show_progress();
  }
  info!("Board {}, {} events per pair, mode {}", histos_settings.board, controller.quota(), controller.mode());
  match controller.run() {
    Err(AcquisitionError::Interrupted) => {
      warn!("Interrupted after {} cycles!", controller.n_cycles());
      println!("{}", controller.stats());
    }
    Err(err) => {
      error!("Acquisition failed in state {}! {}", controller.state(), err);
      exit(1);
    }
    Ok(_) => {
      println!("{}", controller.stats());
      info!("Done!");
    }
  }
}
