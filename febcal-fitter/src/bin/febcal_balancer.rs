//! FEBCAL-BALANCER - share calibration requests 
//! among several fitters
//!
//! Optionally starts the fitters itself. They are
//! pointed to the task output and evaluation input
//! of the balancer.

#[macro_use] extern crate log;
extern crate clap;
extern crate zmq;
extern crate signal_hook;

use std::process::{exit,
                   Child,
                   Command};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use clap::Parser;
use signal_hook::consts::{SIGINT,
                          SIGTERM};

use febcal_lib::{FebcalSettings,
                 init_env_logger,
                 banner};
use febcal_fitter::{Balancer,
                    BalancerEndpoints,
                    stop_fitters};

#[derive(Parser, Debug)]
#[command(author = "febcal", version, about, long_about = None)]
struct Args {
  /// Number of fitter processes to start
  #[arg(short, long)]
  n_fitters: Option<usize>,
  /// Path to the febcal-fitter executable
  #[arg(long)]
  fitter: Option<String>,
  /// Settings file (.toml), handed down to the fitters
  #[arg(long)]
  settings: Option<String>,
}

fn main() {
  init_env_logger();
  banner("febcal-balancer");
  let args = Args::parse();

  let mut settings = FebcalSettings::new().balancer;
  if let Some(fname) = &args.settings {
    match FebcalSettings::from_toml(fname.clone()) {
      Err(err) => {
        error!("Unable to read settings from {}! {}", fname, err);
        exit(1);
      }
      Ok(s) => settings = s.balancer
    }
  }
  if let Some(n) = args.n_fitters {
    settings.n_fitters = n;
  }
  if let Some(fitter) = &args.fitter {
    settings.fitter_binary = fitter.clone();
  }

  let stop = Arc::new(AtomicBool::new(false));
  for signal in [SIGINT, SIGTERM] {
    if let Err(err) = signal_hook::flag::register(signal, Arc::clone(&stop)) {
      error!("Unable to register signal handler! {err}");
    }
  }

  let ctx      = zmq::Context::new();
  let endpoints = BalancerEndpoints::from_settings(&settings);
  let mut balancer = match Balancer::bind(&ctx, &endpoints) {
    Err(err) => {
      error!("Unable to bind sockets! {err}");
      exit(1);
    }
    Ok(b) => b
  };

  let mut fitters = Vec::<Child>::new();
  for k in 0..settings.n_fitters {
    let mut cmd = Command::new(&settings.fitter_binary);
    cmd.arg("--input").arg(format!("tcp://localhost:{}", settings.task_output_port))
       .arg("--output").arg(format!("tcp://localhost:{}", settings.evaluation_input_port));
    if let Some(fname) = &args.settings {
      cmd.arg("--settings").arg(fname);
    }
    match cmd.spawn() {
      Err(err) => {
        error!("Unable to start fitter {} ({})! {}", k, settings.fitter_binary, err);
      }
      Ok(child) => {
        info!("Started fitter {} with pid {}", k, child.id());
        fitters.push(child);
      }
    }
  }

  balancer.run(&stop);
  
  let n_reaped = stop_fitters(fitters);
  info!("Stopped {} fitters", n_reaped);
}
