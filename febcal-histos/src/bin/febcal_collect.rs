//! FEBCAL-COLLECT - receive histogram sets and 
//! write them to disk
//!
//! Binds a PULL socket which febcal-histos pushes
//! to. Every set is written as it arrives to 
//! `<dir>/<board>-<timestamp>.histos`.

#[macro_use] extern crate log;
extern crate clap;
extern crate zmq;
extern crate crossbeam_channel;
extern crate signal_hook;

use std::fs;
use std::path::{Path,
                PathBuf};
use std::process::exit;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool,
                        Ordering};
use std::thread;

use clap::Parser;
use crossbeam_channel as cbc;
use signal_hook::consts::{SIGINT,
                          SIGTERM};

use feb_dataclasses::constants::HISTOGRAM_SET_LEN;
use febcal_lib::{FebcalSettings,
                 init_env_logger,
                 banner};
use febcal_histos::{CollectionTally,
                    histogram_filename};

#[derive(Parser, Debug)]
#[command(author = "febcal", version, about, long_about = None)]
struct Args {
  /// Port to bind the PULL socket to
  #[arg(short, long)]
  port: Option<u16>,
  /// Directory for the histogram files
  #[arg(short, long)]
  output_dir: Option<PathBuf>,
  /// Stop after that many sets per board
  #[arg(short, long)]
  n_sets: Option<usize>,
  /// Settings file (.toml)
  #[arg(long)]
  settings: Option<String>,
  /// Boards to wait for. Without, run until interrupted
  boards: Vec<u8>,
}

/// Write everything which comes through the channel
fn writer(dir : PathBuf, incoming : cbc::Receiver<(u8, Vec<u8>)>) {
  for (board, payload) in incoming.iter() {
    let fname = histogram_filename(&dir, board, &chrono::Utc::now());
    match fs::write(&fname, &payload) {
      Err(err) => {
        error!("Unable to write {}! {}", fname.display(), err);
      }
      Ok(_) => {
        info!("Wrote {}", fname.display());
      }
    }
  }
  debug!("Writer thread finished");
}

fn main() {
  init_env_logger();
  banner("febcal-collect");
  let args = Args::parse();

  let mut settings = FebcalSettings::new().collector;
  if let Some(fname) = &args.settings {
    match FebcalSettings::from_toml(fname.clone()) {
      Err(err) => {
        error!("Unable to read settings from {}! {}", fname, err);
        exit(1);
      }
      Ok(s) => settings = s.collector
    }
  }
  let port       = args.port.unwrap_or(settings.port);
  let n_sets     = args.n_sets.unwrap_or(settings.n_sets);
  let output_dir = args.output_dir.clone().unwrap_or(PathBuf::from(&settings.output_dir));
  if !Path::new(&output_dir).is_dir() {
    error!("{} is not a directory!", output_dir.display());
    exit(1);
  }

  let stop = Arc::new(AtomicBool::new(false));
  for signal in [SIGINT, SIGTERM] {
    if let Err(err) = signal_hook::flag::register(signal, Arc::clone(&stop)) {
      error!("Unable to register signal handler! {err}");
    }
  }

  let ctx    = zmq::Context::new();
  let socket = match ctx.socket(zmq::PULL) {
    Err(err) => {
      error!("Unable to create PULL socket! {err}");
      exit(1);
    }
    Ok(sock) => sock
  };
  let address = format!("tcp://*:{}", port);
  if let Err(err) = socket.bind(&address) {
    error!("Unable to bind to {}! {}", address, err);
    exit(1);
  }
  if let Err(err) = socket.set_rcvtimeo(200) {
    warn!("Unable to set receive timeout! {err}");
  }
  info!("Collecting histograms at {}", address);

  let (to_writer, from_main) : (cbc::Sender<(u8, Vec<u8>)>, cbc::Receiver<(u8, Vec<u8>)>) = cbc::unbounded();
  let writer_dir = output_dir.clone();
  let writer_thread = thread::Builder::new()
    .name("histogram-writer".into())
    .spawn(move || writer(writer_dir, from_main));
  let writer_thread = match writer_thread {
    Err(err) => {
      error!("Unable to start writer thread! {err}");
      exit(1);
    }
    Ok(handle) => handle
  };

  let mut tally = CollectionTally::new(args.boards.clone(), n_sets);
  while !stop.load(Ordering::Relaxed) {
    match socket.recv_bytes(0) {
      Err(zmq::Error::EAGAIN) => continue,
      Err(err) => {
        error!("Receiving histograms failed! {err}");
        continue;
      }
      Ok(payload) => {
        if payload.len() != HISTOGRAM_SET_LEN {
          warn!("Discarding message with {} bytes, expected {}", payload.len(), HISTOGRAM_SET_LEN);
          continue;
        }
        let board = payload[0];
        let count = tally.add(board);
        info!("Received histogram set {} of board {}", count, board);
        if let Err(err) = to_writer.send((board, payload)) {
          error!("Writer thread is gone! {err}");
          break;
        }
        if tally.is_complete() {
          info!("All boards delivered {} sets", n_sets);
          break;
        }
      }
    }
  }
  drop(to_writer);
  if writer_thread.join().is_err() {
    error!("Writer thread panicked!");
  }
}
