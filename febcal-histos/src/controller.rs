//! The acquisition state machine
//!
//! A cycle walks through all 16 channel pairs. For 
//! every pair the board is reconfigured, the bias 
//! switched on again and events are histogrammed
//! until the quota for that pair is met. After the 
//! last pair, the histograms are sent out.
//!
//! ```text
//! Idle -> Configuring(p) -> BiasSwitching(p) -> Acquiring(p) 
//!           ^                                       |
//!           +---------------- p+1 ------------------+
//!                                                   | p == 15
//!                                               Emitting -> Idle | Terminal
//! ```

use std::fmt;
use std::thread;
use std::time::Duration;

use indicatif::{ProgressBar,
                ProgressStyle};

use feb_dataclasses::{BitSeq,
                      DriverCommand,
                      HistogramSet,
                      SlowControlConfig,
                      TriggerMode};
use feb_dataclasses::constants::{NPAIRS,
                                 BROADCAST_ID};
use febcal_lib::HistosSettings;

use crate::driver::ControlLink;
use crate::source::EventSource;
use crate::emitter::HistogramSink;
use crate::demux::{EventDemultiplexer,
                   DemuxStats};
use crate::errors::AcquisitionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquisitionState {
  Idle,
  Configuring(usize),
  BiasSwitching(usize),
  Acquiring(usize),
  Emitting,
  Terminal,
}

impl fmt::Display for AcquisitionState {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    let repr = match self {
      AcquisitionState::Idle             => String::from("Idle"),
      AcquisitionState::Configuring(p)   => format!("Configuring({})", p),
      AcquisitionState::BiasSwitching(p) => format!("BiasSwitching({})", p),
      AcquisitionState::Acquiring(p)     => format!("Acquiring({})", p),
      AcquisitionState::Emitting         => String::from("Emitting"),
      AcquisitionState::Terminal         => String::from("Terminal"),
    };
    write!(f, "<AcquisitionState: {}>", repr)
  }
}

pub struct AcquisitionController<L, S, K> 
  where L : ControlLink,
        S : EventSource,
        K : HistogramSink {
  link         : L,
  source       : S,
  sink         : K,
  sc           : SlowControlConfig,
  pm           : BitSeq,
  board        : u8,
  mode         : TriggerMode,
  events       : usize,
  continuous   : bool,
  settle_delay : Duration,
  state        : AcquisitionState,
  histos       : HistogramSet,
  demux        : EventDemultiplexer,
  bar          : ProgressBar,
  n_cycles     : usize,
}

impl<L, S, K> AcquisitionController<L, S, K> 
  where L : ControlLink,
        S : EventSource,
        K : HistogramSink {

  /// # Arguments
  ///
  /// * sc       : slow control register. Trigger bits
  ///              get changed for each pair
  /// * pm       : power amplifier register, sent as is
  /// * settings : board, events, mode flags and the 
  ///              settle delay are taken from here
  pub fn new(link     : L,
             source   : S,
             sink     : K,
             sc       : SlowControlConfig,
             pm       : BitSeq,
             settings : &HistosSettings) -> Self {
    let mode = TriggerMode::from_flags(settings.all_channels, settings.as_is);
    Self {
      link,
      source,
      sink,
      pm,
      board        : settings.board,
      mode,
      events       : settings.events,
      continuous   : settings.continuous,
      settle_delay : Duration::from_millis(settings.settle_delay_ms),
      state        : AcquisitionState::Idle,
      histos       : HistogramSet::new(settings.board, sc.pack()),
      sc,
      demux        : EventDemultiplexer::new(settings.board, mode),
      bar          : ProgressBar::hidden(),
      n_cycles     : 0,
    }
  }

  /// Show a progress bar over the channel pairs
  pub fn show_progress(&mut self) {
    let bar_template : &str = "[{elapsed_precise}] {prefix} {msg} {spinner} {bar:60.blue/grey} {pos:>7}/{len:7}";
    self.bar = ProgressBar::new(NPAIRS as u64);
    match ProgressStyle::with_template(bar_template) {
      Err(err) => {
        warn!("Unable to set progressbar style! {err}");
      }
      Ok(style) => {
        self.bar.set_style(style);
      }
    }
    self.bar.set_position(0);
    self.bar.set_message(format!("Board {} - channel pairs", self.board));
    self.bar.set_prefix("\u{2699}");
  }

  pub fn state(&self) -> AcquisitionState {
    self.state
  }

  pub fn mode(&self) -> TriggerMode {
    self.mode
  }

  pub fn histograms(&self) -> &HistogramSet {
    &self.histos
  }

  pub fn stats(&self) -> DemuxStats {
    self.demux.stats
  }

  pub fn link(&self) -> &L {
    &self.link
  }
  
  pub fn sink(&self) -> &K {
    &self.sink
  }

  pub fn slow_control(&self) -> &SlowControlConfig {
    &self.sc
  }

  /// Number of histogram sets sent out so far
  pub fn n_cycles(&self) -> usize {
    self.n_cycles
  }

  /// Events to collect for every pair
  pub fn quota(&self) -> usize {
    self.mode.events_per_pair(self.events)
  }

  fn send(&mut self, command : DriverCommand) -> Result<(), AcquisitionError> {
    let reply = self.link.request(&command)?;
    trace!("{} acknowledged with {:?}", command.name(), reply);
    Ok(())
  }

  /// Do the work of the current state and move on
  /// to the next one.
  pub fn step(&mut self) -> Result<AcquisitionState, AcquisitionError> {
    let next = match self.state {
      AcquisitionState::Idle => {
        self.histos = HistogramSet::new(self.board, self.sc.pack());
        self.bar.reset();
        info!("Starting acquisition cycle {} for board {} in mode {}", self.n_cycles, self.board, self.mode);
        AcquisitionState::Configuring(0)
      }
      AcquisitionState::Configuring(pair) => {
        self.sc.configure_pair(pair, self.mode)?;
        self.send(DriverCommand::DaqEnd)?;
        self.send(DriverCommand::BiasOff(self.board))?;
        let sc = self.sc.pack();
        let pm = self.pm.pack();
        self.send(DriverCommand::SetConf {board : self.board, sc, pm})?;
        AcquisitionState::BiasSwitching(pair)
      }
      AcquisitionState::BiasSwitching(pair) => {
        self.send(DriverCommand::BiasOn(self.board))?;
        thread::sleep(self.settle_delay);
        self.send(DriverCommand::DaqBegin)?;
        debug!("DAQ started for pair {} (broadcast {})", pair, BROADCAST_ID);
        AcquisitionState::Acquiring(pair)
      }
      AcquisitionState::Acquiring(pair) => {
        let mut remaining = self.quota();
        // at least one buffer per pair
        loop {
          let buffer = self.source.next_buffer()?;
          self.demux.fill_from_buffer(&buffer, pair, &mut self.histos, &mut remaining);
          if remaining == 0 {
            break;
          }
        }
        self.bar.inc(1);
        if pair + 1 < NPAIRS {
          AcquisitionState::Configuring(pair + 1)
        } else {
          AcquisitionState::Emitting
        }
      }
      AcquisitionState::Emitting => {
        self.bar.finish_with_message("Done");
        self.sink.emit(&self.histos)?;
        self.n_cycles += 1;
        info!("Sent histograms of cycle {}", self.n_cycles);
        debug!("{}", self.demux.stats);
        if self.continuous {
          AcquisitionState::Idle
        } else {
          AcquisitionState::Terminal
        }
      }
      AcquisitionState::Terminal => AcquisitionState::Terminal,
    };
    trace!("{} -> {}", self.state, next);
    self.state = next;
    Ok(next)
  }

  /// Step until the machine terminates or fails
  pub fn run(&mut self) -> Result<(), AcquisitionError> {
    while self.state != AcquisitionState::Terminal {
      self.step()?;
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::VecDeque;
  use feb_dataclasses::EventRecord;
  use feb_dataclasses::constants::{NCHN,
                                   SC_BIT_LEN,
                                   PM_BIT_LEN,
                                   MAGIC_WORD32};
  use feb_dataclasses::serialization::Serialization;
  use crate::errors::DriverError;

  #[derive(Default)]
  struct RecordingLink {
    commands : Vec<DriverCommand>,
  }

  impl ControlLink for RecordingLink {
    fn request(&mut self, command : &DriverCommand) -> Result<Vec<u8>, DriverError> {
      self.commands.push(command.clone());
      Ok(vec![0u8;3])
    }
  }

  struct DeadLink;

  impl ControlLink for DeadLink {
    fn request(&mut self, command : &DriverCommand) -> Result<Vec<u8>, DriverError> {
      Err(DriverError::Unresponsive {command : String::from(command.name()), attempts : 3})
    }
  }

  /// Hands out the same buffer over and over, 
  /// at most limit times
  struct RepeatingSource {
    buffer  : Vec<u8>,
    limit   : usize,
    n_calls : usize,
  }

  impl EventSource for RepeatingSource {
    fn next_buffer(&mut self) -> Result<Vec<u8>, AcquisitionError> {
      if self.n_calls >= self.limit {
        return Err(AcquisitionError::Interrupted);
      }
      self.n_calls += 1;
      Ok(self.buffer.clone())
    }
  }

  struct QueueSource {
    buffers : VecDeque<Vec<u8>>,
  }

  impl EventSource for QueueSource {
    fn next_buffer(&mut self) -> Result<Vec<u8>, AcquisitionError> {
      self.buffers.pop_front().ok_or(AcquisitionError::Interrupted)
    }
  }

  #[derive(Default)]
  struct CollectingSink {
    sets : Vec<HistogramSet>,
  }

  impl HistogramSink for CollectingSink {
    fn emit(&mut self, histos : &HistogramSet) -> Result<(), AcquisitionError> {
      self.sets.push(histos.clone());
      Ok(())
    }
  }

  fn buffer(board : u16, n : usize, adc : [u16;NCHN]) -> Vec<u8> {
    let mut stream = Vec::<u8>::new();
    for k in 0..n {
      let mut rec  = EventRecord::new();
      rec.board_id = board;
      rec.adc      = adc;
      if k == n - 1 {
        rec.ts1 = MAGIC_WORD32;
      }
      stream.extend_from_slice(&rec.to_bytestream());
    }
    stream
  }

  fn settings(events : usize) -> HistosSettings {
    let mut settings         = HistosSettings::new();
    settings.board           = 3;
    settings.events          = events;
    settings.settle_delay_ms = 0;
    settings
  }

  fn registers() -> (SlowControlConfig, BitSeq) {
    let sc = SlowControlConfig::new(BitSeq::zeros(SC_BIT_LEN)).unwrap();
    (sc, BitSeq::zeros(PM_BIT_LEN))
  }

  #[test]
  fn commands_per_pair_in_order() {
    let (sc, pm) = registers();
    let source   = RepeatingSource {buffer : buffer(3, 10, [5;NCHN]), limit : 1000, n_calls : 0};
    let mut ctrl = AcquisitionController::new(RecordingLink::default(),
                                              source,
                                              CollectingSink::default(),
                                              sc, pm, &settings(10));
    ctrl.run().unwrap();
    let cmds = &ctrl.link().commands;
    assert_eq!(cmds.len(), 5*NPAIRS);
    for pair in 0..NPAIRS {
      let chunk = &cmds[5*pair..5*pair+5];
      assert_eq!(chunk[0], DriverCommand::DaqEnd);
      assert_eq!(chunk[1], DriverCommand::BiasOff(3));
      match &chunk[2] {
        DriverCommand::SetConf {board, sc, pm} => {
          assert_eq!(*board, 3);
          assert_eq!(sc.len(), 143);
          assert_eq!(pm.len(), 28);
          let uploaded = SlowControlConfig::new(BitSeq::unpack(sc, SC_BIT_LEN).unwrap()).unwrap();
          for ch in 0..NCHN {
            assert_eq!(uploaded.trigger_enabled(ch).unwrap(), ch/2 == pair);
          }
        }
        other => panic!("Expected SETCONF, got {}", other)
      }
      assert_eq!(chunk[3], DriverCommand::BiasOn(3));
      assert_eq!(chunk[4], DriverCommand::DaqBegin);
    }
  }

  #[test]
  fn quota_per_pair_pulls_more_buffers() {
    let (sc, pm) = registers();
    // 4 events per buffer, 10 needed -> 3 buffers per pair
    let source   = RepeatingSource {buffer : buffer(3, 4, [7;NCHN]), limit : 1000, n_calls : 0};
    let mut ctrl = AcquisitionController::new(RecordingLink::default(),
                                              source,
                                              CollectingSink::default(),
                                              sc, pm, &settings(10));
    ctrl.run().unwrap();
    assert_eq!(ctrl.source.n_calls, 3*NPAIRS);
    assert_eq!(ctrl.stats().n_processed, 12*NPAIRS as u64);
    let sent = &ctrl.sink().sets;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].board_id, 3);
    // every channel is signal for exactly one pair
    for ch in 0..NCHN {
      assert_eq!(sent[0].gain[ch][7], 12);
      assert_eq!(sent[0].pedestal[ch][7], 12*(NPAIRS as u32 - 1));
    }
  }

  #[test]
  fn all_mode_divides_the_quota() {
    let (sc, pm)   = registers();
    let mut set    = settings(160);
    set.all_channels = true;
    let mut adc    = [1u16;NCHN];
    adc[9]         = 300;
    let source     = RepeatingSource {buffer : buffer(3, 10, adc), limit : 1000, n_calls : 0};
    let mut ctrl   = AcquisitionController::new(RecordingLink::default(),
                                                source,
                                                CollectingSink::default(),
                                                sc, pm, &set);
    assert_eq!(ctrl.quota(), 10);
    ctrl.run().unwrap();
    assert_eq!(ctrl.source.n_calls, NPAIRS);
    let sent = &ctrl.sink().sets[0];
    // channel 9 always had the highest signal
    assert_eq!(sent.gain[9][300], 10*NPAIRS as u16);
    assert_eq!(sent.gain[8][1], 10*NPAIRS as u16);
    assert_eq!(sent.pedestal[0][1], 10*NPAIRS as u32);
    for ch in 0..NCHN {
      assert!(ctrl.slow_control().trigger_enabled(ch).unwrap());
    }
  }

  #[test]
  fn foreign_boards_do_not_fill_the_quota() {
    let (sc, pm)    = registers();
    let mut buffers = VecDeque::<Vec<u8>>::new();
    for _ in 0..NPAIRS {
      buffers.push_back(buffer(4, 20, [2;NCHN]));
      buffers.push_back(buffer(3, 5, [2;NCHN]));
    }
    let mut ctrl = AcquisitionController::new(RecordingLink::default(),
                                              QueueSource {buffers},
                                              CollectingSink::default(),
                                              sc, pm, &settings(5));
    ctrl.run().unwrap();
    assert_eq!(ctrl.stats().n_foreign, 20*NPAIRS as u64);
    assert_eq!(ctrl.stats().n_processed, 5*NPAIRS as u64);
    assert_eq!(ctrl.n_cycles(), 1);
  }

  #[test]
  fn continuous_mode_starts_over() {
    let (sc, pm) = registers();
    let mut set  = settings(1);
    set.continuous = true;
    // enough buffers for two cycles
    let source   = RepeatingSource {buffer : buffer(3, 1, [3;NCHN]), limit : 2*NPAIRS, n_calls : 0};
    let mut ctrl = AcquisitionController::new(RecordingLink::default(),
                                              source,
                                              CollectingSink::default(),
                                              sc, pm, &set);
    match ctrl.run() {
      Err(AcquisitionError::Interrupted) => (),
      other => panic!("Expected the source to run dry, got {:?}", other)
    }
    assert_eq!(ctrl.n_cycles(), 2);
    let sent = &ctrl.sink().sets;
    assert_eq!(sent.len(), 2);
    // the second set starts from scratch
    assert_eq!(sent[1].gain[0][3], 1);
    assert_eq!(ctrl.state(), AcquisitionState::Acquiring(0));
  }

  #[test]
  fn unresponsive_driver_stops_the_machine() {
    let (sc, pm) = registers();
    let source   = RepeatingSource {buffer : buffer(3, 1, [3;NCHN]), limit : 10, n_calls : 0};
    let mut ctrl = AcquisitionController::new(DeadLink,
                                              source,
                                              CollectingSink::default(),
                                              sc, pm, &settings(1));
    assert_eq!(ctrl.step().unwrap(), AcquisitionState::Configuring(0));
    match ctrl.step() {
      Err(AcquisitionError::Driver(DriverError::Unresponsive {command, ..})) => {
        assert_eq!(command, "DAQ_END");
      }
      other => panic!("Expected an unresponsive driver, got {:?}", other)
    }
    assert_eq!(ctrl.state(), AcquisitionState::Configuring(0));
    assert_eq!(ctrl.source.n_calls, 0);
  }
}
