//! Sort event records into pedestal and gain histograms

use std::fmt;

use feb_dataclasses::{EventRecord,
                      HistogramSet,
                      TriggerMode};
use feb_dataclasses::events;

/// Bookkeeping over the lifetime of a demultiplexer
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DemuxStats {
  pub n_records          : u64,
  /// Records of other boards
  pub n_foreign          : u64,
  pub n_processed        : u64,
  pub n_adc_out_of_range : u64,
  pub n_buffers          : u64,
  /// Buffers which did not fill up the quota
  pub n_short_buffers    : u64,
}

impl fmt::Display for DemuxStats {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let mut repr = String::from("<DemuxStats:");
    repr += &(format!("\n  buffers          : {}", self.n_buffers));
    repr += &(format!("\n  short buffers    : {}", self.n_short_buffers));
    repr += &(format!("\n  records          : {}", self.n_records));
    repr += &(format!("\n  processed        : {}", self.n_processed));
    repr += &(format!("\n  foreign board    : {}", self.n_foreign));
    repr += &(format!("\n  adc out of range : {}>", self.n_adc_out_of_range));
    write!(f, "{}", repr)
  }
}

#[derive(Debug, Clone)]
pub struct EventDemultiplexer {
  pub board : u8,
  pub mode  : TriggerMode,
  pub stats : DemuxStats,
}

impl EventDemultiplexer {

  pub fn new(board : u8, mode : TriggerMode) -> Self {
    Self {
      board,
      mode,
      stats : DemuxStats::default(),
    }
  }

  /// The pair whose channels go into the gain histograms
  pub fn signal_pair(&self, record : &EventRecord, active_pair : usize) -> usize {
    match self.mode {
      TriggerMode::Pairwise => active_pair,
      TriggerMode::AllChannels
      | TriggerMode::AsIs     => record.triggered_channel()/2,
    }
  }

  /// Histogram a single record
  ///
  /// Returns true if the record was used. In that 
  /// case, remaining is decremented by one.
  ///
  /// # Arguments
  ///
  /// * record      : event from the driver
  /// * active_pair : pair whose triggers are enabled
  /// * histos      : histograms of the current cycle
  /// * remaining   : events still missing for this pair
  pub fn process(&mut self,
                 record      : &EventRecord,
                 active_pair : usize,
                 histos      : &mut HistogramSet,
                 remaining   : &mut usize) -> bool {
    self.stats.n_records += 1;
    if record.board_id != self.board as u16 {
      self.stats.n_foreign += 1;
      trace!("Discarding record of board {}", record.board_id);
      return false;
    }
    if !record.adc_in_range() {
      self.stats.n_adc_out_of_range += 1;
      warn!("Skipping record with adc values out of range! {}", record);
      return false;
    }
    *remaining = remaining.saturating_sub(1);
    let pair = self.signal_pair(record, active_pair);
    for (ch, adc) in record.adc.iter().enumerate() {
      let filled = if ch/2 == pair {
        histos.fill_gain(ch, *adc)
      } else {
        histos.fill_pedestal(ch, *adc)
      };
      // range was checked above
      if let Err(err) = filled {
        error!("Unable to fill channel {}! {}", ch, err);
      }
    }
    self.stats.n_processed += 1;
    true
  }

  /// Histogram a driver buffer up to and including
  /// its terminating record.
  ///
  /// All records of the buffer are looked at, even if
  /// the quota is already met. Returns the number of 
  /// records which were used.
  pub fn fill_from_buffer(&mut self,
                          buffer      : &[u8],
                          active_pair : usize,
                          histos      : &mut HistogramSet,
                          remaining   : &mut usize) -> usize {
    self.stats.n_buffers += 1;
    let mut n_used = 0usize;
    for record in events::records(buffer) {
      if self.process(&record, active_pair, histos, remaining) {
        n_used += 1;
      }
    }
    if *remaining > 0 {
      self.stats.n_short_buffers += 1;
      debug!("Buffer with {} usable records, still missing {} events for pair {}", n_used, remaining, active_pair);
    }
    n_used
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use feb_dataclasses::constants::{NCHN, MAGIC_WORD32};
  use feb_dataclasses::serialization::Serialization;

  fn record(board : u16, adc : [u16;NCHN]) -> EventRecord {
    let mut rec  = EventRecord::new();
    rec.board_id = board;
    rec.adc      = adc;
    rec
  }

  #[test]
  fn foreign_records_do_not_count() {
    let mut demux     = EventDemultiplexer::new(7, TriggerMode::Pairwise);
    let mut histos    = HistogramSet::new(7, vec![]);
    let mut remaining = 10usize;
    assert!(!demux.process(&record(8, [100;NCHN]), 0, &mut histos, &mut remaining));
    assert_eq!(remaining, 10);
    assert!(demux.process(&record(7, [100;NCHN]), 0, &mut histos, &mut remaining));
    assert_eq!(remaining, 9);
    assert_eq!(demux.stats.n_foreign, 1);
    assert_eq!(demux.stats.n_processed, 1);
  }

  #[test]
  fn pairwise_fills_gain_for_active_pair() {
    let mut demux     = EventDemultiplexer::new(1, TriggerMode::Pairwise);
    let mut histos    = HistogramSet::new(1, vec![]);
    let mut remaining = 1usize;
    demux.process(&record(1, [42;NCHN]), 3, &mut histos, &mut remaining);
    for ch in 0..NCHN {
      if ch == 6 || ch == 7 {
        assert_eq!(histos.gain[ch][42], 1);
        assert_eq!(histos.pedestal[ch][42], 0);
      } else {
        assert_eq!(histos.gain[ch][42], 0);
        assert_eq!(histos.pedestal[ch][42], 1);
      }
    }
  }

  #[test]
  fn all_channels_follow_the_highest_adc() {
    let mut demux     = EventDemultiplexer::new(1, TriggerMode::AllChannels);
    let mut histos    = HistogramSet::new(1, vec![]);
    let mut remaining = 5usize;
    let mut adc       = [10u16;NCHN];
    adc[21]           = 900;
    // active pair does not matter
    demux.process(&record(1, adc), 0, &mut histos, &mut remaining);
    assert_eq!(histos.gain[20][10], 1);
    assert_eq!(histos.gain[21][900], 1);
    assert_eq!(histos.gain[0][10], 0);
    assert_eq!(histos.pedestal[0][10], 1);
    assert_eq!(remaining, 4);
  }

  #[test]
  fn ties_go_to_the_lower_channel() {
    let mut demux     = EventDemultiplexer::new(1, TriggerMode::AsIs);
    let mut histos    = HistogramSet::new(1, vec![]);
    let mut remaining = 5usize;
    let mut adc       = [0u16;NCHN];
    adc[4]            = 500;
    adc[30]           = 500;
    demux.process(&record(1, adc), 15, &mut histos, &mut remaining);
    assert_eq!(histos.gain[4][500], 1);
    assert_eq!(histos.pedestal[30][500], 1);
  }

  #[test]
  fn adc_out_of_range_skips_record() {
    let mut demux     = EventDemultiplexer::new(1, TriggerMode::Pairwise);
    let mut histos    = HistogramSet::new(1, vec![]);
    let mut remaining = 5usize;
    let mut adc       = [10u16;NCHN];
    adc[3]            = 4096;
    assert!(!demux.process(&record(1, adc), 0, &mut histos, &mut remaining));
    assert_eq!(remaining, 5);
    assert_eq!(demux.stats.n_adc_out_of_range, 1);
    assert_eq!(histos.gain[0][10], 0);
    assert_eq!(histos.pedestal[5][10], 0);
  }

  #[test]
  fn buffer_stops_at_terminator() {
    let mut buffer = Vec::<u8>::new();
    for k in 0..5 {
      let mut rec = record(2, [k as u16;NCHN]);
      if k == 2 {
        rec.ts1 = MAGIC_WORD32;
      }
      buffer.extend_from_slice(&rec.to_bytestream());
    }
    let mut demux     = EventDemultiplexer::new(2, TriggerMode::Pairwise);
    let mut histos    = HistogramSet::new(2, vec![]);
    let mut remaining = 100usize;
    let n = demux.fill_from_buffer(&buffer, 0, &mut histos, &mut remaining);
    assert_eq!(n, 3);
    assert_eq!(remaining, 97);
    assert_eq!(histos.pedestal[4][3], 0);
    assert_eq!(histos.pedestal[4][2], 1);
    assert_eq!(demux.stats.n_short_buffers, 1);
  }
}
