//! Bookkeeping for febcal-collect

use std::collections::HashMap;
use std::path::{Path,
                PathBuf};

use chrono::{DateTime,
             Utc};

/// Counts received histogram sets per board
#[derive(Debug, Clone, Default)]
pub struct CollectionTally {
  boards : Vec<u8>,
  n_sets : usize,
  counts : HashMap<u8, usize>,
}

impl CollectionTally {

  /// If boards is empty, the tally is never complete
  pub fn new(boards : Vec<u8>, n_sets : usize) -> Self {
    Self {
      boards,
      n_sets,
      counts : HashMap::<u8, usize>::new(),
    }
  }

  /// Register a set, returns how many we have 
  /// seen for this board so far
  pub fn add(&mut self, board : u8) -> usize {
    let count = self.counts.entry(board).or_insert(0);
    *count += 1;
    if !self.boards.is_empty() && !self.boards.contains(&board) {
      warn!("Received histograms of unexpected board {}", board);
    }
    *count
  }

  pub fn count(&self, board : u8) -> usize {
    *self.counts.get(&board).unwrap_or(&0)
  }

  /// Every requested board delivered n_sets
  pub fn is_complete(&self) -> bool {
    !self.boards.is_empty() 
      && self.boards.iter().all(|b| self.count(*b) >= self.n_sets)
  }
}

/// Where to write a histogram set received at a given time
pub fn histogram_filename(dir : &Path, board : u8, when : &DateTime<Utc>) -> PathBuf {
  let stamp = when.format("%Y%m%d_%H%M%S%.3f");
  dir.join(format!("{:02x}-{}.histos", board, stamp))
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::TimeZone;

  #[test]
  fn tally_completes_when_all_boards_are_done() {
    let mut tally = CollectionTally::new(vec![3, 0x1f], 2);
    assert_eq!(tally.add(3), 1);
    assert_eq!(tally.add(3), 2);
    assert!(!tally.is_complete());
    tally.add(0x1f);
    tally.add(7);
    assert!(!tally.is_complete());
    tally.add(0x1f);
    assert!(tally.is_complete());
    assert_eq!(tally.count(7), 1);
  }

  #[test]
  fn tally_without_boards_runs_forever() {
    let mut tally = CollectionTally::new(vec![], 1);
    tally.add(1);
    assert!(!tally.is_complete());
  }

  #[test]
  fn filename_has_board_in_hex() {
    let when  = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 5).unwrap();
    let fname = histogram_filename(Path::new("/tmp"), 0x1f, &when);
    assert_eq!(fname, PathBuf::from("/tmp/1f-20240301_123005.000.histos"));
  }
}
