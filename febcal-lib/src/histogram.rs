//! A plain 1d histogram as seen by the peak search
//!
//! Bins are described by their centers only. The 
//! calibration spectra have one bin per adc count,
//! centered at the adc value.

use std::fmt;

use feb_dataclasses::constants::NBINS;

#[derive(Debug, Clone, PartialEq)]
pub struct Histogram1D {
  pub centers   : Vec<f64>,
  pub counts    : Vec<f64>,
  pub bin_width : f64,
}

impl Histogram1D {

  pub fn new(centers : Vec<f64>, counts : Vec<f64>, bin_width : f64) -> Self {
    Self {
      centers,
      counts,
      bin_width,
    }
  }

  /// One bin per adc value, centered at the adc value
  ///
  /// # Arguments
  ///
  /// * bins : (adc, count). Bins outside of the 12bit 
  ///          range are ignored.
  pub fn from_spectrum(bins : &[(usize, f64)]) -> Self {
    let centers    = (0..NBINS).map(|k| k as f64).collect();
    let mut counts = vec![0.0;NBINS];
    for (bin, count) in bins {
      if *bin < NBINS {
        counts[*bin] = *count;
      }
    }
    Self::new(centers, counts, 1.0)
  }

  pub fn len(&self) -> usize {
    self.counts.len()
  }

  pub fn is_empty(&self) -> bool {
    self.counts.is_empty()
  }

  pub fn integral(&self) -> f64 {
    self.counts.iter().sum()
  }

  /// Center of the first bin with entries
  pub fn x_min(&self) -> Option<f64> {
    self.counts.iter()
      .position(|c| *c > 0.0)
      .map(|k| self.centers[k])
  }

  /// Center of the last bin with entries
  pub fn x_max(&self) -> Option<f64> {
    self.counts.iter()
      .rposition(|c| *c > 0.0)
      .map(|k| self.centers[k])
  }

  /// Index of the bin with the most entries. 
  /// The first one wins for equal counts.
  pub fn maximum_bin(&self) -> Option<usize> {
    let mut best : Option<usize> = None;
    for (k, c) in self.counts.iter().enumerate() {
      match best {
        None => best = Some(k),
        Some(b) => {
          if *c > self.counts[b] {
            best = Some(k);
          }
        }
      }
    }
    best
  }

  /// Merge factor consecutive bins. 
  ///
  /// The new bin center is the mean of the merged 
  /// centers, a trailing incomplete group forms the 
  /// last bin.
  pub fn rebin(&self, factor : usize) -> Histogram1D {
    if factor <= 1 {
      return self.clone();
    }
    let mut centers = Vec::<f64>::with_capacity(self.len()/factor + 1);
    let mut counts  = Vec::<f64>::with_capacity(self.len()/factor + 1);
    for (c_chunk, n_chunk) in self.centers.chunks(factor).zip(self.counts.chunks(factor)) {
      centers.push(c_chunk.iter().sum::<f64>() / c_chunk.len() as f64);
      counts.push(n_chunk.iter().sum());
    }
    Histogram1D::new(centers, counts, self.bin_width*factor as f64)
  }

  /// (center, count) of all bins with center in [low, high]
  pub fn window(&self, low : f64, high : f64) -> Vec<(f64, f64)> {
    self.centers.iter()
      .zip(self.counts.iter())
      .filter(|(x, _)| **x >= low && **x <= high)
      .map(|(x, y)| (*x, *y))
      .collect()
  }
}

impl fmt::Display for Histogram1D {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    let mut repr = format!("<Histogram1D: {} bins (width {})", self.len(), self.bin_width);
    repr += &(format!("\n  integral : {}", self.integral()));
    match (self.x_min(), self.x_max()) {
      (Some(lo), Some(hi)) => repr += &(format!("\n  range    : [{}, {}]>", lo, hi)),
      _                    => repr += "\n  -- empty -->",
    }
    write!(f, "{}", repr)
  }
}
