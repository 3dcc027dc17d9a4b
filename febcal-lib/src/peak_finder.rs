//! Peak search in 1d histograms
//!
//! The sweep engine only relies on the `FindPeaks` 
//! trait. `PeakSearch` is a simple implementation:
//! the histogram is smoothed with a gaussian of 
//! the requested width, then local maxima above 
//! a fraction of the highest one are reported.

use crate::histogram::Histogram1D;

/// Maximum number of peaks reported by PeakSearch
pub const MAX_PEAKS : usize = 10;

pub trait FindPeaks {
  /// Positions (in x) of the peaks in the histogram.
  ///
  /// # Arguments
  ///
  /// * hist      : the (possibly rebinned) histogram 
  /// * width     : expected peak sigma in bins
  /// * threshold : peaks lower than threshold times
  ///               the highest peak are dropped
  fn find_peaks(&self, hist : &Histogram1D, width : f64, threshold : f64) -> Vec<f64>;
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct PeakSearch {
  pub max_peaks : usize,
}

impl PeakSearch {
  pub fn new() -> Self {
    Self {
      max_peaks : MAX_PEAKS,
    }
  }
}

impl Default for PeakSearch {
  fn default() -> Self {
    Self::new()
  }
}

/// Moving average over 2*half+1 bins. At the edges
/// only the bins inside the histogram are averaged.
fn box_filter(values : &[f64], half : usize) -> Vec<f64> {
  let n = values.len();
  let mut prefix = Vec::<f64>::with_capacity(n + 1);
  prefix.push(0.0);
  for v in values {
    let last = prefix[prefix.len() - 1];
    prefix.push(last + v);
  }
  (0..n).map(|k| {
    let lo = k.saturating_sub(half);
    let hi = usize::min(n - 1, k + half);
    (prefix[hi + 1] - prefix[lo]) / (hi - lo + 1) as f64
  }).collect()
}

/// Approximate a gaussian smoothing with sigma (in bins)
/// by three box filters
pub fn smooth(values : &[f64], sigma : f64) -> Vec<f64> {
  // box width for n=3 passes: sqrt(12 sigma^2/n + 1)
  let ideal = (4.0*sigma*sigma + 1.0).sqrt();
  let mut width = ideal.round() as usize;
  if width % 2 == 0 {
    width = if ideal > width as f64 {width + 1} else {width.saturating_sub(1)};
  }
  let half = width.max(1) / 2;
  if half == 0 || values.is_empty() {
    return values.to_vec();
  }
  let mut smoothed = box_filter(values, half);
  smoothed = box_filter(&smoothed, half);
  box_filter(&smoothed, half)
}

impl FindPeaks for PeakSearch {
  fn find_peaks(&self, hist : &Histogram1D, width : f64, threshold : f64) -> Vec<f64> {
    let smoothed = smooth(&hist.counts, width);
    // rounding noise of the running sums must not 
    // produce maxima on flat stretches
    let eps = 1e-12 * smoothed.iter().fold(0.0f64, |acc, x| acc.max(*x));
    let mut maxima = Vec::<(usize, f64)>::new();
    for k in 1..smoothed.len().saturating_sub(1) {
      if smoothed[k] > smoothed[k-1] + eps && smoothed[k] + eps >= smoothed[k+1] && smoothed[k] > 0.0 {
        maxima.push((k, smoothed[k]));
      }
    }
    let highest = maxima.iter().fold(0.0f64, |acc, (_, h)| acc.max(*h));
    maxima.retain(|(_, h)| *h >= threshold*highest);
    maxima.sort_by(|a, b| b.1.total_cmp(&a.1));
    maxima.truncate(self.max_peaks);
    maxima.iter().map(|(k, _)| hist.centers[*k]).collect()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn gauss(x : f64, mu : f64, sigma : f64, amp : f64) -> f64 {
    amp*(-(x - mu).powi(2)/(2.0*sigma*sigma)).exp()
  }

  fn comb(peaks : &[(f64, f64)], sigma : f64) -> Histogram1D {
    let bins : Vec<(usize, f64)> = (0..4096).map(|k| {
      let y = peaks.iter().map(|(mu, amp)| gauss(k as f64, *mu, sigma, *amp)).sum::<f64>();
      (k, y.round())
    }).collect();
    Histogram1D::from_spectrum(&bins)
  }

  #[test]
  fn smoothing_keeps_integral() {
    let mut values = vec![0.0;101];
    values[50] = 100.0;
    let smoothed = smooth(&values, 3.0);
    let total : f64 = smoothed.iter().sum();
    assert!((total - 100.0).abs() < 1e-6);
    assert!(smoothed[50] < 100.0);
    assert!(smoothed[50] > smoothed[45]);
    assert_eq!(smooth(&values, 0.0), values);
  }

  #[test]
  fn finds_separated_peaks() {
    let hist  = comb(&[(200.0, 100.0), (260.0, 80.0), (320.0, 60.0)], 3.0);
    let mut peaks = PeakSearch::new().find_peaks(&hist, 2.0, 0.05);
    peaks.sort_by(|a, b| a.total_cmp(b));
    assert_eq!(peaks, vec![200.0, 260.0, 320.0]);
  }

  #[test]
  fn threshold_drops_small_peaks() {
    let hist  = comb(&[(200.0, 100.0), (260.0, 10.0)], 3.0);
    let peaks = PeakSearch::new().find_peaks(&hist, 2.0, 0.5);
    assert_eq!(peaks, vec![200.0]);
  }

  #[test]
  fn at_most_ten_peaks() {
    let peaks : Vec<(f64, f64)> = (0..15).map(|k| (100.0 + 50.0*k as f64, 100.0 - k as f64)).collect();
    let hist  = comb(&peaks, 3.0);
    let found = PeakSearch::new().find_peaks(&hist, 2.0, 0.05);
    assert_eq!(found.len(), MAX_PEAKS);
    // highest first
    assert_eq!(found[0], 100.0);
  }

  #[test]
  fn empty_histogram() {
    let hist = Histogram1D::from_spectrum(&[]);
    assert!(PeakSearch::new().find_peaks(&hist, 3.0, 0.05).is_empty());
  }
}
