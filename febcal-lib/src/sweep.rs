//! The peak search scan
//!
//! A spectrum is searched for peaks with every 
//! combination of threshold, bin size and peak 
//! width. A parameter set is kept if it yields 
//! enough well measured peaks inside the populated 
//! range of the spectrum.

use feb_dataclasses::PeakSet;
use feb_dataclasses::errors::CalibrationError;

use crate::histogram::Histogram1D;
use crate::peak_finder::FindPeaks;
use crate::gaussian_fit::{FitGaussian,
                          GaussianFit};
use crate::settings::SweepSettings;

/// Thresholds from min (included) to max (excluded)
pub fn thresholds(settings : &SweepSettings) -> impl Iterator<Item = f64> {
  let SweepSettings {threshold_min, threshold_max, threshold_step, ..} = *settings;
  // without the margin 0.05 + 37*0.02 might fall 
  // on either side of 0.8
  let limit = threshold_max - 1e-9*threshold_step.abs();
  (0usize..)
    .map(move |k| threshold_min + k as f64*threshold_step)
    .take_while(move |t| threshold_step > 0.0 && *t < limit)
}

pub fn bin_sizes(settings : &SweepSettings) -> impl Iterator<Item = usize> {
  settings.bin_size_min.max(1)..settings.bin_size_max
}

pub fn peak_widths(settings : &SweepSettings) -> impl Iterator<Item = usize> {
  settings.width_min.max(1)..settings.width_max
}

/// All (threshold, bin size, peak width) tuples, 
/// threshold varying slowest
pub fn parameter_grid(settings : &SweepSettings) -> impl Iterator<Item = (f64, usize, usize)> {
  let widths = *settings;
  let sizes  = *settings;
  thresholds(settings).flat_map(move |th| {
    bin_sizes(&sizes).flat_map(move |bs| {
      peak_widths(&widths).map(move |pw| (th, bs, pw))
    })
  })
}

/// A peak is good if its center is measured to better 
/// than max_rel_err and lies strictly inside the 
/// populated range of the spectrum
pub fn is_good_peak(fit : &GaussianFit, x_min : f64, x_max : f64, max_rel_err : f64) -> bool {
  fit.center_err / fit.center < max_rel_err
    && x_min < fit.center
    && fit.center < x_max
}

pub struct SweepEngine<'a> {
  finder   : &'a dyn FindPeaks,
  fitter   : &'a dyn FitGaussian,
  settings : SweepSettings,
}

impl<'a> SweepEngine<'a> {

  pub fn new(finder   : &'a dyn FindPeaks,
             fitter   : &'a dyn FitGaussian,
             settings : SweepSettings) -> Self {
    Self {
      finder,
      fitter,
      settings,
    }
  }

  /// Look for peaks with a single set of parameters. 
  ///
  /// Returns the peak set if it has enough good peaks.
  pub fn scan(&self,
              hist      : &Histogram1D,
              x_min     : f64,
              x_max     : f64,
              threshold : f64,
              bin_size  : usize,
              width     : usize) -> Option<PeakSet> {
    let mut candidates = self.finder.find_peaks(hist, width as f64, threshold);
    let n_cand = candidates.len();
    if !(self.settings.candidates_min < n_cand && n_cand < self.settings.candidates_max) {
      trace!("th {:.2} bs {} w {} : {} candidates", threshold, bin_size, width, n_cand);
      return None;
    }
    candidates.sort_by(|a, b| a.total_cmp(b));
    let half_window = self.settings.window_scale * width as f64;
    let mut fits    = Vec::<(f64, f64)>::with_capacity(n_cand);
    for pos in candidates {
      match self.fitter.fit_gaussian(hist, pos - half_window, pos + half_window) {
        Err(err) => {
          trace!("Fit at {} failed! {}", pos, err);
        }
        Ok(fit) => {
          if is_good_peak(&fit, x_min, x_max, self.settings.max_rel_err) {
            fits.push((fit.center, fit.center_err));
          }
        }
      }
    }
    if fits.len() <= self.settings.min_good_peaks {
      return None;
    }
    debug!("th {:.2} bs {} w {} : {} good peaks", threshold, bin_size, width, fits.len());
    Some(PeakSet {
      threshold,
      peak_width : width,
      bin_size,
      fits,
    })
  }

  /// Scan the full parameter space
  ///
  /// Fails with Infeasible if the spectrum is empty or
  /// no parameter set was kept.
  pub fn run(&self, hist : &Histogram1D) -> Result<Vec<PeakSet>, CalibrationError> {
    let (x_min, x_max) = match (hist.x_min(), hist.x_max()) {
      (Some(lo), Some(hi)) => (lo, hi),
      _ => {
        debug!("Empty spectrum!");
        return Err(CalibrationError::Infeasible);
      }
    };
    // rebin only once per bin size
    let rebinned : Vec<(usize, Histogram1D)> = bin_sizes(&self.settings)
      .map(|bs| (bs, hist.rebin(bs)))
      .collect();
    let mut kept = Vec::<PeakSet>::new();
    for (threshold, bin_size, width) in parameter_grid(&self.settings) {
      let h = match rebinned.iter().find(|(bs, _)| *bs == bin_size) {
        Some((_, h)) => h,
        None         => continue,
      };
      if let Some(peaks) = self.scan(h, x_min, x_max, threshold, bin_size, width) {
        kept.push(peaks);
      }
    }
    if kept.is_empty() {
      return Err(CalibrationError::Infeasible);
    }
    Ok(kept)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::cell::Cell;
  use crate::gaussian_fit::FitError;

  /// Always reports the same positions
  struct FixedPeaks(Vec<f64>);

  impl FindPeaks for FixedPeaks {
    fn find_peaks(&self, _hist : &Histogram1D, _width : f64, _threshold : f64) -> Vec<f64> {
      self.0.clone()
    }
  }

  /// Puts the peak at the window center, with a 
  /// fixed relative error. Counts the calls.
  struct CenteredFit {
    rel_err : f64,
    calls   : Cell<usize>,
  }

  impl FitGaussian for CenteredFit {
    fn fit_gaussian(&self, _hist : &Histogram1D, low : f64, high : f64) -> Result<GaussianFit, FitError> {
      self.calls.set(self.calls.get() + 1);
      let center = 0.5*(low + high);
      Ok(GaussianFit {
        amplitude  : 1.0,
        center,
        center_err : self.rel_err*center,
        sigma      : 1.0,
        sigma_err  : 0.1,
        chi_square : 1.0,
        ndf        : 1,
      })
    }
  }

  fn fit(center : f64, center_err : f64) -> GaussianFit {
    GaussianFit {
      amplitude : 1.0, center, center_err, sigma : 1.0, sigma_err : 0.0, chi_square : 0.0, ndf : 0
    }
  }

  fn single_tuple() -> SweepSettings {
    let mut settings  = SweepSettings::new();
    settings.threshold_max = 0.06;
    settings.bin_size_max  = 2;
    settings.width_max     = 2;
    settings
  }

  #[test]
  fn default_grid() {
    let settings = SweepSettings::new();
    let ths : Vec<f64> = thresholds(&settings).collect();
    assert_eq!(ths.len(), 38);
    assert!((ths[37] - 0.79).abs() < 1e-12);
    assert_eq!(bin_sizes(&settings).count(), 19);
    assert_eq!(peak_widths(&settings).count(), 49);
    assert_eq!(parameter_grid(&settings).count(), 38*19*49);
    let first : Vec<(f64, usize, usize)> = parameter_grid(&settings).take(2).collect();
    assert_eq!(first[0], (0.05, 1, 1));
    assert_eq!(first[1], (0.05, 1, 2));
  }

  #[test]
  fn acceptance() {
    assert!( is_good_peak(&fit(100.0, 5.0),  50.0, 200.0, 0.1));
    assert!(!is_good_peak(&fit(100.0, 15.0), 50.0, 200.0, 0.1));
    assert!(!is_good_peak(&fit(50.0,  1.0),  50.0, 200.0, 0.1));
    assert!(!is_good_peak(&fit(250.0, 1.0),  50.0, 200.0, 0.1));
    assert!(!is_good_peak(&fit(100.0, f64::INFINITY), 50.0, 200.0, 0.1));
  }

  #[test]
  fn few_candidates_are_not_fitted() {
    let hist   = Histogram1D::from_spectrum(&[(10, 1.0), (1000, 1.0)]);
    let finder = FixedPeaks(vec![100.0, 200.0, 300.0]);
    let fitter = CenteredFit {rel_err : 0.01, calls : Cell::new(0)};
    let engine = SweepEngine::new(&finder, &fitter, single_tuple());
    assert_eq!(engine.scan(&hist, 10.0, 1000.0, 0.05, 1, 1), None);
    assert_eq!(fitter.calls.get(), 0);
    assert_eq!(engine.run(&hist), Err(CalibrationError::Infeasible));
    assert_eq!(fitter.calls.get(), 0);
  }

  #[test]
  fn too_many_candidates_are_not_fitted() {
    let hist   = Histogram1D::from_spectrum(&[(10, 1.0), (1000, 1.0)]);
    let finder = FixedPeaks((1..11).map(|k| 50.0*k as f64).collect());
    let fitter = CenteredFit {rel_err : 0.01, calls : Cell::new(0)};
    let engine = SweepEngine::new(&finder, &fitter, single_tuple());
    assert_eq!(engine.scan(&hist, 10.0, 1000.0, 0.05, 1, 1), None);
    assert_eq!(fitter.calls.get(), 0);
  }

  #[test]
  fn keeps_sorted_good_peaks() {
    let hist   = Histogram1D::from_spectrum(&[(10, 1.0), (1000, 1.0)]);
    let finder = FixedPeaks(vec![500.0, 100.0, 300.0, 200.0, 400.0, 2000.0]);
    let fitter = CenteredFit {rel_err : 0.05, calls : Cell::new(0)};
    let engine = SweepEngine::new(&finder, &fitter, single_tuple());
    let peaks  = engine.run(&hist).unwrap();
    assert_eq!(fitter.calls.get(), 6);
    assert_eq!(peaks.len(), 1);
    let centers : Vec<f64> = peaks[0].fits.iter().map(|(c, _)| *c).collect();
    assert_eq!(centers, vec![100.0, 200.0, 300.0, 400.0, 500.0]);
    assert_eq!(peaks[0].bin_size, 1);
    assert_eq!(peaks[0].peak_width, 1);
  }

  #[test]
  fn four_good_peaks_are_not_enough() {
    let hist   = Histogram1D::from_spectrum(&[(10, 1.0), (1000, 1.0)]);
    let finder = FixedPeaks(vec![100.0, 200.0, 300.0, 400.0, 2000.0]);
    let fitter = CenteredFit {rel_err : 0.05, calls : Cell::new(0)};
    let engine = SweepEngine::new(&finder, &fitter, single_tuple());
    assert_eq!(engine.run(&hist), Err(CalibrationError::Infeasible));
    assert_eq!(fitter.calls.get(), 5);
  }
}
