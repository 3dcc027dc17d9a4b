//! Gain from the distances between peaks
//!
//! For every kept peak set, the distance between 
//! each pair of peaks goes into a histogram. The 
//! most frequent distance is the spacing of the 
//! photo electron peaks, which is fitted with a 
//! gaussian.

use ndhistogram::{
    ndhistogram,
    Histogram,
};
use ndhistogram::axis::{
    Uniform,
    BinInterval,
};

use feb_dataclasses::constants::NBINS;
use feb_dataclasses::errors::CalibrationError;
use feb_dataclasses::{PeakSet,
                      GainEstimate};

use crate::histogram::Histogram1D;
use crate::gaussian_fit::FitGaussian;
use crate::settings::DistanceWeighting;

/// (distance, uncertainty) for all pairs of peaks 
/// within each peak set
///
/// The peaks of a set are sorted, so distances are
/// positive.
pub fn pairwise_distances(peaks : &[PeakSet]) -> Vec<(f64, f64)> {
  let mut distances = Vec::<(f64, f64)>::new();
  for set in peaks {
    for j in 0..set.fits.len() {
      for k in j+1..set.fits.len() {
        let (c_j, e_j) = set.fits[j];
        let (c_k, e_k) = set.fits[k];
        distances.push((c_k - c_j, (e_k*e_k + e_j*e_j).sqrt()));
      }
    }
  }
  distances
}

pub struct GainSynthesizer<'a> {
  fitter        : &'a dyn FitGaussian,
  weighting     : DistanceWeighting,
  legacy_window : bool,
}

impl<'a> GainSynthesizer<'a> {

  pub fn new(fitter        : &'a dyn FitGaussian,
             weighting     : DistanceWeighting,
             legacy_window : bool) -> Self {
    Self {
      fitter,
      weighting,
      legacy_window,
    }
  }

  /// Histogram the distances in unit bins over [0, 4096)
  pub fn distance_histogram(&self, distances : &[(f64, f64)]) -> Result<Histogram1D, CalibrationError> {
    let axis = match Uniform::new(NBINS, 0.0, NBINS as f64) {
      Err(err) => {
        error!("Unable to create distance axis! {err}");
        return Err(CalibrationError::FitFailed);
      }
      Ok(axis) => axis
    };
    let mut hist = ndhistogram!(axis; f64);
    for (distance, uncertainty) in distances {
      match self.weighting {
        DistanceWeighting::Count       => hist.fill(distance),
        DistanceWeighting::Uncertainty => hist.fill_with(distance, *uncertainty),
      }
    }
    let mut centers = Vec::<f64>::with_capacity(NBINS);
    let mut counts  = Vec::<f64>::with_capacity(NBINS);
    for item in hist.iter() {
      // under/overflow do not take part in the fit
      if let BinInterval::Bin {start, end} = item.bin {
        centers.push(0.5*(start + end));
        counts.push(*item.value);
      }
    }
    Ok(Histogram1D::new(centers, counts, 1.0))
  }

  /// The window for the gain fit around the most 
  /// populated bin
  pub fn fit_window(&self, hist : &Histogram1D, max_bin : usize) -> (f64, f64) {
    if self.legacy_window {
      // bins counted from 1, integer arithmetic
      let index = max_bin + 1;
      ((index/2) as f64, (3*index/2) as f64)
    } else {
      let center = hist.centers[max_bin];
      (0.5*center, 1.5*center)
    }
  }

  /// Distances and the gain fit for a set of peak sets
  pub fn synthesize(&self, peaks : &[PeakSet]) -> Result<(Vec<(f64, f64)>, GainEstimate), CalibrationError> {
    let distances = pairwise_distances(peaks);
    if distances.is_empty() {
      return Err(CalibrationError::Infeasible);
    }
    let hist    = self.distance_histogram(&distances)?;
    let max_bin = match hist.maximum_bin() {
      Some(k) if hist.counts[k] > 0.0 => k,
      _ => {
        warn!("No distance inside the histogram range!");
        return Err(CalibrationError::FitFailed);
      }
    };
    let (low, high) = self.fit_window(&hist, max_bin);
    debug!("Fitting gain in [{}, {}] ({} distances)", low, high, distances.len());
    match self.fitter.fit_gaussian(&hist, low, high) {
      Err(err) => {
        warn!("Gain fit failed! {err}");
        Err(CalibrationError::FitFailed)
      }
      Ok(fit) => {
        if let Some(p) = fit.p_value() {
          debug!("Gain fit p-value {:.3}", p);
        }
        if fit.width_at_floor(hist.bin_width) {
          info!("Gain width not resolved, sigma {:.3} is the floor of half a bin", fit.sigma);
        }
        let gain = GainEstimate {
          center     : fit.center,
          sigma      : fit.sigma,
          chi_square : fit.chi_square,
          ndf        : fit.ndf,
        };
        Ok((distances, gain))
      }
    }
  }
}
