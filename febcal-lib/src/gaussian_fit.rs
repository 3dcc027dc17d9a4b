//! Gaussian fits to histogram windows
//!
//! `LevenbergMarquardt` fits A*exp(-(x-mu)^2/(2 sigma^2))
//! with unit weights to the bins inside the window.
//! Parameter errors are taken from the covariance 
//! matrix, scaled with chi2/ndf.

use std::error::Error;
use std::fmt;

use nalgebra::{Matrix3, Vector3};
use statrs::distribution::{ChiSquared, ContinuousCDF};

use crate::histogram::Histogram1D;

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum FitError {
  NotEnoughPoints,
  Singular,
  EmptyWindow,
  NotConverged,
}

impl FitError {
  pub fn to_string(&self) -> String {
    match self {
      FitError::NotEnoughPoints => {return String::from("NotEnoughPoints");},
      FitError::Singular        => {return String::from("Singular");},
      FitError::EmptyWindow     => {return String::from("EmptyWindow");},
      FitError::NotConverged    => {return String::from("NotConverged");},
    }
  }
}

impl fmt::Display for FitError {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    let repr = self.to_string();
    write!(f, "<FitError : {}>", repr)
  }
}

impl Error for FitError {
}

/// Result of a gaussian fit
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct GaussianFit {
  pub amplitude  : f64,
  pub center     : f64,
  pub center_err : f64,
  pub sigma      : f64,
  pub sigma_err  : f64,
  pub chi_square : f64,
  pub ndf        : usize,
}

impl GaussianFit {

  pub fn eval(&self, x : f64) -> f64 {
    gauss(x, self.amplitude, self.center, self.sigma)
  }

  /// The width ended at the floor of half a bin, 
  /// so sigma is an upper bound and not a measurement
  pub fn width_at_floor(&self, bin_width : f64) -> bool {
    self.sigma <= SIGMA_FLOOR_BINS*bin_width*(1.0 + 1e-9)
  }

  /// Probability to get a larger chi2 by chance. 
  /// None without degrees of freedom.
  pub fn p_value(&self) -> Option<f64> {
    if self.ndf == 0 || !self.chi_square.is_finite() {
      return None;
    }
    match ChiSquared::new(self.ndf as f64) {
      Err(err) => {
        debug!("Can not construct chi2 distribution! {err}");
        None
      }
      Ok(dist) => Some(1.0 - dist.cdf(self.chi_square))
    }
  }
}

impl fmt::Display for GaussianFit {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    let mut repr = String::from("<GaussianFit:");
    repr += &(format!("\n  A     : {:.3}", self.amplitude));
    repr += &(format!("\n  mu    : {:.3} +- {:.3}", self.center, self.center_err));
    repr += &(format!("\n  sigma : {:.3} +- {:.3}", self.sigma, self.sigma_err));
    repr += &(format!("\n  chi2/ndf : {:.2}/{}>", self.chi_square, self.ndf));
    write!(f, "{}", repr)
  }
}

pub trait FitGaussian {
  /// Fit a gaussian to the bins of hist with 
  /// centers in [low, high]
  fn fit_gaussian(&self, hist : &Histogram1D, low : f64, high : f64) -> Result<GaussianFit, FitError>;
}

/// Smallest width a fit can return, in units of the bin width
pub const SIGMA_FLOOR_BINS : f64 = 0.5;

fn gauss(x : f64, amplitude : f64, center : f64, sigma : f64) -> f64 {
  amplitude*(-(x - center).powi(2)/(2.0*sigma*sigma)).exp()
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct LevenbergMarquardt {
  pub max_iterations : usize,
  /// Stop once chi2 changes relatively less than this
  pub tolerance      : f64,
}

impl LevenbergMarquardt {
  pub fn new() -> Self {
    Self {
      max_iterations : 200,
      tolerance      : 1e-10,
    }
  }

  fn chi_square(points : &[(f64, f64)], p : &Vector3<f64>) -> f64 {
    points.iter().map(|(x, y)| (y - gauss(*x, p[0], p[1], p[2])).powi(2)).sum()
  }

  /// J^T J and J^T r at the parameters p
  fn normal_equations(points : &[(f64, f64)], p : &Vector3<f64>) -> (Matrix3<f64>, Vector3<f64>) {
    let mut jtj = Matrix3::<f64>::zeros();
    let mut jtr = Vector3::<f64>::zeros();
    for (x, y) in points {
      let dx  = x - p[1];
      let e   = (-(dx*dx)/(2.0*p[2]*p[2])).exp();
      let row = Vector3::new(e,
                             p[0]*e*dx/(p[2]*p[2]),
                             p[0]*e*dx*dx/(p[2]*p[2]*p[2]));
      let r   = y - p[0]*e;
      jtj += row * row.transpose();
      jtr += row * r;
    }
    (jtj, jtr)
  }
}

impl Default for LevenbergMarquardt {
  fn default() -> Self {
    Self::new()
  }
}

impl FitGaussian for LevenbergMarquardt {
  fn fit_gaussian(&self, hist : &Histogram1D, low : f64, high : f64) -> Result<GaussianFit, FitError> {
    let points = hist.window(low, high);
    if points.len() < 3 {
      return Err(FitError::NotEnoughPoints);
    }
    let total : f64 = points.iter().map(|(_, y)| y.max(0.0)).sum();
    if total <= 0.0 {
      return Err(FitError::EmptyWindow);
    }
    // narrower peaks can not be resolved
    let sigma_min = SIGMA_FLOOR_BINS*hist.bin_width;

    // start values from the moments of the window
    let (mut x_peak, mut y_peak) = points[0];
    for (x, y) in points.iter() {
      if *y > y_peak {
        x_peak = *x;
        y_peak = *y;
      }
    }
    let mean  = points.iter().map(|(x, y)| x*y.max(0.0)).sum::<f64>() / total;
    let var   = points.iter().map(|(x, y)| (x - mean).powi(2)*y.max(0.0)).sum::<f64>() / total;
    let mut sigma = var.sqrt();
    if !sigma.is_finite() || sigma < sigma_min {
      sigma = sigma_min;
    }

    let mut p      = Vector3::new(y_peak, x_peak, sigma);
    let mut chi2   = Self::chi_square(&points, &p);
    let mut lambda = 1e-3;
    for iteration in 0..self.max_iterations {
      let (jtj, jtr) = Self::normal_equations(&points, &p);
      let mut damped = jtj;
      for k in 0..3 {
        damped[(k,k)] += lambda*jtj[(k,k)].max(1e-12);
      }
      let delta = match damped.try_inverse() {
        None => {
          if iteration == 0 {
            return Err(FitError::Singular);
          }
          break;
        }
        Some(inv) => inv * jtr
      };
      let mut trial = p + delta;
      trial[2] = trial[2].abs().max(sigma_min);
      let trial_chi2 = Self::chi_square(&points, &trial);
      if trial_chi2.is_finite() && trial_chi2 <= chi2 {
        let change = (chi2 - trial_chi2) / chi2.max(f64::MIN_POSITIVE);
        p      = trial;
        chi2   = trial_chi2;
        lambda = (lambda / 10.0).max(1e-12);
        if change < self.tolerance {
          break;
        }
      } else {
        lambda *= 10.0;
        if lambda > 1e12 {
          break;
        }
      }
    }

    if !(p[0].is_finite() && p[1].is_finite() && p[2].is_finite() && chi2.is_finite()) {
      return Err(FitError::NotConverged);
    }
    let ndf   = points.len() - 3;
    let scale = if ndf > 0 {chi2 / ndf as f64} else {1.0};
    let (jtj, _) = Self::normal_equations(&points, &p);
    let (center_err, sigma_err) = match jtj.try_inverse() {
      None => (f64::INFINITY, f64::INFINITY),
      Some(cov) => {
        ((cov[(1,1)]*scale).abs().sqrt(), (cov[(2,2)]*scale).abs().sqrt())
      }
    };
    Ok(GaussianFit {
      amplitude  : p[0],
      center     : p[1],
      center_err,
      sigma      : p[2],
      sigma_err,
      chi_square : chi2,
      ndf,
    })
  }
}
