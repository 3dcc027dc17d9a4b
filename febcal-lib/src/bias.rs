//! Gain vs bias dependency of the SiPMs
//!
//! The gain of a SiPM grows linearly with the bias 
//! voltage, which is set per channel through the 8bit 
//! input DAC. Measuring the gain at a few DAC settings
//! gives the slope and offset, which are then inverted
//! to find the DAC setting for a nominal gain.

use std::fmt;

use feb_dataclasses::constants::NCHN;

/// Minimum number of (bias, gain) points for a fit
pub const MIN_POINTS : usize = 3;

/// gain = slope*bias + offset
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct GainDependency {
  pub slope  : f64,
  pub offset : f64,
}

impl GainDependency {
  /// The (not rounded, not clamped) bias for a gain.
  /// None for a flat dependency.
  pub fn bias_for_gain(&self, gain : f64) -> Option<f64> {
    if self.slope == 0.0 || !self.slope.is_finite() {
      return None;
    }
    Some((gain - self.offset) / self.slope)
  }
}

impl fmt::Display for GainDependency {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    write!(f, "<GainDependency: gain = {:.3}*bias + {:.3}>", self.slope, self.offset)
  }
}

/// Weighted linear fit of the gain against the bias.
///
/// # Arguments
///
/// * points : (bias, gain, gain uncertainty). Every point 
///            enters with weight 1/uncertainty, points without
///            a positive, finite uncertainty are ignored.
pub fn fit_gain_dependency(points : &[(f64, f64, f64)]) -> Option<GainDependency> {
  let valid : Vec<&(f64, f64, f64)> = points.iter()
    .filter(|(x, y, s)| x.is_finite() && y.is_finite() && s.is_finite() && *s > 0.0)
    .collect();
  if valid.len() < MIN_POINTS {
    debug!("Only {} valid points, need {}", valid.len(), MIN_POINTS);
    return None;
  }
  // least squares of sum (w*(y - a*x - b))^2 with w = 1/s
  let (mut sw, mut sx, mut sy, mut sxx, mut sxy) = (0.0, 0.0, 0.0, 0.0, 0.0);
  for (x, y, s) in valid {
    let w = 1.0/(s*s);
    sw  += w;
    sx  += w*x;
    sy  += w*y;
    sxx += w*x*x;
    sxy += w*x*y;
  }
  let det = sw*sxx - sx*sx;
  if det == 0.0 || !det.is_finite() {
    return None;
  }
  let slope  = (sw*sxy - sx*sy) / det;
  let offset = (sy - slope*sx) / sw;
  Some(GainDependency {slope, offset})
}

/// DAC settings for all channels to reach the nominal gain
///
/// Settings outside of [min, max] are clamped, channels 
/// without a dependency get the middle of the range.
pub fn plan_bias_settings(dependencies : &[Option<GainDependency>],
                          nominal_gain : f64,
                          range        : (u8, u8)) -> Vec<u8> {
  let (min, max) = (range.0.min(range.1), range.0.max(range.1));
  let midpoint   = ((min as u16 + max as u16)/2) as u8;
  let mut settings = Vec::<u8>::with_capacity(NCHN);
  for (ch, dep) in dependencies.iter().enumerate() {
    match dep.and_then(|d| d.bias_for_gain(nominal_gain)) {
      None => {
        warn!("Bias setting couldn't be computed for channel {} - setting {}", ch, midpoint);
        settings.push(midpoint);
      }
      Some(bias) => {
        let bias = bias.round();
        if bias < min as f64 {
          warn!("Bias below range for channel {} - setting {}", ch, min);
          settings.push(min);
        } else if bias > max as f64 {
          warn!("Bias above range for channel {} - setting {}", ch, max);
          settings.push(max);
        } else {
          settings.push(bias as u8);
        }
      }
    }
  }
  settings
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn exact_line() {
    let points : Vec<(f64, f64, f64)> = [180.0, 185.0, 190.0, 195.0, 200.0].iter()
      .map(|b| (*b, 2.5*b - 400.0, 1.0))
      .collect();
    let dep = fit_gain_dependency(&points).unwrap();
    assert!((dep.slope  - 2.5).abs()   < 1e-9);
    assert!((dep.offset + 400.0).abs() < 1e-6);
    assert!((dep.bias_for_gain(75.0).unwrap() - 190.0).abs() < 1e-6);
  }

  #[test]
  fn weights_pull_the_line() {
    // the outlier has a huge uncertainty
    let points = vec![(180.0, 50.0, 0.1), (190.0, 75.0, 0.1), (200.0, 100.0, 0.1), (195.0, 0.0, 1000.0)];
    let dep    = fit_gain_dependency(&points).unwrap();
    assert!((dep.slope - 2.5).abs() < 1e-3);
  }

  #[test]
  fn needs_three_points() {
    let points = vec![(180.0, 50.0, 1.0), (190.0, 75.0, 1.0), (200.0, 100.0, 0.0)];
    assert_eq!(fit_gain_dependency(&points), None);
    let flat = GainDependency {slope : 0.0, offset : 75.0};
    assert_eq!(flat.bias_for_gain(75.0), None);
  }

  #[test]
  fn planning_clamps() {
    let deps = vec![Some(GainDependency {slope : 2.5, offset : -400.0}),
                    Some(GainDependency {slope : 2.5, offset : -300.0}),
                    Some(GainDependency {slope : 2.5, offset : -500.0}),
                    None];
    assert_eq!(plan_bias_settings(&deps, 75.0, (170, 210)), vec![190, 170, 210, 190]);
  }
}
