//! One calibration request in, one result out

use feb_dataclasses::{CalibrationRequest,
                      CalibrationResult};
use feb_dataclasses::errors::CalibrationError;

use crate::histogram::Histogram1D;
use crate::peak_finder::FindPeaks;
use crate::gaussian_fit::FitGaussian;
use crate::sweep::SweepEngine;
use crate::gain::GainSynthesizer;
use crate::settings::FitterSettings;

/// Search the peaks in the spectrum of the request 
/// and fit the gain from their distances.
///
/// # Arguments
///
/// * request  : spectrum and key, the key is 
///              handed back in the result
/// * finder   : peak search backend
/// * fitter   : gaussian fit backend, used for 
///              the peaks and the gain
/// * settings : scan ranges and acceptance cuts
pub fn calibrate(request  : &CalibrationRequest,
                 finder   : &dyn FindPeaks,
                 fitter   : &dyn FitGaussian,
                 settings : &FitterSettings) -> Result<CalibrationResult, CalibrationError> {
  let bins   = request.bins()?;
  let hist   = Histogram1D::from_spectrum(&bins);
  let engine = SweepEngine::new(finder, fitter, settings.sweep);
  let peaks  = engine.run(&hist)?;
  info!("{} : kept {} peak sets", request.key, peaks.len());
  let synthesizer = GainSynthesizer::new(fitter,
                                         settings.distance_weighting,
                                         settings.legacy_gain_window);
  let (distances, gain) = synthesizer.synthesize(&peaks)?;
  info!("{} : {}", request.key, gain);
  Ok(CalibrationResult {
    key : request.key.clone(),
    peaks,
    distances,
    gain,
  })
}
