//! Aperiodic spectral fitting boundary
//!
//! Upstream feature extraction fits each power spectrum with an aperiodic
//! (1/f-like) component plus oscillatory peaks. The fitting algorithm is
//! pluggable through [`AperiodicFitter`]; [`fit_spectra`] runs a fitter over a
//! channels × frequencies × trials grid and keeps going when individual fits
//! fail.
//!
//! [`LogLinearFitter`] is a minimal fitter: a least-squares line through the
//! spectrum in log-log space, without peak detection.

use ndarray::{Array2, ArrayView1, ArrayView3, Axis};

use crate::error::DataShapeError;

/// One oscillatory peak above the aperiodic component.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpectralPeak {
    pub center: f64,
    pub power: f64,
    pub bandwidth: f64,
}

/// Result of fitting one spectrum.
#[derive(Debug, Clone, PartialEq)]
pub struct AperiodicFit {
    /// `log10` power at 1 Hz of the aperiodic component.
    pub offset: f64,
    /// Negated log-log slope of the aperiodic component.
    pub exponent: f64,
    pub peaks: Vec<SpectralPeak>,
}

impl AperiodicFit {
    /// Whether any peak is centered inside `[low, high]`.
    #[must_use]
    pub fn has_peak_in(&self, (low, high): (f64, f64)) -> bool {
        self.peaks.iter().any(|p| (low..=high).contains(&p.center))
    }
}

#[derive(Debug, Clone, PartialEq, derive_more::Display, derive_more::Error)]
#[display("spectral fit failed: {reason}")]
pub struct FitFailure {
    pub reason: String,
}

impl FitFailure {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// A spectral parameterization algorithm.
pub trait AperiodicFitter {
    /// Fits `power` sampled at `freqs`, using only frequencies inside `range`.
    fn fit(
        &self,
        freqs: &[f64],
        power: ArrayView1<'_, f64>,
        range: (f64, f64),
    ) -> Result<AperiodicFit, FitFailure>;
}

/// Least-squares line in log-log space.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogLinearFitter;

impl AperiodicFitter for LogLinearFitter {
    fn fit(
        &self,
        freqs: &[f64],
        power: ArrayView1<'_, f64>,
        (low, high): (f64, f64),
    ) -> Result<AperiodicFit, FitFailure> {
        let points = freqs
            .iter()
            .zip(power.iter())
            .filter(|&(&f, &p)| (low..=high).contains(&f) && f > 0.0 && p > 0.0)
            .map(|(f, p)| (f.log10(), p.log10()))
            .collect::<Vec<_>>();
        if points.len() < 2 {
            return Err(FitFailure::new("fewer than two positive points in range"));
        }

        #[expect(clippy::cast_precision_loss)]
        let n = points.len() as f64;
        let mean_x = points.iter().map(|p| p.0).sum::<f64>() / n;
        let mean_y = points.iter().map(|p| p.1).sum::<f64>() / n;
        let sxx = points.iter().map(|p| (p.0 - mean_x).powi(2)).sum::<f64>();
        let sxy = points
            .iter()
            .map(|p| (p.0 - mean_x) * (p.1 - mean_y))
            .sum::<f64>();
        if sxx <= f64::EPSILON {
            return Err(FitFailure::new("degenerate frequency range"));
        }
        let slope = sxy / sxx;
        let offset = mean_y - slope * mean_x;
        if !slope.is_finite() || !offset.is_finite() {
            return Err(FitFailure::new("non-finite fit"));
        }
        Ok(AperiodicFit {
            offset,
            exponent: -slope,
            peaks: vec![],
        })
    }
}

/// Fits of a channels × trials grid; `None` marks a failed fit.
#[derive(Debug, Clone, PartialEq)]
pub struct SpectralFits {
    fits: Array2<Option<AperiodicFit>>,
}

impl SpectralFits {
    #[must_use]
    pub fn get(&self, channel: usize, trial: usize) -> Option<&AperiodicFit> {
        self.fits.get((channel, trial))?.as_ref()
    }

    #[must_use]
    pub fn dim(&self) -> (usize, usize) {
        self.fits.dim()
    }

    #[must_use]
    pub fn failures(&self) -> usize {
        self.fits.iter().filter(|f| f.is_none()).count()
    }

    /// Aperiodic offsets, `NaN` for failed fits.
    #[must_use]
    pub fn offsets(&self) -> Array2<f64> {
        self.fits.map(|f| f.as_ref().map_or(f64::NAN, |f| f.offset))
    }

    /// Aperiodic exponents, `NaN` for failed fits.
    #[must_use]
    pub fn exponents(&self) -> Array2<f64> {
        self.fits.map(|f| f.as_ref().map_or(f64::NAN, |f| f.exponent))
    }

    /// Per channel × trial flag of a peak inside `band`; failed fits count as no peak.
    #[must_use]
    pub fn peaks_in(&self, band: (f64, f64)) -> Array2<bool> {
        self.fits
            .map(|f| f.as_ref().is_some_and(|f| f.has_peak_in(band)))
    }
}

/// Fits every spectrum of a channels × frequencies × trials array.
///
/// Failed fits are logged and recorded as `None`; they never abort the batch.
///
/// # Examples
///
/// ```
/// use mnemo_data::spectral::{LogLinearFitter, fit_spectra};
/// use ndarray::Array3;
///
/// let freqs = [2.0_f64, 4.0, 8.0, 16.0];
/// // 1 / f² spectra for 2 channels × 3 trials
/// let spectra = Array3::from_shape_fn((2, 4, 3), |(_, f, _)| freqs[f].powi(-2));
/// let fits = fit_spectra(&LogLinearFitter, &freqs, spectra.view(), (1.0, 20.0))?;
/// assert_eq!(fits.dim(), (2, 3));
/// assert!(fits.exponents().iter().all(|e| (e - 2.0).abs() < 1e-9));
/// # Ok::<(), mnemo_data::error::DataShapeError>(())
/// ```
pub fn fit_spectra<F>(
    fitter: &F,
    freqs: &[f64],
    spectra: ArrayView3<'_, f64>,
    range: (f64, f64),
) -> Result<SpectralFits, DataShapeError>
where
    F: AperiodicFitter + ?Sized,
{
    let (n_channels, n_freqs, n_trials) = spectra.dim();
    if n_freqs != freqs.len() {
        return Err(DataShapeError::FrequencyCountMismatch {
            freqs: freqs.len(),
            bins: n_freqs,
        });
    }

    let fits = Array2::from_shape_fn((n_channels, n_trials), |(channel, trial)| {
        let power = spectra
            .index_axis(Axis(0), channel)
            .index_axis_move(Axis(1), trial);
        match fitter.fit(freqs, power, range) {
            Ok(fit) => Some(fit),
            Err(err) => {
                tracing::warn!(channel, trial, %err, "skipping spectrum");
                None
            }
        }
    });
    let fits = SpectralFits { fits };
    if fits.failures() > 0 {
        tracing::info!(
            failures = fits.failures(),
            total = n_channels * n_trials,
            "spectral fitting finished with failures"
        );
    }
    Ok(fits)
}

#[cfg(test)]
mod tests {
    use ndarray::Array3;

    use super::*;

    /// Fails when the first power bin is below `fail_below`, reports a theta peak otherwise.
    struct ScriptedFitter {
        fail_below: f64,
    }

    impl AperiodicFitter for ScriptedFitter {
        fn fit(
            &self,
            _freqs: &[f64],
            power: ArrayView1<'_, f64>,
            _range: (f64, f64),
        ) -> Result<AperiodicFit, FitFailure> {
            if power[0] < self.fail_below {
                return Err(FitFailure::new("scripted"));
            }
            Ok(AperiodicFit {
                offset: power[0],
                exponent: 1.0,
                peaks: vec![SpectralPeak {
                    center: 6.0,
                    power: 0.5,
                    bandwidth: 2.0,
                }],
            })
        }
    }

    #[test]
    fn test_failures_recorded_not_fatal() {
        let freqs = [1.0, 2.0];
        // power[0] encodes channel * 10 + trial
        let spectra = Array3::from_shape_fn((2, 2, 3), |(c, _, t)| f64::from(u8::try_from(c * 10 + t).unwrap()));
        let fits = fit_spectra(
            &ScriptedFitter { fail_below: 2.0 },
            &freqs,
            spectra.view(),
            (1.0, 2.0),
        )
        .unwrap();
        assert_eq!(fits.failures(), 2);
        assert!(fits.get(0, 0).is_none());
        assert!(fits.offsets()[[0, 1]].is_nan());
        assert_eq!(fits.offsets()[[1, 2]], 12.0);
        let theta = fits.peaks_in((4.0, 8.0));
        assert!(!theta[[0, 0]]);
        assert!(theta[[0, 2]]);
    }

    #[test]
    fn test_frequency_axis_must_match() {
        let spectra = Array3::<f64>::zeros((1, 3, 1));
        assert!(matches!(
            fit_spectra(&LogLinearFitter, &[1.0, 2.0], spectra.view(), (1.0, 2.0)),
            Err(DataShapeError::FrequencyCountMismatch { freqs: 2, bins: 3 })
        ));
    }

    #[test]
    fn test_log_linear_rejects_flat_range() {
        let power = ndarray::arr1(&[1.0, 1.0]);
        assert!(
            LogLinearFitter
                .fit(&[3.0, 4.0], power.view(), (10.0, 20.0))
                .is_err()
        );
    }
}
