use serde::Serialize;

use crate::frame::AudioFeatures;

/// Energy above which the analyser reports an "excited" state.
pub const EXCITED_ENERGY: f32 = 500.0;

/// Visual state derived from one tick's features.
///
/// # Example
/// ```
/// use qa_core::frame::AudioFeatures;
/// use qa_core::quantum::QuantumState;
///
/// let f = AudioFeatures { loudness: 50.0, pitch: 180.0, ..AudioFeatures::default() };
/// let q = QuantumState::from_features(&f);
/// assert!((q.amplitude - 0.5).abs() < 1e-6);
/// assert!((q.phase - 0.5).abs() < 1e-6);
/// assert!((q.probability - 0.25).abs() < 1e-6);
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct QuantumState {
    /// `loudness / 100`.
    pub amplitude: f32,
    /// `pitch / 360`.
    pub phase: f32,
    /// `amplitude²`.
    pub probability: f32,
}

impl QuantumState {
    #[must_use]
    pub fn from_features(features: &AudioFeatures) -> Self {
        let amplitude = features.loudness / 100.0;
        Self {
            amplitude,
            phase: features.pitch / 360.0,
            probability: amplitude * amplitude,
        }
    }
}

/// `true` when spectral energy exceeds [`EXCITED_ENERGY`].
#[inline]
#[must_use]
pub fn is_excited(features: &AudioFeatures) -> bool {
    features.energy > EXCITED_ENERGY
}

/// HFC shown as a percentage, `min(100, round(hfc * 10))`.
///
/// # Example
/// ```
/// use qa_core::frame::AudioFeatures;
/// use qa_core::quantum::coherence_percent;
///
/// let f = AudioFeatures { hfc: 4.26, ..AudioFeatures::default() };
/// assert_eq!(coherence_percent(&f), 43);
/// ```
#[must_use]
pub fn coherence_percent(features: &AudioFeatures) -> u8 {
    (features.hfc * 10.0).round().clamp(0.0, 100.0) as u8
}
