use serde::Serialize;

use crate::error::CoreError;

/// One tick's worth of analyser output.
///
/// Produced fresh every tick by the capture session, handed to the feature
/// extractor, then dropped. Nothing keeps a frame across ticks.
///
/// # Example
/// ```
/// use qa_core::frame::SpectralFrame;
/// let frame = SpectralFrame::new(vec![0; 8], vec![-100.0; 8], vec![0.0; 4]);
/// assert_eq!(frame.bin_count(), 8);
/// assert!(frame.check_lengths().is_ok());
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SpectralFrame {
    /// Byte-quantised magnitudes, one per frequency bin (0–255).
    pub magnitudes: Vec<u8>,
    /// Per-bin magnitude in decibels, kept for spectrum plotting.
    pub float_magnitudes: Vec<f32>,
    /// Time-domain samples in [-1, 1].
    pub waveform: Vec<f32>,
}

impl SpectralFrame {
    /// Build a frame from already-captured buffers.
    #[must_use]
    pub fn new(magnitudes: Vec<u8>, float_magnitudes: Vec<f32>, waveform: Vec<f32>) -> Self {
        Self {
            magnitudes,
            float_magnitudes,
            waveform,
        }
    }

    /// Number of frequency bins (N).
    #[inline]
    #[must_use]
    pub fn bin_count(&self) -> usize {
        self.magnitudes.len()
    }

    /// Verify the length invariants the extractor relies on.
    ///
    /// # Errors
    /// Returns [`CoreError::FrameTooSmall`] when N < 2 and
    /// [`CoreError::FrameLengthMismatch`] when the byte and float buffers differ.
    ///
    /// # Example
    /// ```
    /// use qa_core::frame::SpectralFrame;
    /// let frame = SpectralFrame::new(vec![0; 1], vec![0.0; 1], vec![]);
    /// assert!(frame.check_lengths().is_err());
    /// ```
    pub fn check_lengths(&self) -> Result<(), CoreError> {
        let bins = self.magnitudes.len();
        if bins < 2 {
            return Err(CoreError::FrameTooSmall { bins });
        }
        if self.float_magnitudes.len() != bins {
            return Err(CoreError::FrameLengthMismatch {
                magnitudes: bins,
                float_magnitudes: self.float_magnitudes.len(),
            });
        }
        Ok(())
    }
}

/// Features extracted from a single [`SpectralFrame`].
///
/// A pure function of its input frame. Written by the session thread, read by
/// whoever holds the output side of the triple buffer and by the sink.
///
/// # Example
/// ```
/// use qa_core::frame::AudioFeatures;
/// let f = AudioFeatures::default();
/// assert_eq!(f.loudness, 0.0);
/// assert!(f.spectrum.is_empty());
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct AudioFeatures {
    /// Dominant frequency estimate in Hz, taken from the lower quarter of the spectrum.
    pub pitch: f32,
    /// Mean byte magnitude (0–255 scale, shown as "dB" by the text sink).
    pub loudness: f32,
    /// Magnitude-weighted mean bin, converted to Hz.
    pub centroid: f32,
    /// Mean squared magnitude.
    pub energy: f32,
    /// Mean squared magnitude over the upper half of the spectrum.
    pub hfc: f32,
    /// Decibel spectrum of the source frame, unchanged.
    pub spectrum: Vec<f32>,
}

impl AudioFeatures {
    /// `true` when every scalar is finite and non-negative.
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        [self.pitch, self.loudness, self.centroid, self.energy, self.hfc]
            .iter()
            .all(|v| v.is_finite() && *v >= 0.0)
    }
}
