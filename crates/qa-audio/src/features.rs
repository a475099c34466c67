use qa_core::frame::{AudioFeatures, SpectralFrame};

pub use qa_core::config::DEFAULT_HZ_SAMPLE_RATE;

/// Extract loudness, centroid, energy, pitch and HFC from one frame.
///
/// Pure and stateless: the same frame always yields the same features.
/// Sums are accumulated in `f64` and narrowed once at the end.
///
/// # Panics
/// Panics if the frame has fewer than 2 magnitude bins.
///
/// # Example
/// ```
/// use qa_audio::features::{extract_features, DEFAULT_HZ_SAMPLE_RATE};
/// use qa_core::frame::SpectralFrame;
///
/// let frame = SpectralFrame::new(vec![0; 2048], vec![-100.0; 2048], vec![0.0; 1024]);
/// let features = extract_features(&frame, DEFAULT_HZ_SAMPLE_RATE);
/// assert_eq!(features.loudness, 0.0);
/// assert_eq!(features.centroid, 0.0);
/// ```
#[must_use]
pub fn extract_features(frame: &SpectralFrame, sample_rate_hz: f32) -> AudioFeatures {
    let mags = &frame.magnitudes;
    let n = mags.len();
    assert!(n >= 2, "spectral frame needs at least 2 bins, got {n}");

    let bins = n as f64;
    let bin_hz = f64::from(sample_rate_hz) / bins;

    let mut magnitude_sum = 0.0f64;
    let mut weighted_sum = 0.0f64;
    let mut square_sum = 0.0f64;
    for (i, &m) in mags.iter().enumerate() {
        let m = f64::from(m);
        magnitude_sum += m;
        weighted_sum += m * i as f64;
        square_sum += m * m;
    }

    let centroid = if magnitude_sum > 0.0 {
        weighted_sum / magnitude_sum * bin_hz
    } else {
        0.0
    };

    // Bin 0 (DC) is never a pitch candidate; strict `>` keeps the first maximum.
    let mut max_value = 0u8;
    let mut max_index = 0usize;
    for (i, &m) in mags.iter().enumerate().take(n / 4).skip(1) {
        if m > max_value {
            max_value = m;
            max_index = i;
        }
    }

    let half = n / 2;
    let high_sum: f64 = mags[half..].iter().map(|&m| f64::from(m).powi(2)).sum();

    AudioFeatures {
        pitch: (max_index as f64 * bin_hz) as f32,
        loudness: (magnitude_sum / bins) as f32,
        centroid: centroid as f32,
        energy: (square_sum / bins) as f32,
        hfc: (high_sum / half as f64) as f32,
        spectrum: frame.float_magnitudes.clone(),
    }
}
