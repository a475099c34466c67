use std::sync::Arc;

use qa_core::config::{AnalysisConfig, MAX_FFT_SIZE, MIN_FFT_SIZE};
use qa_core::frame::SpectralFrame;
use realfft::num_complex::Complex;
use realfft::{RealFftPlanner, RealToComplex};

/// Blackman window coefficients (α = 0.16).
const BLACKMAN_A0: f32 = 0.42;
const BLACKMAN_A1: f32 = 0.5;
const BLACKMAN_A2: f32 = 0.08;

/// Ring of the most recent samples, read back oldest first.
///
/// Backs the analyser's FFT input and, on its own, the waveform readout.
pub struct SampleWindow {
    samples: Vec<f32>,
    write_pos: usize,
}

impl SampleWindow {
    /// Zero-filled window of `len` samples.
    ///
    /// # Panics
    /// Panics if `len` is zero.
    #[must_use]
    pub fn new(len: usize) -> Self {
        assert!(len > 0, "sample window must hold at least one sample");
        Self {
            samples: vec![0.0; len],
            write_pos: 0,
        }
    }

    /// Waveform window sized from `[analysis].waveform_fft_size`.
    #[must_use]
    pub fn waveform(config: &AnalysisConfig) -> Self {
        Self::new(config.waveform_fft_size)
    }

    /// Append samples. Only the last `len()` of them survive.
    pub fn push(&mut self, samples: &[f32]) {
        let len = self.samples.len();
        for &s in &samples[samples.len().saturating_sub(len)..] {
            self.samples[self.write_pos] = s;
            self.write_pos = (self.write_pos + 1) % len;
        }
    }

    /// Samples oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &f32> {
        let (newer, older) = self.samples.split_at(self.write_pos);
        older.iter().chain(newer)
    }

    /// Copy `min(out.len(), len())` samples, oldest first, into `out`.
    pub fn copy_to(&self, out: &mut [f32]) {
        for (o, &s) in out.iter_mut().zip(self.iter()) {
            *o = s;
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Samples per waveform snapshot: half the window.
    #[must_use]
    pub fn snapshot_len(&self) -> usize {
        self.samples.len() / 2
    }
}

/// Frequency analyser: rolling sample window, Blackman-windowed real FFT,
/// temporal smoothing, and decibel / byte readouts.
///
/// Pre-allocates the FFT plan and every buffer; `update` and the readouts
/// never allocate.
///
/// # Example
/// ```
/// use qa_audio::analyser::Analyser;
/// let analyser = Analyser::new(4096, 0.8, -100.0, -30.0);
/// assert_eq!(analyser.bin_count(), 2048);
/// ```
pub struct Analyser {
    fft_size: usize,
    smoothing: f32,
    min_decibels: f32,
    max_decibels: f32,
    history: SampleWindow,
    input_buf: Vec<f32>,
    spectrum_buf: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
    plan: Arc<dyn RealToComplex<f32>>,
    window: Vec<f32>,
    /// Smoothed linear magnitude per bin.
    smoothed: Vec<f32>,
}

impl Analyser {
    /// Create an analyser with the given window size.
    ///
    /// # Panics
    /// Panics if `fft_size` is not a power of two in [32, 32768].
    #[must_use]
    pub fn new(fft_size: usize, smoothing: f32, min_decibels: f32, max_decibels: f32) -> Self {
        assert!(
            fft_size.is_power_of_two() && (MIN_FFT_SIZE..=MAX_FFT_SIZE).contains(&fft_size),
            "FFT size must be a power of two in [{MIN_FFT_SIZE}, {MAX_FFT_SIZE}], got {fft_size}"
        );
        debug_assert!(min_decibels < max_decibels);

        let mut planner = RealFftPlanner::<f32>::new();
        let plan = planner.plan_fft_forward(fft_size);

        let input_buf = plan.make_input_vec();
        let spectrum_buf = plan.make_output_vec();
        let scratch = plan.make_scratch_vec();

        let window: Vec<f32> = (0..fft_size)
            .map(|i| {
                let x = 2.0 * std::f32::consts::PI * i as f32 / fft_size as f32;
                BLACKMAN_A0 - BLACKMAN_A1 * x.cos() + BLACKMAN_A2 * (2.0 * x).cos()
            })
            .collect();

        Self {
            fft_size,
            smoothing: smoothing.clamp(0.0, 1.0),
            min_decibels,
            max_decibels,
            history: SampleWindow::new(fft_size),
            input_buf,
            spectrum_buf,
            scratch,
            plan,
            window,
            smoothed: vec![0.0; fft_size / 2],
        }
    }

    /// Frequency analyser configured from the `[analysis]` section.
    #[must_use]
    pub fn frequency(config: &AnalysisConfig) -> Self {
        Self::new(
            config.fft_size,
            config.smoothing_time_constant,
            config.min_decibels,
            config.max_decibels,
        )
    }

    /// Append mono samples to the rolling window.
    pub fn push_samples(&mut self, samples: &[f32]) {
        self.history.push(samples);
    }

    /// Compute one spectrum from the current window and fold it into the
    /// smoothed magnitudes.
    pub fn update(&mut self) {
        for ((slot, &s), &w) in self
            .input_buf
            .iter_mut()
            .zip(self.history.iter())
            .zip(&self.window)
        {
            *slot = s * w;
        }

        if self
            .plan
            .process_with_scratch(&mut self.input_buf, &mut self.spectrum_buf, &mut self.scratch)
            .is_err()
        {
            log::warn!("FFT failed for window of {} samples", self.fft_size);
            return;
        }

        let norm = self.fft_size as f32;
        let tau = self.smoothing;
        for (s, c) in self.smoothed.iter_mut().zip(&self.spectrum_buf) {
            let magnitude = c.norm() / norm;
            let next = tau * *s + (1.0 - tau) * magnitude;
            *s = if next.is_finite() { next } else { 0.0 };
        }
    }

    /// Per-bin magnitude in decibels.
    ///
    /// Silent bins read the decibel value of `f32::MIN_POSITIVE` (about -758 dB)
    /// rather than negative infinity.
    pub fn float_frequency_data(&self, out: &mut [f32]) {
        for (o, &s) in out.iter_mut().zip(&self.smoothed) {
            *o = to_decibels(s);
        }
    }

    /// Per-bin magnitude mapped linearly from [min_dB, max_dB] onto [0, 255].
    pub fn byte_frequency_data(&self, out: &mut [u8]) {
        let scale = 255.0 / (self.max_decibels - self.min_decibels);
        for (o, &s) in out.iter_mut().zip(&self.smoothed) {
            let scaled = (scale * (to_decibels(s) - self.min_decibels)).floor();
            *o = scaled.clamp(0.0, 255.0) as u8;
        }
    }

    /// Copy the window, oldest sample first, into `out`.
    ///
    /// Copies `min(out.len(), fft_size)` samples; anything past that is left untouched.
    pub fn float_time_domain_data(&self, out: &mut [f32]) {
        self.history.copy_to(out);
    }

    /// Number of frequency bins (fft_size / 2).
    #[must_use]
    pub fn bin_count(&self) -> usize {
        self.fft_size / 2
    }

    /// Analysis window size.
    #[must_use]
    pub fn fft_size(&self) -> usize {
        self.fft_size
    }
}

#[inline]
fn to_decibels(magnitude: f32) -> f32 {
    20.0 * magnitude.max(f32::MIN_POSITIVE).log10()
}

/// Snapshot the analyser and the waveform window into a fresh frame.
///
/// Runs one spectrum update on `frequency` and copies the oldest
/// `waveform.snapshot_len()` samples of `waveform`.
///
/// # Example
/// ```
/// use qa_audio::analyser::{Analyser, SampleWindow, snapshot_frame};
/// let mut freq = Analyser::new(64, 0.0, -100.0, -30.0);
/// let wave = SampleWindow::new(32);
/// let frame = snapshot_frame(&mut freq, &wave);
/// assert_eq!(frame.magnitudes.len(), 32);
/// assert_eq!(frame.waveform.len(), 16);
/// ```
#[must_use]
pub fn snapshot_frame(frequency: &mut Analyser, waveform: &SampleWindow) -> SpectralFrame {
    frequency.update();

    let bins = frequency.bin_count();
    let mut magnitudes = vec![0u8; bins];
    let mut float_magnitudes = vec![0.0f32; bins];
    let mut samples = vec![0.0f32; waveform.snapshot_len()];

    frequency.byte_frequency_data(&mut magnitudes);
    frequency.float_frequency_data(&mut float_magnitudes);
    waveform.copy_to(&mut samples);

    SpectralFrame::new(magnitudes, float_magnitudes, samples)
}
