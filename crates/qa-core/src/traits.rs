use anyhow::Result;

use crate::frame::{AudioFeatures, SpectralFrame};

/// Produces one [`SpectralFrame`] per tick.
///
/// Implemented by: `CaptureSession` (live microphone), scripted sources in tests.
/// Not `Send`: a live source owns a device stream that stays on the thread
/// that opened it.
///
/// # Example
/// ```
/// use qa_core::traits::FrameSource;
/// use qa_core::frame::SpectralFrame;
///
/// struct Silence;
/// impl FrameSource for Silence {
///     fn next_frame(&mut self) -> anyhow::Result<SpectralFrame> {
///         Ok(SpectralFrame::new(vec![0; 8], vec![-100.0; 8], vec![0.0; 4]))
///     }
/// }
/// ```
pub trait FrameSource {
    /// Snapshot the analysers for the current tick.
    ///
    /// An error skips this tick only. The next tick calls again.
    fn next_frame(&mut self) -> Result<SpectralFrame>;

    /// Device sample rate, for sources backed by one.
    fn sample_rate(&self) -> Option<u32> {
        None
    }
}

/// Consumes the features of each tick (display, logging, export).
///
/// # Example
/// ```
/// use qa_core::traits::FeatureSink;
/// use qa_core::frame::AudioFeatures;
///
/// struct Discard;
/// impl FeatureSink for Discard {
///     fn present(&mut self, _features: &AudioFeatures) -> anyhow::Result<()> { Ok(()) }
/// }
/// ```
pub trait FeatureSink: Send {
    /// Hand over one tick's features. Must not block for longer than a tick.
    fn present(&mut self, features: &AudioFeatures) -> Result<()>;
}

impl<T: FeatureSink + ?Sized> FeatureSink for Box<T> {
    fn present(&mut self, features: &AudioFeatures) -> Result<()> {
        (**self).present(features)
    }
}
