use thiserror::Error;

/// Errors originating from the core module.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Invalid configuration value or structure.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// A spectral frame has fewer bins than the extractor supports.
    #[error("Spectral frame too small: {bins} bins (need at least 2)")]
    FrameTooSmall {
        /// Number of byte magnitude bins in the frame.
        bins: usize,
    },

    /// Byte and float magnitude buffers disagree in length.
    #[error("Spectral frame length mismatch: {magnitudes} byte bins vs {float_magnitudes} float bins")]
    FrameLengthMismatch {
        /// Length of the byte magnitude buffer.
        magnitudes: usize,
        /// Length of the float magnitude buffer.
        float_magnitudes: usize,
    },
}
