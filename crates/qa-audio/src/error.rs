use thiserror::Error;

/// Errors originating from the audio module.
#[derive(Error, Debug)]
pub enum AudioError {
    /// The host reports no default input device.
    #[error("No audio input device found")]
    NoInputDevice,

    /// No input device matches the requested name.
    #[error("Audio input device not found: {0}")]
    DeviceNotFound(String),

    /// Unsupported sample format.
    #[error("Unsupported audio format: {0}")]
    UnsupportedFormat(String),

    /// The device refused to open or start a stream.
    #[error("Audio stream error: {0}")]
    Stream(String),
}
