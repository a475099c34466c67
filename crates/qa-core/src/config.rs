use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Sampling rate used for bin → Hz conversion in the feature arithmetic.
///
/// Half the 44100 Hz capture rate of a typical input device. Kept as the
/// default so reported Hz values match the reference readout.
pub const DEFAULT_HZ_SAMPLE_RATE: f32 = 22050.0;

/// Smallest analyser window accepted.
pub const MIN_FFT_SIZE: usize = 32;
/// Largest analyser window accepted.
pub const MAX_FFT_SIZE: usize = 32768;

/// Complete session configuration, hot-reloadable.
///
/// Serialisable to TOML. Every field has a sane default.
///
/// # Example
/// ```
/// use qa_core::config::SessionConfig;
/// let config = SessionConfig::default();
/// assert_eq!(config.analysis.fft_size, 4096);
/// assert_eq!(config.session.target_fps, 60);
/// ```
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct SessionConfig {
    pub analysis: AnalysisConfig,
    pub session: CaptureConfig,
    pub output: OutputConfig,
}

/// Analyser and feature-extraction parameters.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct AnalysisConfig {
    /// Window of the frequency analyser. N = fft_size / 2.
    pub fft_size: usize,
    /// Window of the waveform analyser. M = waveform_fft_size / 2.
    pub waveform_fft_size: usize,
    /// Temporal smoothing τ in [0, 1]. 0 = no smoothing.
    pub smoothing_time_constant: f32,
    /// dB value mapped to byte 0.
    pub min_decibels: f32,
    /// dB value mapped to byte 255.
    pub max_decibels: f32,
    /// Rate used to convert bin indices to Hz.
    pub sample_rate_hz: f32,
}

/// Capture device and tick cadence.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct CaptureConfig {
    /// Ticks per second.
    pub target_fps: u32,
    /// Input device name. "default" = host default input.
    pub device: String,
}

/// Output sink settings.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct OutputConfig {
    pub format: OutputFormat,
    /// Present every n-th tick only (>= 1).
    pub every_n_ticks: u32,
    /// Include the dB spectrum in JSON output.
    pub include_spectrum: bool,
}

/// Output format of the feature sink.
///
/// # Example
/// ```
/// use qa_core::config::OutputFormat;
/// assert_eq!("json".parse::<OutputFormat>().ok(), Some(OutputFormat::Json));
/// ```
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable line per tick.
    #[default]
    Text,
    /// One JSON object per tick.
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = crate::error::CoreError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(crate::error::CoreError::Config(format!(
                "unknown output format '{other}' (expected text or json)"
            ))),
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            fft_size: 4096,
            waveform_fft_size: 2048,
            smoothing_time_constant: 0.8,
            min_decibels: -100.0,
            max_decibels: -30.0,
            sample_rate_hz: DEFAULT_HZ_SAMPLE_RATE,
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            target_fps: 60,
            device: "default".into(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::Text,
            every_n_ticks: 1,
            include_spectrum: false,
        }
    }
}

impl SessionConfig {
    /// Clamp all numeric fields to their valid ranges.
    /// Called after TOML deserialization to prevent out-of-range values.
    pub fn clamp_all(&mut self) {
        let defaults = AnalysisConfig::default();
        let a = &mut self.analysis;

        a.fft_size = clamp_fft_size(a.fft_size);
        a.waveform_fft_size = clamp_fft_size(a.waveform_fft_size);

        a.smoothing_time_constant = if a.smoothing_time_constant.is_finite() {
            a.smoothing_time_constant.clamp(0.0, 1.0)
        } else {
            defaults.smoothing_time_constant
        };

        if !(a.min_decibels.is_finite()
            && a.max_decibels.is_finite()
            && a.min_decibels < a.max_decibels)
        {
            log::warn!(
                "Invalid decibel range [{}, {}], using [{}, {}]",
                a.min_decibels,
                a.max_decibels,
                defaults.min_decibels,
                defaults.max_decibels
            );
            a.min_decibels = defaults.min_decibels;
            a.max_decibels = defaults.max_decibels;
        }

        if !(a.sample_rate_hz.is_finite() && a.sample_rate_hz > 0.0) {
            log::warn!(
                "Invalid sample_rate_hz {}, using {DEFAULT_HZ_SAMPLE_RATE}",
                a.sample_rate_hz
            );
            a.sample_rate_hz = DEFAULT_HZ_SAMPLE_RATE;
        }

        self.session.target_fps = self.session.target_fps.clamp(1, 240);
        self.output.every_n_ticks = self.output.every_n_ticks.max(1);
    }

    /// `None` when the host default input device should be used.
    #[must_use]
    pub fn device_name(&self) -> Option<&str> {
        match self.session.device.as_str() {
            "" | "default" => None,
            name => Some(name),
        }
    }
}

/// Round to the next power of two inside [`MIN_FFT_SIZE`, `MAX_FFT_SIZE`].
fn clamp_fft_size(size: usize) -> usize {
    size.clamp(MIN_FFT_SIZE, MAX_FFT_SIZE).next_power_of_two()
}

/// Intermediate TOML structure, every section optional.
#[derive(Deserialize)]
struct ConfigFile {
    analysis: Option<AnalysisSection>,
    session: Option<SessionSection>,
    output: Option<OutputSection>,
}

/// Analysis section of the TOML config, all fields optional for partial override.
#[derive(Deserialize)]
struct AnalysisSection {
    fft_size: Option<usize>,
    waveform_fft_size: Option<usize>,
    smoothing_time_constant: Option<f32>,
    min_decibels: Option<f32>,
    max_decibels: Option<f32>,
    sample_rate_hz: Option<f32>,
}

#[derive(Deserialize)]
struct SessionSection {
    target_fps: Option<u32>,
    device: Option<String>,
}

#[derive(Deserialize)]
struct OutputSection {
    format: Option<OutputFormat>,
    every_n_ticks: Option<u32>,
    include_spectrum: Option<bool>,
}

/// Load a TOML file and merge it over the defaults.
///
/// # Errors
/// Returns an error if the file cannot be read or parsed.
///
/// # Example
/// ```no_run
/// use qa_core::config::load_config;
/// use std::path::Path;
/// let config = load_config(Path::new("config/default.toml")).unwrap();
/// ```
pub fn load_config(path: &Path) -> Result<SessionConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Cannot read {}", path.display()))?;

    parse_config(&content).with_context(|| format!("TOML parse error in {}", path.display()))
}

/// Parse TOML text and merge it over the defaults.
///
/// # Errors
/// Returns an error if the text is not valid TOML for this schema.
///
/// # Example
/// ```
/// use qa_core::config::{parse_config, OutputFormat};
/// let config = parse_config("[output]\nformat = \"json\"\n").unwrap();
/// assert_eq!(config.output.format, OutputFormat::Json);
/// assert_eq!(config.analysis.fft_size, 4096);
/// ```
pub fn parse_config(content: &str) -> Result<SessionConfig> {
    let file: ConfigFile = toml::from_str(content)?;
    let mut config = SessionConfig::default();

    if let Some(a) = file.analysis {
        if let Some(v) = a.fft_size {
            config.analysis.fft_size = v;
        }
        if let Some(v) = a.waveform_fft_size {
            config.analysis.waveform_fft_size = v;
        }
        if let Some(v) = a.smoothing_time_constant {
            config.analysis.smoothing_time_constant = v;
        }
        if let Some(v) = a.min_decibels {
            config.analysis.min_decibels = v;
        }
        if let Some(v) = a.max_decibels {
            config.analysis.max_decibels = v;
        }
        if let Some(v) = a.sample_rate_hz {
            config.analysis.sample_rate_hz = v;
        }
    }

    if let Some(s) = file.session {
        if let Some(v) = s.target_fps {
            config.session.target_fps = v;
        }
        if let Some(v) = s.device {
            config.session.device = v;
        }
    }

    if let Some(o) = file.output {
        if let Some(v) = o.format {
            config.output.format = v;
        }
        if let Some(v) = o.every_n_ticks {
            config.output.every_n_ticks = v;
        }
        if let Some(v) = o.include_spectrum {
            config.output.include_spectrum = v;
        }
    }

    config.clamp_all();
    Ok(config)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config, SessionConfig::default());
    }

    #[test]
    fn partial_override_keeps_other_keys() {
        let config = parse_config(
            "[analysis]\nsample_rate_hz = 44100.0\n\n[session]\ntarget_fps = 30\n",
        )
        .unwrap();
        assert!((config.analysis.sample_rate_hz - 44100.0).abs() < f32::EPSILON);
        assert_eq!(config.session.target_fps, 30);
        assert_eq!(config.analysis.fft_size, 4096);
        assert_eq!(config.output, OutputConfig::default());
    }

    #[test]
    fn out_of_range_values_are_clamped() {
        let config = parse_config(
            "[analysis]\nfft_size = 3000\nwaveform_fft_size = 8\nsmoothing_time_constant = 4.0\n\
             min_decibels = -10.0\nmax_decibels = -20.0\nsample_rate_hz = -1.0\n\n\
             [session]\ntarget_fps = 0\n\n[output]\nevery_n_ticks = 0\n",
        )
        .unwrap();
        assert_eq!(config.analysis.fft_size, 4096);
        assert_eq!(config.analysis.waveform_fft_size, MIN_FFT_SIZE);
        assert!((config.analysis.smoothing_time_constant - 1.0).abs() < f32::EPSILON);
        assert!((config.analysis.min_decibels + 100.0).abs() < f32::EPSILON);
        assert!((config.analysis.max_decibels + 30.0).abs() < f32::EPSILON);
        assert!((config.analysis.sample_rate_hz - DEFAULT_HZ_SAMPLE_RATE).abs() < f32::EPSILON);
        assert_eq!(config.session.target_fps, 1);
        assert_eq!(config.output.every_n_ticks, 1);
    }

    #[test]
    fn invalid_toml_is_an_error() {
        assert!(parse_config("[analysis\nfft_size = ").is_err());
        assert!(parse_config("[output]\nformat = \"svg\"\n").is_err());
    }

    #[test]
    fn load_config_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[output]\nformat = \"json\"\ninclude_spectrum = true").unwrap();
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.output.format, OutputFormat::Json);
        assert!(config.output.include_spectrum);
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(load_config(Path::new("/nonexistent/quanta.toml")).is_err());
    }

    #[test]
    fn default_device_maps_to_none() {
        let mut config = SessionConfig::default();
        assert_eq!(config.device_name(), None);
        config.session.device = "USB Mic".into();
        assert_eq!(config.device_name(), Some("USB Mic"));
    }
}
