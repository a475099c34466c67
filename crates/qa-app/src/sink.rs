use std::io::Write;
use std::sync::Arc;

use anyhow::Result;
use arc_swap::ArcSwap;
use qa_core::config::{OutputFormat, SessionConfig};
use qa_core::frame::AudioFeatures;
use qa_core::quantum::{self, QuantumState};
use qa_core::traits::FeatureSink;
use serde::Serialize;

/// Build the sink selected by `[output].format`.
pub fn make_sink<W>(config: &Arc<ArcSwap<SessionConfig>>, out: W) -> Box<dyn FeatureSink>
where
    W: Write + Send + 'static,
{
    match config.load().output.format {
        OutputFormat::Text => Box::new(TextSink::new(out)),
        OutputFormat::Json => Box::new(JsonSink::new(out, Arc::clone(config))),
    }
}

/// One readable line per tick.
pub struct TextSink<W> {
    out: W,
}

impl<W: Write> TextSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }
}

impl<W: Write + Send> FeatureSink for TextSink<W> {
    fn present(&mut self, features: &AudioFeatures) -> Result<()> {
        writeln!(self.out, "{}", format_line(features))?;
        self.out.flush()?;
        Ok(())
    }
}

/// Feature panel as a single line.
#[must_use]
pub fn format_line(f: &AudioFeatures) -> String {
    let state = if quantum::is_excited(f) {
        "excited"
    } else {
        "ground"
    };
    format!(
        "Pitch: {:.1} Hz | Loudness: {:.1} dB | Centroid: {:.1} Hz | Energy: {:.3} | HFC: {:.1} | state: {state} | coherence: {}%",
        f.pitch,
        f.loudness,
        f.centroid,
        f.energy,
        f.hfc,
        quantum::coherence_percent(f),
    )
}

/// One JSON object per tick.
///
/// Reads `[output].include_spectrum` on every tick so hot reload applies.
pub struct JsonSink<W> {
    out: W,
    config: Arc<ArcSwap<SessionConfig>>,
    seq: u64,
}

#[derive(Serialize)]
struct Record<'a> {
    seq: u64,
    pitch: f32,
    loudness: f32,
    centroid: f32,
    energy: f32,
    hfc: f32,
    excited: bool,
    coherence: u8,
    quantum: QuantumState,
    #[serde(skip_serializing_if = "Option::is_none")]
    spectrum: Option<&'a [f32]>,
}

impl<W: Write> JsonSink<W> {
    pub fn new(out: W, config: Arc<ArcSwap<SessionConfig>>) -> Self {
        Self {
            out,
            config,
            seq: 0,
        }
    }
}

impl<W: Write + Send> FeatureSink for JsonSink<W> {
    fn present(&mut self, f: &AudioFeatures) -> Result<()> {
        let include_spectrum = self.config.load().output.include_spectrum;
        let record = Record {
            seq: self.seq,
            pitch: f.pitch,
            loudness: f.loudness,
            centroid: f.centroid,
            energy: f.energy,
            hfc: f.hfc,
            excited: quantum::is_excited(f),
            coherence: quantum::coherence_percent(f),
            quantum: QuantumState::from_features(f),
            spectrum: include_spectrum.then_some(f.spectrum.as_slice()),
        };
        serde_json::to_writer(&mut self.out, &record)?;
        writeln!(self.out)?;
        self.out.flush()?;
        self.seq += 1;
        Ok(())
    }
}
