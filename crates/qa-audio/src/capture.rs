use anyhow::Result;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SampleFormat, SizedSample};
use rtrb::{Consumer, Producer, RingBuffer};

use crate::error::AudioError;

/// Microphone capture via cpal.
///
/// Writes mono f32 samples into a lock-free ring buffer. Dropping the
/// capture stops the stream and releases the device.
///
/// # Example
/// ```no_run
/// use qa_audio::capture::AudioCapture;
/// let capture = AudioCapture::start(None).unwrap();
/// ```
pub struct AudioCapture {
    /// Kept alive for the lifetime of the capture.
    _stream: cpal::Stream,
    consumer: Consumer<f32>,
    sample_rate: u32,
}

impl AudioCapture {
    /// Start capturing from the named input device, or the host default when `None`.
    ///
    /// # Errors
    /// Returns an error if the device is missing, refuses access, or uses an
    /// unsupported sample format.
    pub fn start(device_name: Option<&str>) -> Result<Self> {
        let host = cpal::default_host();
        let device = match device_name {
            None => host.default_input_device().ok_or(AudioError::NoInputDevice)?,
            Some(name) => host
                .input_devices()
                .map_err(|e| AudioError::Stream(e.to_string()))?
                .find(|d| d.name().is_ok_and(|n| n == name))
                .ok_or_else(|| AudioError::DeviceNotFound(name.to_string()))?,
        };

        let supported = device
            .default_input_config()
            .map_err(|e| AudioError::Stream(format!("cannot query input config: {e}")))?;
        let sample_format = supported.sample_format();
        let config: cpal::StreamConfig = supported.into();
        let sample_rate = config.sample_rate.0;
        let channels = usize::from(config.channels.max(1));

        log::info!(
            "Input device: {} ({sample_format:?} @ {sample_rate}Hz, {channels} ch)",
            device.name().unwrap_or_else(|_| "unknown".into())
        );

        // Ring buffer: 2 seconds of audio @ sample_rate
        let (producer, consumer) = RingBuffer::new(sample_rate as usize * 2);

        let stream = match sample_format {
            SampleFormat::F32 => build_stream::<f32>(&device, &config, producer, channels),
            SampleFormat::I16 => build_stream::<i16>(&device, &config, producer, channels),
            SampleFormat::U16 => build_stream::<u16>(&device, &config, producer, channels),
            SampleFormat::I32 => build_stream::<i32>(&device, &config, producer, channels),
            other => return Err(AudioError::UnsupportedFormat(format!("{other:?}")).into()),
        }?;

        stream
            .play()
            .map_err(|e| AudioError::Stream(format!("cannot start capture: {e}")))?;

        Ok(Self {
            _stream: stream,
            consumer,
            sample_rate,
        })
    }

    /// Read available samples from the ring buffer into `out`.
    ///
    /// Returns how many samples were read.
    pub fn read_samples(&mut self, out: &mut Vec<f32>) -> usize {
        let available = self.consumer.slots();
        out.clear();
        out.reserve(available);
        while let Ok(sample) = self.consumer.pop() {
            out.push(sample);
        }
        out.len()
    }

    /// The sample rate of the capture stream.
    #[must_use]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

/// Build an input stream that downmixes `T` frames to mono f32.
fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut producer: Producer<f32>,
    channels: usize,
) -> Result<cpal::Stream>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    let stream = device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                for chunk in data.chunks(channels) {
                    let mono = chunk.iter().map(|&s| f32::from_sample(s)).sum::<f32>()
                        / chunk.len() as f32;
                    // Full buffer: the reader fell behind, drop the sample.
                    let _ = producer.push(mono);
                }
            },
            |err| {
                log::error!("Audio stream error: {err}");
            },
            None,
        )
        .map_err(|e| {
            AudioError::Stream(format!(
                "cannot open input stream (permission denied or device busy?): {e}"
            ))
        })?;
    Ok(stream)
}

/// Names of every input device the default host exposes.
///
/// # Errors
/// Returns an error if the host cannot enumerate devices.
pub fn list_input_devices() -> Result<Vec<String>> {
    let host = cpal::default_host();
    let names = host
        .input_devices()
        .map_err(|e| AudioError::Stream(e.to_string()))?
        .map(|d| d.name().unwrap_or_else(|_| "unknown".into()))
        .collect();
    Ok(names)
}
