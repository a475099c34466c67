use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;
use arc_swap::ArcSwap;
use flume::RecvTimeoutError;
use qa_core::config::{AnalysisConfig, SessionConfig};
use qa_core::frame::{AudioFeatures, SpectralFrame};
use qa_core::traits::{FeatureSink, FrameSource};
use triple_buffer::TripleBuffer;

use crate::analyser::{self, Analyser, SampleWindow};
use crate::capture::AudioCapture;
use crate::features;

/// Commands accepted by the session thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCommand {
    /// Halt the tick loop and release the capture device.
    Stop,
}

/// Counters reported when the tick loop ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickStats {
    /// Ticks whose frame was extracted and published.
    pub extracted: u64,
    /// Ticks dropped because the frame could not be produced or was malformed.
    pub skipped: u64,
    /// Ticks whose features the sink failed to present.
    pub sink_errors: u64,
}

/// A live capture session: device handle, analyser, waveform window, and
/// scratch buffer.
///
/// Owned by the session thread; the device stream never leaves it.
pub struct CaptureSession {
    capture: AudioCapture,
    frequency: Analyser,
    waveform: SampleWindow,
    scratch: Vec<f32>,
}

impl CaptureSession {
    /// Open the input device and size the analysers from `config`.
    ///
    /// # Errors
    /// Returns an error if the device is unavailable or access is denied.
    pub fn open(config: &AnalysisConfig, device: Option<&str>) -> Result<Self> {
        let capture = AudioCapture::start(device)?;
        Ok(Self {
            capture,
            frequency: Analyser::frequency(config),
            waveform: SampleWindow::waveform(config),
            scratch: Vec::with_capacity(config.fft_size * 2),
        })
    }
}

impl FrameSource for CaptureSession {
    fn next_frame(&mut self) -> Result<SpectralFrame> {
        self.capture.read_samples(&mut self.scratch);
        self.frequency.push_samples(&self.scratch);
        self.waveform.push(&self.scratch);
        Ok(analyser::snapshot_frame(&mut self.frequency, &self.waveform))
    }

    fn sample_rate(&self) -> Option<u32> {
        Some(self.capture.sample_rate())
    }
}

/// Repeat ticks until [`SessionCommand::Stop`] arrives or the command
/// channel disconnects.
///
/// Each tick pulls one frame, extracts its features with the current
/// `[analysis].sample_rate_hz`, publishes them to `output`, and presents them
/// to `sink` every `[output].every_n_ticks` ticks. A failed tick is logged
/// and skipped; the next one runs normally.
pub fn run_tick_loop<S, K>(
    source: &mut S,
    sink: &mut K,
    config: &ArcSwap<SessionConfig>,
    commands: &flume::Receiver<SessionCommand>,
    output: &mut triple_buffer::Input<AudioFeatures>,
) -> TickStats
where
    S: FrameSource + ?Sized,
    K: FeatureSink + ?Sized,
{
    let mut stats = TickStats::default();
    let mut tick: u64 = 0;

    loop {
        let started = Instant::now();
        if matches!(commands.try_recv(), Ok(SessionCommand::Stop)) || commands.is_disconnected()
        {
            break;
        }

        // Copied out so no arc-swap guard is held across the sleep below.
        let (sample_rate_hz, every_n_ticks, target_fps) = {
            let cfg = config.load();
            (
                cfg.analysis.sample_rate_hz,
                cfg.output.every_n_ticks.max(1),
                cfg.session.target_fps.max(1),
            )
        };
        match next_features(source, sample_rate_hz) {
            Ok(feats) => {
                stats.extracted += 1;
                let present = tick % u64::from(every_n_ticks) == 0;
                if present && let Err(e) = sink.present(&feats) {
                    stats.sink_errors += 1;
                    log::warn!("Tick {tick}: sink failed: {e:#}");
                }
                output.write(feats);
            }
            Err(e) => {
                stats.skipped += 1;
                log::warn!("Tick {tick} skipped: {e:#}");
            }
        }
        tick += 1;

        let period = Duration::from_secs_f64(1.0 / f64::from(target_fps));
        match commands.recv_timeout(period.saturating_sub(started.elapsed())) {
            Ok(SessionCommand::Stop) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }
    }

    log::debug!(
        "Tick loop ended: {} extracted, {} skipped, {} sink errors",
        stats.extracted,
        stats.skipped,
        stats.sink_errors
    );
    stats
}

/// One tick: acquire, validate, extract.
fn next_features<S>(source: &mut S, sample_rate_hz: f32) -> Result<AudioFeatures>
where
    S: FrameSource + ?Sized,
{
    let frame = source.next_frame()?;
    frame.check_lengths()?;
    Ok(features::extract_features(&frame, sample_rate_hz))
}

/// Handle on a running session thread.
///
/// Dropping the handle stops the session as well.
pub struct SessionHandle {
    commands: flume::Sender<SessionCommand>,
    latest: triple_buffer::Output<AudioFeatures>,
    thread: Option<thread::JoinHandle<TickStats>>,
    sample_rate: Option<u32>,
}

impl SessionHandle {
    /// Most recently published features (all-zero before the first tick).
    pub fn latest(&mut self) -> &AudioFeatures {
        self.latest.read()
    }

    /// Device sample rate of the running capture, if the source has one.
    #[must_use]
    pub fn sample_rate(&self) -> Option<u32> {
        self.sample_rate
    }

    /// Stop the tick loop and wait for the session thread.
    ///
    /// On return no further extraction happens and the device stream is released.
    ///
    /// # Errors
    /// Returns an error if the session thread panicked.
    pub fn stop(mut self) -> Result<TickStats> {
        self.join()
    }

    fn join(&mut self) -> Result<TickStats> {
        let Some(handle) = self.thread.take() else {
            return Ok(TickStats::default());
        };
        // The thread may already be gone; joining is what matters.
        let _ = self.commands.send(SessionCommand::Stop);
        handle
            .join()
            .map_err(|_| anyhow::anyhow!("session thread panicked"))
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        if let Err(e) = self.join() {
            log::error!("{e}");
        }
    }
}

/// Start a microphone capture session on its own thread.
///
/// The device is opened on the session thread and the outcome reported back
/// before this returns, so a missing device or denied permission surfaces
/// here as an error. Nothing is retried.
///
/// # Errors
/// Returns an error if the thread cannot be spawned or capture fails to start.
pub fn spawn_session(
    config: &Arc<ArcSwap<SessionConfig>>,
    sink: Box<dyn FeatureSink>,
) -> Result<SessionHandle> {
    spawn_session_with(config, sink, |cfg: &SessionConfig| {
        CaptureSession::open(&cfg.analysis, cfg.device_name())
    })
}

/// Start a session whose frames come from the source built by `open`.
///
/// `open` runs on the session thread with the config current at start. Its
/// error is returned from here and ends the session.
///
/// # Errors
/// Returns an error if the thread cannot be spawned or `open` fails.
pub fn spawn_session_with<S, F>(
    config: &Arc<ArcSwap<SessionConfig>>,
    mut sink: Box<dyn FeatureSink>,
    open: F,
) -> Result<SessionHandle>
where
    S: FrameSource,
    F: FnOnce(&SessionConfig) -> Result<S> + Send + 'static,
{
    let (cmd_tx, cmd_rx) = flume::unbounded();
    let (ready_tx, ready_rx) = flume::bounded::<Result<Option<u32>>>(1);
    let (mut buf_input, buf_output) = TripleBuffer::new(&AudioFeatures::default()).split();

    let config = Arc::clone(config);
    let thread = thread::Builder::new()
        .name("qa-session".to_string())
        .spawn(move || {
            let snapshot = config.load_full();
            let mut source = match open(snapshot.as_ref()) {
                Ok(source) => {
                    let _ = ready_tx.send(Ok(source.sample_rate()));
                    source
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return TickStats::default();
                }
            };
            run_tick_loop(&mut source, &mut sink, &config, &cmd_rx, &mut buf_input)
        })?;

    match ready_rx.recv() {
        Ok(Ok(sample_rate)) => {
            match sample_rate {
                Some(rate) => log::info!("Capture session started @ {rate}Hz"),
                None => log::info!("Capture session started"),
            }
            Ok(SessionHandle {
                commands: cmd_tx,
                latest: buf_output,
                thread: Some(thread),
                sample_rate,
            })
        }
        Ok(Err(e)) => {
            let _ = thread.join();
            Err(e)
        }
        Err(_) => {
            let _ = thread.join();
            anyhow::bail!("session thread exited before capture started")
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    /// Replays scripted frames and asks the loop to stop once drained.
    struct ScriptedSource {
        frames: VecDeque<Result<SpectralFrame>>,
        pulls: usize,
        stop: flume::Sender<SessionCommand>,
    }

    impl FrameSource for ScriptedSource {
        fn next_frame(&mut self) -> Result<SpectralFrame> {
            self.pulls += 1;
            let next = self
                .frames
                .pop_front()
                .unwrap_or_else(|| Err(anyhow::anyhow!("script exhausted")));
            if self.frames.is_empty() {
                let _ = self.stop.send(SessionCommand::Stop);
            }
            next
        }
    }

    #[derive(Default)]
    struct Recorder {
        seen: Arc<Mutex<Vec<f32>>>,
        fail_on: Option<usize>,
    }

    impl FeatureSink for Recorder {
        fn present(&mut self, features: &AudioFeatures) -> Result<()> {
            let mut seen = self.seen.lock().unwrap();
            if self.fail_on == Some(seen.len()) {
                seen.push(-1.0);
                anyhow::bail!("display gone");
            }
            seen.push(features.loudness);
            Ok(())
        }
    }

    fn flat_frame(level: u8) -> SpectralFrame {
        SpectralFrame::new(vec![level; 8], vec![-50.0; 8], vec![0.0; 4])
    }

    fn fast_config(every_n_ticks: u32) -> ArcSwap<SessionConfig> {
        let mut config = SessionConfig::default();
        config.session.target_fps = 240;
        config.output.every_n_ticks = every_n_ticks;
        ArcSwap::from_pointee(config)
    }

    fn run(
        frames: Vec<Result<SpectralFrame>>,
        sink: &mut Recorder,
        every_n_ticks: u32,
    ) -> (TickStats, usize, AudioFeatures) {
        let (tx, rx) = flume::unbounded();
        let mut source = ScriptedSource {
            frames: frames.into(),
            pulls: 0,
            stop: tx,
        };
        let (mut input, mut output) = TripleBuffer::new(&AudioFeatures::default()).split();
        let config = fast_config(every_n_ticks);
        let stats = run_tick_loop(&mut source, sink, &config, &rx, &mut input);
        (stats, source.pulls, output.read().clone())
    }

    #[test]
    fn ticks_are_presented_in_order() {
        let mut sink = Recorder::default();
        let frames = vec![Ok(flat_frame(10)), Ok(flat_frame(20)), Ok(flat_frame(30))];
        let (stats, pulls, last) = run(frames, &mut sink, 1);

        assert_eq!(stats.extracted, 3);
        assert_eq!(stats.skipped, 0);
        assert_eq!(pulls, 3);
        assert_eq!(*sink.seen.lock().unwrap(), vec![10.0, 20.0, 30.0]);
        assert!((last.loudness - 30.0).abs() < f32::EPSILON);
    }

    #[test]
    fn failed_and_malformed_ticks_are_skipped() {
        let mut sink = Recorder::default();
        let malformed = SpectralFrame::new(vec![1; 8], vec![0.0; 3], vec![]);
        let frames = vec![
            Ok(flat_frame(5)),
            Err(anyhow::anyhow!("device hiccup")),
            Ok(malformed),
            Ok(flat_frame(7)),
        ];
        let (stats, pulls, _) = run(frames, &mut sink, 1);

        assert_eq!(stats.extracted, 2);
        assert_eq!(stats.skipped, 2);
        assert_eq!(pulls, 4);
        assert_eq!(*sink.seen.lock().unwrap(), vec![5.0, 7.0]);
    }

    #[test]
    fn sink_failure_does_not_stop_the_loop() {
        let mut sink = Recorder {
            fail_on: Some(0),
            ..Recorder::default()
        };
        let frames = vec![Ok(flat_frame(1)), Ok(flat_frame(2))];
        let (stats, _, last) = run(frames, &mut sink, 1);

        assert_eq!(stats.sink_errors, 1);
        assert_eq!(stats.extracted, 2);
        assert_eq!(*sink.seen.lock().unwrap(), vec![-1.0, 2.0]);
        assert!((last.loudness - 2.0).abs() < f32::EPSILON);
    }

    #[test]
    fn sink_sees_every_nth_tick() {
        let mut sink = Recorder::default();
        let frames = (1..=5).map(|l| Ok(flat_frame(l))).collect();
        let (stats, _, last) = run(frames, &mut sink, 2);

        assert_eq!(stats.extracted, 5);
        assert_eq!(*sink.seen.lock().unwrap(), vec![1.0, 3.0, 5.0]);
        assert!((last.loudness - 5.0).abs() < f32::EPSILON);
    }

    #[test]
    fn stop_before_first_tick_pulls_nothing() {
        let (tx, rx) = flume::unbounded();
        tx.send(SessionCommand::Stop).unwrap();
        let mut source = ScriptedSource {
            frames: vec![Ok(flat_frame(9))].into(),
            pulls: 0,
            stop: tx,
        };
        let mut sink = Recorder::default();
        let (mut input, _output) = TripleBuffer::new(&AudioFeatures::default()).split();
        let stats = run_tick_loop(&mut source, &mut sink, &fast_config(1), &rx, &mut input);

        assert_eq!(source.pulls, 0);
        assert_eq!(stats, TickStats::default());
    }

    #[test]
    fn disconnected_commands_end_the_loop() {
        let (tx, rx) = flume::unbounded::<SessionCommand>();
        let (unused_tx, _) = flume::unbounded();
        drop(tx);
        let mut source = ScriptedSource {
            frames: vec![Ok(flat_frame(9)), Ok(flat_frame(9))].into(),
            pulls: 0,
            stop: unused_tx,
        };
        let mut sink = Recorder::default();
        let (mut input, _output) = TripleBuffer::new(&AudioFeatures::default()).split();
        let stats = run_tick_loop(&mut source, &mut sink, &fast_config(1), &rx, &mut input);

        assert_eq!(source.pulls, 0);
        assert_eq!(stats.extracted, 0);
    }

    /// Swaps in a new Hz sample rate while producing its first frame.
    struct RetuningSource {
        config: Arc<ArcSwap<SessionConfig>>,
        pulls: usize,
        stop: flume::Sender<SessionCommand>,
    }

    impl FrameSource for RetuningSource {
        fn next_frame(&mut self) -> Result<SpectralFrame> {
            self.pulls += 1;
            if self.pulls == 1 {
                let mut next = (**self.config.load()).clone();
                next.analysis.sample_rate_hz = 44100.0;
                self.config.store(Arc::new(next));
            } else {
                let _ = self.stop.send(SessionCommand::Stop);
            }
            Ok(flat_frame(10))
        }
    }

    struct CentroidLog(Arc<Mutex<Vec<f32>>>);

    impl FeatureSink for CentroidLog {
        fn present(&mut self, features: &AudioFeatures) -> Result<()> {
            self.0.lock().unwrap().push(features.centroid);
            Ok(())
        }
    }

    #[test]
    fn reloaded_sample_rate_applies_on_next_tick() {
        let config = Arc::new(fast_config(1));
        let (tx, rx) = flume::unbounded();
        let mut source = RetuningSource {
            config: Arc::clone(&config),
            pulls: 0,
            stop: tx,
        };
        let centroids = Arc::new(Mutex::new(Vec::new()));
        let mut sink = CentroidLog(Arc::clone(&centroids));
        let (mut input, _output) = TripleBuffer::new(&AudioFeatures::default()).split();

        let stats = run_tick_loop(&mut source, &mut sink, &config, &rx, &mut input);

        assert_eq!(stats.extracted, 2);
        let frame = flat_frame(10);
        let expected = vec![
            features::extract_features(&frame, 22050.0).centroid,
            features::extract_features(&frame, 44100.0).centroid,
        ];
        assert_eq!(*centroids.lock().unwrap(), expected);
        assert!(expected[1] > expected[0]);
    }

    /// Endless flat frames, counting pulls where the test can see them.
    struct CountingSource {
        pulls: Arc<AtomicUsize>,
    }

    impl FrameSource for CountingSource {
        fn next_frame(&mut self) -> Result<SpectralFrame> {
            self.pulls.fetch_add(1, Ordering::SeqCst);
            Ok(flat_frame(10))
        }
    }

    #[test]
    fn failed_open_is_returned_and_not_retried() {
        let config = Arc::new(fast_config(1));
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&attempts);

        let result = spawn_session_with(
            &config,
            Box::new(Recorder::default()),
            move |_: &SessionConfig| {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<CountingSource, _>(anyhow::anyhow!("permission denied"))
            },
        );

        let Err(e) = result else {
            panic!("session started without a source");
        };
        assert!(format!("{e:#}").contains("permission denied"));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn stop_joins_the_session_and_ends_extraction() {
        let config = Arc::new(fast_config(1));
        let pulls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&pulls);

        let mut handle = spawn_session_with(
            &config,
            Box::new(Recorder::default()),
            move |_: &SessionConfig| Ok(CountingSource { pulls: counter }),
        )
        .unwrap();
        assert_eq!(handle.sample_rate(), None);

        let deadline = Instant::now() + Duration::from_secs(5);
        while pulls.load(Ordering::SeqCst) < 3 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(2));
        }
        assert!((handle.latest().loudness - 10.0).abs() < f32::EPSILON);

        let stats = handle.stop().unwrap();
        let pulled = pulls.load(Ordering::SeqCst);
        assert!(stats.extracted >= 3);
        assert_eq!(stats.extracted, pulled as u64);

        thread::sleep(Duration::from_millis(30));
        assert_eq!(pulls.load(Ordering::SeqCst), pulled);
    }
}
