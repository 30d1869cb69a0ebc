//! Session-based microphone collaborator.
//!
//! [`CaptureSource`] is the contract the pipeline controller talks to:
//! open a session, close or cancel it, read the captured clip.  [`MicCapture`]
//! is the production implementation — a cpal stream runs for the process
//! lifetime, a bridge thread downmixes and resamples every chunk, and samples
//! are accumulated only while a session is open.  Device failures surface as
//! [`CaptureErrorEvent`]s on the bus.

use std::sync::{mpsc, Arc, Mutex};
use std::time::Instant;

use crate::events::{CaptureErrorEvent, EventBus};
use crate::pipeline::session::SessionId;

use super::capture::{AudioCapture, CaptureError, StreamHandle};
use super::clip::{PcmClip, SAMPLE_RATE_HZ};
use super::resample::{downmix_to_mono, RateConverter};

/// Input block size handed to the resampler (20 ms at 48 kHz).
const RESAMPLE_CHUNK: usize = 960;

// ---------------------------------------------------------------------------
// CaptureSource
// ---------------------------------------------------------------------------

/// Audio collaborator contract: one mutually exclusive session at a time
/// (enforced upstream by the capture state machine), PCM16LE mono 16 kHz out.
pub trait CaptureSource: Send + Sync {
    /// Begin accumulating audio under `id`.
    fn start_session(&self, id: SessionId) -> Result<(), CaptureError>;

    /// Stop accumulating; the captured audio stays readable via `read_all`.
    fn stop_session(&self, id: SessionId);

    /// Abort the session and discard its audio.
    fn cancel_session(&self, id: SessionId);

    /// Take everything captured for `id` as a [`PcmClip`].
    fn read_all(&self, id: SessionId) -> PcmClip;
}

// ---------------------------------------------------------------------------
// SessionRecorder
// ---------------------------------------------------------------------------

/// The accumulation state shared between the bridge thread and the
/// controller-facing [`CaptureSource`] calls.
#[derive(Debug)]
pub(crate) struct SessionRecorder {
    inner: Mutex<RecorderInner>,
}

#[derive(Debug)]
struct RecorderInner {
    /// Session currently accepting samples.
    recording: Option<SessionId>,
    samples: Vec<f32>,
    /// Accumulation cap; audio beyond it is dropped (the validator rejects
    /// overlong clips anyway, this only bounds memory).
    max_samples: usize,
}

impl SessionRecorder {
    pub(crate) fn new(max_duration_ms: u64) -> Self {
        // One extra second of slack past the validator's maximum.
        let max_samples = ((max_duration_ms + 1_000) as usize) * SAMPLE_RATE_HZ as usize / 1_000;
        Self {
            inner: Mutex::new(RecorderInner {
                recording: None,
                samples: Vec::new(),
                max_samples,
            }),
        }
    }

    /// Called from the bridge thread with 16 kHz mono samples.
    pub(crate) fn push(&self, samples: &[f32]) {
        let mut inner = self.inner.lock().unwrap();
        if inner.recording.is_none() {
            return;
        }
        let room = inner.max_samples.saturating_sub(inner.samples.len());
        let take = samples.len().min(room);
        if take > 0 {
            let chunk = &samples[..take];
            inner.samples.extend_from_slice(chunk);
        }
    }

    fn begin(&self, id: SessionId) {
        let mut inner = self.inner.lock().unwrap();
        inner.samples.clear();
        inner.recording = Some(id);
    }

    fn end(&self, id: SessionId) {
        let mut inner = self.inner.lock().unwrap();
        if inner.recording == Some(id) {
            inner.recording = None;
        }
    }

    fn discard(&self, id: SessionId) {
        let mut inner = self.inner.lock().unwrap();
        if inner.recording == Some(id) {
            inner.recording = None;
        }
        inner.samples.clear();
    }

    fn take(&self) -> Vec<f32> {
        std::mem::take(&mut self.inner.lock().unwrap().samples)
    }
}

impl CaptureSource for SessionRecorder {
    fn start_session(&self, id: SessionId) -> Result<(), CaptureError> {
        self.begin(id);
        Ok(())
    }

    fn stop_session(&self, id: SessionId) {
        self.end(id);
    }

    fn cancel_session(&self, id: SessionId) {
        self.discard(id);
    }

    fn read_all(&self, _id: SessionId) -> PcmClip {
        PcmClip::from_samples(&self.take())
    }
}

// ---------------------------------------------------------------------------
// MicCapture
// ---------------------------------------------------------------------------

/// Production capture collaborator: cpal stream + bridge thread + recorder.
pub struct MicCapture {
    recorder: Arc<SessionRecorder>,
}

impl MicCapture {
    /// Open the input device and start streaming.
    ///
    /// Returns the collaborator and the stream guard; the guard is not
    /// `Send` and must stay on the calling thread for the process lifetime.
    pub fn start(
        device_name: Option<&str>,
        max_duration_ms: u64,
        bus: EventBus,
    ) -> Result<(Arc<Self>, StreamHandle), CaptureError> {
        let capture = AudioCapture::new(device_name)?;
        let recorder = Arc::new(SessionRecorder::new(max_duration_ms));

        let (chunk_tx, chunk_rx) = mpsc::channel();
        spawn_bridge_thread(
            chunk_rx,
            Arc::clone(&recorder),
            capture.sample_rate(),
            capture.channels(),
        )?;

        let error_bus = bus.clone();
        let handle = capture.start(chunk_tx, move |reason| {
            error_bus.publish_capture_error(CaptureErrorEvent {
                reason,
                at: Instant::now(),
            });
        })?;

        Ok((Arc::new(Self { recorder }), handle))
    }
}

impl CaptureSource for MicCapture {
    fn start_session(&self, id: SessionId) -> Result<(), CaptureError> {
        self.recorder.start_session(id)
    }

    fn stop_session(&self, id: SessionId) {
        self.recorder.stop_session(id)
    }

    fn cancel_session(&self, id: SessionId) {
        self.recorder.cancel_session(id)
    }

    fn read_all(&self, id: SessionId) -> PcmClip {
        self.recorder.read_all(id)
    }
}

/// Drain cpal chunks, downmix, resample to 16 kHz, and feed the recorder.
/// The thread ends when the chunk sender (the cpal stream) is dropped.
fn spawn_bridge_thread(
    chunk_rx: mpsc::Receiver<super::capture::AudioChunk>,
    recorder: Arc<SessionRecorder>,
    sample_rate: u32,
    channels: u16,
) -> Result<(), CaptureError> {
    let mut converter =
        RateConverter::new(sample_rate, RESAMPLE_CHUNK).map_err(CaptureError::Resampler)?;

    std::thread::Builder::new()
        .name("audio-bridge".into())
        .spawn(move || {
            while let Ok(chunk) = chunk_rx.recv() {
                let mono = downmix_to_mono(&chunk.samples, channels);
                let resampled = converter.process(&mono);
                if !resampled.is_empty() {
                    recorder.push(&resampled);
                }
            }
        })
        .map_err(|e| CaptureError::Resampler(format!("bridge thread spawn failed: {e}")))?;

    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn samples_accumulate_only_while_recording() {
        let rec = SessionRecorder::new(60_000);
        rec.push(&[0.1; 100]);

        let id = SessionId::next();
        rec.start_session(id).unwrap();
        rec.push(&[0.2; 100]);
        rec.stop_session(id);
        rec.push(&[0.3; 100]);

        let clip = rec.read_all(id);
        assert_eq!(clip.sample_count(), 100);
    }

    #[test]
    fn starting_a_session_clears_leftovers() {
        let rec = SessionRecorder::new(60_000);
        let first = SessionId::next();
        rec.start_session(first).unwrap();
        rec.push(&[0.5; 50]);
        rec.stop_session(first);

        // The clip from `first` is never read; a new session must not see it.
        let second = SessionId::next();
        rec.start_session(second).unwrap();
        rec.push(&[0.1; 10]);
        rec.stop_session(second);

        assert_eq!(rec.read_all(second).sample_count(), 10);
    }

    #[test]
    fn cancel_discards_audio() {
        let rec = SessionRecorder::new(60_000);
        let id = SessionId::next();
        rec.start_session(id).unwrap();
        rec.push(&[0.5; 200]);
        rec.cancel_session(id);

        assert!(rec.read_all(id).is_empty());
    }

    #[test]
    fn read_all_drains_the_buffer() {
        let rec = SessionRecorder::new(60_000);
        let id = SessionId::next();
        rec.start_session(id).unwrap();
        rec.push(&[0.5; 100]);
        rec.stop_session(id);

        assert_eq!(rec.read_all(id).sample_count(), 100);
        assert!(rec.read_all(id).is_empty());
    }

    #[test]
    fn accumulation_is_capped() {
        // 1 ms cap + 1 s slack = 16 016 samples of room.
        let rec = SessionRecorder::new(1);
        let id = SessionId::next();
        rec.start_session(id).unwrap();
        rec.push(&vec![0.1; 20_000]);
        rec.push(&vec![0.1; 20_000]);
        rec.stop_session(id);

        assert_eq!(rec.read_all(id).sample_count(), 16_016);
    }

    #[test]
    fn stale_stop_does_not_end_the_current_session() {
        let rec = SessionRecorder::new(60_000);
        let current = SessionId::next();
        let stale = SessionId::next();

        rec.start_session(current).unwrap();
        rec.stop_session(stale);
        rec.push(&[0.2; 30]);
        rec.stop_session(current);

        assert_eq!(rec.read_all(current).sample_count(), 30);
    }
}
