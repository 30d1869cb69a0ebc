//! External recognizer driven as a subprocess.
//!
//! Each transcription writes the clip to a uniquely named temp WAV, spawns
//! the recognizer binary with a deterministic absolute-path argument list,
//! drains stdout/stderr through byte-capped sinks on their own threads, and
//! awaits exit under a hard deadline.  On timeout the process is killed and
//! reaped before the call returns.  The temp WAV is removed on every exit
//! path (RAII via `tempfile`).
//!
//! Argument list:
//!
//! ```text
//! <binary> --model <m> --file <wav> --language <l> --output <text|json> --threads <n>
//! ```
//!
//! In `json` mode the recognizer prints one JSON object on stdout; `text`
//! mode prints the transcript directly.

use std::io::Read;
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tempfile::NamedTempFile;

use crate::audio::{PcmClip, SAMPLE_RATE_HZ};
use crate::reconcile::tokenize;
use crate::stt::backend::{EngineError, FailKind, RawTranscription, SttBackend};

/// Stable log identifier for this engine.
pub const SUBPROCESS_ENGINE_NAME: &str = "whisper-cli";

/// Stderr carried inside an error is capped at 2 KB.
const STDERR_SNIPPET_MAX: usize = 2_048;

/// Poll interval while awaiting process exit.
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Prefix of the per-call temp WAV files.
const TEMP_WAV_PREFIX: &str = "voicekey-rec-";

// ---------------------------------------------------------------------------
// OutputMode / RecognizerConfig
// ---------------------------------------------------------------------------

/// CLI output format requested from the recognizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    Text,
    Json,
}

impl OutputMode {
    fn as_arg(self) -> &'static str {
        match self {
            OutputMode::Text => "text",
            OutputMode::Json => "json",
        }
    }
}

/// Settings for the subprocess engine.
#[derive(Debug, Clone)]
pub struct RecognizerConfig {
    /// Recognizer binary.
    pub binary_path: PathBuf,
    /// Model file handed to the binary.
    pub model_path: PathBuf,
    /// ISO-639-1 language code.
    pub language: String,
    pub output_mode: OutputMode,
    /// Hard per-call deadline.
    pub timeout: Duration,
    /// Worker threads handed to the binary.
    pub threads: u32,
    /// Stdout accumulation cap; bytes beyond it are discarded.
    pub max_stdout_bytes: usize,
    /// Stderr accumulation cap.
    pub max_stderr_bytes: usize,
}

impl Default for RecognizerConfig {
    fn default() -> Self {
        Self {
            binary_path: PathBuf::new(),
            model_path: PathBuf::new(),
            language: "en".into(),
            output_mode: OutputMode::Text,
            timeout: Duration::from_secs(10),
            threads: 4,
            max_stdout_bytes: 1_048_576,
            max_stderr_bytes: 262_144,
        }
    }
}

// ---------------------------------------------------------------------------
// SubprocessBackend
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct ResolvedPaths {
    binary: PathBuf,
    model: PathBuf,
}

/// The external recognizer engine.
///
/// `initialize()` resolves and checks the binary and model paths; each call
/// then owns its own process, temp file, and drain threads, so calls can run
/// concurrently up to the adapter's admission limit.
#[derive(Debug)]
pub struct SubprocessBackend {
    config: RecognizerConfig,
    resolved: Mutex<Option<ResolvedPaths>>,
    last_tokens: Mutex<Option<Vec<String>>>,
    last_raw: Mutex<Option<Value>>,
    /// Path of the most recent call's temp WAV, for cleanup assertions.
    #[cfg(test)]
    last_wav_path: Mutex<Option<PathBuf>>,
}

impl SubprocessBackend {
    pub fn new(config: RecognizerConfig) -> Self {
        Self {
            config,
            resolved: Mutex::new(None),
            last_tokens: Mutex::new(None),
            last_raw: Mutex::new(None),
            #[cfg(test)]
            last_wav_path: Mutex::new(None),
        }
    }

    fn resolved(&self) -> Result<ResolvedPaths, EngineError> {
        self.resolved
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| EngineError::NotInitialized {
                engine: SUBPROCESS_ENGINE_NAME.into(),
            })
    }

    fn io_error(cause: String, start: Instant) -> EngineError {
        EngineError::transcription(
            SUBPROCESS_ENGINE_NAME,
            FailKind::Io,
            cause,
            start.elapsed().as_millis() as u64,
        )
    }

    /// Write the clip into a uniquely named temp WAV with a conformant
    /// 16 kHz / 16-bit / mono header.
    fn write_temp_wav(clip: &PcmClip, start: Instant) -> Result<NamedTempFile, EngineError> {
        let file = tempfile::Builder::new()
            .prefix(TEMP_WAV_PREFIX)
            .suffix(".wav")
            .tempfile()
            .map_err(|e| Self::io_error(format!("temp WAV create failed: {e}"), start))?;

        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: SAMPLE_RATE_HZ,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(file.path(), spec)
            .map_err(|e| Self::io_error(format!("temp WAV open failed: {e}"), start))?;
        for sample in clip.to_i16_samples() {
            writer
                .write_sample(sample)
                .map_err(|e| Self::io_error(format!("temp WAV write failed: {e}"), start))?;
        }
        writer
            .finalize()
            .map_err(|e| Self::io_error(format!("temp WAV finalize failed: {e}"), start))?;
        Ok(file)
    }
}

impl SttBackend for SubprocessBackend {
    fn engine_name(&self) -> &str {
        SUBPROCESS_ENGINE_NAME
    }

    /// Resolve binary and model to absolute paths and check they exist.
    /// Idempotent.
    fn initialize(&self) -> Result<(), EngineError> {
        let mut guard = self.resolved.lock().unwrap();
        if guard.is_some() {
            return Ok(());
        }

        let init_err = |what: &str, path: &PathBuf, e: String| EngineError::Init {
            engine: SUBPROCESS_ENGINE_NAME.into(),
            cause: format!("{what} {}: {e}", path.display()),
        };

        let binary = std::fs::canonicalize(&self.config.binary_path)
            .map_err(|e| init_err("recognizer binary", &self.config.binary_path, e.to_string()))?;
        let model = std::fs::canonicalize(&self.config.model_path)
            .map_err(|e| init_err("recognizer model", &self.config.model_path, e.to_string()))?;

        *guard = Some(ResolvedPaths { binary, model });
        log::info!("{SUBPROCESS_ENGINE_NAME}: ready ({})", self.config.binary_path.display());
        Ok(())
    }

    fn transcribe(&self, clip: &PcmClip) -> Result<RawTranscription, EngineError> {
        let paths = self.resolved()?;
        let start = Instant::now();

        // The guard deletes the WAV when this function returns, on every path.
        let wav = Self::write_temp_wav(clip, start)?;
        #[cfg(test)]
        {
            *self.last_wav_path.lock().unwrap() = Some(wav.path().to_path_buf());
        }

        let mut child = Command::new(&paths.binary)
            .arg("--model")
            .arg(&paths.model)
            .arg("--file")
            .arg(wav.path())
            .arg("--language")
            .arg(&self.config.language)
            .arg("--output")
            .arg(self.config.output_mode.as_arg())
            .arg("--threads")
            .arg(self.config.threads.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Self::io_error(format!("spawn failed: {e}"), start))?;

        let stdout_drain = CappedDrain::spawn(
            "stdout",
            child.stdout.take().expect("stdout was piped"),
            self.config.max_stdout_bytes,
        );
        let stderr_drain = CappedDrain::spawn(
            "stderr",
            child.stderr.take().expect("stderr was piped"),
            self.config.max_stderr_bytes,
        );

        let waited = wait_with_deadline(&mut child, self.config.timeout);
        let duration_ms = start.elapsed().as_millis() as u64;

        let status: ExitStatus = match waited {
            Ok(Some(status)) => status,
            Ok(None) => {
                // Deadline expired: kill, reap, report.
                kill_and_reap(&mut child);
                let _ = stdout_drain.finish();
                let stderr = stderr_drain.finish();
                return Err(EngineError::Transcription {
                    engine: SUBPROCESS_ENGINE_NAME.into(),
                    kind: FailKind::Timeout,
                    cause: format!(
                        "recognizer exceeded {} ms deadline (binary {}, model {})",
                        self.config.timeout.as_millis(),
                        paths.binary.display(),
                        paths.model.display(),
                    ),
                    duration_ms,
                    exit_code: None,
                    stderr_snippet: stderr_snippet(&stderr),
                });
            }
            Err(e) => {
                kill_and_reap(&mut child);
                let _ = stdout_drain.finish();
                let _ = stderr_drain.finish();
                return Err(Self::io_error(format!("wait failed: {e}"), start));
            }
        };

        let stdout = stdout_drain.finish();
        let stderr = stderr_drain.finish();

        if !status.success() {
            return Err(EngineError::Transcription {
                engine: SUBPROCESS_ENGINE_NAME.into(),
                kind: FailKind::NonZeroExit,
                cause: format!(
                    "recognizer exited with {status} (binary {}, model {})",
                    paths.binary.display(),
                    paths.model.display(),
                ),
                duration_ms,
                exit_code: status.code(),
                stderr_snippet: stderr_snippet(&stderr),
            });
        }

        let stdout = String::from_utf8_lossy(&stdout);
        let (text, tokens, raw) = match self.config.output_mode {
            OutputMode::Text => parse_text_output(&stdout),
            OutputMode::Json => parse_json_output(&stdout),
        };
        let confidence = raw
            .as_ref()
            .and_then(json_confidence)
            .unwrap_or(if text.is_empty() { 0.0 } else { 1.0 });

        *self.last_tokens.lock().unwrap() = Some(tokens);
        *self.last_raw.lock().unwrap() = raw;

        log::debug!("{SUBPROCESS_ENGINE_NAME}: exit {status} in {duration_ms} ms");

        Ok(RawTranscription {
            text,
            confidence: confidence.clamp(0.0, 1.0),
        })
    }

    fn is_healthy(&self) -> bool {
        self.resolved.lock().unwrap().is_some()
    }

    /// Forget the resolved paths and caches.  Idempotent; per-call resources
    /// are scoped to `transcribe` and need no teardown here.
    fn close(&self) {
        self.resolved.lock().unwrap().take();
        self.last_tokens.lock().unwrap().take();
        self.last_raw.lock().unwrap().take();
    }

    fn take_last_tokens(&self) -> Option<Vec<String>> {
        self.last_tokens.lock().unwrap().take()
    }

    fn take_last_raw(&self) -> Option<Value> {
        self.last_raw.lock().unwrap().take()
    }
}

// ---------------------------------------------------------------------------
// Process plumbing
// ---------------------------------------------------------------------------

/// Poll for exit until `timeout`.  `Ok(None)` means the deadline expired with
/// the process still alive.
fn wait_with_deadline(child: &mut Child, timeout: Duration) -> std::io::Result<Option<ExitStatus>> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            return Ok(None);
        }
        thread::sleep(EXIT_POLL_INTERVAL);
    }
}

/// Kill the process and block until it is reaped.  After SIGKILL the reap is
/// prompt; `wait` also closes the pipes so the drain threads finish.
fn kill_and_reap(child: &mut Child) {
    if let Err(e) = child.kill() {
        log::warn!("{SUBPROCESS_ENGINE_NAME}: kill failed: {e}");
    }
    if let Err(e) = child.wait() {
        log::warn!("{SUBPROCESS_ENGINE_NAME}: reap failed: {e}");
    }
}

/// Background reader that accumulates at most `cap` bytes and discards the
/// rest of the stream without stalling the writer.
struct CappedDrain {
    label: &'static str,
    handle: thread::JoinHandle<(Vec<u8>, bool)>,
}

impl CappedDrain {
    fn spawn(label: &'static str, mut reader: impl Read + Send + 'static, cap: usize) -> Self {
        let handle = thread::Builder::new()
            .name(format!("recognizer-{label}-drain"))
            .spawn(move || {
                let mut buf: Vec<u8> = Vec::new();
                let mut chunk = [0u8; 8 * 1024];
                let mut truncated = false;
                loop {
                    match reader.read(&mut chunk) {
                        Ok(0) => break,
                        Ok(n) => {
                            if buf.len() < cap {
                                let take = n.min(cap - buf.len());
                                buf.extend_from_slice(&chunk[..take]);
                                if take < n {
                                    truncated = true;
                                }
                            } else {
                                truncated = true;
                            }
                        }
                        Err(_) => break,
                    }
                }
                (buf, truncated)
            })
            .expect("failed to spawn recognizer drain thread");
        Self { label, handle }
    }

    /// Join the drain (the stream has ended by the time callers get here)
    /// and return the capped bytes.
    fn finish(self) -> Vec<u8> {
        match self.handle.join() {
            Ok((buf, truncated)) => {
                if truncated {
                    log::warn!(
                        "{SUBPROCESS_ENGINE_NAME}: {} exceeded its byte cap; excess discarded",
                        self.label
                    );
                }
                buf
            }
            Err(_) => {
                log::warn!("{SUBPROCESS_ENGINE_NAME}: {} drain thread panicked", self.label);
                Vec::new()
            }
        }
    }
}

fn stderr_snippet(stderr: &[u8]) -> Option<String> {
    if stderr.is_empty() {
        return None;
    }
    let end = stderr.len().min(STDERR_SNIPPET_MAX);
    Some(String::from_utf8_lossy(&stderr[..end]).into_owned())
}

// ---------------------------------------------------------------------------
// Output parsing
// ---------------------------------------------------------------------------

fn parse_text_output(stdout: &str) -> (String, Vec<String>, Option<Value>) {
    let text = stdout.trim().to_owned();
    let tokens = tokenize(&text).into_iter().collect();
    (text, tokens, None)
}

/// Extract text and tokens from the recognizer's JSON output.
///
/// Text comes from the top-level `text` field, falling back to concatenated
/// `segments[].text`.  Tokens come from word-level fields when present
/// (`words[].word`, or `segments[].words[].word`), else from the text.
/// Malformed JSON yields empty text and tokens rather than an error.
fn parse_json_output(stdout: &str) -> (String, Vec<String>, Option<Value>) {
    let value: Value = match serde_json::from_str(stdout.trim()) {
        Ok(v) => v,
        Err(e) => {
            log::warn!("{SUBPROCESS_ENGINE_NAME}: malformed JSON output ({e}); treating as empty");
            return (String::new(), Vec::new(), None);
        }
    };

    let text = match value.get("text").and_then(Value::as_str) {
        Some(t) => t.trim().to_owned(),
        None => segment_texts(&value).join(" ").trim().to_owned(),
    };

    let mut word_fields: Vec<String> = Vec::new();
    collect_words(value.get("words"), &mut word_fields);
    if word_fields.is_empty() {
        if let Some(segments) = value.get("segments").and_then(Value::as_array) {
            for seg in segments {
                collect_words(seg.get("words"), &mut word_fields);
            }
        }
    }

    let tokens: Vec<String> = if word_fields.is_empty() {
        tokenize(&text).into_iter().collect()
    } else {
        let mut set = std::collections::BTreeSet::new();
        for w in &word_fields {
            set.extend(tokenize(w));
        }
        set.into_iter().collect()
    };

    (text, tokens, Some(value))
}

fn segment_texts(value: &Value) -> Vec<String> {
    value
        .get("segments")
        .and_then(Value::as_array)
        .map(|segs| {
            segs.iter()
                .filter_map(|s| s.get("text").and_then(Value::as_str))
                .map(|t| t.trim().to_owned())
                .collect()
        })
        .unwrap_or_default()
}

fn collect_words(words: Option<&Value>, out: &mut Vec<String>) {
    if let Some(words) = words.and_then(Value::as_array) {
        for w in words {
            if let Some(word) = w.get("word").and_then(Value::as_str) {
                out.push(word.to_owned());
            }
        }
    }
}

/// Confidence from the JSON output: top-level `confidence`, else the mean of
/// word-level `probability` fields.
fn json_confidence(value: &Value) -> Option<f32> {
    if let Some(c) = value.get("confidence").and_then(Value::as_f64) {
        return Some(c as f32);
    }

    let mut sum = 0.0f64;
    let mut count = 0usize;
    let mut visit = |words: Option<&Value>| {
        if let Some(words) = words.and_then(Value::as_array) {
            for w in words {
                if let Some(p) = w.get("probability").and_then(Value::as_f64) {
                    sum += p;
                    count += 1;
                }
            }
        }
    };
    visit(value.get("words"));
    if let Some(segments) = value.get("segments").and_then(Value::as_array) {
        for seg in segments {
            visit(seg.get("words"));
        }
    }

    (count > 0).then(|| (sum / count as f64) as f32)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
