//! Subprocess-backed STT/TTS providers: whisper.cpp for transcription,
//! piper for synthesis. Both pipe their payload over stdin and read the
//! result from stdout, the same pattern regardless of which binary is
//! wrapped.

use crate::error::VoiceError;
use crate::providers::{SttProvider, TtsProvider};
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Maximum audio input size for STT (10 MiB). Prevents OOM from oversized payloads.
const MAX_STT_INPUT_BYTES: usize = 10 * 1024 * 1024;
/// Maximum text input size for TTS (64 KiB). Prevents resource exhaustion from
/// oversized synthesis requests.
const MAX_TTS_INPUT_BYTES: usize = 64 * 1024;

const STT_TIMEOUT: Duration = Duration::from_secs(120);
const TTS_TIMEOUT: Duration = Duration::from_secs(60);

/// Wraps a whisper.cpp-compatible binary invoked as `<binary> -m <model> -f -`,
/// reading raw audio from stdin and a plain-text transcript from stdout.
#[derive(Debug, Clone)]
pub struct SubprocessSttProvider {
    binary_path: PathBuf,
    model_path: PathBuf,
}

impl SubprocessSttProvider {
    pub fn new(binary_path: impl Into<PathBuf>, model_path: impl Into<PathBuf>) -> Self {
        Self {
            binary_path: binary_path.into(),
            model_path: model_path.into(),
        }
    }
}

#[async_trait]
impl SttProvider for SubprocessSttProvider {
    async fn transcribe(&self, audio: &[u8]) -> Result<String, VoiceError> {
        if audio.len() > MAX_STT_INPUT_BYTES {
            return Err(VoiceError::ProviderIo(format!(
                "audio data exceeds maximum size: {} bytes (limit: {} bytes)",
                audio.len(),
                MAX_STT_INPUT_BYTES
            )));
        }

        let mut child = Command::new(&self.binary_path)
            .arg("-m")
            .arg(&self.model_path)
            .arg("-f")
            .arg("-")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| VoiceError::ProviderIo(format!("failed to spawn STT binary: {e}")))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| VoiceError::ProviderIo("failed to open STT stdin".to_string()))?;
        stdin
            .write_all(audio)
            .await
            .map_err(|e| VoiceError::ProviderIo(format!("failed to write STT stdin: {e}")))?;
        drop(stdin);

        let output = tokio::time::timeout(STT_TIMEOUT, child.wait_with_output())
            .await
            .map_err(|_| VoiceError::ProviderIo("STT process timed out".to_string()))?
            .map_err(|e| VoiceError::ProviderIo(format!("failed to read STT output: {e}")))?;

        if !output.status.success() {
            return Err(VoiceError::ProviderIo(format!(
                "STT binary failed: {}",
                String::from_utf8_lossy(&output.stderr)
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

/// Wraps a piper-compatible binary invoked as
/// `<binary> --model <model> --output_raw --length_scale <scale>`,
/// writing text to stdin and reading raw PCM (s16le) from stdout.
#[derive(Debug, Clone)]
pub struct SubprocessTtsProvider {
    binary_path: PathBuf,
    model_path: PathBuf,
    length_scale: f32,
}

impl SubprocessTtsProvider {
    pub fn new(binary_path: impl Into<PathBuf>, model_path: impl Into<PathBuf>) -> Self {
        Self {
            binary_path: binary_path.into(),
            model_path: model_path.into(),
            length_scale: 1.0,
        }
    }

    pub fn with_speed(mut self, speed: f32) -> Self {
        self.length_scale = 1.0 / speed.max(0.01);
        self
    }
}

#[async_trait]
impl TtsProvider for SubprocessTtsProvider {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, VoiceError> {
        if text.len() > MAX_TTS_INPUT_BYTES {
            return Err(VoiceError::ProviderIo(format!(
                "text exceeds maximum size: {} bytes (limit: {} bytes)",
                text.len(),
                MAX_TTS_INPUT_BYTES
            )));
        }

        let mut child = Command::new(&self.binary_path)
            .arg("--model")
            .arg(&self.model_path)
            .arg("--output_raw")
            .arg("--length_scale")
            .arg(self.length_scale.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| VoiceError::ProviderIo(format!("failed to spawn TTS binary: {e}")))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| VoiceError::ProviderIo("failed to open TTS stdin".to_string()))?;
        let text_owned = text.to_string();
        let write_task = tokio::spawn(async move { stdin.write_all(text_owned.as_bytes()).await });

        let output = tokio::time::timeout(TTS_TIMEOUT, child.wait_with_output())
            .await
            .map_err(|_| VoiceError::ProviderIo("TTS process timed out".to_string()))?
            .map_err(|e| VoiceError::ProviderIo(format!("failed to read TTS output: {e}")))?;

        match write_task.await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                return Err(VoiceError::ProviderIo(format!(
                    "failed to write TTS stdin: {e}"
                )))
            }
            Err(e) => return Err(VoiceError::ProviderIo(format!("TTS stdin task failed: {e}"))),
        }

        if !output.status.success() {
            return Err(VoiceError::ProviderIo(format!(
                "TTS binary failed: {}",
                String::from_utf8_lossy(&output.stderr)
            )));
        }

        Ok(output.stdout)
    }
}
