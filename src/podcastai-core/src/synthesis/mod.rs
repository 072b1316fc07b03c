//! Speech synthesis service.
//!
//! Turns one utterance into one normalized WAV clip, walking an ordered
//! chain of backends until one succeeds. Failures never escape as errors:
//! they come back as a failed [`AudioSegment`].

mod backend;
#[cfg(feature = "kokoro")]
mod kokoro;

pub use backend::{CommandBackend, SynthesisBackend, SynthesisRequest};
#[cfg(feature = "kokoro")]
pub use kokoro::KokoroBackend;

use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{debug, warn};

use crate::audio::normalize_wav;
use crate::catalog::VoiceId;
use crate::config::{BackendConfig, SynthesisConfig};
use crate::error::{PodcastError, SynthesisError};

/// Characters the command-line synthesizers choke on.
const UNSAFE_CHARS: &[char] = &['.', '!', '?', ',', '。', '！', '？', '，'];

/// Strip whitespace and sentence punctuation (Latin and CJK).
pub fn sanitize_for_synthesis(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_whitespace() && !UNSAFE_CHARS.contains(c))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SegmentStatus {
    Ok { backend: String },
    Failed { reason: String },
}

/// Outcome of synthesizing one utterance.
#[derive(Debug, Clone)]
pub struct AudioSegment {
    pub turn: usize,
    pub speaker: String,
    /// Normalized clip; `None` when synthesis failed.
    pub path: Option<PathBuf>,
    pub duration: Duration,
    pub status: SegmentStatus,
}

impl AudioSegment {
    pub fn is_ok(&self) -> bool {
        matches!(self.status, SegmentStatus::Ok { .. })
    }

    fn failed(turn: usize, speaker: &str, reason: String) -> Self {
        Self {
            turn,
            speaker: speaker.to_string(),
            path: None,
            duration: Duration::ZERO,
            status: SegmentStatus::Failed { reason },
        }
    }
}

/// Ordered fallback chain with a per-attempt timeout.
pub struct SpeechSynthesizer {
    backends: Vec<Box<dyn SynthesisBackend>>,
    timeout: Duration,
    sample_rate: u32,
}

impl SpeechSynthesizer {
    pub fn new(backends: Vec<Box<dyn SynthesisBackend>>, timeout: Duration, sample_rate: u32) -> Self {
        Self {
            backends,
            timeout,
            sample_rate,
        }
    }

    pub async fn from_config(config: &SynthesisConfig) -> Result<Self, PodcastError> {
        Ok(Self::new(
            build_backends(config).await?,
            config.timeout(),
            config.sample_rate,
        ))
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn backend_names(&self) -> Vec<&str> {
        self.backends.iter().map(|b| b.name()).collect()
    }

    /// Synthesize one utterance into `work_dir/turn_{turn:04}.wav`.
    pub async fn synthesize(
        &self,
        turn: usize,
        speaker: &str,
        text: &str,
        voice: &VoiceId,
        work_dir: &Path,
    ) -> AudioSegment {
        let sanitized = sanitize_for_synthesis(text);
        if sanitized.is_empty() {
            warn!("Turn {} has no speakable text, skipping synthesis", turn);
            return AudioSegment::failed(turn, speaker, SynthesisError::EmptyText.to_string());
        }

        let clip = work_dir.join(format!("turn_{:04}.wav", turn));
        let mut reasons = Vec::with_capacity(self.backends.len());

        for (index, backend) in self.backends.iter().enumerate() {
            let input = if backend.sanitizes_text() {
                sanitized.as_str()
            } else {
                text.trim()
            };
            let attempt_dir = work_dir.join(format!("turn_{:04}_{}", turn, index));

            match self.attempt(backend.as_ref(), input, voice, &attempt_dir, &clip).await {
                Ok(duration) => {
                    debug!(
                        "Turn {} synthesized by {} ({:.2}s)",
                        turn,
                        backend.name(),
                        duration.as_secs_f64()
                    );
                    return AudioSegment {
                        turn,
                        speaker: speaker.to_string(),
                        path: Some(clip),
                        duration,
                        status: SegmentStatus::Ok {
                            backend: backend.name().to_string(),
                        },
                    };
                }
                Err(e) => {
                    warn!("Turn {}: backend {} failed: {}", turn, backend.name(), e);
                    reasons.push(format!("{}: {}", backend.name(), e));
                }
            }
        }

        if reasons.is_empty() {
            reasons.push("no synthesis backends configured".to_string());
        }
        AudioSegment::failed(turn, speaker, reasons.join("; "))
    }

    async fn attempt(
        &self,
        backend: &dyn SynthesisBackend,
        text: &str,
        voice: &VoiceId,
        attempt_dir: &Path,
        clip: &Path,
    ) -> Result<Duration, SynthesisError> {
        tokio::fs::create_dir_all(attempt_dir).await?;

        let request = SynthesisRequest {
            text,
            voice,
            output_dir: attempt_dir,
        };
        let result = match tokio::time::timeout(self.timeout, backend.synthesize(&request)).await {
            Ok(Ok(raw)) => normalize_wav(&raw, clip, self.sample_rate),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(SynthesisError::Timeout {
                backend: backend.name().to_string(),
                millis: self.timeout.as_millis(),
            }),
        };

        if let Err(e) = tokio::fs::remove_dir_all(attempt_dir).await {
            debug!("Could not remove {}: {}", attempt_dir.display(), e);
        }
        result
    }
}

/// Instantiate the configured fallback chain in order.
pub async fn build_backends(
    config: &SynthesisConfig,
) -> Result<Vec<Box<dyn SynthesisBackend>>, PodcastError> {
    let mut backends: Vec<Box<dyn SynthesisBackend>> = Vec::with_capacity(config.backends.len());
    for entry in &config.backends {
        match entry {
            BackendConfig::Command {
                name,
                program,
                args,
                produces,
                sanitize,
            } => backends.push(Box::new(
                CommandBackend::new(name.clone(), program.clone())
                    .with_args(args.iter().cloned())
                    .with_produces(produces.clone())
                    .with_sanitize(*sanitize),
            )),
            #[cfg(feature = "kokoro")]
            BackendConfig::Kokoro {
                voices,
                default_voice,
            } => backends.push(Box::new(
                KokoroBackend::new(voices.clone(), default_voice.clone()).await?,
            )),
            #[cfg(not(feature = "kokoro"))]
            BackendConfig::Kokoro { .. } => {
                return Err(PodcastError::ConfigError(
                    "the kokoro backend requires building with the `kokoro` feature".to_string(),
                ));
            }
        }
    }
    Ok(backends)
}
