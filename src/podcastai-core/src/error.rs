//! Error types for the podcast pipeline.

use std::path::PathBuf;

use async_openai::error::OpenAIError;
use thiserror::Error;

use crate::character::{AgeBand, Gender};

/// Failure reported by the conversational-AI collaborator for one call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// Worth retrying: network trouble, timeouts, overloaded upstream, empty replies.
    #[error("transient provider failure: {0}")]
    Transient(String),

    /// The upstream asked us to slow down.
    #[error("provider rate limit reached: {0}")]
    RateLimited(String),

    /// Retrying will not help (bad credentials, unknown model, malformed request).
    #[error("provider rejected the request: {0}")]
    Fatal(String),
}

impl ProviderError {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ProviderError::Fatal(_))
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ProviderError::RateLimited(_))
    }
}

impl From<OpenAIError> for ProviderError {
    fn from(err: OpenAIError) -> Self {
        match err {
            OpenAIError::Reqwest(e) => ProviderError::Transient(e.to_string()),
            OpenAIError::ApiError(api) => classify_api_message(&api.to_string()),
            other => ProviderError::Fatal(other.to_string()),
        }
    }
}

/// Sort an upstream error message into retry classes.
pub(crate) fn classify_api_message(message: &str) -> ProviderError {
    let lower = message.to_lowercase();
    if lower.contains("rate limit")
        || lower.contains("rate_limit")
        || lower.contains("too many requests")
        || lower.contains("429")
    {
        ProviderError::RateLimited(message.to_string())
    } else if lower.contains("overloaded")
        || lower.contains("server_error")
        || lower.contains("timeout")
        || lower.contains("temporarily unavailable")
        || lower.contains("502")
        || lower.contains("503")
    {
        ProviderError::Transient(message.to_string())
    } else {
        ProviderError::Fatal(message.to_string())
    }
}

/// Failure of a single synthesis attempt. Never escapes the synthesis service;
/// it is logged and recorded on the failed segment.
#[derive(Error, Debug)]
pub enum SynthesisError {
    #[error("text is empty after sanitization")]
    EmptyText,

    #[error("failed to launch '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("backend '{backend}' exited with {status}: {stderr}")]
    Exit {
        backend: String,
        status: String,
        stderr: String,
    },

    #[error("backend '{backend}' timed out after {millis} ms")]
    Timeout { backend: String, millis: u128 },

    #[error("expected output file {0:?} is missing or empty")]
    MissingOutput(PathBuf),

    #[error("invalid audio output: {0}")]
    InvalidAudio(String),

    #[error("backend error: {0}")]
    Backend(String),

    #[error("I/O error during synthesis: {0}")]
    Io(#[from] std::io::Error),
}

/// Caller-visible outcome of a failed pipeline run.
#[derive(Error, Debug)]
pub enum PodcastError {
    #[error("Invalid podcast request: {0}")]
    InvalidRequest(String),

    #[error("Dialogue generation failed for '{speaker}' at turn {turn} after {attempts} attempt(s): {source}")]
    DialogueGeneration {
        speaker: String,
        turn: usize,
        attempts: u32,
        source: ProviderError,
    },

    #[error("Rate limited while generating turn {turn} for '{speaker}' after {attempts} attempt(s); try again later")]
    RateLimited {
        speaker: String,
        turn: usize,
        attempts: u32,
    },

    #[error("No catalog voice matches '{character}' (gender: {gender}, age: {age}, style: {style})")]
    NoMatchingVoice {
        character: String,
        gender: Gender,
        age: AgeBand,
        style: String,
    },

    #[error("All {attempted} utterance(s) failed synthesis; no podcast was written")]
    EmptyPodcast { attempted: usize },

    #[error("Podcast file {0:?} already exists and was not replaced")]
    ArtifactExists(PathBuf),

    #[error("Generation was cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Audio error: {0}")]
    Audio(#[from] hound::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_rate_limit_messages() {
        assert!(classify_api_message("Rate limit reached for gpt-4o").is_rate_limited());
        assert!(classify_api_message("HTTP 429 Too Many Requests").is_rate_limited());
    }

    #[test]
    fn test_classify_transient_and_fatal_messages() {
        assert_eq!(
            classify_api_message("The server is overloaded"),
            ProviderError::Transient("The server is overloaded".to_string())
        );
        let fatal = classify_api_message("Incorrect API key provided");
        assert!(!fatal.is_retryable());
    }
}
