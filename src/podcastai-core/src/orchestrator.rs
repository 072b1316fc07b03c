//! Conversation orchestration logic.
//!
//! Runs the round-robin turn loop, threads the transcript through every
//! provider call and applies the retry policy.

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use log::{debug, error, info, warn};
use regex::Regex;

use crate::cancel::CancelSignal;
use crate::config::DialogueConfig;
use crate::error::{PodcastError, ProviderError};
use crate::provider::{ChatProvider, PersonaContext};
use crate::request::PodcastRequest;
use crate::transcript::Transcript;

/// Replies shorter than this are treated as empty and retried.
const MIN_RESPONSE_CHARS: usize = 10;

/// Callback for conversation events.
pub type ConversationCallback = Arc<dyn Fn(ConversationEvent) + Send + Sync>;

/// Events emitted while the dialogue is generated.
#[derive(Debug, Clone)]
pub enum ConversationEvent {
    /// The dialogue is starting.
    RunStart { topic: String, turns: usize },
    /// A character is about to speak.
    TurnStart {
        turn: usize,
        round: u32,
        speaker: String,
    },
    /// A character has spoken.
    Utterance {
        turn: usize,
        speaker: String,
        text: String,
    },
    /// A provider call failed and will be retried after `delay`.
    Retry {
        turn: usize,
        speaker: String,
        attempt: u32,
        delay: Duration,
        rate_limited: bool,
    },
    /// Every turn has been generated.
    RunEnd { utterances: usize },
}

/// Drives the multi-character dialogue.
pub struct ConversationOrchestrator {
    config: DialogueConfig,
    provider: Arc<dyn ChatProvider>,
    callback: Option<ConversationCallback>,
}

impl ConversationOrchestrator {
    pub fn new(config: DialogueConfig, provider: Arc<dyn ChatProvider>) -> Self {
        Self {
            config,
            provider,
            callback: None,
        }
    }

    /// Set a callback for conversation events.
    pub fn with_callback(mut self, callback: ConversationCallback) -> Self {
        self.callback = Some(callback);
        self
    }

    /// Generate the full transcript: `rounds × characters` turns in listed order.
    ///
    /// Fails as a whole if any turn exhausts its retries; partial transcripts
    /// are never returned.
    pub async fn run(
        &self,
        request: &PodcastRequest,
        cancel: &CancelSignal,
    ) -> Result<Transcript, PodcastError> {
        request.validate(&self.config)?;

        let personas = self.build_personas(request);
        let mut transcript = Transcript::new();

        info!(
            "Generating dialogue on '{}': {} character(s), {} round(s)",
            request.topic,
            request.characters.len(),
            request.rounds
        );
        self.emit_event(ConversationEvent::RunStart {
            topic: request.topic.clone(),
            turns: request.turn_count(),
        });

        for round in 1..=request.rounds {
            for (index, character) in request.characters.iter().enumerate() {
                if cancel.is_cancelled() {
                    warn!("Dialogue cancelled before turn {}", transcript.len() + 1);
                    return Err(PodcastError::Cancelled);
                }

                let turn = transcript.len() + 1;
                self.emit_event(ConversationEvent::TurnStart {
                    turn,
                    round,
                    speaker: character.name.clone(),
                });

                let mut persona = personas[index].clone();
                persona.turn_prompt = self.config.prompts.turn_prompt(
                    &character.name,
                    &request.topic,
                    round,
                    request.rounds,
                );

                let text = self.complete_turn(&persona, &transcript, turn).await?;
                debug!("Turn {} ({}): {} chars", turn, character.name, text.len());

                transcript.push(character.name.clone(), round, text.clone());
                self.emit_event(ConversationEvent::Utterance {
                    turn,
                    speaker: character.name.clone(),
                    text,
                });
            }
        }

        self.emit_event(ConversationEvent::RunEnd {
            utterances: transcript.len(),
        });
        Ok(transcript)
    }

    fn build_personas(&self, request: &PodcastRequest) -> Vec<PersonaContext> {
        request
            .characters
            .iter()
            .map(|character| {
                let others = request
                    .characters
                    .iter()
                    .filter(|other| other.name != character.name)
                    .map(|other| other.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", ");

                PersonaContext {
                    speaker: character.name.clone(),
                    model: request.model.clone(),
                    system_prompt: self.config.prompts.persona_prompt(
                        &character.name,
                        &request.topic,
                        &character.persona_description(),
                        &others,
                    ),
                    turn_prompt: String::new(),
                    max_tokens: self.config.max_tokens,
                    temperature: self.config.temperature,
                }
            })
            .collect()
    }

    /// One turn with retries. Each attempt re-issues the identical call; the
    /// transcript is only appended to after success.
    async fn complete_turn(
        &self,
        persona: &PersonaContext,
        transcript: &Transcript,
        turn: usize,
    ) -> Result<String, PodcastError> {
        let max_attempts = self.config.max_attempts.max(1);
        let timeout = self.config.request_timeout();
        let mut attempt = 0;

        loop {
            attempt += 1;

            let outcome =
                match tokio::time::timeout(timeout, self.provider.complete(persona, transcript))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(ProviderError::Transient(format!(
                        "no reply within {:?}",
                        timeout
                    ))),
                };

            let failure = match outcome {
                Ok(raw) => {
                    let text = strip_speaker_prefix(&sanitize_response(&raw), &persona.speaker);
                    if text.chars().count() >= MIN_RESPONSE_CHARS {
                        return Ok(text);
                    }
                    ProviderError::Transient(format!(
                        "empty or too short reply ({} chars)",
                        text.chars().count()
                    ))
                }
                Err(e) => e,
            };

            if !failure.is_retryable() {
                error!(
                    "Turn {} for {} failed permanently: {}",
                    turn, persona.speaker, failure
                );
                return Err(PodcastError::DialogueGeneration {
                    speaker: persona.speaker.clone(),
                    turn,
                    attempts: attempt,
                    source: failure,
                });
            }

            if attempt >= max_attempts {
                error!(
                    "Turn {} for {} exhausted {} attempt(s): {}",
                    turn, persona.speaker, attempt, failure
                );
                return Err(if failure.is_rate_limited() {
                    PodcastError::RateLimited {
                        speaker: persona.speaker.clone(),
                        turn,
                        attempts: attempt,
                    }
                } else {
                    PodcastError::DialogueGeneration {
                        speaker: persona.speaker.clone(),
                        turn,
                        attempts: attempt,
                        source: failure,
                    }
                });
            }

            let rate_limited = failure.is_rate_limited();
            let delay = backoff_delay(&self.config, attempt, rate_limited);
            warn!(
                "[Retry {}/{}] Turn {} for {} failed ({}), retrying in {:?}",
                attempt, max_attempts, turn, persona.speaker, failure, delay
            );
            self.emit_event(ConversationEvent::Retry {
                turn,
                speaker: persona.speaker.clone(),
                attempt,
                delay,
                rate_limited,
            });
            tokio::time::sleep(delay).await;
        }
    }

    /// Emit an event if a callback is registered.
    fn emit_event(&self, event: ConversationEvent) {
        if let Some(ref callback) = self.callback {
            callback(event);
        }
    }
}

/// Exponential backoff after the `attempt`-th failure (1-based).
/// Rate limits start from a longer base; both are capped.
pub fn backoff_delay(config: &DialogueConfig, attempt: u32, rate_limited: bool) -> Duration {
    let base = if rate_limited {
        config.rate_limit_backoff_ms
    } else {
        config.base_backoff_ms
    };
    let factor = 1u64 << attempt.saturating_sub(1).min(16);
    Duration::from_millis(base.saturating_mul(factor).min(config.max_backoff_ms))
}

static REASONING_TAGS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        "thinking",
        "think",
        "reflection",
        "reflect",
        "internal",
        "reasoning",
        "thought",
        "scratch",
        "scratchpad",
        "plan",
        "analysis",
    ]
    .iter()
    .filter_map(|tag| Regex::new(&format!(r"(?is)<{tag}[^>]*>.*?</{tag}>", tag = tag)).ok())
    .collect()
});

static ORPHAN_TAG: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"</?[\w]+[^>]*>").ok());

static STAGE_DIRECTION: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\([^)]*\)|\[[^\]]*\]").ok());

static WHITESPACE: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"\s+").ok());

/// Strip reasoning blocks, tags, stage directions and markdown emphasis from a reply.
pub fn sanitize_response(response: &str) -> String {
    let mut result = response.to_string();

    for re in REASONING_TAGS.iter() {
        result = re.replace_all(&result, "").to_string();
    }
    if let Some(re) = ORPHAN_TAG.as_ref() {
        result = re.replace_all(&result, "").to_string();
    }
    if let Some(re) = STAGE_DIRECTION.as_ref() {
        result = re.replace_all(&result, "").to_string();
    }

    result = result.replace(['*', '#', '_'], "");

    if let Some(re) = WHITESPACE.as_ref() {
        result = re.replace_all(&result, " ").to_string();
    }

    result.trim().to_string()
}

/// Models sometimes echo "Name:" in front of their line.
fn strip_speaker_prefix(text: &str, speaker: &str) -> String {
    for separator in [":", "："] {
        let prefix = format!("{}{}", speaker, separator);
        if let Some(rest) = text.strip_prefix(&prefix) {
            return rest.trim().to_string();
        }
    }
    text.to_string()
}
