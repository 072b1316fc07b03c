//! Configuration module for loading TOML config files.

use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::PodcastError;

/// Root configuration structure. Every section has defaults, so an empty
/// document is a valid configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub dialogue: DialogueConfig,
    pub catalog: CatalogConfig,
    pub synthesis: SynthesisConfig,
    pub assembly: AssemblyConfig,
    pub seeds: SeedsConfig,
}

/// Turn-taking limits, retry policy and prompt templates.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DialogueConfig {
    pub min_participants: usize,
    pub max_participants: usize,
    pub min_rounds: u32,
    pub max_rounds: u32,
    /// Attempts per turn, including the first one.
    pub max_attempts: u32,
    pub base_backoff_ms: u64,
    pub rate_limit_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub request_timeout_secs: u64,
    pub max_tokens: u32,
    pub temperature: f32,
    pub prompts: PromptsConfig,
}

impl Default for DialogueConfig {
    fn default() -> Self {
        Self {
            min_participants: 2,
            max_participants: 6,
            min_rounds: 3,
            max_rounds: 12,
            max_attempts: 3,
            base_backoff_ms: 1000,
            rate_limit_backoff_ms: 4000,
            max_backoff_ms: 30_000,
            request_timeout_secs: 120,
            max_tokens: 300,
            temperature: 0.7,
            prompts: PromptsConfig::default(),
        }
    }
}

impl DialogueConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// System and per-turn prompt templates.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PromptsConfig {
    pub persona_template: String,
    pub turn_template: String,
}

impl Default for PromptsConfig {
    fn default() -> Self {
        Self {
            persona_template: DEFAULT_PERSONA_PROMPT.to_string(),
            turn_template: DEFAULT_TURN_PROMPT.to_string(),
        }
    }
}

impl PromptsConfig {
    /// Render the system prompt for one character.
    pub fn persona_prompt(&self, name: &str, topic: &str, persona: &str, others: &str) -> String {
        self.persona_template
            .replace("{name}", name)
            .replace("{topic}", topic)
            .replace("{persona}", persona)
            .replace("{others}", others)
    }

    /// Render the instruction appended to the transcript for one turn.
    pub fn turn_prompt(&self, name: &str, topic: &str, round: u32, total_rounds: u32) -> String {
        self.turn_template
            .replace("{name}", name)
            .replace("{topic}", topic)
            .replace("{round}", &round.to_string())
            .replace("{total_rounds}", &total_rounds.to_string())
    }
}

/// Where the voice catalog document lives.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Falls back to the built-in catalog when unset.
    pub path: Option<PathBuf>,
}

/// Speech synthesis settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
    /// Tried in order until one produces valid audio.
    pub backends: Vec<BackendConfig>,
    pub timeout_secs: u64,
    pub concurrency: usize,
    /// Sample rate of the normalized per-turn clips.
    pub sample_rate: u32,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            backends: vec![
                BackendConfig::Command {
                    name: "chattts".to_string(),
                    program: "chattts".to_string(),
                    args: vec!["-s".to_string(), "{voice}".to_string(), "{text}".to_string()],
                    produces: Some("tts.wav".to_string()),
                    sanitize: true,
                },
                // Reads raw text: argv is never shell-expanded, and stripping
                // whitespace would run every word together.
                BackendConfig::Command {
                    name: "espeak-ng".to_string(),
                    program: "espeak-ng".to_string(),
                    args: vec!["-w".to_string(), "{output}".to_string(), "{text}".to_string()],
                    produces: None,
                    sanitize: false,
                },
            ],
            timeout_secs: 120,
            concurrency: 1,
            sample_rate: 24_000,
        }
    }
}

impl SynthesisConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// One entry of the synthesis fallback chain.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BackendConfig {
    /// External program invoked with an argument vector.
    Command {
        name: String,
        program: String,
        #[serde(default)]
        args: Vec<String>,
        /// Fixed file name the tool writes into its working directory.
        #[serde(default)]
        produces: Option<String>,
        /// Strip whitespace and sentence punctuation before invoking the program.
        /// Set to `false` for engines that need word boundaries; the text is
        /// still passed as a single argument, never through a shell.
        #[serde(default = "default_true")]
        sanitize: bool,
    },
    /// In-process kokoro-tiny engine (requires the `kokoro` feature).
    Kokoro {
        #[serde(default)]
        voices: HashMap<String, String>,
        #[serde(default = "default_kokoro_voice")]
        default_voice: String,
    },
}

fn default_true() -> bool {
    true
}

fn default_kokoro_voice() -> String {
    "af_sky".to_string()
}

/// Final artifact settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AssemblyConfig {
    pub output_dir: PathBuf,
    /// Silence inserted between consecutive successful utterances.
    pub gap_seconds: f32,
    pub extension: String,
}

impl Default for AssemblyConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("generated_audio"),
            gap_seconds: 0.0,
            extension: "wav".to_string(),
        }
    }
}

/// Persistence of voice assignments across runs.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SeedsConfig {
    pub history_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, PodcastError> {
        let content = fs::read_to_string(path.as_ref())
            .map_err(|e| PodcastError::ConfigError(format!("Failed to read config: {}", e)))?;

        Self::from_str(&content)
    }

    /// Load configuration from string content.
    pub fn from_str(content: &str) -> Result<Self, PodcastError> {
        let config: Config = toml::from_str(content)
            .map_err(|e| PodcastError::ConfigError(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), PodcastError> {
        let d = &self.dialogue;
        if d.min_participants < 2 || d.min_participants > d.max_participants {
            return Err(PodcastError::ConfigError(format!(
                "participant bounds {}..={} are invalid",
                d.min_participants, d.max_participants
            )));
        }
        if d.min_rounds == 0 || d.min_rounds > d.max_rounds {
            return Err(PodcastError::ConfigError(format!(
                "round bounds {}..={} are invalid",
                d.min_rounds, d.max_rounds
            )));
        }
        if d.max_attempts == 0 {
            return Err(PodcastError::ConfigError(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        if self.synthesis.backends.is_empty() {
            return Err(PodcastError::ConfigError(
                "at least one synthesis backend is required".to_string(),
            ));
        }
        if self.synthesis.concurrency == 0 || self.synthesis.sample_rate == 0 {
            return Err(PodcastError::ConfigError(
                "synthesis concurrency and sample_rate must be positive".to_string(),
            ));
        }
        // Clips are always written as PCM WAV.
        if !self.assembly.extension.eq_ignore_ascii_case("wav") {
            return Err(PodcastError::ConfigError(format!(
                "unsupported output extension '{}'",
                self.assembly.extension
            )));
        }
        Ok(())
    }
}

const DEFAULT_PERSONA_PROMPT: &str = r#"You are {name}, a guest on a spoken podcast.

PODCAST TOPIC: {topic}

WHO YOU ARE:
{persona}

OTHER GUESTS: {others}

CONVERSATION RULES:
- Stay fully in character and never mention being an AI
- React to what the other guests just said before adding your own point
- Keep each turn to a few spoken sentences
- Let your personality and background shape your opinions

CRITICAL OUTPUT RULES:
- Output ONLY the words you say out loud
- Do NOT prefix your reply with your name
- Do NOT include stage directions, parentheses, asterisks or markdown
"#;

const DEFAULT_TURN_PROMPT: &str =
    "[Round {round} of {total_rounds}] It is your turn, {name}. Continue the conversation about {topic}.";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = Config::from_str("").unwrap();
        assert_eq!(config.dialogue.min_participants, 2);
        assert_eq!(config.dialogue.max_participants, 6);
        assert_eq!(config.dialogue.max_attempts, 3);
        assert_eq!(config.synthesis.backends.len(), 2);
        assert_eq!(config.assembly.extension, "wav");
    }

    #[test]
    fn test_backend_chain_parses_in_order() {
        let config = Config::from_str(
            r#"
            [synthesis]
            timeout_secs = 30

            [[synthesis.backends]]
            kind = "command"
            name = "primary"
            program = "chattts"
            args = ["-s", "{voice}", "{text}"]
            produces = "tts.wav"

            [[synthesis.backends]]
            kind = "kokoro"
            default_voice = "bf_emma"
            "#,
        )
        .unwrap();

        assert_eq!(config.synthesis.timeout(), Duration::from_secs(30));
        match &config.synthesis.backends[0] {
            BackendConfig::Command { name, sanitize, .. } => {
                assert_eq!(name, "primary");
                assert!(*sanitize);
            }
            other => panic!("unexpected backend {:?}", other),
        }
        assert!(matches!(
            config.synthesis.backends[1],
            BackendConfig::Kokoro { .. }
        ));
    }

    #[test]
    fn test_invalid_round_bounds_rejected() {
        let err = Config::from_str("[dialogue]\nmin_rounds = 8\nmax_rounds = 4\n").unwrap_err();
        assert!(matches!(err, PodcastError::ConfigError(_)));
    }

    #[test]
    fn test_prompt_placeholders_replaced() {
        let prompts = PromptsConfig::default();
        let system = prompts.persona_prompt("Ada", "Tea", "Ada is curious.", "Bo");
        assert!(system.contains("You are Ada"));
        assert!(system.contains("PODCAST TOPIC: Tea"));
        assert!(system.contains("OTHER GUESTS: Bo"));
        assert!(!system.contains('{'));

        let turn = prompts.turn_prompt("Ada", "Tea", 2, 5);
        assert!(turn.starts_with("[Round 2 of 5]"));
    }
}
