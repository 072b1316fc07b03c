//! The input of one pipeline run.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::character::Character;
use crate::config::DialogueConfig;
use crate::error::PodcastError;

/// Topic, guests and length of a podcast to generate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PodcastRequest {
    pub topic: String,
    /// Speaking order within every round.
    pub characters: Vec<Character>,
    pub rounds: u32,
    /// Model name passed to the conversational-AI provider.
    pub model: String,
}

impl PodcastRequest {
    pub fn new(
        topic: impl Into<String>,
        characters: Vec<Character>,
        rounds: u32,
        model: impl Into<String>,
    ) -> Self {
        Self {
            topic: topic.into(),
            characters,
            rounds,
            model: model.into(),
        }
    }

    /// Total number of utterances the dialogue will contain.
    pub fn turn_count(&self) -> usize {
        self.rounds as usize * self.characters.len()
    }

    /// Check the request against the configured bounds.
    pub fn validate(&self, limits: &DialogueConfig) -> Result<(), PodcastError> {
        if self.topic.trim().is_empty() {
            return Err(PodcastError::InvalidRequest(
                "topic cannot be empty".to_string(),
            ));
        }

        let count = self.characters.len();
        if count < limits.min_participants || count > limits.max_participants {
            return Err(PodcastError::InvalidRequest(format!(
                "expected {}-{} characters, got {}",
                limits.min_participants, limits.max_participants, count
            )));
        }

        if self.rounds < limits.min_rounds || self.rounds > limits.max_rounds {
            return Err(PodcastError::InvalidRequest(format!(
                "expected {}-{} rounds, got {}",
                limits.min_rounds, limits.max_rounds, self.rounds
            )));
        }

        if self.model.trim().is_empty() {
            return Err(PodcastError::InvalidRequest(
                "model cannot be empty".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for character in &self.characters {
            let name = character.name.trim();
            if name.is_empty() {
                return Err(PodcastError::InvalidRequest(
                    "every character needs a name".to_string(),
                ));
            }
            if !seen.insert(name) {
                return Err(PodcastError::InvalidRequest(format!(
                    "character name '{}' is used more than once",
                    name
                )));
            }
        }

        Ok(())
    }
}
