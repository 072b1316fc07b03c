//! Dialogue transcript produced by the orchestrator.

use serde::{Deserialize, Serialize};

/// One character's line, tagged with its 1-based turn index.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Utterance {
    pub turn: usize,
    pub round: u32,
    pub speaker: String,
    pub text: String,
}

/// Ordered, append-only sequence of utterances.
///
/// Only the orchestrator appends; everyone downstream reads.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Transcript {
    utterances: Vec<Utterance>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(
        &mut self,
        speaker: impl Into<String>,
        round: u32,
        text: impl Into<String>,
    ) -> &Utterance {
        let turn = self.utterances.len() + 1;
        self.utterances.push(Utterance {
            turn,
            round,
            speaker: speaker.into(),
            text: text.into(),
        });
        &self.utterances[turn - 1]
    }

    pub fn utterances(&self) -> &[Utterance] {
        &self.utterances
    }

    pub fn iter(&self) -> impl Iterator<Item = &Utterance> {
        self.utterances.iter()
    }

    pub fn len(&self) -> usize {
        self.utterances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.utterances.is_empty()
    }

    /// Speaker names in turn order.
    pub fn speakers(&self) -> Vec<&str> {
        self.utterances.iter().map(|u| u.speaker.as_str()).collect()
    }

    /// Plain-text rendering, one `Speaker: text` line per utterance.
    pub fn render(&self) -> String {
        self.utterances
            .iter()
            .map(|u| format!("{}: {}", u.speaker, u.text))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl<'a> IntoIterator for &'a Transcript {
    type Item = &'a Utterance;
    type IntoIter = std::slice::Iter<'a, Utterance>;

    fn into_iter(self) -> Self::IntoIter {
        self.utterances.iter()
    }
}
