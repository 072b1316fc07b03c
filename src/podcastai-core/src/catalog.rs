//! Voice catalog: (gender, age band, style) to candidate synthetic voices.
//!
//! The catalog is read-only once built. Reloading means building a new
//! catalog and swapping it in between runs.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::character::{AgeBand, Character, Gender};
use crate::error::PodcastError;

/// Opaque identifier of a synthetic voice timbre (a "seed").
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct VoiceId(String);

impl VoiceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VoiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for VoiceId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Exact-match key into the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VoiceKey {
    pub gender: Gender,
    pub age: AgeBand,
    /// Trimmed and lowercased.
    pub style: String,
}

impl VoiceKey {
    pub fn new(gender: Gender, age: AgeBand, style: &str) -> Self {
        Self {
            gender,
            age,
            style: normalize_style(style),
        }
    }

    pub fn for_character(character: &Character) -> Self {
        Self::new(character.gender, character.age, &character.style)
    }
}

/// Style tags are compared case-insensitively, ignoring surrounding whitespace.
pub fn normalize_style(style: &str) -> String {
    style.trim().to_ascii_lowercase()
}

/// One selectable voice.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct VoiceCandidate {
    pub id: VoiceId,
    pub description: String,
}

/// Summary row for one (age band, style) combination of a gender.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct VoiceCombination {
    pub gender: Gender,
    pub age: AgeBand,
    pub style: String,
    pub candidates: usize,
}

/// A single record of the catalog document.
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogRecord {
    pub id: String,
    pub gender: Gender,
    pub age: AgeBand,
    pub style: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Deserialize)]
struct CatalogDocument {
    #[serde(default)]
    voices: Vec<CatalogRecord>,
}

/// In-memory voice table.
#[derive(Debug, Clone, Default)]
pub struct VoiceCatalog {
    entries: BTreeMap<VoiceKey, Vec<VoiceCandidate>>,
}

impl VoiceCatalog {
    /// Load a catalog document from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, PodcastError> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            PodcastError::ConfigError(format!(
                "Failed to read voice catalog {:?}: {}",
                path.as_ref(),
                e
            ))
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse a catalog document.
    pub fn from_toml_str(content: &str) -> Result<Self, PodcastError> {
        let document: CatalogDocument = toml::from_str(content).map_err(|e| {
            PodcastError::ConfigError(format!("Failed to parse voice catalog: {}", e))
        })?;
        Self::from_records(document.voices)
    }

    /// Build a catalog, rejecting empty IDs and duplicates within a triple.
    pub fn from_records(records: Vec<CatalogRecord>) -> Result<Self, PodcastError> {
        let mut entries: BTreeMap<VoiceKey, Vec<VoiceCandidate>> = BTreeMap::new();
        let mut seen = HashSet::new();

        for record in records {
            let id = record.id.trim();
            if id.is_empty() {
                return Err(PodcastError::ConfigError(
                    "voice catalog entry with an empty id".to_string(),
                ));
            }
            if normalize_style(&record.style).is_empty() {
                return Err(PodcastError::ConfigError(format!(
                    "voice '{}' has an empty style",
                    id
                )));
            }

            let key = VoiceKey::new(record.gender, record.age, &record.style);
            if !seen.insert((key.clone(), id.to_string())) {
                return Err(PodcastError::ConfigError(format!(
                    "voice '{}' listed twice for {} {} {}",
                    id, key.gender, key.age, key.style
                )));
            }

            entries.entry(key).or_default().push(VoiceCandidate {
                id: VoiceId::new(id),
                description: record.description,
            });
        }

        Ok(Self { entries })
    }

    /// The catalog shipped with the binary, used when no document is configured.
    pub fn builtin() -> Self {
        let mut entries: BTreeMap<VoiceKey, Vec<VoiceCandidate>> = BTreeMap::new();
        for (id, gender, age, style, description) in BUILTIN_VOICES {
            entries
                .entry(VoiceKey::new(*gender, *age, style))
                .or_default()
                .push(VoiceCandidate {
                    id: VoiceId::new(*id),
                    description: description.to_string(),
                });
        }
        Self { entries }
    }

    /// All candidates for an exact (gender, age band, style) triple.
    pub fn candidates(&self, gender: Gender, age: AgeBand, style: &str) -> &[VoiceCandidate] {
        self.entries
            .get(&VoiceKey::new(gender, age, style))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn candidates_for(&self, character: &Character) -> &[VoiceCandidate] {
        self.candidates(character.gender, character.age, &character.style)
    }

    /// Distinct (age band, style) combinations, optionally restricted to one gender.
    pub fn combinations(&self, gender: Option<Gender>) -> Vec<VoiceCombination> {
        self.entries
            .iter()
            .filter(|(key, _)| gender.is_none_or(|g| key.gender == g))
            .map(|(key, candidates)| VoiceCombination {
                gender: key.gender,
                age: key.age,
                style: key.style.clone(),
                candidates: candidates.len(),
            })
            .collect()
    }

    /// Total number of (triple, voice) pairs.
    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

const BUILTIN_VOICES: &[(&str, Gender, AgeBand, &str, &str)] = &[
    ("111", Gender::Male, AgeBand::Young, "literary", "young man, literary and soft-spoken"),
    ("333", Gender::Male, AgeBand::Young, "gentle", "young man, gentle and considerate"),
    ("666", Gender::Male, AgeBand::Middle, "professional", "middle-aged man, white-collar professional"),
    ("7777", Gender::Male, AgeBand::Middle, "hongkong", "middle-aged man, Hong Kong film style"),
    ("9999", Gender::Male, AgeBand::Middle, "deep", "middle-aged man, deep and resonant"),
    ("2", Gender::Female, AgeBand::Young, "emotional", "young woman, emotionally rich"),
    ("2", Gender::Female, AgeBand::Young, "warm", "young woman, warm and expressive"),
    ("2002", Gender::Female, AgeBand::Young, "warm", "young woman, bright and friendly"),
    ("2003", Gender::Female, AgeBand::Young, "warm", "young woman, soft and caring"),
    ("4", Gender::Female, AgeBand::Middle, "heartfelt", "middle-aged woman, deeply emotional"),
    ("1111", Gender::Female, AgeBand::Middle, "clear", "middle-aged woman, clear and pure"),
    ("3333", Gender::Female, AgeBand::Middle, "calm", "middle-aged woman, calm and serene"),
];

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"
        [[voices]]
        id = "2"
        gender = "female"
        age = "young"
        style = "warm"
        description = "young woman, warm"

        [[voices]]
        id = "2002"
        gender = "female"
        age = "young"
        style = "Warm "

        [[voices]]
        id = "666"
        gender = "male"
        age = "middle-aged"
        style = "professional"
    "#;

    #[test]
    fn test_document_groups_candidates_by_triple() {
        let catalog = VoiceCatalog::from_toml_str(DOC).unwrap();
        let ids: Vec<&str> = catalog
            .candidates(Gender::Female, AgeBand::Young, "warm")
            .iter()
            .map(|c| c.id.as_str())
            .collect();
        assert_eq!(ids, vec!["2", "2002"]);
        assert_eq!(catalog.len(), 3);
    }

    #[test]
    fn test_match_is_exact_on_all_three_fields() {
        let catalog = VoiceCatalog::from_toml_str(DOC).unwrap();
        assert!(catalog.candidates(Gender::Male, AgeBand::Young, "warm").is_empty());
        assert!(catalog.candidates(Gender::Female, AgeBand::Middle, "warm").is_empty());
        assert!(catalog.candidates(Gender::Female, AgeBand::Young, "war").is_empty());
        assert_eq!(
            catalog
                .candidates(Gender::Male, AgeBand::Middle, "PROFESSIONAL")
                .len(),
            1
        );
    }

    #[test]
    fn test_duplicate_voice_in_triple_rejected() {
        let doc = r#"
            [[voices]]
            id = "2"
            gender = "female"
            age = "young"
            style = "warm"

            [[voices]]
            id = "2"
            gender = "female"
            age = "young"
            style = "warm"
        "#;
        assert!(matches!(
            VoiceCatalog::from_toml_str(doc),
            Err(PodcastError::ConfigError(_))
        ));
    }

    #[test]
    fn test_combinations_filtered_by_gender() {
        let catalog = VoiceCatalog::builtin();
        let female = catalog.combinations(Some(Gender::Female));
        assert!(female.iter().all(|c| c.gender == Gender::Female));

        let warm = female
            .iter()
            .find(|c| c.age == AgeBand::Young && c.style == "warm")
            .unwrap();
        assert_eq!(warm.candidates, 3);

        let all = catalog.combinations(None);
        assert!(all.len() > female.len());
    }

    #[test]
    fn test_builtin_catalog_has_warm_young_female_voices() {
        let catalog = VoiceCatalog::builtin();
        let ids: Vec<&str> = catalog
            .candidates(Gender::Female, AgeBand::Young, "warm")
            .iter()
            .map(|c| c.id.as_str())
            .collect();
        assert_eq!(ids, vec!["2", "2002", "2003"]);
    }
}
