//! Voice seed resolution.
//!
//! Picks one catalog voice per character and pins it by character name for
//! the rest of the run, so a speaker can never change voice mid-podcast.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};

use log::{debug, info};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::catalog::{VoiceCandidate, VoiceCatalog, VoiceId};
use crate::character::Character;
use crate::error::PodcastError;

/// Picks one voice among several equally valid candidates.
pub trait CandidateChooser: Send + Sync {
    /// Return an index into `candidates`, which is never empty.
    fn choose(&self, candidates: &[VoiceCandidate]) -> usize;
}

/// Uniform random choice.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomChooser;

impl CandidateChooser for RandomChooser {
    fn choose(&self, candidates: &[VoiceCandidate]) -> usize {
        rand::rng().random_range(0..candidates.len())
    }
}

/// Always the first candidate in catalog order. Useful for reproducible runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct FirstChooser;

impl CandidateChooser for FirstChooser {
    fn choose(&self, _candidates: &[VoiceCandidate]) -> usize {
        0
    }
}

/// Character name to voice assignments remembered across runs.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SeedAssignments {
    assignments: BTreeMap<String, VoiceId>,
}

impl SeedAssignments {
    /// Load from a JSON file. A missing file is an empty history.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, PodcastError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| {
            PodcastError::ConfigError(format!("Failed to parse seed history {:?}: {}", path, e))
        })
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), PodcastError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self).map_err(|e| {
            PodcastError::ConfigError(format!("Failed to serialize seed history: {}", e))
        })?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&VoiceId> {
        self.assignments.get(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, voice: VoiceId) {
        self.assignments.insert(name.into(), voice);
    }

    /// Overlay another set of assignments on top of this one.
    pub fn merge(&mut self, other: SeedAssignments) {
        self.assignments.extend(other.assignments);
    }

    pub fn len(&self) -> usize {
        self.assignments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }
}

/// Per-run resolver. One instance per pipeline run; its cache dies with it.
pub struct SeedResolver {
    catalog: Arc<VoiceCatalog>,
    chooser: Arc<dyn CandidateChooser>,
    history: SeedAssignments,
    cache: Mutex<HashMap<String, VoiceId>>,
}

impl SeedResolver {
    pub fn new(catalog: Arc<VoiceCatalog>, chooser: Arc<dyn CandidateChooser>) -> Self {
        Self {
            catalog,
            chooser,
            history: SeedAssignments::default(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Prefer voices remembered from earlier runs when they still fit.
    pub fn with_history(mut self, history: SeedAssignments) -> Self {
        self.history = history;
        self
    }

    /// Fail fast if the catalog cannot serve this character. Does not touch the cache.
    pub fn check(&self, character: &Character) -> Result<(), PodcastError> {
        if self.catalog.candidates_for(character).is_empty() {
            return Err(no_matching_voice(character));
        }
        Ok(())
    }

    /// Resolve the voice for a character, pinning it by name on first use.
    pub fn resolve(&self, character: &Character) -> Result<VoiceId, PodcastError> {
        // Held across lookup and insert: one assignment per name.
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(voice) = cache.get(&character.name) {
            return Ok(voice.clone());
        }

        let candidates = self.catalog.candidates_for(character);
        if candidates.is_empty() {
            return Err(no_matching_voice(character));
        }

        let remembered = self
            .history
            .get(&character.name)
            .filter(|voice| candidates.iter().any(|c| &c.id == *voice));

        let voice = match remembered {
            Some(voice) => {
                debug!("Reusing remembered voice {} for {}", voice, character.name);
                voice.clone()
            }
            None => {
                let index = self.chooser.choose(candidates).min(candidates.len() - 1);
                let picked = &candidates[index];
                info!(
                    "Picked voice {} ({}) for {} out of {} candidate(s)",
                    picked.id,
                    picked.description,
                    character.name,
                    candidates.len()
                );
                picked.id.clone()
            }
        };

        cache.insert(character.name.clone(), voice.clone());
        Ok(voice)
    }

    /// Snapshot of the assignments made in this run.
    pub fn assignments(&self) -> SeedAssignments {
        let cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        let mut assignments = SeedAssignments::default();
        for (name, voice) in cache.iter() {
            assignments.insert(name.clone(), voice.clone());
        }
        assignments
    }
}

fn no_matching_voice(character: &Character) -> PodcastError {
    PodcastError::NoMatchingVoice {
        character: character.name.clone(),
        gender: character.gender,
        age: character.age,
        style: character.style.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::character::{AgeBand, Gender};
    use std::collections::HashSet;

    fn warm_guest(name: &str) -> Character {
        Character::new(name, Gender::Female, AgeBand::Young, "warm")
    }

    fn resolver(chooser: Arc<dyn CandidateChooser>) -> SeedResolver {
        SeedResolver::new(Arc::new(VoiceCatalog::builtin()), chooser)
    }

    #[test]
    fn test_same_name_resolves_to_same_voice() {
        let resolver = resolver(Arc::new(RandomChooser));
        let guest = warm_guest("Ada");
        let first = resolver.resolve(&guest).unwrap();
        for _ in 0..20 {
            assert_eq!(resolver.resolve(&guest).unwrap(), first);
        }
        assert!(["2", "2002", "2003"].contains(&first.as_str()));
    }

    #[test]
    fn test_cache_is_keyed_by_name_not_triple() {
        let resolver = resolver(Arc::new(FirstChooser));
        let first = resolver.resolve(&warm_guest("Ada")).unwrap();

        // Same name with a different triple keeps the pinned voice.
        let changed = Character::new("Ada", Gender::Male, AgeBand::Middle, "deep");
        assert_eq!(resolver.resolve(&changed).unwrap(), first);
    }

    #[test]
    fn test_random_choice_covers_every_candidate() {
        let catalog = Arc::new(VoiceCatalog::builtin());
        let mut picked = HashSet::new();
        for _ in 0..300 {
            let resolver = SeedResolver::new(catalog.clone(), Arc::new(RandomChooser));
            picked.insert(resolver.resolve(&warm_guest("Ada")).unwrap());
        }
        assert_eq!(picked.len(), 3);
    }

    #[test]
    fn test_no_matching_voice() {
        let resolver = resolver(Arc::new(RandomChooser));
        let guest = Character::new("Zed", Gender::Male, AgeBand::Other, "robotic");

        assert!(matches!(
            resolver.check(&guest),
            Err(PodcastError::NoMatchingVoice { .. })
        ));
        match resolver.resolve(&guest) {
            Err(PodcastError::NoMatchingVoice { character, style, .. }) => {
                assert_eq!(character, "Zed");
                assert_eq!(style, "robotic");
            }
            other => panic!("expected NoMatchingVoice, got {:?}", other),
        }
        assert!(resolver.assignments().is_empty());
    }

    #[test]
    fn test_history_reused_only_when_still_a_candidate() {
        let mut history = SeedAssignments::default();
        history.insert("Ada", VoiceId::from("2003"));
        history.insert("Bo", VoiceId::from("9999"));

        let resolver = resolver(Arc::new(FirstChooser)).with_history(history);
        assert_eq!(resolver.resolve(&warm_guest("Ada")).unwrap().as_str(), "2003");
        // 9999 is not a young/warm/female voice any more, so a fresh pick is made.
        assert_eq!(resolver.resolve(&warm_guest("Bo")).unwrap().as_str(), "2");
    }

    #[test]
    fn test_assignments_round_trip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seeds").join("history.json");

        let resolver = resolver(Arc::new(FirstChooser));
        resolver.resolve(&warm_guest("Ada")).unwrap();
        resolver.assignments().save(&path).unwrap();

        let loaded = SeedAssignments::load(&path).unwrap();
        assert_eq!(loaded.get("Ada").map(VoiceId::as_str), Some("2"));
        assert!(SeedAssignments::load(dir.path().join("missing.json")).unwrap().is_empty());
    }
}
