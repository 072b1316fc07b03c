//! Podcast character definitions.
//!
//! A character is both a persona for the dialogue model and a
//! (gender, age band, style) key into the voice catalog.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Voice gender used for catalog matching.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    #[serde(alias = "男", alias = "男性")]
    Male,
    #[serde(alias = "女", alias = "女性")]
    Female,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
        }
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Gender {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "male" | "m" | "男" | "男性" => Ok(Gender::Male),
            "female" | "f" | "女" | "女性" => Ok(Gender::Female),
            other => Err(format!("unknown gender '{}', expected male or female", other)),
        }
    }
}

/// Coarse age classification. Only used to pick a voice.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum AgeBand {
    #[serde(alias = "年轻")]
    Young,
    #[serde(alias = "middle-aged", alias = "中年")]
    Middle,
    #[serde(alias = "old", alias = "mature", alias = "其他")]
    Other,
}

impl AgeBand {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgeBand::Young => "young",
            AgeBand::Middle => "middle",
            AgeBand::Other => "other",
        }
    }
}

impl fmt::Display for AgeBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgeBand {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "young" | "年轻" => Ok(AgeBand::Young),
            "middle" | "middle-aged" | "中年" => Ok(AgeBand::Middle),
            "other" | "old" | "mature" | "其他" => Ok(AgeBand::Other),
            other => Err(format!(
                "unknown age band '{}', expected young, middle or other",
                other
            )),
        }
    }
}

/// A podcast guest. Immutable for the duration of a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Character {
    /// Unique name within a request; also the key for voice consistency.
    pub name: String,
    pub gender: Gender,
    pub age: AgeBand,
    /// Voice style tag drawn from the catalog (e.g. "warm").
    pub style: String,
    #[serde(default)]
    pub personality: String,
    #[serde(default)]
    pub background: String,
}

impl Character {
    /// Create a character with the fields needed for voice matching.
    pub fn new(
        name: impl Into<String>,
        gender: Gender,
        age: AgeBand,
        style: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            gender,
            age,
            style: style.into(),
            personality: String::new(),
            background: String::new(),
        }
    }

    pub fn with_personality(mut self, personality: impl Into<String>) -> Self {
        self.personality = personality.into();
        self
    }

    pub fn with_background(mut self, background: impl Into<String>) -> Self {
        self.background = background.into();
        self
    }

    /// Fold the character's attributes into a natural-language persona.
    pub fn persona_description(&self) -> String {
        let age = match self.age {
            AgeBand::Young => "young",
            AgeBand::Middle => "middle-aged",
            AgeBand::Other => "seasoned",
        };
        let mut persona = format!(
            "{} is a {} {} speaker with a {} way of talking.",
            self.name,
            age,
            self.gender,
            self.style.trim()
        );
        if !self.personality.trim().is_empty() {
            persona.push_str(&format!(" Personality: {}.", self.personality.trim()));
        }
        if !self.background.trim().is_empty() {
            persona.push_str(&format!(" Background: {}", self.background.trim()));
        }
        persona
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gender_parsing_accepts_aliases() {
        assert_eq!("Female".parse::<Gender>().unwrap(), Gender::Female);
        assert_eq!("男性".parse::<Gender>().unwrap(), Gender::Male);
        assert!("robot".parse::<Gender>().is_err());
    }

    #[test]
    fn test_age_band_parsing_accepts_aliases() {
        assert_eq!("middle-aged".parse::<AgeBand>().unwrap(), AgeBand::Middle);
        assert_eq!("old".parse::<AgeBand>().unwrap(), AgeBand::Other);
        assert_eq!("年轻".parse::<AgeBand>().unwrap(), AgeBand::Young);
        assert!("ancient".parse::<AgeBand>().is_err());
    }

    #[test]
    fn test_persona_description_folds_all_fields() {
        let host = Character::new("Ada", Gender::Female, AgeBand::Young, "warm")
            .with_personality("curious")
            .with_background("Runs a small robotics lab.");
        let persona = host.persona_description();

        assert!(persona.starts_with("Ada is a young female speaker"));
        assert!(persona.contains("warm"));
        assert!(persona.contains("Personality: curious."));
        assert!(persona.contains("robotics lab"));
    }

    #[test]
    fn test_persona_description_skips_empty_fields() {
        let guest = Character::new("Bo", Gender::Male, AgeBand::Other, "deep");
        let persona = guest.persona_description();
        assert!(!persona.contains("Personality"));
        assert!(!persona.contains("Background"));
    }

    #[test]
    fn test_character_deserializes_with_aliases() {
        let guest: Character = toml::from_str(
            r#"
            name = "Lin"
            gender = "女性"
            age = "middle-aged"
            style = "calm"
            "#,
        )
        .unwrap();
        assert_eq!(guest.gender, Gender::Female);
        assert_eq!(guest.age, AgeBand::Middle);
        assert!(guest.personality.is_empty());
    }
}
