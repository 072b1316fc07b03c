//! In-process synthesis with kokoro-tiny.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use kokoro_tiny::TtsEngine;
use log::debug;

use super::backend::{SynthesisBackend, SynthesisRequest};
use crate::audio::write_wav;
use crate::error::{PodcastError, SynthesisError};

const KOKORO_SAMPLE_RATE: u32 = 24_000;
/// Kokoro has a strict input limit; longer text is synthesized in chunks.
const MAX_CHUNK_CHARS: usize = 200;
/// 0.3 s pause between chunks.
const CHUNK_PAUSE_SAMPLES: usize = 7_200;

pub struct KokoroBackend {
    engine: Arc<Mutex<TtsEngine>>,
    voices: HashMap<String, String>,
    default_voice: String,
}

impl KokoroBackend {
    /// Initialize the engine (downloads the model on first run).
    pub async fn new(
        voices: HashMap<String, String>,
        default_voice: String,
    ) -> Result<Self, PodcastError> {
        let engine = TtsEngine::new().await.map_err(|e| {
            PodcastError::ConfigError(format!("Failed to initialize kokoro: {}", e))
        })?;

        let available = engine.voices();
        for voice in voices.values().chain(std::iter::once(&default_voice)) {
            if !available.contains(voice) {
                return Err(PodcastError::ConfigError(format!(
                    "Unknown kokoro voice '{}'",
                    voice
                )));
            }
        }

        Ok(Self {
            engine: Arc::new(Mutex::new(engine)),
            voices,
            default_voice,
        })
    }

    fn kokoro_voice(&self, voice: &str) -> String {
        self.voices
            .get(voice)
            .cloned()
            .unwrap_or_else(|| self.default_voice.clone())
    }
}

#[async_trait]
impl SynthesisBackend for KokoroBackend {
    fn name(&self) -> &str {
        "kokoro"
    }

    fn sanitizes_text(&self) -> bool {
        false
    }

    async fn synthesize(&self, request: &SynthesisRequest<'_>) -> Result<PathBuf, SynthesisError> {
        let engine = self.engine.clone();
        let voice = self.kokoro_voice(request.voice.as_str());
        let chunks = split_into_chunks(request.text, MAX_CHUNK_CHARS);
        let output = request.output_dir.join("kokoro.wav");
        let target = output.clone();
        debug!("[kokoro] {} chunk(s) with voice {}", chunks.len(), voice);

        tokio::task::spawn_blocking(move || {
            let mut engine = engine
                .lock()
                .map_err(|_| SynthesisError::Backend("kokoro engine poisoned".to_string()))?;

            let mut samples = Vec::new();
            for chunk in chunks {
                let audio = engine
                    .synthesize(&chunk, Some(voice.as_str()))
                    .map_err(|e| SynthesisError::Backend(format!("Synthesis failed: {}", e)))?;
                samples.extend(audio);
                samples.extend(vec![0.0; CHUNK_PAUSE_SAMPLES]);
            }

            write_wav(&target, &samples, KOKORO_SAMPLE_RATE)
                .map_err(|e| SynthesisError::InvalidAudio(e.to_string()))
        })
        .await
        .map_err(|e| SynthesisError::Backend(format!("kokoro task failed: {}", e)))??;

        Ok(output)
    }
}

/// Split text into chunks that are safe for kokoro.
fn split_into_chunks(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current_chunk = String::new();

    for sentence in text.split_inclusive(&['.', '!', '?', ';', '。', '！', '？'][..]) {
        let sentence = sentence.trim();
        if sentence.is_empty() {
            continue;
        }

        if current_chunk.len() + sentence.len() > max_chars && !current_chunk.is_empty() {
            chunks.push(current_chunk.trim().to_string());
            current_chunk.clear();
        }

        if sentence.len() > max_chars {
            // Over-long sentence: fall back to commas.
            for part in sentence.split_inclusive(&[',', '，'][..]) {
                if current_chunk.len() + part.len() > max_chars && !current_chunk.is_empty() {
                    chunks.push(current_chunk.trim().to_string());
                    current_chunk.clear();
                }
                current_chunk.push_str(part);
                current_chunk.push(' ');
            }
        } else {
            current_chunk.push_str(sentence);
            current_chunk.push(' ');
        }
    }

    if !current_chunk.trim().is_empty() {
        chunks.push(current_chunk.trim().to_string());
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_into_chunks() {
        let text = "Hello world. This is a test. Another sentence here.";
        let chunks = split_into_chunks(text, 30);
        assert!(chunks.len() >= 2);
        for chunk in &chunks {
            assert!(chunk.len() <= 35);
        }
        assert_eq!(chunks.join(" "), text);
    }

    #[test]
    fn test_long_sentence_split_on_commas() {
        let text = "one, two, three, four, five, six, seven, eight, nine, ten.";
        let chunks = split_into_chunks(text, 20);
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| !c.is_empty()));
    }
}
