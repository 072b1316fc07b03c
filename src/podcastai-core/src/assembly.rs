//! Audio assembly: merges per-turn clips into the final artifact.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use chrono::{DateTime, Local, TimeDelta};
use log::{debug, info, warn};
use regex::Regex;
use serde::Serialize;

use crate::audio::{combine_audio_segments, read_wav_mono, resample, samples_duration, write_wav};
use crate::config::AssemblyConfig;
use crate::error::PodcastError;
use crate::synthesis::AudioSegment;

/// Timestamp layout shared by artifact names and lookups.
const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";
/// How many later seconds to try when the artifact name is already taken.
const MAX_NAME_ATTEMPTS: i64 = 60;

static ARTIFACT_SUFFIX: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^\d{8}_\d{6}\.[A-Za-z0-9]+$").ok());

/// The finished podcast. Ownership passes to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct PodcastAudio {
    pub path: PathBuf,
    pub duration_secs: f64,
    pub byte_size: u64,
    pub created_at: DateTime<Local>,
    /// Turns whose audio could not be produced, ascending.
    pub skipped_turns: Vec<usize>,
    /// Number of utterances in the transcript.
    pub utterances: usize,
}

impl PodcastAudio {
    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.duration_secs)
    }
}

/// Concatenates clips by turn index and cleans up after itself.
#[derive(Debug, Clone)]
pub struct AudioAssembler {
    output_dir: PathBuf,
    gap_seconds: f32,
    extension: String,
    sample_rate: u32,
}

impl AudioAssembler {
    pub fn new(config: &AssemblyConfig, sample_rate: u32) -> Self {
        Self {
            output_dir: config.output_dir.clone(),
            gap_seconds: config.gap_seconds,
            extension: config.extension.clone(),
            sample_rate,
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn assemble(
        &self,
        segments: Vec<AudioSegment>,
        identity: &str,
    ) -> Result<PodcastAudio, PodcastError> {
        self.assemble_at(segments, identity, Local::now())
    }

    /// Merge `segments` in turn order into `{identity}_{timestamp}.{ext}`.
    ///
    /// Failed segments are omitted and listed in `skipped_turns`. Every
    /// per-turn file is deleted whether or not the merge succeeds.
    pub fn assemble_at(
        &self,
        mut segments: Vec<AudioSegment>,
        identity: &str,
        timestamp: DateTime<Local>,
    ) -> Result<PodcastAudio, PodcastError> {
        segments.sort_by_key(|s| s.turn);
        let utterances = segments.len();

        let mut skipped_turns = Vec::new();
        let mut clips = Vec::new();

        for segment in &segments {
            let Some(path) = segment.path.as_ref().filter(|_| segment.is_ok()) else {
                warn!("Skipping turn {} ({}): no audio", segment.turn, segment.speaker);
                skipped_turns.push(segment.turn);
                continue;
            };
            match read_wav_mono(path) {
                Ok((samples, rate)) => clips.push(resample(samples, rate, self.sample_rate)),
                Err(e) => {
                    warn!("Skipping turn {}: unreadable clip {}: {}", segment.turn, path.display(), e);
                    skipped_turns.push(segment.turn);
                }
            }
        }

        let result = if clips.is_empty() {
            Err(PodcastError::EmptyPodcast {
                attempted: utterances,
            })
        } else {
            self.write_artifact(clips, identity, timestamp, skipped_turns, utterances)
        };

        remove_segment_files(&segments);
        result
    }

    fn write_artifact(
        &self,
        clips: Vec<Vec<f32>>,
        identity: &str,
        timestamp: DateTime<Local>,
        skipped_turns: Vec<usize>,
        utterances: usize,
    ) -> Result<PodcastAudio, PodcastError> {
        fs::create_dir_all(&self.output_dir)?;

        let merged = combine_audio_segments(clips, self.gap_seconds, self.sample_rate);
        let staged = tempfile::Builder::new()
            .prefix(".podcast-")
            .suffix(".partial")
            .tempfile_in(&self.output_dir)?;
        write_wav(staged.path(), &merged, self.sample_rate)?;
        let (path, timestamp) = self.publish(staged, identity, timestamp)?;

        let byte_size = fs::metadata(&path)?.len();
        let duration = samples_duration(merged.len(), self.sample_rate);
        info!(
            "Podcast written to {} ({:.1}s, {} skipped turn(s))",
            path.display(),
            duration.as_secs_f64(),
            skipped_turns.len()
        );

        Ok(PodcastAudio {
            path,
            duration_secs: duration.as_secs_f64(),
            byte_size,
            created_at: timestamp,
            skipped_turns,
            utterances,
        })
    }

    /// Move the staged file to its final name without replacing an existing
    /// artifact. A taken name moves the timestamp forward one second.
    fn publish(
        &self,
        mut staged: tempfile::NamedTempFile,
        identity: &str,
        timestamp: DateTime<Local>,
    ) -> Result<(PathBuf, DateTime<Local>), PodcastError> {
        let mut last = None;
        for offset in 0..MAX_NAME_ATTEMPTS {
            let stamp = timestamp + TimeDelta::seconds(offset);
            let path = self
                .output_dir
                .join(artifact_file_name(identity, &stamp, &self.extension));
            match staged.persist_noclobber(&path) {
                Ok(_) => return Ok((path, stamp)),
                Err(e) if e.error.kind() == ErrorKind::AlreadyExists => {
                    debug!("{} already exists, trying the next second", path.display());
                    staged = e.file;
                    last = Some(path);
                }
                Err(e) => return Err(e.error.into()),
            }
        }
        Err(PodcastError::ArtifactExists(
            last.unwrap_or_else(|| self.output_dir.clone()),
        ))
    }
}

fn remove_segment_files(segments: &[AudioSegment]) {
    for path in segments.iter().filter_map(|s| s.path.as_ref()) {
        if let Err(e) = fs::remove_file(path) {
            debug!("Could not remove {}: {}", path.display(), e);
        }
    }
}

/// Keep identities filesystem-safe: `[A-Za-z0-9_-]`, everything else becomes `_`.
fn sanitize_identity(identity: &str) -> String {
    let sanitized: String = identity
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();

    if sanitized.is_empty() {
        "anonymous".to_string()
    } else {
        sanitized
    }
}

/// `{identity}_{YYYYMMDD}_{HHMMSS}.{ext}`, sortable by recency per identity.
pub fn artifact_file_name(identity: &str, timestamp: &DateTime<Local>, extension: &str) -> String {
    format!(
        "{}_{}.{}",
        sanitize_identity(identity),
        timestamp.format(TIMESTAMP_FORMAT),
        extension
    )
}

/// Most recent artifact for `identity` in `dir`, by file name.
pub fn latest_artifact<P: AsRef<Path>>(dir: P, identity: &str) -> Option<PathBuf> {
    let prefix = format!("{}_", sanitize_identity(identity));
    let suffix = ARTIFACT_SUFFIX.as_ref()?;

    fs::read_dir(dir.as_ref())
        .ok()?
        .filter_map(Result::ok)
        .filter_map(|entry| {
            let name = entry.file_name().to_str()?.to_string();
            let rest = name.strip_prefix(&prefix)?;
            suffix.is_match(rest).then(|| (name.clone(), entry.path()))
        })
        .max_by(|a, b| a.0.cmp(&b.0))
        .map(|(_, path)| path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthesis::SegmentStatus;
    use chrono::TimeZone;

    const RATE: u32 = 1_000;

    fn timestamp() -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 3, 14, 9, 26, 53).unwrap()
    }

    fn assembler(dir: &Path, gap_seconds: f32) -> AudioAssembler {
        let config = AssemblyConfig {
            output_dir: dir.join("out"),
            gap_seconds,
            extension: "wav".to_string(),
        };
        AudioAssembler::new(&config, RATE)
    }

    fn ok_segment(dir: &Path, turn: usize, level: f32, len: usize) -> AudioSegment {
        let path = dir.join(format!("turn_{:04}.wav", turn));
        write_wav(&path, &vec![level; len], RATE).unwrap();
        AudioSegment {
            turn,
            speaker: format!("S{}", turn),
            path: Some(path),
            duration: samples_duration(len, RATE),
            status: SegmentStatus::Ok {
                backend: "fake".to_string(),
            },
        }
    }

    fn failed_segment(turn: usize) -> AudioSegment {
        AudioSegment {
            turn,
            speaker: format!("S{}", turn),
            path: None,
            duration: Duration::ZERO,
            status: SegmentStatus::Failed {
                reason: "all backends failed".to_string(),
            },
        }
    }

    #[test]
    fn test_concatenates_by_turn_not_completion_order() {
        let dir = tempfile::tempdir().unwrap();
        let segments = vec![
            ok_segment(dir.path(), 3, 0.75, 10),
            ok_segment(dir.path(), 1, 0.25, 10),
            ok_segment(dir.path(), 2, 0.5, 10),
        ];

        let audio = assembler(dir.path(), 0.0)
            .assemble_at(segments, "alice", timestamp())
            .unwrap();

        let (samples, _) = read_wav_mono(&audio.path).unwrap();
        assert_eq!(samples.len(), 30);
        assert_eq!(samples[0], 0.25);
        assert_eq!(samples[10], 0.5);
        assert_eq!(samples[20], 0.75);
        assert!(audio.skipped_turns.is_empty());
        assert_eq!(audio.utterances, 3);
        assert!((audio.duration_secs - 0.03).abs() < 1e-9);
    }

    #[test]
    fn test_failed_turn_is_omitted_and_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let first = ok_segment(dir.path(), 1, 0.25, 10);
        let third = ok_segment(dir.path(), 3, 0.75, 10);
        let temp_paths = vec![first.path.clone().unwrap(), third.path.clone().unwrap()];

        let audio = assembler(dir.path(), 0.0)
            .assemble_at(vec![third, failed_segment(2), first], "alice", timestamp())
            .unwrap();

        assert_eq!(audio.skipped_turns, vec![2]);
        let (samples, _) = read_wav_mono(&audio.path).unwrap();
        assert_eq!(samples.len(), 20);
        assert_eq!(samples[9], 0.25);
        assert_eq!(samples[10], 0.75);

        for path in temp_paths {
            assert!(!path.exists());
        }
        assert_eq!(
            audio.path.file_name().unwrap().to_str().unwrap(),
            "alice_20260314_092653.wav"
        );
        assert_eq!(audio.byte_size, fs::metadata(&audio.path).unwrap().len());
    }

    #[test]
    fn test_same_second_runs_never_overwrite_each_other() {
        let dir = tempfile::tempdir().unwrap();
        let assembler = assembler(dir.path(), 0.0);

        let first = assembler
            .assemble_at(vec![ok_segment(dir.path(), 1, 0.25, 10)], "alice", timestamp())
            .unwrap();
        let second = assembler
            .assemble_at(vec![ok_segment(dir.path(), 1, 0.75, 10)], "alice", timestamp())
            .unwrap();

        assert_ne!(first.path, second.path);
        assert_eq!(
            second.path.file_name().unwrap().to_str().unwrap(),
            "alice_20260314_092654.wav"
        );
        assert_eq!(second.created_at, timestamp() + TimeDelta::seconds(1));

        let (samples, _) = read_wav_mono(&first.path).unwrap();
        assert_eq!(samples[0], 0.25);
        let (samples, _) = read_wav_mono(&second.path).unwrap();
        assert_eq!(samples[0], 0.75);

        // No staging files left behind.
        let names: Vec<String> = fs::read_dir(dir.path().join("out"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names.len(), 2);
        assert_eq!(
            latest_artifact(dir.path().join("out"), "alice"),
            Some(second.path.clone())
        );
    }

    #[test]
    fn test_all_failed_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let err = assembler(dir.path(), 0.0)
            .assemble_at(vec![failed_segment(1), failed_segment(2)], "alice", timestamp())
            .unwrap_err();

        assert!(matches!(err, PodcastError::EmptyPodcast { attempted: 2 }));
        assert!(!dir.path().join("out").exists());
    }

    #[test]
    fn test_gap_only_between_successful_clips() {
        let dir = tempfile::tempdir().unwrap();
        let segments = vec![
            ok_segment(dir.path(), 1, 0.25, 10),
            failed_segment(2),
            ok_segment(dir.path(), 3, 0.75, 10),
        ];

        let audio = assembler(dir.path(), 0.005)
            .assemble_at(segments, "alice", timestamp())
            .unwrap();

        let (samples, _) = read_wav_mono(&audio.path).unwrap();
        assert_eq!(samples.len(), 25);
        assert_eq!(&samples[10..15], &[0.0; 5]);
    }

    #[test]
    fn test_artifact_file_name_layout() {
        assert_eq!(
            artifact_file_name("alice", &timestamp(), "wav"),
            "alice_20260314_092653.wav"
        );
        assert_eq!(
            artifact_file_name("bob smith/../x", &timestamp(), "wav"),
            "bob_smith____x_20260314_092653.wav"
        );
        assert_eq!(
            artifact_file_name("  ", &timestamp(), "wav"),
            "anonymous_20260314_092653.wav"
        );
    }

    #[test]
    fn test_latest_artifact_per_identity() {
        let dir = tempfile::tempdir().unwrap();
        for name in [
            "alice_20260101_080000.wav",
            "alice_20260314_092653.wav",
            "alice_20251231_235959.wav",
            "alice_x_20270101_000000.wav",
            "bob_20270101_000000.wav",
            "alice_20270101_000000.wav.partial",
        ] {
            fs::write(dir.path().join(name), b"x").unwrap();
        }

        assert_eq!(
            latest_artifact(dir.path(), "alice"),
            Some(dir.path().join("alice_20260314_092653.wav"))
        );
        assert_eq!(
            latest_artifact(dir.path(), "bob"),
            Some(dir.path().join("bob_20270101_000000.wav"))
        );
        assert_eq!(latest_artifact(dir.path(), "carol"), None);
        assert_eq!(latest_artifact(dir.path().join("missing"), "alice"), None);
    }
}
