//! PodcastAI Core Library
//!
//! Provides the multi-character dialogue orchestration, per-character voice
//! selection, speech synthesis with fallbacks and audio assembly.

pub mod assembly;
pub mod audio;
pub mod cancel;
pub mod catalog;
pub mod character;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod pipeline;
pub mod provider;
pub mod request;
pub mod seed;
pub mod synthesis;
pub mod transcript;

pub use assembly::{AudioAssembler, PodcastAudio, artifact_file_name, latest_artifact};
pub use cancel::CancelSignal;
pub use catalog::{VoiceCandidate, VoiceCatalog, VoiceCombination, VoiceId};
pub use character::{AgeBand, Character, Gender};
pub use config::Config;
pub use error::{PodcastError, ProviderError, SynthesisError};
pub use orchestrator::{ConversationCallback, ConversationEvent, ConversationOrchestrator};
pub use pipeline::PodcastPipeline;
pub use provider::{ChatProvider, OpenAiProvider, PersonaContext};
pub use request::PodcastRequest;
pub use seed::{CandidateChooser, FirstChooser, RandomChooser, SeedAssignments, SeedResolver};
pub use synthesis::{
    AudioSegment, CommandBackend, SegmentStatus, SpeechSynthesizer, SynthesisBackend,
    SynthesisRequest, sanitize_for_synthesis,
};
pub use transcript::{Transcript, Utterance};
