//! Pipeline controller: dialogue, voices, synthesis, assembly.

use std::collections::HashMap;
use std::fs;
use std::sync::{Arc, RwLock};

use futures_util::stream::{self, StreamExt};
use log::{info, warn};

use crate::assembly::{AudioAssembler, PodcastAudio};
use crate::cancel::CancelSignal;
use crate::catalog::{VoiceCatalog, VoiceCombination, VoiceId};
use crate::character::{AgeBand, Character, Gender};
use crate::config::Config;
use crate::error::PodcastError;
use crate::orchestrator::{ConversationCallback, ConversationOrchestrator};
use crate::provider::ChatProvider;
use crate::request::PodcastRequest;
use crate::seed::{CandidateChooser, RandomChooser, SeedAssignments, SeedResolver};
use crate::synthesis::{AudioSegment, SpeechSynthesizer};

/// One configured pipeline. Each `generate` call is an independent run.
pub struct PodcastPipeline {
    config: Config,
    provider: Arc<dyn ChatProvider>,
    catalog: RwLock<Arc<VoiceCatalog>>,
    synthesizer: SpeechSynthesizer,
    assembler: AudioAssembler,
    chooser: Arc<dyn CandidateChooser>,
    callback: Option<ConversationCallback>,
}

impl PodcastPipeline {
    pub fn new(
        config: Config,
        provider: Arc<dyn ChatProvider>,
        catalog: VoiceCatalog,
        synthesizer: SpeechSynthesizer,
    ) -> Self {
        let assembler = AudioAssembler::new(&config.assembly, synthesizer.sample_rate());
        Self {
            config,
            provider,
            catalog: RwLock::new(Arc::new(catalog)),
            synthesizer,
            assembler,
            chooser: Arc::new(RandomChooser),
            callback: None,
        }
    }

    /// Build the catalog and backend chain described by `config`.
    pub async fn from_config(
        config: Config,
        provider: Arc<dyn ChatProvider>,
    ) -> Result<Self, PodcastError> {
        let catalog = match &config.catalog.path {
            Some(path) => VoiceCatalog::load(path)?,
            None => VoiceCatalog::builtin(),
        };
        info!("Voice catalog ready: {} voice(s)", catalog.len());

        let synthesizer = SpeechSynthesizer::from_config(&config.synthesis).await?;
        info!("Synthesis chain: {}", synthesizer.backend_names().join(" -> "));

        Ok(Self::new(config, provider, catalog, synthesizer))
    }

    /// Replace the random tie-break, e.g. with a deterministic chooser.
    pub fn with_chooser(mut self, chooser: Arc<dyn CandidateChooser>) -> Self {
        self.chooser = chooser;
        self
    }

    /// Set a callback for conversation events.
    pub fn with_callback(mut self, callback: ConversationCallback) -> Self {
        self.callback = Some(callback);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Swap in a new catalog. Runs already in progress keep their snapshot.
    pub fn reload_catalog(&self, catalog: VoiceCatalog) {
        let mut current = self.catalog.write().unwrap_or_else(|e| e.into_inner());
        *current = Arc::new(catalog);
        info!("Voice catalog reloaded: {} voice(s)", current.len());
    }

    /// Snapshot of the current catalog.
    pub fn catalog(&self) -> Arc<VoiceCatalog> {
        self.catalog
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn list_voice_combinations(&self, gender: Option<Gender>) -> Vec<VoiceCombination> {
        self.catalog().combinations(gender)
    }

    pub fn preview_candidates(&self, gender: Gender, age: AgeBand, style: &str) -> Vec<VoiceId> {
        self.catalog()
            .candidates(gender, age, style)
            .iter()
            .map(|c| c.id.clone())
            .collect()
    }

    /// Run the whole pipeline for one request.
    ///
    /// Per-utterance synthesis failures are recorded as skipped turns; every
    /// other failure aborts the run.
    pub async fn generate(
        &self,
        request: &PodcastRequest,
        identity: &str,
        cancel: &CancelSignal,
    ) -> Result<PodcastAudio, PodcastError> {
        request.validate(&self.config.dialogue)?;

        let history = match &self.config.seeds.history_path {
            Some(path) => SeedAssignments::load(path)?,
            None => SeedAssignments::default(),
        };
        let resolver =
            SeedResolver::new(self.catalog(), self.chooser.clone()).with_history(history.clone());

        // Catalog gaps are configuration errors; find them before spending AI calls.
        for character in &request.characters {
            resolver.check(character)?;
        }

        let mut orchestrator =
            ConversationOrchestrator::new(self.config.dialogue.clone(), self.provider.clone());
        if let Some(ref callback) = self.callback {
            orchestrator = orchestrator.with_callback(callback.clone());
        }
        let transcript = orchestrator.run(request, cancel).await?;
        info!("Dialogue complete: {} utterance(s)", transcript.len());

        let characters: HashMap<&str, &Character> = request
            .characters
            .iter()
            .map(|c| (c.name.as_str(), c))
            .collect();
        let mut jobs = Vec::with_capacity(transcript.len());
        for utterance in &transcript {
            let character = characters.get(utterance.speaker.as_str()).ok_or_else(|| {
                PodcastError::InvalidRequest(format!("unknown speaker '{}'", utterance.speaker))
            })?;
            jobs.push((utterance, resolver.resolve(character)?));
        }

        fs::create_dir_all(self.assembler.output_dir())?;
        let work_dir = tempfile::Builder::new()
            .prefix(".podcast-")
            .tempdir_in(self.assembler.output_dir())?;
        let work_path = work_dir.path();

        let concurrency = self.config.synthesis.concurrency.max(1);
        info!(
            "Synthesizing {} utterance(s), {} at a time",
            jobs.len(),
            concurrency
        );
        let results: Vec<Option<AudioSegment>> = stream::iter(jobs)
            .map(move |(utterance, voice)| async move {
                if cancel.is_cancelled() {
                    return None;
                }
                Some(
                    self.synthesizer
                        .synthesize(
                            utterance.turn,
                            &utterance.speaker,
                            &utterance.text,
                            &voice,
                            work_path,
                        )
                        .await,
                )
            })
            .buffer_unordered(concurrency)
            .collect()
            .await;

        if cancel.is_cancelled() {
            warn!("Generation cancelled during synthesis");
            return Err(PodcastError::Cancelled);
        }
        let segments: Vec<AudioSegment> = results.into_iter().flatten().collect();

        let assembler = self.assembler.clone();
        let identity = identity.to_string();
        let audio = tokio::task::spawn_blocking(move || assembler.assemble(segments, &identity))
            .await
            .map_err(|e| PodcastError::Io(std::io::Error::other(e.to_string())))??;

        if let Err(e) = work_dir.close() {
            warn!("Could not remove synthesis work directory: {}", e);
        }

        if let Some(path) = &self.config.seeds.history_path {
            let mut updated = history;
            updated.merge(resolver.assignments());
            if let Err(e) = updated.save(path) {
                warn!("Could not save voice history to {}: {}", path.display(), e);
            }
        }

        Ok(audio)
    }
}
