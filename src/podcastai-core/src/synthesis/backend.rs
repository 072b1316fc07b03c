//! Synthesis backends: anything that turns a line of text into a WAV file.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::LazyLock;

use async_trait::async_trait;
use log::debug;
use regex::{Captures, Regex};
use tokio::process::Command;

use crate::catalog::VoiceId;
use crate::error::SynthesisError;

const DEFAULT_OUTPUT_FILE: &str = "output.wav";
const MAX_STDERR_CHARS: usize = 400;

static PLACEHOLDER: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\{(text|voice|output)\}").ok());

/// One synthesis attempt.
#[derive(Debug, Clone)]
pub struct SynthesisRequest<'a> {
    pub text: &'a str,
    pub voice: &'a VoiceId,
    /// Private to this attempt; the backend may write anything here.
    pub output_dir: &'a Path,
}

#[async_trait]
pub trait SynthesisBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Whether the backend wants text stripped of whitespace and punctuation first.
    fn sanitizes_text(&self) -> bool {
        true
    }

    /// Produce a WAV file and return its path.
    async fn synthesize(&self, request: &SynthesisRequest<'_>) -> Result<PathBuf, SynthesisError>;
}

/// External synthesizer invoked with an argument vector, never through a shell.
///
/// Arguments may contain `{text}`, `{voice}` and `{output}` placeholders. Tools
/// that always write a fixed file into their working directory declare it
/// with `produces`.
#[derive(Debug, Clone)]
pub struct CommandBackend {
    name: String,
    program: String,
    args: Vec<String>,
    produces: Option<String>,
    sanitize: bool,
}

impl CommandBackend {
    pub fn new(name: impl Into<String>, program: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            program: program.into(),
            args: Vec::new(),
            produces: None,
            sanitize: true,
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_produces(mut self, file_name: Option<String>) -> Self {
        self.produces = file_name;
        self
    }

    pub fn with_sanitize(mut self, sanitize: bool) -> Self {
        self.sanitize = sanitize;
        self
    }

    fn output_path(&self, output_dir: &Path) -> PathBuf {
        output_dir.join(self.produces.as_deref().unwrap_or(DEFAULT_OUTPUT_FILE))
    }

    /// Substitute placeholders in a single pass; substituted values are never re-expanded.
    fn render_args(&self, request: &SynthesisRequest<'_>, output: &Path) -> Vec<String> {
        let output = output.to_string_lossy();
        let Some(placeholder) = PLACEHOLDER.as_ref() else {
            return self.args.clone();
        };
        self.args
            .iter()
            .map(|arg| {
                placeholder
                    .replace_all(arg, |caps: &Captures| match &caps[1] {
                        "text" => request.text.to_string(),
                        "voice" => request.voice.as_str().to_string(),
                        _ => output.to_string(),
                    })
                    .into_owned()
            })
            .collect()
    }
}

#[async_trait]
impl SynthesisBackend for CommandBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn sanitizes_text(&self) -> bool {
        self.sanitize
    }

    async fn synthesize(&self, request: &SynthesisRequest<'_>) -> Result<PathBuf, SynthesisError> {
        let output = self.output_path(request.output_dir);
        let args = self.render_args(request, &output);
        debug!("[{}] {} {:?}", self.name, self.program, args);

        let result = Command::new(&self.program)
            .args(&args)
            .current_dir(request.output_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| SynthesisError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if !result.status.success() {
            let stderr: String = String::from_utf8_lossy(&result.stderr)
                .trim()
                .chars()
                .take(MAX_STDERR_CHARS)
                .collect();
            return Err(SynthesisError::Exit {
                backend: self.name.clone(),
                status: result.status.to_string(),
                stderr,
            });
        }

        match tokio::fs::metadata(&output).await {
            Ok(meta) if meta.len() > 0 => Ok(output),
            _ => Err(SynthesisError::MissingOutput(output)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request<'a>(text: &'a str, voice: &'a VoiceId, dir: &'a Path) -> SynthesisRequest<'a> {
        SynthesisRequest {
            text,
            voice,
            output_dir: dir,
        }
    }

    #[test]
    fn test_placeholders_are_rendered_per_argument() {
        let backend = CommandBackend::new("chattts", "chattts").with_args(["-s", "{voice}", "{text}"]);
        let voice = VoiceId::from("2002");
        let dir = Path::new("/tmp/attempt");
        let args = backend.render_args(
            &request("Hello; rm -rf /", &voice, dir),
            &backend.output_path(dir),
        );
        assert_eq!(args, vec!["-s", "2002", "Hello; rm -rf /"]);
    }

    #[test]
    fn test_placeholders_inside_text_stay_literal() {
        let backend = CommandBackend::new("espeak-ng", "espeak-ng")
            .with_args(["-w", "{output}", "--voice={voice}", "{text}"]);
        let voice = VoiceId::from("2002");
        let dir = Path::new("/tmp/attempt");
        let args = backend.render_args(
            &request("say{voice}and{output}", &voice, dir),
            &backend.output_path(dir),
        );
        assert_eq!(
            args,
            vec![
                "-w",
                "/tmp/attempt/output.wav",
                "--voice=2002",
                "say{voice}and{output}"
            ]
        );
    }

    #[tokio::test]
    async fn test_fixed_output_file_in_working_directory() {
        let dir = tempfile::tempdir().unwrap();
        let backend = CommandBackend::new("touchy", "sh")
            .with_args(["-c", "printf RIFF > tts.wav"])
            .with_produces(Some("tts.wav".to_string()));
        let voice = VoiceId::from("1");

        let path = backend
            .synthesize(&request("hi", &voice, dir.path()))
            .await
            .unwrap();
        assert_eq!(path, dir.path().join("tts.wav"));
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let backend = CommandBackend::new("broken", "sh").with_args(["-c", "echo nope >&2; exit 3"]);
        let voice = VoiceId::from("1");

        match backend.synthesize(&request("hi", &voice, dir.path())).await {
            Err(SynthesisError::Exit { backend, stderr, .. }) => {
                assert_eq!(backend, "broken");
                assert_eq!(stderr, "nope");
            }
            other => panic!("expected Exit, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_program_and_missing_output() {
        let dir = tempfile::tempdir().unwrap();
        let voice = VoiceId::from("1");

        let missing = CommandBackend::new("ghost", "definitely-not-a-real-tts-binary");
        assert!(matches!(
            missing.synthesize(&request("hi", &voice, dir.path())).await,
            Err(SynthesisError::Spawn { .. })
        ));

        let silent = CommandBackend::new("silent", "true");
        assert!(matches!(
            silent.synthesize(&request("hi", &voice, dir.path())).await,
            Err(SynthesisError::MissingOutput(_))
        ));
    }
}
