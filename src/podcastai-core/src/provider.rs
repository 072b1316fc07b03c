//! Conversational-AI collaborator.
//!
//! The orchestrator only sees [`ChatProvider`]; [`OpenAiProvider`] talks to
//! any OpenAI-compatible endpoint.

use std::time::Duration;

use async_openai::Client;
use async_openai::config::OpenAIConfig;
use async_openai::types::chat::{
    ChatCompletionRequestAssistantMessage, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessage, ChatCompletionRequestUserMessage,
    CreateChatCompletionRequestArgs,
};
use async_trait::async_trait;

use crate::error::{PodcastError, ProviderError};
use crate::transcript::Transcript;

/// Everything the provider needs to speak as one character for one turn.
#[derive(Debug, Clone)]
pub struct PersonaContext {
    pub speaker: String,
    pub model: String,
    pub system_prompt: String,
    pub turn_prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Produce the next line for `persona` given everything said so far.
    async fn complete(
        &self,
        persona: &PersonaContext,
        transcript: &Transcript,
    ) -> Result<String, ProviderError>;
}

/// Build the chat history seen by one speaker: their own lines are assistant
/// turns, everyone else's are user turns tagged with the speaker's name.
pub fn build_messages(
    persona: &PersonaContext,
    transcript: &Transcript,
) -> Vec<ChatCompletionRequestMessage> {
    let mut messages = Vec::with_capacity(transcript.len() + 2);
    messages.push(ChatCompletionRequestMessage::System(
        ChatCompletionRequestSystemMessage {
            content: persona.system_prompt.clone().into(),
            name: None,
        },
    ));

    for utterance in transcript {
        if utterance.speaker == persona.speaker {
            messages.push(ChatCompletionRequestMessage::Assistant(
                ChatCompletionRequestAssistantMessage {
                    content: Some(utterance.text.clone().into()),
                    name: None,
                    tool_calls: None,
                    refusal: None,
                    audio: None,
                    function_call: None,
                },
            ));
        } else {
            messages.push(ChatCompletionRequestMessage::User(
                ChatCompletionRequestUserMessage {
                    content: format!("[{} said]: {}", utterance.speaker, utterance.text).into(),
                    name: None,
                },
            ));
        }
    }

    messages.push(ChatCompletionRequestMessage::User(
        ChatCompletionRequestUserMessage {
            content: persona.turn_prompt.clone().into(),
            name: None,
        },
    ));
    messages
}

/// OpenAI-compatible chat completion provider.
pub struct OpenAiProvider {
    client: Client<OpenAIConfig>,
}

impl OpenAiProvider {
    pub fn new(
        api_base: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, PodcastError> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| {
                PodcastError::ConfigError(format!("Failed to create HTTP client: {}", e))
            })?;

        let api_base: String = api_base.into();
        let api_key: String = api_key.into();
        let config = OpenAIConfig::new()
            .with_api_key(&api_key)
            .with_api_base(&api_base);

        Ok(Self {
            client: Client::with_config(config).with_http_client(http_client),
        })
    }
}

#[async_trait]
impl ChatProvider for OpenAiProvider {
    async fn complete(
        &self,
        persona: &PersonaContext,
        transcript: &Transcript,
    ) -> Result<String, ProviderError> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(&persona.model)
            .max_completion_tokens(persona.max_tokens)
            .temperature(persona.temperature)
            .messages(build_messages(persona, transcript))
            .build()?;

        let response = self.client.chat().create(request).await?;
        Ok(response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn persona(speaker: &str) -> PersonaContext {
        PersonaContext {
            speaker: speaker.to_string(),
            model: "test-model".to_string(),
            system_prompt: "You are Ada".to_string(),
            turn_prompt: "Your turn".to_string(),
            max_tokens: 100,
            temperature: 0.5,
        }
    }

    #[test]
    fn test_messages_wrap_transcript_between_system_and_turn_prompt() {
        let mut transcript = Transcript::new();
        transcript.push("Ada", 1, "Hello there.");
        transcript.push("Bo", 1, "Hi Ada.");

        let messages = build_messages(&persona("Ada"), &transcript);
        assert_eq!(messages.len(), 4);
        assert!(matches!(messages[0], ChatCompletionRequestMessage::System(_)));
        assert!(matches!(messages[1], ChatCompletionRequestMessage::Assistant(_)));
        assert!(matches!(messages[2], ChatCompletionRequestMessage::User(_)));
        assert!(matches!(messages[3], ChatCompletionRequestMessage::User(_)));
    }

    #[test]
    fn test_first_turn_has_only_system_and_turn_prompt() {
        let messages = build_messages(&persona("Ada"), &Transcript::new());
        assert_eq!(messages.len(), 2);
    }
}
