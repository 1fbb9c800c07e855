//! # API Module
//!
//! Client construction and answer generation against an OpenAI-compatible
//! chat-completions endpoint.
//!
//! The query pipeline depends on the [`Generator`] trait rather than on the
//! HTTP client, so tests (and alternative backends) can stand in for the
//! remote model.
//!
//! # Example
//!
//! ```no_run
//! use doku::api::{Generator, OpenAiGenerator};
//! use doku::config::DokuConfig;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = DokuConfig { api_key: Some("...".into()), ..DokuConfig::default() };
//! let generator = OpenAiGenerator::new(&config)?;
//! let answer = generator.generate(None, "Say hello.").await?;
//! println!("{answer}");
//! # Ok(()) }
//! ```

use async_openai::{
    Client,
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
    },
};
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

use crate::{
    config::DokuConfig,
    error::{DokuError, Result},
};

/// Produces answer text for a rendered prompt.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, system_prompt: Option<&str>, prompt: &str) -> Result<String>;
}

/// Creates a new OpenAI-compatible API client from configuration.
///
/// Resolves the API key first, so a missing credential fails here rather than
/// on the first request. Every request made through the client is bounded by
/// `request_timeout_secs`.
pub fn create_client(config: &DokuConfig) -> Result<Client<OpenAIConfig>> {
    let api_key = config.resolve_api_key()?;
    let openai_config = OpenAIConfig::new()
        .with_api_key(api_key)
        .with_api_base(config.api_base.clone());

    let http_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.request_timeout_secs))
        .build()
        .map_err(|err| DokuError::Config(format!("unable to build HTTP client: {err}")))?;

    debug!("Client created for {}", config.api_base);
    Ok(Client::with_config(openai_config).with_http_client(http_client))
}

/// Answers prompts with a chat-completion model.
pub struct OpenAiGenerator {
    client: Client<OpenAIConfig>,
    model: String,
    temperature: Option<f32>,
}

impl OpenAiGenerator {
    pub fn new(config: &DokuConfig) -> Result<Self> {
        Ok(Self {
            client: create_client(config)?,
            model: config.chat_model.clone(),
            temperature: config.temperature,
        })
    }

    fn build_messages(
        system_prompt: Option<&str>,
        prompt: &str,
    ) -> Result<Vec<ChatCompletionRequestMessage>> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system_prompt) = system_prompt {
            messages.push(
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(system_prompt)
                    .build()
                    .map_err(|err| DokuError::Generation(err.to_string()))?
                    .into(),
            );
        }
        messages.push(
            ChatCompletionRequestUserMessageArgs::default()
                .content(prompt)
                .build()
                .map_err(|err| DokuError::Generation(err.to_string()))?
                .into(),
        );
        Ok(messages)
    }
}

#[async_trait]
impl Generator for OpenAiGenerator {
    async fn generate(&self, system_prompt: Option<&str>, prompt: &str) -> Result<String> {
        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(&self.model)
            .messages(Self::build_messages(system_prompt, prompt)?);
        if let Some(temperature) = self.temperature {
            args.temperature(temperature);
        }
        let request = args
            .build()
            .map_err(|err| DokuError::Generation(err.to_string()))?;

        debug!("Sending request: {:?}", request);

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|err| DokuError::Generation(err.to_string()))?;

        let answer: String = response
            .choices
            .into_iter()
            .filter_map(|choice| choice.message.content)
            .collect();

        if answer.trim().is_empty() {
            return Err(DokuError::Generation(
                "model returned an empty response".to_string(),
            ));
        }
        Ok(answer.trim().to_string())
    }
}
