//! Content-generation capability (§4.4): a narrow trait in place of the
//! teacher's `LlmClient`, plus a deterministic fake for tests and a real
//! OpenAI-backed implementation for production wiring.

use crate::error::ProviderError;
use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessage,
        ChatCompletionRequestUserMessage, CreateChatCompletionRequestArgs,
    },
    types::embeddings::{CreateEmbeddingRequest, EmbeddingInput},
    Client,
};
use async_trait::async_trait;

/// Parameters influencing one generation call.
#[derive(Clone, Debug)]
pub struct GenerationParams {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: 0.8,
            max_tokens: 280,
        }
    }
}

/// Content-generation capability. Narrower than the teacher's `LlmClient`:
/// no tool calls, no streaming — the content pipeline needs one completed
/// string and, separately, embeddings for memory search.
#[async_trait]
pub trait ContentProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(
        &self,
        system_prompt: &str,
        instruction: &str,
        params: &GenerationParams,
    ) -> Result<String, ProviderError>;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError>;

    /// Lightweight liveness check, used by the control API's `/status` endpoint.
    async fn healthcheck(&self) -> Result<(), ProviderError> {
        Ok(())
    }
}

/// OpenAI-backed `ContentProvider` (aligns with the teacher's `ChatOpenAI`,
/// narrowed to one-shot completions; embeddings follow the teacher's
/// `OpenAIEmbedder`). Reads `OPENAI_API_KEY` from the environment via
/// `OpenAIConfig::new()` unless built `with_config`.
pub struct OpenAiProvider {
    client: Client<OpenAIConfig>,
    name: String,
    chat_model: String,
    embed_model: String,
}

impl OpenAiProvider {
    pub fn new(chat_model: impl Into<String>, embed_model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            name: "openai".to_string(),
            chat_model: chat_model.into(),
            embed_model: embed_model.into(),
        }
    }

    pub fn with_config(
        config: OpenAIConfig,
        chat_model: impl Into<String>,
        embed_model: impl Into<String>,
    ) -> Self {
        Self {
            client: Client::with_config(config),
            name: "openai".to_string(),
            chat_model: chat_model.into(),
            embed_model: embed_model.into(),
        }
    }
}

#[async_trait]
impl ContentProvider for OpenAiProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(
        &self,
        system_prompt: &str,
        instruction: &str,
        params: &GenerationParams,
    ) -> Result<String, ProviderError> {
        let messages = vec![
            ChatCompletionRequestMessage::System(ChatCompletionRequestSystemMessage::from(
                system_prompt,
            )),
            ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage::from(
                instruction,
            )),
        ];
        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(self.chat_model.clone());
        args.messages(messages);
        args.temperature(params.temperature);
        args.max_tokens(params.max_tokens);
        let request = args.build().map_err(|e| ProviderError::InvalidInput {
            provider: self.name.clone(),
            detail: e.to_string(),
        })?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| ProviderError::RequestFailed {
                provider: self.name.clone(),
                detail: e.to_string(),
            })?;

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| ProviderError::EmptyCompletion {
                provider: self.name.clone(),
            })?;
        if content.is_empty() {
            return Err(ProviderError::EmptyCompletion {
                provider: self.name.clone(),
            });
        }
        Ok(content)
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let request = CreateEmbeddingRequest {
            input: EmbeddingInput::String(text.to_string()),
            model: self.embed_model.clone(),
            ..Default::default()
        };
        let response = self
            .client
            .embeddings()
            .create(request)
            .await
            .map_err(|e| ProviderError::RequestFailed {
                provider: self.name.clone(),
                detail: e.to_string(),
            })?;
        response
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| ProviderError::EmptyCompletion {
                provider: self.name.clone(),
            })
    }
}

/// Deterministic fake provider for tests and dry runs: generation echoes a
/// templated string derived from its inputs, embeddings are a cheap hash
/// projected into a fixed-size vector. No network calls, no randomness.
pub struct FakeProvider {
    name: String,
    /// When set, `generate` returns this instead of the templated echo.
    fixed_response: std::sync::Mutex<Option<String>>,
    /// When true, every call fails with `ProviderError::RequestFailed`.
    fail: std::sync::atomic::AtomicBool,
}

impl FakeProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fixed_response: std::sync::Mutex::new(None),
            fail: std::sync::atomic::AtomicBool::new(false),
        }
    }

    pub fn with_fixed_response(self, response: impl Into<String>) -> Self {
        *self.fixed_response.lock().unwrap() = Some(response.into());
        self
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail.store(failing, std::sync::atomic::Ordering::SeqCst);
    }
}

#[async_trait]
impl ContentProvider for FakeProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(
        &self,
        system_prompt: &str,
        instruction: &str,
        _params: &GenerationParams,
    ) -> Result<String, ProviderError> {
        if self.fail.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(ProviderError::RequestFailed {
                provider: self.name.clone(),
                detail: "fake provider set to fail".to_string(),
            });
        }
        if let Some(fixed) = self.fixed_response.lock().unwrap().clone() {
            return Ok(fixed);
        }
        Ok(format!(
            "[{}] {} | {}",
            self.name,
            system_prompt.chars().take(40).collect::<String>(),
            instruction
        ))
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        if self.fail.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(ProviderError::RequestFailed {
                provider: self.name.clone(),
                detail: "fake provider set to fail".to_string(),
            });
        }
        const DIMS: usize = 8;
        let mut vec = vec![0.0f32; DIMS];
        for (i, byte) in text.bytes().enumerate() {
            vec[i % DIMS] += byte as f32 / 255.0;
        }
        Ok(vec)
    }
}
