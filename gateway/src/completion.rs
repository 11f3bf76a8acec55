use crate::config::CompletionConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Returned when the model produced no text.
pub const EMPTY_ANSWER: &str = "Sin respuesta";

#[derive(Error, Debug)]
pub enum CompletionError {
    #[error("invalid completion URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("completion API returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("completion API returned no choices")]
    NoChoices,
}

/// Answers a user question with a language model.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    fn model(&self) -> &str;

    async fn complete(&self, question: &str) -> Result<String, CompletionError>;
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

/// Client for any OpenAI-compatible `/chat/completions` endpoint (Groq by default).
pub struct OpenAiCompatibleClient {
    client: reqwest::Client,
    endpoint: Url,
    config: CompletionConfig,
}

impl OpenAiCompatibleClient {
    pub fn new(config: CompletionConfig) -> Result<Self, CompletionError> {
        let endpoint = Url::parse(&format!(
            "{}/chat/completions",
            config.base_url.as_str().trim_end_matches('/')
        ))?;
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .connect_timeout(config.connect_timeout())
            .build()
            .map_err(CompletionError::ClientBuild)?;

        Ok(OpenAiCompatibleClient {
            client,
            endpoint,
            config,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl CompletionClient for OpenAiCompatibleClient {
    fn model(&self) -> &str {
        &self.config.model
    }

    async fn complete(&self, question: &str) -> Result<String, CompletionError> {
        let request = ChatRequest {
            model: &self.config.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &self.config.system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: question,
                },
            ],
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        };

        tracing::debug!(model = %self.config.model, endpoint = %self.endpoint, "Requesting completion");
        let response = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CompletionError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed = response.json::<ChatResponse>().await?;
        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or(CompletionError::NoChoices)?;

        Ok(choice
            .message
            .content
            .filter(|content| !content.is_empty())
            .unwrap_or_else(|| EMPTY_ANSWER.to_string()))
    }
}
