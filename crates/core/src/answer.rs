//! Answer generation over retrieved passages.
//!
//! The generator is picked once from [`LlmConfig`] and injected; callers only
//! see the [`AnswerGenerator`] trait. Whatever a backend returns, including a
//! transport failure rendered as text, is passed through as the answer.

use crate::embeddings::Embedder;
use crate::error::SearchError;
use crate::index::VectorIndex;
use crate::models::RetrievedPassage;
use crate::orchestrator::{format_context, Retriever};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::warn;

pub const OPENROUTER_CHAT_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    fn name(&self) -> &str;

    /// Generated text, or a readable error message in its place.
    async fn generate(&self, prompt: &str) -> String;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmBackend {
    Ollama,
    OpenRouter,
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub ollama_base_url: String,
    pub ollama_model: String,
    pub openrouter_api_key: Option<String>,
    pub openrouter_model: String,
    pub app_url: String,
    pub app_name: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            ollama_base_url: "http://localhost:11434".to_string(),
            ollama_model: "llama3.1".to_string(),
            openrouter_api_key: None,
            openrouter_model: "openai/gpt-4o-mini".to_string(),
            app_url: "http://localhost".to_string(),
            app_name: "statute-rag".to_string(),
            temperature: 0.2,
            max_tokens: 800,
        }
    }
}

impl LlmConfig {
    /// The hosted backend is used whenever an API key is configured.
    pub fn backend(&self) -> LlmBackend {
        match self.openrouter_api_key.as_deref().map(str::trim) {
            Some(key) if !key.is_empty() => LlmBackend::OpenRouter,
            _ => LlmBackend::Ollama,
        }
    }
}

pub fn generator_from_config(config: &LlmConfig) -> Result<Box<dyn AnswerGenerator>, SearchError> {
    Ok(match config.backend() {
        LlmBackend::OpenRouter => Box::new(OpenRouterGenerator::new(config)?),
        LlmBackend::Ollama => Box::new(OllamaGenerator::new(config)?),
    })
}

pub struct OllamaGenerator {
    client: Client,
    base_url: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl OllamaGenerator {
    pub fn new(config: &LlmConfig) -> Result<Self, SearchError> {
        Ok(Self {
            client: Client::builder().timeout(Duration::from_secs(120)).build()?,
            base_url: config.ollama_base_url.trim_end_matches('/').to_string(),
            model: config.ollama_model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }

    fn payload(&self, prompt: &str) -> Value {
        json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
            "options": {
                "temperature": self.temperature,
                "num_predict": self.max_tokens,
            }
        })
    }

    async fn request(&self, prompt: &str) -> Result<String, SearchError> {
        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&self.payload(prompt))
            .send()
            .await?
            .error_for_status()?;

        parse_ollama_response(&response.json::<Value>().await?)
    }
}

#[async_trait]
impl AnswerGenerator for OllamaGenerator {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn generate(&self, prompt: &str) -> String {
        match self.request(prompt).await {
            Ok(answer) => answer,
            Err(error) => {
                warn!(backend = "ollama", %error, "answer generation failed");
                format!("Ollama 연결 오류: {error}")
            }
        }
    }
}

pub fn parse_ollama_response(body: &Value) -> Result<String, SearchError> {
    body.get("response")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| SearchError::BackendResponse {
            backend: "ollama".to_string(),
            details: format!("missing response in {body}"),
        })
}

pub struct OpenRouterGenerator {
    client: Client,
    api_key: String,
    model: String,
    app_url: String,
    app_name: String,
    temperature: f32,
    max_tokens: u32,
}

impl OpenRouterGenerator {
    pub fn new(config: &LlmConfig) -> Result<Self, SearchError> {
        let api_key = config
            .openrouter_api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| SearchError::Request("openrouter api key is not set".to_string()))?;

        Ok(Self {
            client: Client::builder().timeout(Duration::from_secs(60)).build()?,
            api_key,
            model: config.openrouter_model.clone(),
            app_url: config.app_url.clone(),
            app_name: config.app_name.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }

    fn payload(&self, prompt: &str) -> Value {
        json!({
            "model": self.model,
            "messages": [{"role": "user", "content": prompt}],
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
        })
    }

    async fn request(&self, prompt: &str) -> Result<String, SearchError> {
        let response = self
            .client
            .post(OPENROUTER_CHAT_URL)
            .bearer_auth(&self.api_key)
            .header("HTTP-Referer", &self.app_url)
            .header("X-Title", &self.app_name)
            .json(&self.payload(prompt))
            .send()
            .await?
            .error_for_status()?;

        parse_openrouter_response(&response.json::<Value>().await?)
    }
}

#[async_trait]
impl AnswerGenerator for OpenRouterGenerator {
    fn name(&self) -> &str {
        "openrouter"
    }

    async fn generate(&self, prompt: &str) -> String {
        match self.request(prompt).await {
            Ok(answer) => answer,
            Err(error) => {
                warn!(backend = "openrouter", %error, "answer generation failed");
                format!("OpenRouter API 오류: {error}")
            }
        }
    }
}

pub fn parse_openrouter_response(body: &Value) -> Result<String, SearchError> {
    body.pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| SearchError::BackendResponse {
            backend: "openrouter".to_string(),
            details: format!("missing choices[0].message.content in {body}"),
        })
}

pub fn build_prompt(context: &str, question: &str) -> String {
    format!(
        "당신은 한국 법령 리서처입니다. 아래 <컨텍스트>만을 근거로 간결하고 정확히 답변하고, \
인용(제목/출처)을 제시하세요. 모르면 모른다고 말하세요.

<컨텍스트>
{context}

[질문]
{question}

형식:
- 요약(2~5문장)
- 핵심포인트(불릿)
- 인용(제목/출처)
- 면책고지

최종 답만 한국어로. 사고흐름/메타 금지.
"
    )
}

#[derive(Debug, Clone)]
pub struct Answer {
    pub text: String,
    pub sources: Vec<RetrievedPassage>,
}

/// Retrieves the top `k` passages for `question` and asks the generator to
/// answer from them alone.
pub async fn answer_question<V, E>(
    retriever: &Retriever<V, E>,
    generator: &dyn AnswerGenerator,
    question: &str,
    k: usize,
) -> Result<Answer, SearchError>
where
    V: VectorIndex,
    E: Embedder,
{
    let sources = retriever.retrieve(question, k)?;
    let prompt = build_prompt(&format_context(&sources), question);
    let text = generator.generate(&prompt).await.trim().to_string();

    Ok(Answer { text, sources })
}
