//! AI chat proxy.
//!
//! Holds the provider API key server-side. The system prompt and model come
//! from the `settings/chatbot` document, so admins can retune the assistant
//! without a deploy; a caller may still override the prompt per request.

use crate::{FunctionError, FunctionResult};
use async_trait::async_trait;
use document_store::DocumentStore;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, error, info};
use webfront_config::ChatConfig;
use webfront_model::collections;

const DEFAULT_SYSTEM_PROMPT: &str =
    "You are the WebFront project assistant. Answer questions about the client's project clearly and briefly.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Bot,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub text: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub history: Vec<ChatTurn>,
    #[serde(default)]
    pub custom_system_prompt: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub text: String,
}

/// The `settings/chatbot` document.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ChatbotSettings {
    system_prompt: Option<String>,
    model: Option<String>,
}

/// Speaker as the model provider names it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptRole {
    User,
    Model,
}

impl From<ChatRole> for PromptRole {
    fn from(role: ChatRole) -> Self {
        match role {
            ChatRole::User => PromptRole::User,
            ChatRole::Bot => PromptRole::Model,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTurn {
    pub role: PromptRole,
    pub text: String,
}

/// A fully assembled model call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub model: String,
    pub system_instruction: String,
    /// Conversation so far, ending with the new user message.
    pub contents: Vec<PromptTurn>,
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn generate(&self, prompt: &Prompt) -> FunctionResult<String>;
}

/// Gemini `generateContent` over REST.
pub struct GeminiClient {
    http: reqwest::Client,
    api_url: String,
    api_key: String,
}

impl GeminiClient {
    pub fn new(api_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_url: api_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    fn request_body(prompt: &Prompt) -> Value {
        let contents: Vec<Value> = prompt
            .contents
            .iter()
            .map(|turn| json!({ "role": turn.role, "parts": [{ "text": turn.text }] }))
            .collect();
        json!({
            "systemInstruction": { "parts": [{ "text": prompt.system_instruction }] },
            "contents": contents,
        })
    }

    fn extract_text(body: &Value) -> Option<String> {
        let parts = body
            .get("candidates")?
            .get(0)?
            .get("content")?
            .get("parts")?
            .as_array()?;
        let text: String = parts
            .iter()
            .filter_map(|part| part.get("text").and_then(Value::as_str))
            .collect();
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }
}

#[async_trait]
impl LanguageModel for GeminiClient {
    async fn generate(&self, prompt: &Prompt) -> FunctionResult<String> {
        let url = format!("{}/models/{}:generateContent", self.api_url, prompt.model);
        debug!(model = %prompt.model, turns = prompt.contents.len(), "Calling language model");

        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&Self::request_body(prompt))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FunctionError::Internal(format!(
                "Model provider returned {}: {}",
                status, body
            )));
        }

        let body: Value = response.json().await?;
        Self::extract_text(&body)
            .ok_or_else(|| FunctionError::Internal("Model returned no text".to_string()))
    }
}

pub struct ChatProxy {
    store: Arc<dyn DocumentStore>,
    model: Option<Arc<dyn LanguageModel>>,
    default_model: String,
}

impl ChatProxy {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        model: Option<Arc<dyn LanguageModel>>,
        default_model: impl Into<String>,
    ) -> Self {
        Self {
            store,
            model,
            default_model: default_model.into(),
        }
    }

    /// Proxy backed by Gemini when an API key is configured.
    pub fn from_config(store: Arc<dyn DocumentStore>, config: &ChatConfig) -> Self {
        let model = config
            .api_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
            .map(|key| Arc::new(GeminiClient::new(&config.api_url, key)) as Arc<dyn LanguageModel>);
        Self::new(store, model, &config.model)
    }

    pub async fn handle(&self, request: ChatRequest) -> FunctionResult<ChatResponse> {
        let message = request.message.trim();
        if message.is_empty() {
            return Err(FunctionError::InvalidArgument(
                "A message is required".to_string(),
            ));
        }

        let settings = self
            .store
            .get_document(collections::SETTINGS, collections::CHATBOT_SETTINGS_KEY)
            .await?
            .ok_or_else(|| {
                FunctionError::NotFound("Chatbot settings have not been configured".to_string())
            })?;
        let settings: ChatbotSettings = serde_json::from_value(Value::Object(settings.data))
            .map_err(|e| FunctionError::Internal(format!("Malformed chatbot settings: {}", e)))?;

        let model = self.model.as_ref().ok_or_else(|| {
            FunctionError::FailedPrecondition("The chat API key is not configured".to_string())
        })?;

        let prompt = build_prompt(&request, message, settings, &self.default_model);
        let text = model.generate(&prompt).await.map_err(|e| {
            error!(error = %e, model = %prompt.model, "Chat completion failed");
            FunctionError::Internal("The assistant is unavailable right now".to_string())
        })?;

        info!(model = %prompt.model, turns = prompt.contents.len(), "Chat reply generated");
        Ok(ChatResponse { text })
    }
}

fn build_prompt(
    request: &ChatRequest,
    message: &str,
    settings: ChatbotSettings,
    default_model: &str,
) -> Prompt {
    let system_instruction = request
        .custom_system_prompt
        .clone()
        .filter(|p| !p.trim().is_empty())
        .or(settings.system_prompt.filter(|p| !p.trim().is_empty()))
        .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string());
    let model = settings
        .model
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| default_model.to_string());

    let mut contents: Vec<PromptTurn> = request
        .history
        .iter()
        .filter(|turn| !turn.text.trim().is_empty())
        .map(|turn| PromptTurn {
            role: turn.role.into(),
            text: turn.text.clone(),
        })
        .collect();
    contents.push(PromptTurn {
        role: PromptRole::User,
        text: message.to_string(),
    });

    Prompt {
        model,
        system_instruction,
        contents,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use document_store::MemoryDocumentStore;
    use std::sync::Mutex;

    struct ScriptedModel {
        reply: FunctionResult<String>,
        prompts: Mutex<Vec<Prompt>>,
    }

    impl ScriptedModel {
        fn replying(text: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(text.to_string()),
                prompts: Mutex::new(Vec::new()),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                reply: Err(FunctionError::Internal("quota".into())),
                prompts: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl LanguageModel for ScriptedModel {
        async fn generate(&self, prompt: &Prompt) -> FunctionResult<String> {
            self.prompts.lock().unwrap().push(prompt.clone());
            match &self.reply {
                Ok(text) => Ok(text.clone()),
                Err(e) => Err(FunctionError::Internal(e.to_string())),
            }
        }
    }

    async fn store_with_settings(settings: Value) -> Arc<MemoryDocumentStore> {
        let store = Arc::new(MemoryDocumentStore::new());
        store
            .set_document(
                collections::SETTINGS,
                collections::CHATBOT_SETTINGS_KEY,
                settings.as_object().cloned().unwrap(),
            )
            .await
            .unwrap();
        store
    }

    fn request(message: &str) -> ChatRequest {
        ChatRequest {
            message: message.to_string(),
            history: vec![
                ChatTurn {
                    role: ChatRole::User,
                    text: "Hi".into(),
                },
                ChatTurn {
                    role: ChatRole::Bot,
                    text: "Hello! How can I help?".into(),
                },
            ],
            custom_system_prompt: None,
        }
    }

    #[tokio::test]
    async fn test_reply_uses_settings_and_maps_history() {
        let store =
            store_with_settings(json!({ "systemPrompt": "Be terse.", "model": "gemini-pro" })).await;
        let model = ScriptedModel::replying("Phase two ships Friday.");
        let proxy = ChatProxy::new(
            store,
            Some(model.clone() as Arc<dyn LanguageModel>),
            "gemini-1.5-flash",
        );

        let response = proxy.handle(request("When is launch?")).await.unwrap();
        assert_eq!(response.text, "Phase two ships Friday.");

        let prompts = model.prompts.lock().unwrap();
        let prompt = &prompts[0];
        assert_eq!(prompt.model, "gemini-pro");
        assert_eq!(prompt.system_instruction, "Be terse.");
        let roles: Vec<PromptRole> = prompt.contents.iter().map(|t| t.role).collect();
        assert_eq!(roles, vec![PromptRole::User, PromptRole::Model, PromptRole::User]);
        assert_eq!(prompt.contents[2].text, "When is launch?");
    }

    #[tokio::test]
    async fn test_custom_prompt_overrides_settings() {
        let store = store_with_settings(json!({ "systemPrompt": "Be terse." })).await;
        let model = ScriptedModel::replying("ok");
        let proxy = ChatProxy::new(
            store,
            Some(model.clone() as Arc<dyn LanguageModel>),
            "gemini-1.5-flash",
        );

        let mut req = request("hello");
        req.custom_system_prompt = Some("Speak like a pirate.".into());
        proxy.handle(req).await.unwrap();

        let prompts = model.prompts.lock().unwrap();
        assert_eq!(prompts[0].system_instruction, "Speak like a pirate.");
        assert_eq!(prompts[0].model, "gemini-1.5-flash");
    }

    #[tokio::test]
    async fn test_failure_taxonomy() {
        let empty = Arc::new(MemoryDocumentStore::new());
        let model: Arc<dyn LanguageModel> = ScriptedModel::replying("x");
        let proxy = ChatProxy::new(empty, Some(model), "m");
        let err = proxy.handle(request("  ")).await.unwrap_err();
        assert_eq!(err.code(), "invalid-argument");
        let err = proxy.handle(request("hi")).await.unwrap_err();
        assert_eq!(err.code(), "not-found");

        let store = store_with_settings(json!({})).await;
        let proxy = ChatProxy::new(store.clone(), None, "m");
        let err = proxy.handle(request("hi")).await.unwrap_err();
        assert_eq!(err.code(), "failed-precondition");

        let model: Arc<dyn LanguageModel> = ScriptedModel::failing();
        let proxy = ChatProxy::new(store, Some(model), "m");
        let err = proxy.handle(request("hi")).await.unwrap_err();
        assert_eq!(err.code(), "internal");
    }

    #[test]
    fn test_missing_api_key_leaves_model_unset() {
        let store = Arc::new(MemoryDocumentStore::new());
        let proxy = ChatProxy::from_config(store.clone(), &ChatConfig::default());
        assert!(proxy.model.is_none());

        let config = ChatConfig {
            api_key: Some("k".into()),
            ..ChatConfig::default()
        };
        assert!(ChatProxy::from_config(store, &config).model.is_some());
    }

    #[test]
    fn test_gemini_wire_format() {
        let prompt = Prompt {
            model: "gemini-1.5-flash".into(),
            system_instruction: "Be kind.".into(),
            contents: vec![
                PromptTurn {
                    role: PromptRole::Model,
                    text: "Hi".into(),
                },
                PromptTurn {
                    role: PromptRole::User,
                    text: "Status?".into(),
                },
            ],
        };
        let body = GeminiClient::request_body(&prompt);
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], json!("Be kind."));
        assert_eq!(body["contents"][0]["role"], json!("model"));
        assert_eq!(body["contents"][1]["parts"][0]["text"], json!("Status?"));

        let reply = json!({
            "candidates": [{ "content": { "parts": [{ "text": "All " }, { "text": "good." }] } }]
        });
        assert_eq!(GeminiClient::extract_text(&reply).as_deref(), Some("All good."));
        assert_eq!(GeminiClient::extract_text(&json!({ "candidates": [] })), None);
    }
}
