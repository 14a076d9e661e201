//! The generation backend: a prompt goes in, raw reply text comes out.
//!
//! The reply is *instructed* to be a single JSON object in the workspace
//! shape (see [`FORMAT_INSTRUCTION`]), but nothing here assumes the model
//! complied — parsing and fallback live in [`crate::workspace`].

pub mod mention;

pub use mention::MentionDispatcher;

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use serde_json::json;

use crate::config::AiConfig;

/// Pins the reply to the workspace JSON contract.
pub const FORMAT_INSTRUCTION: &str = r#"You are helping users collaboratively build software projects.

You MUST ALWAYS respond with a SINGLE VALID JSON OBJECT (UTF-8, no comments),
with this exact structure:

{
  "type": "workspace",
  "files": [
    {
      "path": "string (e.g. 'src/index.js' or 'app.js')",
      "language": "string (e.g. 'js', 'ts', 'jsx', 'tsx', 'html', 'css', 'json')",
      "content": "full file content as a single string"
    }
  ],
  "readme": "Markdown string describing the project, how files work, and how to run it"
}

STRICT RULES:
- Do NOT include any text outside the JSON.
- Do NOT wrap the JSON in backticks.
- Do NOT explain what you are doing.
- Do NOT use markdown formatting outside "readme".
- Put ALL code only inside the "content" fields of files.
- Use a realistic, clean file/folder structure.

Now, generate such a workspace for the following user request."#;

const SYSTEM_INSTRUCTION: &str = "Follow the given instructions exactly. Output ONLY the JSON object described, with no extra text or markdown.";

/// Produces a raw reply for a prompt.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// HTTP client for the model API.
pub struct HttpBackend {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl HttpBackend {
    pub fn new(config: &AiConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .context("GEMINI_API_KEY is not configured")?;
        Ok(Self {
            client: reqwest::Client::new(),
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            api_key,
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl GenerationBackend for HttpBackend {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/models/{}:generateContent", self.endpoint, self.model);
        let body = json!({
            "system_instruction": { "parts": [{ "text": SYSTEM_INSTRUCTION }] },
            "contents": [{
                "parts": [{ "text": format!("{FORMAT_INSTRUCTION}\n\nUSER REQUEST:\n{prompt}") }]
            }]
        });

        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .context("Generation request failed")?
            .error_for_status()
            .context("Generation request was rejected")?;

        let value: serde_json::Value = response
            .json()
            .await
            .context("Generation response was not JSON")?;

        value
            .pointer("/candidates/0/content/parts/0/text")
            .and_then(|text| text.as_str())
            .map(str::to_string)
            .context("No response text from model")
    }
}

/// Stand-in backend for deployments without an API key: every generation
/// fails, the room keeps working.
pub struct UnconfiguredBackend;

#[async_trait]
impl GenerationBackend for UnconfiguredBackend {
    async fn generate(&self, _prompt: &str) -> Result<String> {
        anyhow::bail!("generation backend is not configured (set GEMINI_API_KEY)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_backend_requires_an_api_key() {
        let config = AiConfig {
            endpoint: "https://example.test/v1".to_string(),
            api_key: None,
            model: "test-model".to_string(),
        };
        assert!(HttpBackend::new(&config).is_err());

        let config = AiConfig {
            api_key: Some("k".to_string()),
            ..config
        };
        assert!(HttpBackend::new(&config).is_ok());
    }

    #[tokio::test]
    async fn unconfigured_backend_always_fails() {
        let backend = UnconfiguredBackend;
        let err = backend.generate("anything").await.unwrap_err();
        assert!(err.to_string().contains("not configured"));
    }

    #[test]
    fn format_instruction_names_the_workspace_contract() {
        assert!(FORMAT_INSTRUCTION.contains("\"type\": \"workspace\""));
        assert!(FORMAT_INSTRUCTION.contains("\"files\""));
        assert!(FORMAT_INSTRUCTION.contains("\"readme\""));
    }
}
