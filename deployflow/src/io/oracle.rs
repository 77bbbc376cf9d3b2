//! Chat-completion oracle.
//!
//! The [`Oracle`] trait decouples both conversations from the HTTP service.
//! Tests use scripted oracles that return predetermined completions.

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, instrument};

use crate::core::conversation::Message;
use crate::error::DeployError;
use crate::io::config::OracleConfig;

/// One synchronous completion call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRequest {
    pub messages: Vec<Message>,
    pub max_tokens: u32,
    /// Ask the service to constrain output to a JSON object.
    pub json_mode: bool,
}

/// Stateless request/response completion service.
pub trait Oracle {
    /// Return the completion text. An empty string means the service produced
    /// nothing; callers decide whether that breaks their contract.
    fn complete(&self, request: &CompletionRequest) -> Result<String>;
}

/// OpenAI-compatible `/chat/completions` client.
pub struct ChatCompletionsOracle {
    client: reqwest::blocking::Client,
    url: String,
    api_key: String,
    model: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl ChatCompletionsOracle {
    /// Client for `config`. Requests never time out unless
    /// `request_timeout_secs` is set.
    pub fn new(config: &OracleConfig, api_key: impl Into<String>) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .context("build http client")?;
        Ok(Self {
            client,
            url: completions_url(&config.endpoint),
            api_key: api_key.into(),
            model: config.model.clone(),
        })
    }

    fn request_body(&self, request: &CompletionRequest) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": request.messages,
            "max_tokens": request.max_tokens,
            "stream": false,
        });
        if request.json_mode {
            body["response_format"] = json!({ "type": "json_object" });
        }
        body
    }
}

impl Oracle for ChatCompletionsOracle {
    #[instrument(skip_all, fields(messages = request.messages.len(), max_tokens = request.max_tokens, json_mode = request.json_mode))]
    fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let body = self.request_body(request);
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .and_then(reqwest::blocking::Response::error_for_status)
            .map_err(|err| DeployError::source_unavailable(format!("oracle request failed: {err}")))?;
        let text = response
            .text()
            .map_err(|err| DeployError::source_unavailable(format!("oracle request failed: {err}")))?;
        let content = parse_completion(&text)?;
        debug!(chars = content.len(), "oracle replied");
        Ok(content)
    }
}

fn completions_url(endpoint: &str) -> String {
    format!("{}/chat/completions", endpoint.trim().trim_end_matches('/'))
}

/// Extract `choices[0].message.content`; a missing choice or null content is
/// an empty completion.
fn parse_completion(raw: &str) -> Result<String> {
    let response: ChatResponse = serde_json::from_str(raw)
        .map_err(|err| DeployError::protocol(format!("unreadable oracle response: {err}")))?;
    Ok(response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oracle() -> ChatCompletionsOracle {
        let config = OracleConfig {
            endpoint: "https://api.example.com/".to_string(),
            ..OracleConfig::default()
        };
        ChatCompletionsOracle::new(&config, "sk-test").expect("client")
    }

    #[test]
    fn url_joins_endpoint() {
        assert_eq!(oracle().url, "https://api.example.com/chat/completions");
    }

    #[test]
    fn json_mode_sets_response_format() {
        let request = CompletionRequest {
            messages: vec![Message::system("rules"), Message::user("go")],
            max_tokens: 750,
            json_mode: true,
        };
        let body = oracle().request_body(&request);
        assert_eq!(body["model"], "deepseek-chat");
        assert_eq!(body["max_tokens"], 750);
        assert_eq!(body["stream"], false);
        assert_eq!(body["messages"][1]["role"], "user");
        assert_eq!(body["response_format"]["type"], "json_object");

        let plain = CompletionRequest {
            json_mode: false,
            ..request
        };
        assert!(oracle().request_body(&plain).get("response_format").is_none());
    }

    #[test]
    fn parses_first_choice_content() {
        let raw = r#"{"choices":[{"message":{"role":"assistant","content":"hello"}}],"usage":{}}"#;
        assert_eq!(parse_completion(raw).expect("parse"), "hello");
    }

    #[test]
    fn null_content_is_empty() {
        let raw = r#"{"choices":[{"message":{"role":"assistant","content":null}}]}"#;
        assert_eq!(parse_completion(raw).expect("parse"), "");
        assert_eq!(parse_completion(r#"{"choices":[]}"#).expect("parse"), "");
    }
}
