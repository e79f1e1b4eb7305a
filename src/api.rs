//! Client for OpenAI-compatible chat completion endpoints.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::message::{Message, Role};
use crate::sse;
use crate::tui::AppEvent;

const SUGGESTION_PROMPT: &str =
    "基于上一次对话的内容，生成3个可能的新对话方向或问题建议。请简短直接地列出这些建议。";

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: Message,
}

/// Configured handle to the completion endpoint. Cheap to clone; the inner
/// reqwest client shares its connection pool. No Debug impl so the key
/// cannot end up in logs.
#[derive(Clone)]
pub struct ChatClient {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
}

impl ChatClient {
    pub fn new(config: &Config) -> Result<Self> {
        let api_key = config
            .resolve_api_key()
            .ok_or_else(|| anyhow!(
                "no API key found; set MATHCHAT_API_KEY or add \"api_key\" to the config file"
            ))?;
        Ok(Self {
            client: reqwest::Client::new(),
            api_url: config.api_url(),
            api_key,
            model: config.model(),
        })
    }

    /// Open a streaming completion and forward its events to the UI channel.
    ///
    /// Runs until the stream finishes, errors, or `cancel` fires. Always
    /// emits exactly one terminal event, so the UI can never be left in a
    /// loading state.
    pub async fn stream_chat(
        &self,
        messages: Vec<Message>,
        cancel: CancellationToken,
        tx: tokio::sync::mpsc::UnboundedSender<AppEvent>,
    ) {
        let request = ChatRequest {
            model: &self.model,
            messages: &messages,
            stream: true,
        };
        let response = tokio::select! {
            _ = cancel.cancelled() => {
                let _ = tx.send(AppEvent::Interrupted);
                return;
            }
            response = self
                .client
                .post(&self.api_url)
                .bearer_auth(&self.api_key)
                .json(&request)
                .send() => response,
        };

        let response = match response.and_then(|r| r.error_for_status()) {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!("completion request failed: {e}");
                let _ = tx.send(AppEvent::StreamError(e.to_string()));
                return;
            }
        };

        sse::pump(response.bytes_stream(), cancel, tx).await;
    }

    /// Ask the model for up to three follow-up conversation starters based
    /// on the finished conversation.
    pub async fn fetch_suggestions(&self, mut messages: Vec<Message>) -> Result<Vec<String>> {
        messages.push(Message {
            role: Role::System,
            content: SUGGESTION_PROMPT.to_string(),
        });
        let request = ChatRequest {
            model: &self.model,
            messages: &messages,
            stream: false,
        };
        let response: ChatResponse = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .context("decoding suggestion response")?;

        let content = response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .unwrap_or_default();
        Ok(parse_suggestions(&content))
    }
}

/// One suggestion per non-empty line, list markers stripped, at most three.
fn parse_suggestions(content: &str) -> Vec<String> {
    content
        .lines()
        .map(|line| {
            line.trim()
                .trim_start_matches(|c: char| c.is_ascii_digit() || c == '.' || c == '-')
                .trim()
                .to_string()
        })
        .filter(|line| !line.is_empty())
        .take(3)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suggestions_strip_list_markers_and_cap_at_three() {
        let content = "1. 第一个建议\n2. 第二个建议\n- 第三个建议\n4. 多余的";
        assert_eq!(
            parse_suggestions(content),
            vec!["第一个建议", "第二个建议", "第三个建议"]
        );
    }

    #[test]
    fn suggestions_skip_blank_lines() {
        assert_eq!(parse_suggestions("\n\nonly one\n\n"), vec!["only one"]);
    }

    #[test]
    fn empty_content_yields_no_suggestions() {
        assert!(parse_suggestions("").is_empty());
    }
}
