//! Chat bridge for the `deepseek_chat` action (spec.md §4.6). Grounded on
//! `original_source/backend/app/services/deepseek_service.py`'s
//! `handle_deepseek_request`: a single POST with a bearer key, 30s timeout,
//! extracting `choices[0].message.content` from the response.

use std::time::Duration;

use serde::Deserialize;

const CHAT_API_URL: &str = "https://api.deepseek.com/v1/chat/completions";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("chat API request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("chat API response missing choices[0].message.content")]
    MalformedResponse,
}

#[derive(Deserialize)]
struct ChatCompletion {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: String,
}

pub struct ChatBridge {
    client: reqwest::Client,
    api_key: String,
}

impl ChatBridge {
    pub fn new(client: reqwest::Client, api_key: String) -> Self {
        Self { client, api_key }
    }

    pub async fn send(&self, message: &str) -> Result<String, ChatError> {
        let payload = serde_json::json!({
            "model": "deepseek-chat",
            "messages": [{ "role": "user", "content": message }],
            "temperature": 0.7,
        });

        let response = self
            .client
            .post(CHAT_API_URL)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?
            .error_for_status()?;

        let completion: ChatCompletion = response.json().await?;
        completion
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or(ChatError::MalformedResponse)
    }
}
