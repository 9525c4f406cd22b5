//! HTTP transport for the text-analysis API.
//!
//! Speaks the OpenAI-compatible chat-completions protocol. Key rotation and
//! retry policy live in `jobfill_core::analysis`; this layer does exactly one
//! request per call and maps HTTP failures onto the error variants that
//! policy rotates on.

use std::time::Duration;

use jobfill_core::error::AppError;
use jobfill_core::traits::AnalysisTransport;
use reqwest::Client;
use serde::{Deserialize, Serialize};

const DEFAULT_API_URL: &str = "https://api.deepseek.com/chat/completions";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

// Deliberately high for a data task: the analysis prompts constrain the
// output format hard enough, and lower values produced truncated lists.
const ANALYSIS_TEMPERATURE: f64 = 1.3;

/// Chat-completions client holding no API key of its own; the key pool
/// supplies one per call.
#[derive(Clone)]
pub struct HttpAnalysisTransport {
    client: Client,
    url: String,
    model: String,
    timeout_secs: u64,
}

impl HttpAnalysisTransport {
    pub fn new(model: &str) -> Result<Self, AppError> {
        Self::with_url(model, DEFAULT_API_URL)
    }

    pub fn with_url(model: &str, url: &str) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| AppError::HttpError(e.to_string()))?;

        Ok(Self {
            client,
            url: url.to_string(),
            model: model.to_string(),
            timeout_secs: DEFAULT_TIMEOUT.as_secs(),
        })
    }
}

// ---- API types ----

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
    stream: bool,
    response_format: ResponseFormat,
    temperature: f64,
}

#[derive(Serialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: String,
}

impl AnalysisTransport for HttpAnalysisTransport {
    async fn send(&self, api_key: &str, prompt: &str, text: &str) -> Result<String, AppError> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                Message {
                    role: "system".to_string(),
                    content: prompt.to_string(),
                },
                Message {
                    role: "user".to_string(),
                    content: format!("Please analyze the following content:{text}"),
                },
            ],
            stream: false,
            response_format: ResponseFormat {
                format_type: "text".to_string(),
            },
            temperature: ANALYSIS_TEMPERATURE,
        };

        let response = self
            .client
            .post(&self.url)
            .header("Authorization", format!("Bearer {api_key}"))
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AppError::Timeout(self.timeout_secs)
                } else if e.is_connect() {
                    AppError::NetworkError(format!("Connection failed: {e}"))
                } else {
                    AppError::HttpError(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let status_code = status.as_u16();
            let body = response.text().await.unwrap_or_default();

            let message = serde_json::from_str::<ApiError>(&body)
                .map(|e| e.error.message)
                .unwrap_or_else(|_| format!("HTTP {status_code}: {body}"));

            if status_code == 429 {
                return Err(AppError::RateLimitExceeded);
            }

            return Err(AppError::AnalysisError {
                message,
                status_code,
                retryable: status_code >= 500,
            });
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| AppError::HttpError(format!("Failed to parse analysis response: {e}")))?;

        chat_response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .ok_or_else(|| AppError::AnalysisError {
                message: "Empty response from analysis API".into(),
                status_code: 200,
                retryable: false,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serializes_with_expected_shape() {
        let request = ChatRequest {
            model: "deepseek-chat".to_string(),
            messages: vec![Message {
                role: "system".to_string(),
                content: "prompt".to_string(),
            }],
            stream: false,
            response_format: ResponseFormat {
                format_type: "text".to_string(),
            },
            temperature: ANALYSIS_TEMPERATURE,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["stream"], false);
        assert_eq!(json["response_format"]["type"], "text");
        assert_eq!(json["temperature"], 1.3);
    }

    #[test]
    fn response_content_parses() {
        let body = r#"{"choices":[{"message":{"content":"[\"Rust\"]"}}]}"#;
        let parsed: ChatResponse = serde_json::from_str(body).unwrap();
        assert_eq!(
            parsed.choices[0].message.content.as_deref(),
            Some("[\"Rust\"]")
        );
    }
}
