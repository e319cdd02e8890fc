use std::env;
use std::time::Duration;

use anyhow::bail;
use anyhow::Context;
use anyhow::Result;
use framework::http_client::build_client;
use framework::http_client::ResponseExt;
use framework::json::from_json;
use framework::json::to_json;
use futures::StreamExt;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::warn;

use crate::chat_api::ApiErrorResponse;
use crate::chat_api::ChatRequest;
use crate::chat_api::ChatResponse;
use crate::chat_api::ChatStreamResponse;
use crate::chat_api::Usage;
use crate::error::classify;
use crate::error::ChatError;
use crate::relay::ChatToken;

const API_TIMEOUT: Duration = Duration::from_secs(180);
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const AZURE_API_VERSION: &str = "2023-05-15";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiType {
    #[default]
    OpenAi,
    Azure,
}

#[derive(Debug, Clone, Default)]
pub struct ClientOptions {
    pub api_key: String,
    pub api_type: ApiType,
    pub base_url: String,
    pub proxy: String,
}

#[derive(Clone)]
pub struct Chat {
    http: reqwest::Client,
    api_key: String,
    api_type: ApiType,
    base_url: String,
}

impl Chat {
    // configuration failures here are fatal, nothing is served with a bad client
    pub fn new(options: ClientOptions) -> Result<Chat> {
        if options.api_key.is_empty() {
            bail!("missed api key");
        }
        let api_key = api_key(&options.api_key)?;

        let base_url = match options.api_type {
            ApiType::OpenAi if options.base_url.is_empty() => DEFAULT_BASE_URL.to_string(),
            ApiType::Azure if options.base_url.is_empty() => bail!("missed base url"),
            _ => options.base_url.clone(),
        };
        reqwest::Url::parse(&base_url).with_context(|| format!("invalid base url: {base_url}"))?;

        let proxy = (!options.proxy.is_empty()).then_some(options.proxy.as_str());
        let http = build_client(API_TIMEOUT, proxy)?;

        Ok(Chat {
            http,
            api_key,
            api_type: options.api_type,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    // one upstream call per invocation, no retries; every failure surfaces as a
    // single Fault token and closing the channel is the sole end-of-turn signal
    pub fn start(&self, request: ChatRequest, cancel: CancellationToken) -> (mpsc::Receiver<ChatToken>, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(64);
        let chat = self.clone();
        let task = tokio::spawn(async move {
            if request.stream {
                chat.stream_completion(request, &tx, &cancel).await;
            } else {
                chat.single_completion(request, &tx, &cancel).await;
            }
        });
        (rx, task)
    }

    async fn stream_completion(&self, request: ChatRequest, tx: &mpsc::Sender<ChatToken>, cancel: &CancellationToken) {
        let response = tokio::select! {
            _ = cancel.cancelled() => return,
            response = self.call_api(&request) => response,
        };
        let response = match response {
            Ok(response) => response,
            Err(error) => return fault(tx, &error).await,
        };

        let mut lines = response.lines();
        let mut usage: Option<Usage> = None;
        loop {
            let line = tokio::select! {
                _ = cancel.cancelled() => return,
                line = lines.next() => line,
            };
            let Some(line) = line else { break };
            let line = match line {
                Ok(line) => line,
                Err(error) => return fault(tx, &ChatError::Stream(error.to_string())).await,
            };

            let Some(data) = line.strip_prefix("data: ") else { continue };
            if data == "[DONE]" {
                break;
            }
            let response: ChatStreamResponse = match from_json(data) {
                Ok(response) => response,
                Err(error) => return fault(tx, &ChatError::Stream(format!("unexpected stream data: {error}"))).await,
            };

            for choice in response.choices {
                if let Some(content) = choice.delta.content {
                    if !content.is_empty() && tx.send(ChatToken::Content(content)).await.is_err() {
                        return; // receiver gone, the exchange was abandoned
                    }
                }
            }
            if let Some(value) = response.usage {
                usage = Some(value);
            }
        }
        if let Some(usage) = usage {
            debug!(
                "usage, prompt_tokens={}, completion_tokens={}",
                usage.prompt_tokens, usage.completion_tokens
            );
        }
    }

    async fn single_completion(&self, request: ChatRequest, tx: &mpsc::Sender<ChatToken>, cancel: &CancellationToken) {
        let response = tokio::select! {
            _ = cancel.cancelled() => return,
            response = self.call_api(&request) => response,
        };
        let content = match response {
            Ok(response) => read_response(response).await,
            Err(error) => Err(error),
        };
        match content {
            Ok(content) => {
                let _ = tx.send(ChatToken::Content(content)).await;
            }
            Err(error) => fault(tx, &error).await,
        }
    }

    async fn call_api(&self, request: &ChatRequest) -> Result<reqwest::Response, ChatError> {
        let body = to_json(request).map_err(|error| ChatError::Request(error.to_string()))?;
        let response = self
            .http
            .post(self.endpoint(&request.model))
            .header("Content-Type", "application/json")
            .header("api-key", &self.api_key) // azure api uses header auth
            .bearer_auth(&self.api_key)
            .body(body)
            .send()
            .await
            .map_err(ChatError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChatError::Api {
                status: status.as_u16(),
                message: api_error_message(&body),
            });
        }
        Ok(response)
    }

    fn endpoint(&self, model: &str) -> String {
        match self.api_type {
            ApiType::OpenAi => format!("{}/chat/completions", self.base_url),
            ApiType::Azure => format!(
                "{}/openai/deployments/{model}/chat/completions?api-version={AZURE_API_VERSION}",
                self.base_url
            ),
        }
    }
}

async fn fault(tx: &mpsc::Sender<ChatToken>, error: &ChatError) {
    warn!("chat completion failed, error={error}");
    let _ = tx.send(ChatToken::Fault(classify(error))).await;
}

async fn read_response(response: reqwest::Response) -> Result<String, ChatError> {
    let body = response.text().await.map_err(ChatError::from_reqwest)?;
    let response: ChatResponse =
        from_json(&body).map_err(|error| ChatError::Stream(format!("unexpected response: {error}")))?;
    if let Some(usage) = response.usage {
        debug!(
            "usage, prompt_tokens={}, completion_tokens={}",
            usage.prompt_tokens, usage.completion_tokens
        );
    }
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ChatError::Stream("response has no choices".to_string()))?;
    choice
        .message
        .content
        .ok_or_else(|| ChatError::Stream("response has no content".to_string()))
}

fn api_error_message(body: &str) -> String {
    match serde_json::from_str::<ApiErrorResponse>(body) {
        Ok(response) => response.error.message,
        Err(_) => body.to_string(),
    }
}

fn api_key(api_key: &str) -> Result<String> {
    if let Some(env) = api_key.strip_prefix("env:") {
        env::var(env).context(format!("can not find env, name={env}"))
    } else {
        Ok(api_key.to_string())
    }
}
