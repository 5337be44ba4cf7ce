use std::pin::Pin;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use futures::stream::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client as ReqwestClient, Response, header};
use serde::Deserialize;
use url::Url;

use crate::error::{Error, Result};
use crate::observability::{
    CLIENT_REQUEST_DURATION, CLIENT_REQUEST_ERRORS, CLIENT_REQUESTS, STREAM_BYTES, STREAM_ERRORS,
};
use crate::types::{ChatRequest, ConversationId, ModelsResponse};

/// Base URL used when neither the caller nor the environment names one.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8080/";

/// Environment variable consulted for the base URL.
pub const BASE_URL_ENV: &str = "PARLEY_BASE_URL";

const MODELS_PATH: &str = "chat/models";
const SEND_PATH: &str = "chat/send";
const HISTORY_PATH: &str = "chat/history/";

/// Raw response body of a send request, chunked however the network delivered it.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// The three backend calls a chat session makes.
///
/// [`ChatClient`] speaks HTTP. Tests substitute an in-memory implementation.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Fetch the model registry payload.
    async fn fetch_models(&self) -> Result<ModelsResponse>;

    /// Send one message and hand back the streamed reply body.
    ///
    /// Resolves once response headers arrive. A non-success status is an
    /// error here, before any body is read.
    async fn send(&self, request: &ChatRequest) -> Result<ByteStream>;

    /// Ask the backend to drop server-side state for a conversation.
    async fn clear_conversation(&self, conversation_id: &ConversationId) -> Result<()>;
}

/// HTTP client for the chat backend.
#[derive(Debug, Clone)]
pub struct ChatClient {
    client: ReqwestClient,
    base_url: Url,
    timeout: Option<Duration>,
}

impl ChatClient {
    /// Create a new client.
    ///
    /// The base URL is taken from the argument, then from `PARLEY_BASE_URL`,
    /// then defaults to a local backend.
    pub fn new(base_url: Option<String>) -> Result<Self> {
        Self::with_options(base_url, None)
    }

    /// Create a new client with an optional request timeout.
    ///
    /// Without a timeout, a stalled stream is only ended by the server or by
    /// stopping the exchange.
    pub fn with_options(base_url: Option<String>, timeout: Option<Duration>) -> Result<Self> {
        let base_url = base_url
            .or_else(|| std::env::var(BASE_URL_ENV).ok())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let base_url = parse_base_url(&base_url)?;

        let mut builder = ReqwestClient::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(|e| {
            Error::http_client(
                format!("Failed to build HTTP client: {}", e),
                Some(Box::new(e)),
            )
        })?;

        Ok(Self {
            client,
            base_url,
            timeout,
        })
    }

    /// The base URL all endpoints are resolved against.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// URL of the models endpoint.
    pub fn models_url(&self) -> Result<Url> {
        Ok(self.base_url.join(MODELS_PATH)?)
    }

    /// URL of the send endpoint.
    pub fn send_url(&self) -> Result<Url> {
        Ok(self.base_url.join(SEND_PATH)?)
    }

    /// URL of the history resource for one conversation.
    pub fn history_url(&self, conversation_id: &ConversationId) -> Result<Url> {
        let mut url = self.base_url.join(HISTORY_PATH)?;
        url.path_segments_mut()
            .map_err(|_| Error::url("Base URL cannot carry a path", None))?
            .pop_if_empty()
            .push(conversation_id.as_str());
        Ok(url)
    }

    fn stream_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static("text/event-stream"),
        );
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        headers
    }

    fn map_request_error(&self, e: reqwest::Error) -> Error {
        CLIENT_REQUEST_ERRORS.click();
        if e.is_timeout() {
            Error::timeout(
                format!("Request timed out: {}", e),
                self.timeout.map(|t| t.as_secs_f64()),
            )
        } else if e.is_connect() {
            Error::connection(format!("Connection error: {}", e), Some(Box::new(e)))
        } else {
            Error::http_client(format!("Request failed: {}", e), Some(Box::new(e)))
        }
    }

    /// Turn a non-success response into a transport error.
    async fn process_error_response(response: Response) -> Error {
        CLIENT_REQUEST_ERRORS.click();
        let status = response.status();

        #[derive(Deserialize)]
        struct ErrorBody {
            error: Option<String>,
            message: Option<String>,
        }

        let body = response.text().await.unwrap_or_default();
        let detail = serde_json::from_str::<ErrorBody>(&body)
            .ok()
            .and_then(|b| b.error.or(b.message))
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| {
                status
                    .canonical_reason()
                    .unwrap_or("request failed")
                    .to_string()
            });
        tracing::warn!(status = status.as_u16(), detail = %detail, "backend returned an error status");
        Error::transport(
            Some(status.as_u16()),
            format!("HTTP {}: {}", status.as_u16(), detail),
            None,
        )
    }
}

#[async_trait]
impl Transport for ChatClient {
    async fn fetch_models(&self) -> Result<ModelsResponse> {
        let url = self.models_url()?;
        CLIENT_REQUESTS.click();
        let start = Instant::now();
        let response = self
            .client
            .get(url)
            .header(header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| self.map_request_error(e))?;
        CLIENT_REQUEST_DURATION.add(start.elapsed().as_secs_f64());

        if !response.status().is_success() {
            return Err(Self::process_error_response(response).await);
        }

        response.json::<ModelsResponse>().await.map_err(|e| {
            Error::serialization(
                format!("Failed to parse models response: {}", e),
                Some(Box::new(e)),
            )
        })
    }

    async fn send(&self, request: &ChatRequest) -> Result<ByteStream> {
        let url = self.send_url()?;
        CLIENT_REQUESTS.click();
        let start = Instant::now();
        let response = self
            .client
            .post(url)
            .headers(Self::stream_headers())
            .json(request)
            .send()
            .await
            .map_err(|e| self.map_request_error(e))?;
        CLIENT_REQUEST_DURATION.add(start.elapsed().as_secs_f64());

        if !response.status().is_success() {
            return Err(Self::process_error_response(response).await);
        }

        let stream = response.bytes_stream().map(|result| match result {
            Ok(bytes) => {
                STREAM_BYTES.count(bytes.len() as u64);
                Ok(bytes)
            }
            Err(e) => {
                STREAM_ERRORS.click();
                Err(Error::transport(
                    None,
                    format!("Error in HTTP stream: {}", e),
                    Some(Box::new(e)),
                ))
            }
        });
        Ok(Box::pin(stream))
    }

    async fn clear_conversation(&self, conversation_id: &ConversationId) -> Result<()> {
        let url = self.history_url(conversation_id)?;
        CLIENT_REQUESTS.click();
        let response = self
            .client
            .delete(url)
            .send()
            .await
            .map_err(|e| self.map_request_error(e))?;
        if !response.status().is_success() {
            return Err(Self::process_error_response(response).await);
        }
        Ok(())
    }
}

/// Parse a base URL, making sure relative endpoint paths resolve beneath it.
fn parse_base_url(base_url: &str) -> Result<Url> {
    let mut url = Url::parse(base_url.trim())?;
    if url.cannot_be_a_base() {
        return Err(Error::validation(
            format!("{base_url} cannot be used as a base URL"),
            Some("base_url".to_string()),
        ));
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}
