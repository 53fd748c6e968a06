//! Model providers for OpenAI-compatible APIs.

#[macro_use]
extern crate tracing;

mod config;
mod embedding;
mod io;
mod proto;
mod response;

use std::error::Error as StdError;
use std::fmt::{self, Display};
use std::sync::Arc;

use docchat_model::{
    ErrorKind, ModelProvider, ModelProviderError, ModelRequest,
};
use mime::Mime;
use reqwest::{Client, RequestBuilder, Response, StatusCode, header};

pub use config::{OpenAIConfig, OpenAIConfigBuilder};
pub use embedding::OpenAIEmbeddingProvider;
use io::{Chunks, Sse};
use proto::ErrorResponse;
use response::OpenAIResponse;

/// Error type for the providers in this crate.
#[derive(Debug)]
pub struct Error {
    message: String,
    kind: ErrorKind,
}

impl Error {
    fn new(message: impl Into<String>, kind: ErrorKind) -> Self {
        Self {
            message: message.into(),
            kind,
        }
    }

    /// Returns the error message.
    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl StdError for Error {}

impl ModelProviderError for Error {
    #[inline]
    fn kind(&self) -> ErrorKind {
        self.kind
    }
}

/// OpenAI-compatible chat model provider.
#[derive(Clone, Debug)]
pub struct OpenAIProvider {
    client: Client,
    config: Arc<OpenAIConfig>,
}

impl OpenAIProvider {
    /// Creates a new `OpenAIProvider` with the given configuration.
    #[inline]
    pub fn new(config: OpenAIConfig) -> Self {
        Self {
            client: Client::new(),
            config: Arc::new(config),
        }
    }

    /// Creates an embedding provider that shares the connection pool and
    /// configuration with this provider.
    #[inline]
    pub fn embedding_provider(&self) -> OpenAIEmbeddingProvider {
        OpenAIEmbeddingProvider::new(
            self.client.clone(),
            Arc::clone(&self.config),
        )
    }
}

impl ModelProvider for OpenAIProvider {
    type Error = Error;
    type Response = OpenAIResponse;

    fn send_request(
        &self,
        req: &ModelRequest,
    ) -> impl Future<Output = Result<Self::Response, Self::Error>> + Send + 'static
    {
        let openai_req = proto::create_request(req, &self.config);
        let resp_fut = authorized_post(
            &self.client,
            &self.config,
            "/chat/completions",
        )
        .header(header::ACCEPT, "text/event-stream")
        .json(&openai_req)
        .send();

        async move {
            let resp = check_response(resp_fut.await).await?;

            let content_type = resp
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok());
            let is_valid_content_type = content_type
                .and_then(|v| v.parse().ok())
                .map(|m: Mime| m.subtype().as_str() == "event-stream")
                .unwrap_or(false);
            if !is_valid_content_type {
                return Err(Error::new(
                    format!("Unexpected content type: {content_type:?}"),
                    ErrorKind::Other,
                ));
            }

            // Here we got a successful response.
            let chunks = Chunks::from_response(resp);
            let sse = Sse::new(chunks);
            Ok(OpenAIResponse::from_sse(sse))
        }
    }
}

#[inline]
fn authorized_post(
    client: &Client,
    config: &OpenAIConfig,
    path: &str,
) -> RequestBuilder {
    client
        .post(config.endpoint(path))
        .header(
            header::AUTHORIZATION,
            format!("Bearer {}", config.api_key),
        )
        .header(header::CONTENT_TYPE, "application/json")
}

/// Turns transport failures and non-success statuses into [`Error`].
async fn check_response(
    resp: Result<Response, reqwest::Error>,
) -> Result<Response, Error> {
    let resp =
        resp.map_err(|err| Error::new(format!("{err}"), ErrorKind::Other))?;
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let body = resp.text().await.unwrap_or_default();
    debug!("request failed with {status}: {body}");
    Err(error_from_status(status, &body))
}

fn error_from_status(status: StatusCode, body: &str) -> Error {
    let (message, code) = match serde_json::from_str::<ErrorResponse>(body) {
        Ok(resp) => (
            resp.error.message,
            resp.error.code.map(|c| c.to_string()).unwrap_or_default(),
        ),
        Err(_) => (body.to_owned(), String::new()),
    };
    let kind = if status == StatusCode::TOO_MANY_REQUESTS {
        ErrorKind::RateLimitExceeded
    } else if status == StatusCode::BAD_REQUEST
        && (code.contains("content_filter") || code.contains("content_policy"))
    {
        ErrorKind::Moderated
    } else {
        ErrorKind::Other
    };
    let message = if message.is_empty() {
        format!("HTTP {status}")
    } else {
        format!("HTTP {status}: {message}")
    };
    Error::new(message, kind)
}
