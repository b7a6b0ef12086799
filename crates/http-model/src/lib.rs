//! A model provider for backends that answer a JSON `POST` with a stream of
//! server-sent-event frames.

#[macro_use]
extern crate tracing;

mod config;
mod io;
mod response;

use std::error::Error as StdError;
use std::fmt::{self, Display};
use std::sync::Arc;

use backoff::ExponentialBackoffBuilder;
use bytes::Bytes;
use mime::Mime;
use relay_model::{
    ErrorKind, ModelProvider, ModelProviderError, ModelRequest,
};
use reqwest::{Client, RequestBuilder, Response, StatusCode, header};

pub use config::{HttpModelConfig, HttpModelConfigBuilder};
use io::Chunks;
pub use response::HttpResponse;

/// Error type for [`HttpModelProvider`].
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

/// HTTP streaming model provider.
#[derive(Clone, Debug)]
pub struct HttpModelProvider {
    client: Client,
    config: Arc<HttpModelConfig>,
}

impl HttpModelProvider {
    /// Creates a new `HttpModelProvider` with the given configuration.
    #[inline]
    pub fn new(config: HttpModelConfig) -> Self {
        Self {
            client: Client::new(),
            config: Arc::new(config),
        }
    }
}

impl ModelProvider for HttpModelProvider {
    type Error = Error;
    type Response = HttpResponse;

    fn send_request(
        &self,
        req: &ModelRequest,
    ) -> impl Future<Output = Result<Self::Response, Self::Error>> + Send + 'static
    {
        let body = serde_json::to_vec(req);
        let client = self.client.clone();
        let config = Arc::clone(&self.config);

        async move {
            let body = Bytes::from(
                body.map_err(|err| Error::new(err.to_string(), ErrorKind::Other))?,
            );
            let policy = ExponentialBackoffBuilder::new()
                .with_max_elapsed_time(Some(config.max_retry_elapsed))
                .build();

            let resp = backoff::future::retry(policy, move || {
                let request = build_request(&client, &config, body.clone());
                async move {
                    let resp = request.send().await.map_err(classify_send_error)?;
                    match classify_status(resp.status()) {
                        Some(err) => Err(err),
                        None => Ok(resp),
                    }
                }
            })
            .await?;

            check_content_type(&resp)?;

            // Here we got a successful response.
            debug!("backend accepted the request, streaming");
            Ok(HttpResponse::from_chunks(Chunks::from_response(resp)))
        }
    }
}

fn build_request(
    client: &Client,
    config: &HttpModelConfig,
    body: Bytes,
) -> RequestBuilder {
    let mut request = client
        .post(&config.endpoint)
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::ACCEPT, "text/event-stream");
    if let Some(api_key) = &config.api_key {
        request = request.header(header::AUTHORIZATION, format!("Bearer {api_key}"));
    }
    for (name, value) in &config.headers {
        request = request.header(name.as_str(), value.as_str());
    }
    request.body(body)
}

fn classify_send_error(err: reqwest::Error) -> backoff::Error<Error> {
    let retryable = err.is_connect() || err.is_timeout();
    let err = Error::new(err.to_string(), ErrorKind::Transport);
    if retryable {
        warn!("failed to reach the backend, will retry: {err}");
        backoff::Error::transient(err)
    } else {
        backoff::Error::permanent(err)
    }
}

fn classify_status(status: StatusCode) -> Option<backoff::Error<Error>> {
    if status.is_success() {
        return None;
    }
    let err = Error::new(
        format!("backend responded with {status}"),
        ErrorKind::Transport,
    );
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        warn!("{err}, will retry");
        Some(backoff::Error::transient(err))
    } else {
        Some(backoff::Error::permanent(err))
    }
}

fn check_content_type(resp: &Response) -> Result<(), Error> {
    let content_type = resp
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok());
    let is_event_stream = content_type
        .and_then(|v| v.parse().ok())
        .map(|m: Mime| m.essence_str() == mime::TEXT_EVENT_STREAM.essence_str())
        .unwrap_or(false);
    if !is_event_stream {
        return Err(Error::new(
            format!("Unexpected content type: {content_type:?}"),
            ErrorKind::Other,
        ));
    }
    Ok(())
}
