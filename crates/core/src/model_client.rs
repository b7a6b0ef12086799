use std::future::poll_fn;
use std::pin::{Pin, pin};
use std::sync::Arc;

use relay_model::{
    Message, ModelProvider, ModelRequest, ModelResponse, ModelResponseEvent,
};
use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::Error;

type SendRequestResult = Result<Message, Error>;
type BoxedSendRequestFuture =
    Pin<Box<dyn Future<Output = SendRequestResult> + Send>>;
type DeltaFn = Box<dyn Fn(&str) + Send + 'static>;
#[rustfmt::skip]
type HandlerFn = Arc<
    dyn Fn(ModelRequest, CancellationToken, DeltaFn)
        -> BoxedSendRequestFuture + Send + Sync
>;

/// A wrapper around a model provider that provides a type-erased interface
/// for the other modules.
#[derive(Clone)]
pub(crate) struct ModelClient {
    handler_fn: HandlerFn,
}

impl ModelClient {
    #[inline]
    pub fn new<P: ModelProvider + 'static>(provider: P) -> Self {
        // We have to erase the type `P`, since `ModelClient` doesn't have a
        // generic parameter and we don't want it either.
        let handler_fn: HandlerFn = Arc::new(move |req, cancel, on_delta| {
            let fut = provider.send_request(&req);
            Box::pin(
                async move {
                    trace!("got a request: {:?}", req);
                    let resp_or_err = select! {
                        biased;
                        _ = cancel.cancelled() => {
                            debug!("cancelled before the response arrived");
                            return Err(Error::Cancelled);
                        }
                        resp_or_err = fut => resp_or_err,
                    };
                    handle_response::<P>(resp_or_err, &cancel, on_delta).await
                }
                .instrument(trace_span!("model client req")),
            )
        });
        Self { handler_fn }
    }

    /// Sends a request and collects the streamed response into an
    /// assistant message.
    ///
    /// Text deltas are reported through `on_delta` as they arrive. When
    /// `cancel` fires, the response stops streaming and
    /// [`Error::Cancelled`] is returned.
    #[inline]
    pub async fn send_request(
        &self,
        req: ModelRequest,
        cancel: &CancellationToken,
        on_delta: impl Fn(&str) + Send + 'static,
    ) -> SendRequestResult {
        (self.handler_fn)(req, cancel.clone(), Box::new(on_delta)).await
    }
}

async fn handle_response<P: ModelProvider + 'static>(
    resp_or_err: Result<P::Response, P::Error>,
    cancel: &CancellationToken,
    on_delta: DeltaFn,
) -> SendRequestResult {
    let resp = match resp_or_err {
        Ok(resp) => resp,
        Err(err) => {
            error!("got an error: {err:?}");
            return Err(Error::from_provider(&err));
        }
    };

    let mut message = Message::assistant("");

    trace!("start receiving events");

    let mut pinned_resp = pin!(resp);
    loop {
        let event_or_err = select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("cancelled while streaming");
                return Err(Error::Cancelled);
            }
            event_or_err = poll_fn(|cx| pinned_resp.as_mut().poll_next_event(cx)) => event_or_err,
        };
        let event = match event_or_err {
            Ok(event) => event,
            Err(err) => {
                error!("got an error: {err:?}");
                return Err(Error::from_provider(&err));
            }
        };

        let Some(event) = event else {
            break;
        };
        trace!("got an event: {event:?}");

        match event {
            ModelResponseEvent::TextDelta(text) => {
                on_delta(&text);
                message.content.push_str(&text);
            }
            ModelResponseEvent::FunctionCall(call) => {
                message.tool_calls.push(call);
            }
            ModelResponseEvent::TokenUsage(usage) => {
                // Backends report cumulative usage, the last frame wins.
                message.token_usage = Some(usage);
            }
        }

        if cancel.is_cancelled() {
            debug!("cancelled after an event");
            return Err(Error::Cancelled);
        }
    }

    trace!("finished a request");

    Ok(message)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use relay_model::{ErrorKind, TokenUsage, ToolCall};
    use relay_test_model::{PresetEvent, PresetResponse, TestModelProvider};

    use super::*;

    fn request() -> ModelRequest {
        ModelRequest {
            messages: vec![Message::user("Hi")],
            functions: vec![],
        }
    }

    #[tokio::test]
    async fn test_send_request() {
        let model_provider = TestModelProvider::default();
        model_provider.add_response(
            PresetResponse::with_events([
                PresetEvent::TextDelta("How ".to_owned()),
                PresetEvent::TextDelta("are you?".to_owned()),
                PresetEvent::TokenUsage(TokenUsage {
                    total_tokens: 3,
                    ..Default::default()
                }),
                PresetEvent::TokenUsage(TokenUsage {
                    total_tokens: 7,
                    ..Default::default()
                }),
            ])
            .then(PresetEvent::FunctionCall(ToolCall {
                id: "c1".to_owned(),
                name: "list_assets".to_owned(),
                arguments: "{}".to_owned(),
            })),
        );

        let model_client = ModelClient::new(model_provider);
        let deltas = Arc::new(Mutex::new(vec![]));
        let resp = model_client
            .send_request(request(), &CancellationToken::new(), {
                let deltas = Arc::clone(&deltas);
                move |text| deltas.lock().unwrap().push(text.to_owned())
            })
            .await
            .unwrap();
        assert_eq!(resp.content, "How are you?");
        assert_eq!(resp.tool_calls.len(), 1);
        assert_eq!(resp.token_usage.unwrap().total_tokens, 7);
        assert_eq!(*deltas.lock().unwrap(), ["How ", "are you?"]);
    }

    #[tokio::test]
    async fn test_error_handling() {
        let model_provider = TestModelProvider::default();
        model_provider.add_response(PresetResponse::sse_chunks(["data: {oops}\n\n"]));
        let model_client = ModelClient::new(model_provider);
        let cancel = CancellationToken::new();

        let err = model_client
            .send_request(request(), &cancel, |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MalformedStreamFrame(_)));

        // The script is exhausted now.
        let err = model_client
            .send_request(request(), &cancel, |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Backend { kind: ErrorKind::Other, .. }));
    }

    #[tokio::test]
    async fn test_cancel_while_streaming() {
        let model_provider = TestModelProvider::default();
        model_provider.add_response(PresetResponse::text("Partial").stalled());
        let model_client = ModelClient::new(model_provider);
        let cancel = CancellationToken::new();

        let err = model_client
            .send_request(request(), &cancel, {
                let cancel = cancel.clone();
                move |_| cancel.cancel()
            })
            .await
            .unwrap_err();
        assert_eq!(err, Error::Cancelled);
    }
}
