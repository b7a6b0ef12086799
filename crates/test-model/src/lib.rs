//! A local scripted model for testing purpose.

mod preset;

use std::collections::VecDeque;
use std::error::Error as StdError;
use std::fmt::{self, Debug, Display, Formatter};
use std::future::ready;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll, ready};
use std::time::Duration;

use relay_model::sse::{FrameDecoder, FrameError};
use relay_model::{
    ErrorKind, ModelProvider, ModelProviderError, ModelRequest, ModelResponse,
    ModelResponseEvent,
};
use tokio::time::{Sleep, sleep};

pub use preset::*;

#[derive(Debug)]
pub struct Error {
    message: String,
    kind: ErrorKind,
}

impl Error {
    fn malformed(err: FrameError) -> Self {
        Self {
            message: err.to_string(),
            kind: ErrorKind::MalformedFrame,
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
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

pub struct TestModelResponse {
    events: VecDeque<PresetEvent>,
    pending: VecDeque<ModelResponseEvent>,
    decoder: FrameDecoder,
    stall: bool,
    finished: bool,
    delay: Duration,
    sleep: Option<Pin<Box<Sleep>>>,
}

impl ModelResponse for TestModelResponse {
    type Error = crate::Error;

    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<ModelResponseEvent>, Self::Error>> {
        let this = self.get_mut();
        loop {
            if let Some(event) = this.pending.pop_front() {
                return Poll::Ready(Ok(Some(event)));
            }
            if this.finished {
                return Poll::Ready(Ok(None));
            }

            let delay = this.delay;
            let timer = this.sleep.get_or_insert_with(|| Box::pin(sleep(delay)));
            ready!(timer.as_mut().poll(cx));
            this.sleep = None;

            match this.events.pop_front() {
                Some(PresetEvent::TextDelta(text)) => {
                    this.pending.push_back(ModelResponseEvent::TextDelta(text));
                }
                Some(PresetEvent::FunctionCall(call)) => {
                    this.pending
                        .push_back(ModelResponseEvent::FunctionCall(call));
                }
                Some(PresetEvent::TokenUsage(usage)) => {
                    this.pending
                        .push_back(ModelResponseEvent::TokenUsage(usage));
                }
                Some(PresetEvent::SseChunk(chunk)) => {
                    let events = this
                        .decoder
                        .decode(chunk.as_bytes())
                        .map_err(Error::malformed)?;
                    this.pending.extend(events);
                }
                None => {
                    if this.stall {
                        // Only cancellation gets the caller out of here.
                        return Poll::Pending;
                    }
                    let events =
                        this.decoder.finish().map_err(Error::malformed)?;
                    this.pending.extend(events);
                    this.finished = true;
                }
            }
        }
    }
}

#[derive(Default)]
struct Script {
    responses: VecDeque<PresetResponse>,
    requests: Vec<ModelRequest>,
}

/// A local scripted model for testing purpose.
///
/// Before sending requests, you need to setup the script, which is how the
/// model should respond to each request. Responses are consumed in order,
/// one per request, no matter which agent sends it. If there are no enough
/// responses in the script, an error will be returned.
///
/// Clones share the same script, so a test can keep a clone around to
/// inspect the requests the orchestrator sent.
///
/// # Note
///
/// This type is not optimized for production use, there are heavy memory
/// copies involved. You should only use it for testing.
#[derive(Clone, Default)]
pub struct TestModelProvider {
    script: Arc<Mutex<Script>>,
    delay: Option<Duration>,
}

impl TestModelProvider {
    fn script(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[inline]
    pub fn add_response(&self, preset: PresetResponse) {
        self.script().responses.push_back(preset);
    }

    #[inline]
    pub fn set_delay(&mut self, duration: Duration) {
        self.delay = Some(duration);
    }

    /// Returns the requests received so far.
    #[inline]
    pub fn requests(&self) -> Vec<ModelRequest> {
        self.script().requests.clone()
    }

    /// Returns the number of responses not consumed yet.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.script().responses.len()
    }
}

impl ModelProvider for TestModelProvider {
    type Error = crate::Error;
    type Response = TestModelResponse;

    fn send_request(
        &self,
        req: &ModelRequest,
    ) -> impl Future<Output = Result<Self::Response, Self::Error>> + Send + 'static
    {
        let mut script = self.script();
        script.requests.push(req.clone());
        let result = match script.responses.pop_front() {
            None => Err(Error {
                message: "no enough steps".to_owned(),
                kind: ErrorKind::Other,
            }),
            Some(preset) if preset.fail => Err(Error {
                message: "connection reset by peer".to_owned(),
                kind: ErrorKind::Transport,
            }),
            Some(preset) => Ok(TestModelResponse {
                events: preset.events.into(),
                pending: VecDeque::new(),
                decoder: FrameDecoder::new(),
                stall: preset.stall,
                finished: false,
                delay: self.delay.unwrap_or(Duration::from_millis(1)),
                sleep: None,
            }),
        };
        ready(result)
    }
}
