use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use pin_project_lite::pin_project;
use relay_model::sse::FrameDecoder;
use relay_model::{ErrorKind, ModelResponse, ModelResponseEvent};

use crate::Error;
use crate::io::Chunks;

struct StreamState {
    chunks: Chunks,
    decoder: FrameDecoder,
    // Events decoded from the last chunk but not yet handed out.
    pending: VecDeque<ModelResponseEvent>,
    exhausted: bool,
}

type PinnedFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;
type NextEvent = Result<(Option<ModelResponseEvent>, StreamState), Error>;

pin_project! {
    pub struct HttpResponse {
        next_event_fut: Option<PinnedFuture<NextEvent>>,
    }
}

impl HttpResponse {
    #[inline]
    pub fn from_chunks(chunks: Chunks) -> Self {
        let state = StreamState {
            chunks,
            decoder: FrameDecoder::new(),
            pending: VecDeque::new(),
            exhausted: false,
        };
        Self {
            next_event_fut: Some(Box::pin(next_event(state))),
        }
    }
}

impl ModelResponse for HttpResponse {
    type Error = crate::Error;

    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<ModelResponseEvent>, Self::Error>> {
        let this = self.project();
        let Some(next_event_fut) = this.next_event_fut else {
            return Poll::Ready(Ok(None));
        };
        let (event, state) = match ready!(next_event_fut.as_mut().poll(cx)) {
            Ok((Some(event), state)) => (event, state),
            Ok((None, _)) => {
                *this.next_event_fut = None;
                return Poll::Ready(Ok(None));
            }
            Err(err) => {
                *this.next_event_fut = None;
                return Poll::Ready(Err(err));
            }
        };

        // The stream may still have more data to pull, create a new future for
        // the next event.
        *this.next_event_fut = Some(Box::pin(next_event(state)));

        Poll::Ready(Ok(Some(event)))
    }
}

async fn next_event(mut state: StreamState) -> NextEvent {
    loop {
        if let Some(event) = state.pending.pop_front() {
            trace!("decoded event: {event:?}");
            return Ok((Some(event), state));
        }
        if state.exhausted {
            return Ok((None, state));
        }

        let chunk = state
            .chunks
            .next_chunk()
            .await
            .map_err(|err| Error::new(err.to_string(), ErrorKind::Transport))?;
        let events = match chunk {
            Some(bytes) => {
                trace!("got a chunk of {} bytes", bytes.len());
                state.decoder.decode(&bytes)
            }
            None => {
                state.exhausted = true;
                state.decoder.finish()
            }
        }
        .map_err(|err| Error::new(err.to_string(), ErrorKind::MalformedFrame))?;

        if state.decoder.is_done() {
            // Anything after the terminator is not read at all.
            state.exhausted = true;
        }
        state.pending.extend(events);
    }
}

#[cfg(test)]
mod tests {
    use std::future::poll_fn;
    use std::pin::pin;

    use bytes::Bytes;
    use relay_model::{ModelProviderError, ToolCall};

    use super::*;

    async fn collect(
        chunks: Vec<&'static str>,
    ) -> Result<Vec<ModelResponseEvent>, Error> {
        let chunks = Chunks::from_vec_deque(
            chunks
                .into_iter()
                .map(|s| Bytes::from_static(s.as_bytes()))
                .collect(),
        );
        let mut resp = pin!(HttpResponse::from_chunks(chunks));
        let mut events = vec![];
        while let Some(event) =
            poll_fn(|cx| resp.as_mut().poll_next_event(cx)).await?
        {
            events.push(event);
        }
        // Polling after completion keeps returning `None`.
        assert_eq!(poll_fn(|cx| resp.as_mut().poll_next_event(cx)).await?, None);
        Ok(events)
    }

    #[tokio::test]
    async fn test_simple_events() {
        let events = collect(vec![
            "data: {\"text\":\"Checking \"}\n\ndata: {\"te",
            "xt\":\"the tree.\"}\n\n",
            "data: {\"function_call\":{\"id\":\"c1\",\"name\":\"list_assets\",\"arguments\":\"{}\"}}\n\n",
            "data: [DONE]\n\n",
            "data: ignored\n\n",
        ])
        .await
        .unwrap();
        assert_eq!(
            events,
            vec![
                ModelResponseEvent::TextDelta("Checking ".to_owned()),
                ModelResponseEvent::TextDelta("the tree.".to_owned()),
                ModelResponseEvent::FunctionCall(ToolCall {
                    id: "c1".to_owned(),
                    name: "list_assets".to_owned(),
                    arguments: "{}".to_owned(),
                }),
            ]
        );
    }

    #[tokio::test]
    async fn test_malformed_frame() {
        let err = collect(vec!["data: {\"text\":\"ok\"}\n\n", "data: {oops\n\n"])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedFrame);
    }
}
