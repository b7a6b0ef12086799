use std::future::ready;
use std::pin::Pin;

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::{Tool, ToolError, ToolResult};
use crate::context::ExecutionContext;
use crate::events::EventBus;

pub(crate) type BoxedToolFuture<'a> =
    Pin<Box<dyn Future<Output = ToolResult> + Send + 'a>>;

pub(crate) trait ToolObject<A>: Send + Sync + 'static {
    fn name(&self) -> &str;

    fn title(&self) -> &str;

    fn description(&self, ctx: &ExecutionContext<A>) -> String;

    fn parameters(&self, ctx: &ExecutionContext<A>) -> Option<Value>;

    fn run<'a>(
        &'a self,
        ctx: &'a ExecutionContext<A>,
        arguments: Value,
        cancel: &'a CancellationToken,
        events: &'a EventBus,
    ) -> BoxedToolFuture<'a>;
}

pub(crate) struct ToolObjectImpl<T>(pub T);

impl<A, T> ToolObject<A> for ToolObjectImpl<T>
where
    A: Send + Sync + 'static,
    T: Tool<A>,
{
    #[inline]
    fn name(&self) -> &str {
        self.0.name()
    }

    #[inline]
    fn title(&self) -> &str {
        self.0.title()
    }

    #[inline]
    fn description(&self, ctx: &ExecutionContext<A>) -> String {
        self.0.description(ctx)
    }

    #[inline]
    fn parameters(&self, ctx: &ExecutionContext<A>) -> Option<Value> {
        self.0.parameters(ctx)
    }

    fn run<'a>(
        &'a self,
        ctx: &'a ExecutionContext<A>,
        arguments: Value,
        cancel: &'a CancellationToken,
        events: &'a EventBus,
    ) -> BoxedToolFuture<'a> {
        let input: T::Input = match serde_json::from_value(arguments) {
            Ok(input) => input,
            Err(err) => {
                let reason = format!("{err}");
                return Box::pin(ready(Err(
                    ToolError::invalid_arguments().with_reason(reason)
                )));
            }
        };
        let span = debug_span!("tool execute", name = self.0.name());
        Box::pin(self.0.run(ctx, input, cancel, events).instrument(span))
    }
}
