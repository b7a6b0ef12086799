//! A terminal chat on an in-memory workspace, showing how to use `relay` as
//! a library.

#[macro_use]
extern crate tracing;

use std::env;
use std::io::Write as _;
use std::sync::Arc;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use relay::SessionBuilder;
use relay::core::{CancellationToken, Event, EventKind, Trace};
use relay::host::Workspace;
use relay_http_model::{HttpModelConfigBuilder, HttpModelProvider};
use tokio::io::{self, AsyncBufReadExt};
use tokio::select;
use tokio::sync::mpsc;

const BAR_CHAR: &str = "▎";

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let Ok(endpoint) = env::var("RELAY_BACKEND_URL") else {
        eprintln!("RELAY_BACKEND_URL environment variable is not set");
        return;
    };
    let mut config = HttpModelConfigBuilder::with_endpoint(endpoint);
    if let Ok(api_key) = env::var("RELAY_API_KEY") {
        config = config.with_api_key(api_key);
    }
    let model_provider = HttpModelProvider::new(config.build());

    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<Event>();
    let mut builder = SessionBuilder::with_model_provider(
        model_provider,
        Arc::new(Workspace::demo()),
    )
    .on_event(move |event: &Event| {
        event_tx.send(event.clone()).ok();
    });
    if let Ok(max_turns) = env::var("RELAY_MAX_TURNS") {
        match max_turns.parse() {
            Ok(max_turns) => builder = builder.with_max_turns(max_turns),
            Err(err) => warn!("ignoring RELAY_MAX_TURNS={max_turns}: {err}"),
        }
    }
    let mut session = builder.build();

    let progress_style = ProgressStyle::with_template("{spinner} {wide_msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏");

    loop {
        print!("> ");
        std::io::stdout().flush().ok();

        let Some(line) = read_line().await else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let progress_bar = ProgressBar::new_spinner();
        progress_bar.set_style(progress_style.clone());
        progress_bar.set_message("🤔 Thinking...");
        progress_bar.enable_steady_tick(Duration::from_millis(100));

        let cancel = CancellationToken::new();
        let result = {
            let run = session.send_message(line, cancel.clone());
            tokio::pin!(run);
            loop {
                select! {
                    result = &mut run => break result,
                    Some(event) = event_rx.recv() => {
                        show_event(&progress_bar, &event);
                    }
                    _ = tokio::signal::ctrl_c(), if !cancel.is_cancelled() => {
                        progress_bar.set_message("Cancelling...");
                        cancel.cancel();
                    }
                }
            }
        };
        while let Ok(event) = event_rx.try_recv() {
            show_event(&progress_bar, &event);
        }
        progress_bar.finish_and_clear();

        match result {
            Ok(reply) => {
                println!(
                    "{}🤖 {}",
                    BAR_CHAR.bright_cyan(),
                    reply.content.bright_white()
                );
            }
            Err(err) => {
                println!("{}❌ {}", BAR_CHAR.bright_red(), err.red());
            }
        }
        print_usage(&session.last_traces().roots());
        println!();
    }
}

fn show_event(progress_bar: &ProgressBar, event: &Event) {
    match &event.kind {
        EventKind::Working { message, .. } => {
            progress_bar.set_message(format!("🤔 {message}..."));
        }
        EventKind::Success { message } => {
            progress_bar.suspend(|| {
                println!("{}✅ {}", BAR_CHAR.bright_green(), message.dimmed());
            });
        }
        EventKind::Error { message, .. } => {
            progress_bar.suspend(|| {
                println!("{}⚠️  {}", BAR_CHAR.bright_yellow(), message.dimmed());
            });
        }
        EventKind::Delta { .. } => {}
    }
}

fn print_usage(roots: &[Trace]) {
    let (prompt, completion) = roots.iter().fold((0, 0), |(p, c), trace| {
        let usage = trace.aggregated_token_usage;
        (p + usage.prompt_tokens, c + usage.completion_tokens)
    });
    if prompt + completion > 0 {
        let summary = format!(
            "{} turns, {prompt} prompt + {completion} completion tokens",
            roots.len()
        );
        println!("{}", summary.dimmed());
    }
}

async fn read_line() -> Option<String> {
    let mut stdin = io::BufReader::new(io::stdin());
    let mut line = String::new();

    match stdin.read_line(&mut line).await {
        Ok(count) => {
            if count == 0 {
                return None;
            }
            Some(line)
        }
        Err(err) => {
            error!("error reading input: {}", err);
            None
        }
    }
}
