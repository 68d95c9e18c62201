//! Terminal output for the CLI
//!
//! Streams relay events to stdout as they arrive, with a spinner until the
//! first delta and a one-line outcome at the end.

pub mod renderer;
pub mod spinner;
pub mod theme;

pub use renderer::TerminalRenderer;
pub use spinner::{RelaySpinner, Stage};
pub use theme::Theme;

use crate::relay::{RelayEvent, RelayHandle, SessionReport};
use anyhow::{Context, Result};

/// Print every event of `handle` and wait for the session task
pub async fn stream_to_terminal(
    handle: RelayHandle,
    renderer: &TerminalRenderer,
) -> Result<SessionReport> {
    let RelayHandle { mut events, task } = handle;
    let mut spinner = RelaySpinner::new();

    while let Some(event) = events.recv().await {
        let mid_answer = spinner.stage() == Stage::Streaming;
        spinner.observe(&event);
        match event {
            RelayEvent::Init(_) => {}
            RelayEvent::Message(delta) => renderer.render_delta(&delta),
            RelayEvent::Done(_) => println!(),
            RelayEvent::Error(reason) => {
                if mid_answer {
                    println!();
                }
                renderer.render_error(&reason);
            }
        }
    }
    spinner.stop();

    let report = task.await.context("relay task panicked")?;
    renderer.render_session(&report);
    Ok(report)
}
