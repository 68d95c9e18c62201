//! Progress indicator for a relay session

use crate::relay::RelayEvent;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Where a session is, as far as the terminal is concerned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Session task not started yet
    Preparing,
    /// `init` seen, no delta yet
    AwaitingAnswer,
    /// Deltas are being printed; the spinner must stay out of the way
    Streaming,
    Finished,
}

impl Stage {
    fn after(self, event: &RelayEvent) -> Stage {
        match event {
            RelayEvent::Init(_) if self == Stage::Preparing => Stage::AwaitingAnswer,
            RelayEvent::Init(_) => self,
            RelayEvent::Message(_) => Stage::Streaming,
            RelayEvent::Done(_) | RelayEvent::Error(_) => Stage::Finished,
        }
    }

    /// Spinner text, or `None` when nothing should spin
    pub fn label(self) -> Option<&'static str> {
        match self {
            Stage::Preparing => Some("Connecting..."),
            Stage::AwaitingAnswer => Some("Waiting for the model..."),
            Stage::Streaming | Stage::Finished => None,
        }
    }
}

/// Spins while nothing is printed yet and clears itself once the answer starts
pub struct RelaySpinner {
    bar: ProgressBar,
    stage: Stage,
    active: bool,
}

impl RelaySpinner {
    pub fn new() -> Self {
        Self::with_bar(ProgressBar::new_spinner())
    }

    /// A spinner that draws nothing
    pub fn hidden() -> Self {
        Self::with_bar(ProgressBar::hidden())
    }

    fn with_bar(bar: ProgressBar) -> Self {
        let style = ProgressStyle::with_template("  {spinner:.cyan} {msg} {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&[
                "\u{2800}", "\u{2801}", "\u{2803}", "\u{2807}", "\u{280f}", "\u{281f}", "\u{283f}",
                "\u{287f}", "\u{28ff}", "\u{28fe}", "\u{28fc}", "\u{28f8}", "\u{28f0}", "\u{28e0}",
                "\u{28c0}", "\u{2880}", "\u{2800}",
            ]);
        bar.set_style(style);
        let mut spinner = Self {
            bar,
            stage: Stage::Preparing,
            active: false,
        };
        spinner.show();
        spinner
    }

    /// Advance on `event` and return the new stage
    pub fn observe(&mut self, event: &RelayEvent) -> Stage {
        let next = self.stage.after(event);
        if next != self.stage {
            self.stage = next;
            self.show();
        }
        self.stage
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    fn show(&mut self) {
        match self.stage.label() {
            Some(label) => {
                self.bar.set_message(label);
                if !self.active {
                    self.bar.enable_steady_tick(Duration::from_millis(80));
                    self.active = true;
                }
            }
            None => self.stop(),
        }
    }

    /// Stop and clear the spinner
    pub fn stop(&mut self) {
        if self.active {
            self.bar.finish_and_clear();
            self.active = false;
        }
    }
}

impl Default for RelaySpinner {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for RelaySpinner {
    fn drop(&mut self) {
        self.stop();
    }
}
