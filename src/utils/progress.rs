//! Spinner shown while external dependency tools run.
//!
//! The spinner is hidden when `CBSCAN_NO_PROGRESS` is set or stderr is not a
//! terminal. `--no-progress` goes through [`Spinner::hidden`] instead.

use indicatif::{ProgressBar as IndicatifBar, ProgressStyle as IndicatifStyle};
use std::io::IsTerminal;
use std::time::Duration;

use crate::constants::NO_PROGRESS_ENV_VAR;

fn is_progress_disabled() -> bool {
    std::env::var(NO_PROGRESS_ENV_VAR).is_ok() || !std::io::stderr().is_terminal()
}

/// An indeterminate progress spinner with cbscan styling.
#[derive(Clone)]
pub struct Spinner {
    inner: IndicatifBar,
}

impl Spinner {
    /// Start a spinner with the given message.
    pub fn start(msg: impl Into<String>) -> Self {
        let bar = if is_progress_disabled() {
            IndicatifBar::hidden()
        } else {
            let bar = IndicatifBar::new_spinner();
            bar.set_style(spinner_style());
            bar.enable_steady_tick(Duration::from_millis(100));
            bar
        };
        bar.set_message(msg.into());
        Self { inner: bar }
    }

    /// A spinner that never draws.
    #[must_use]
    pub fn hidden() -> Self {
        Self {
            inner: IndicatifBar::hidden(),
        }
    }

    /// Stop the spinner and remove it from the terminal.
    pub fn finish_and_clear(&self) {
        self.inner.finish_and_clear();
    }
}

fn spinner_style() -> IndicatifStyle {
    IndicatifStyle::default_spinner()
        .template("{spinner:.cyan} {msg}")
        .unwrap_or_else(|_| IndicatifStyle::default_spinner())
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"])
}
