// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Human-facing status reporting.
//!
//! While idle, bundlesync shows a spinner with the current wall clock time and
//! the most recent status message. Every significant transition, e.g.,
//! detecting a bundle or finishing a push, is printed as a permanent
//! timestamped line above the spinner. Failures are marked distinctly from
//! successes.
//!
//! Reporting is purely observational. Nothing in the ingestion path waits on
//! it or shares state with it.

use chrono::{DateTime, Local};
use indicatif::{ProgressBar, ProgressState, ProgressStyle};
use std::{fmt::Write, time::Duration};

const SPINNER_TEMPLATE: &str = "{spinner:.cyan} [{clock}] {prefix} {wide_msg:.dim}";

const TICK_CHARS: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ ";

const IDLE_TEXT: &str = "Waiting for new archive...";

const SUCCESS_MARK: char = '✓';

const FAILURE_MARK: char = '✗';

/// Render a permanent status line.
pub fn status_line(time: DateTime<Local>, mark: char, message: &str) -> String {
    format!("[{}] {mark} {message}", time.format("%H:%M:%S"))
}

/// Status reporter backed by a spinner.
///
/// Cheap to clone. All clones draw to the same spinner.
#[derive(Debug, Clone)]
pub struct Reporter {
    bar: ProgressBar,
}

impl Reporter {
    /// Construct new spinner that redraws itself every tick.
    ///
    /// # Errors
    ///
    /// - Return [`indicatif::style::TemplateError`] if spinner template is
    ///   invalid.
    pub fn spinner(tick: Duration) -> Result<Self, indicatif::style::TemplateError> {
        let style = ProgressStyle::with_template(SPINNER_TEMPLATE)?
            .tick_chars(TICK_CHARS)
            .with_key("clock", |_: &ProgressState, out: &mut dyn Write| {
                let _ = write!(out, "{}", Local::now().format("%H:%M:%S"));
            });

        let bar = ProgressBar::new_spinner();
        bar.set_style(style);
        bar.set_prefix(IDLE_TEXT);
        bar.enable_steady_tick(tick);

        Ok(Self { bar })
    }

    /// Construct new reporter that draws nothing.
    pub fn hidden() -> Self {
        Self {
            bar: ProgressBar::hidden(),
        }
    }

    /// Replace transient status shown next to the spinner.
    pub fn status(&self, message: impl AsRef<str>) {
        self.bar.set_message(format!("({})", message.as_ref()));
    }

    /// Print permanent success line.
    pub fn success(&self, message: impl AsRef<str>) {
        self.emit(SUCCESS_MARK, message.as_ref());
    }

    /// Print permanent failure line.
    pub fn failure(&self, message: impl AsRef<str>) {
        self.emit(FAILURE_MARK, message.as_ref());
    }

    /// Transient status currently shown next to the spinner.
    pub fn last_status(&self) -> String {
        self.bar.message()
    }

    /// Clear spinner for good and print final line.
    pub fn stop(&self, message: impl AsRef<str>) {
        self.bar.finish_and_clear();
        if !self.bar.is_hidden() {
            println!("{}", status_line(Local::now(), SUCCESS_MARK, message.as_ref()));
        }
    }

    fn emit(&self, mark: char, message: &str) {
        self.bar.println(status_line(Local::now(), mark, message));
        self.status(message);
    }
}
