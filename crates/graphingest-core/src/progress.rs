//! Progress reporting for TTY and non-TTY environments.
//!
//! TTY mode: one spinner per file being ingested.
//! Non-TTY mode: hidden bars, progress goes to the log instead.

use std::io::IsTerminal;
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

fn file_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.green} {prefix:<28.dim} [{elapsed}] {wide_msg}")
        .expect("invalid template")
}

/// Central progress context managing per-file spinners.
pub struct ProgressContext {
    multi: MultiProgress,
    is_tty: bool,
}

impl ProgressContext {
    /// Create new context, detecting TTY automatically.
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            is_tty: std::io::stderr().is_terminal(),
        }
    }

    /// Context that never draws (tests, library callers).
    pub fn hidden() -> Self {
        Self {
            multi: MultiProgress::new(),
            is_tty: false,
        }
    }

    /// Spinner for one file. Hidden (no-op) outside a TTY.
    pub fn file_line(&self, url: &str) -> ProgressBar {
        if !self.is_tty {
            return ProgressBar::hidden();
        }
        let pb = self.multi.add(ProgressBar::new_spinner());
        pb.set_style(file_style());
        pb.set_prefix(tail(url, 28).to_string());
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    }

    pub fn is_tty(&self) -> bool {
        self.is_tty
    }

    /// Get reference to `MultiProgress` for the log bridge.
    pub fn multi(&self) -> &MultiProgress {
        &self.multi
    }
}

impl Default for ProgressContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Show batch/record counters on a file spinner.
pub fn show_counts(pb: &ProgressBar, batches: usize, records: u64) {
    pb.set_message(format!(
        "{} batches, {} records",
        fmt_num(batches as u64),
        fmt_num(records)
    ));
}

/// Last `width` characters of `s` (file names live at the end of URLs).
fn tail(s: &str, width: usize) -> &str {
    let count = s.chars().count();
    if count <= width {
        return s;
    }
    let skip = count - width;
    let start = s.char_indices().nth(skip).map_or(0, |(i, _)| i);
    &s[start..]
}

/// Format number with thousand separators.
pub fn fmt_num(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fmt_num_small() {
        assert_eq!(fmt_num(0), "0");
        assert_eq!(fmt_num(999), "999");
    }

    #[test]
    fn fmt_num_thousands() {
        assert_eq!(fmt_num(1_000), "1,000");
        assert_eq!(fmt_num(1_234_567), "1,234,567");
    }

    #[test]
    fn tail_keeps_file_name() {
        assert_eq!(tail("short.csv", 28), "short.csv");
        assert_eq!(tail("https://example.org/data/people.csv", 10), "people.csv");
    }

    #[test]
    fn hidden_context_hands_out_hidden_bars() {
        let ctx = ProgressContext::hidden();
        let pb = ctx.file_line("a.csv");
        assert!(pb.is_hidden());
        show_counts(&pb, 3, 3000);
    }
}
