//! Numbered step spinners for the synchronous install/switch pipeline.
//!
//! Unlike the async, multi-bar step runner this is descended from, the
//! core pipeline here is single-threaded and synchronous (see the
//! concurrency model), so steps run a plain closure rather than a future.

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};

/// Controls how step output is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Spinner + checkmark per step.
    Normal,
    /// Like Normal but keeps per-entry log lines visible.
    Verbose,
    /// No ANSI — plain println output (for piped/non-TTY).
    Plain,
}

/// Orchestrates numbered steps (extract, backup, promote, reconcile, ...)
/// with spinners and checkmarks.
pub struct StepProgress {
    multi: MultiProgress,
    total_steps: usize,
    current_step: usize,
    mode: OutputMode,
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template("[{prefix}] {spinner:.cyan} {msg}")
        .unwrap()
}

fn done_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template("[{prefix}] \u{2713} {msg:.green}")
        .unwrap()
}

impl StepProgress {
    pub fn new(total_steps: usize, mode: OutputMode) -> Self {
        let multi = if mode == OutputMode::Plain {
            MultiProgress::with_draw_target(ProgressDrawTarget::hidden())
        } else {
            MultiProgress::new()
        };
        Self {
            multi,
            total_steps,
            current_step: 0,
            mode,
        }
    }

    /// Run `f` as a numbered step: spinner while running, checkmark after.
    pub fn run<F, T>(&mut self, label: &str, f: F) -> T
    where
        F: FnOnce() -> T,
    {
        self.current_step += 1;
        let prefix = format!("{}/{}", self.current_step, self.total_steps);

        if self.mode == OutputMode::Plain {
            println!("[{prefix}] {label}");
        }

        let bar = self.multi.add(ProgressBar::new_spinner());
        bar.set_style(spinner_style());
        bar.set_prefix(prefix.clone());
        bar.set_message(label.to_string());
        bar.enable_steady_tick(std::time::Duration::from_millis(80));

        let result = f();

        if self.mode == OutputMode::Plain {
            println!("[{prefix}] \u{2713} {label}");
        }
        bar.set_style(done_style());
        bar.finish_with_message(label.to_string());

        result
    }

    /// Instant completion — no work to run (already-active/no-op steps).
    pub fn skip(&mut self, label: &str) {
        self.current_step += 1;
        let prefix = format!("{}/{}", self.current_step, self.total_steps);

        if self.mode == OutputMode::Plain {
            println!("[{prefix}] \u{2713} {label}");
            return;
        }

        let bar = self.multi.add(ProgressBar::new_spinner());
        bar.set_style(done_style());
        bar.set_prefix(prefix);
        bar.set_message(label.to_string());
        bar.finish();
    }

    /// Print a plain informational line (final summary, counts, ...).
    pub fn println(&self, text: &str) {
        if self.mode == OutputMode::Plain {
            println!("{text}");
        } else {
            let _ = self.multi.println(text);
        }
    }
}

/// A per-entry extraction progress bar, advanced once per archive entry.
/// Driven by the extractor's read callback rather than by byte count —
/// archive entry totals aren't known up front for streamed formats.
pub struct ExtractionProgress {
    bar: ProgressBar,
}

impl ExtractionProgress {
    pub fn new(mode: OutputMode) -> Self {
        let bar = if mode == OutputMode::Plain {
            ProgressBar::hidden()
        } else {
            let bar = ProgressBar::new_spinner();
            bar.set_style(
                ProgressStyle::default_spinner()
                    .template("{spinner:.cyan} extracting... {pos} entries")
                    .unwrap(),
            );
            bar.enable_steady_tick(std::time::Duration::from_millis(80));
            bar
        };
        Self { bar }
    }

    pub fn inc(&self) {
        self.bar.inc(1);
    }

    pub fn finish(&self, total: usize) {
        self.bar.finish_with_message(format!("{total} entries extracted"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_progress_runs_closures_in_order() {
        let mut progress = StepProgress::new(3, OutputMode::Plain);
        let mut order = Vec::new();
        progress.run("extract", || order.push(1));
        progress.run("backup", || order.push(2));
        progress.skip("already active");
        assert_eq!(order, vec![1, 2]);
    }
}
