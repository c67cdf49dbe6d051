//! Progress UI (spinner) for `fetch` runs.

use std::time::Duration;

use bookrelay_core::Progress;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::warn;

/// Renders progress notifications until the channel closes.
///
/// When `use_spinner` is false the notifications are drained silently so
/// the pipeline's reporter never sees a full channel.
pub(crate) fn spawn_progress_ui(
    use_spinner: bool,
    mut receiver: mpsc::Receiver<Progress>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        if !use_spinner {
            while receiver.recv().await.is_some() {}
            return;
        }

        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner} [{elapsed}] {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        spinner.enable_steady_tick(Duration::from_millis(100));

        let mut last = None;
        while let Some(progress) = receiver.recv().await {
            spinner.set_message(format_progress(progress));
            last = Some(progress);
        }

        match last {
            Some(progress) if progress.percent == 100 => spinner.finish_with_message(format_progress(progress)),
            _ => spinner.abandon(),
        }
    })
}

/// Waits for the display task. Returns false when it panicked or was
/// cancelled; the failure is logged, never propagated.
pub(crate) async fn finish_progress_ui(ui: JoinHandle<()>) -> bool {
    match ui.await {
        Ok(()) => true,
        Err(error) => {
            warn!(%error, "progress display task failed");
            false
        }
    }
}

fn format_progress(progress: Progress) -> String {
    format!("{:>3}% {}", progress.percent, progress.phase)
}
