//! Progress notifications emitted at phase boundaries.
//!
//! Reporting is fire-and-forget: a full, closed or absent channel drops the
//! notification and the run carries on.

use std::fmt;

use tokio::sync::mpsc;
use tracing::trace;

/// Pipeline phases in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Scraping the source page for its ISBN.
    ResolvingIdentifier,
    /// Searching the metadata index.
    SearchingCatalog,
    /// Probing mirrors.
    SelectingMirror,
    /// Checking candidate links.
    VerifyingLink,
    /// Downloading through a mirror or the paid API.
    Downloading,
    /// Mailing the book.
    Delivering,
    /// Run finished.
    Done,
}

impl Phase {
    /// Completion percentage reported when the phase starts.
    #[must_use]
    pub fn percent(self) -> u8 {
        match self {
            Self::ResolvingIdentifier => 0,
            Self::SearchingCatalog => 15,
            Self::SelectingMirror => 30,
            Self::VerifyingLink => 45,
            Self::Downloading => 60,
            Self::Delivering => 80,
            Self::Done => 100,
        }
    }

    /// Human-readable label.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::ResolvingIdentifier => "resolving ISBN",
            Self::SearchingCatalog => "searching catalog",
            Self::SelectingMirror => "selecting mirror",
            Self::VerifyingLink => "verifying link",
            Self::Downloading => "downloading",
            Self::Delivering => "sending email",
            Self::Done => "done",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    /// Completion percentage, non-decreasing within a run.
    pub percent: u8,
    /// Phase that just started.
    pub phase: Phase,
}

impl From<Phase> for Progress {
    fn from(phase: Phase) -> Self {
        Self {
            percent: phase.percent(),
            phase,
        }
    }
}

/// Optional sink for [`Progress`] notifications.
#[derive(Debug, Clone, Default)]
pub struct ProgressReporter {
    sender: Option<mpsc::Sender<Progress>>,
}

impl ProgressReporter {
    /// Reporter that drops every notification.
    #[must_use]
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Reporter forwarding into `sender`.
    #[must_use]
    pub fn new(sender: mpsc::Sender<Progress>) -> Self {
        Self {
            sender: Some(sender),
        }
    }

    /// Reports that `phase` started. Never blocks, never fails.
    pub fn report(&self, phase: Phase) {
        if let Some(sender) = &self.sender
            && let Err(error) = sender.try_send(Progress::from(phase))
        {
            trace!(%error, phase = %phase, "progress notification dropped");
        }
    }
}

/// Creates a bounded reporter/receiver pair.
#[must_use]
pub fn progress_channel(capacity: usize) -> (ProgressReporter, mpsc::Receiver<Progress>) {
    let (sender, receiver) = mpsc::channel(capacity.max(1));
    (ProgressReporter::new(sender), receiver)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const ORDER: [Phase; 7] = [
        Phase::ResolvingIdentifier,
        Phase::SearchingCatalog,
        Phase::SelectingMirror,
        Phase::VerifyingLink,
        Phase::Downloading,
        Phase::Delivering,
        Phase::Done,
    ];

    #[test]
    fn test_percentages_are_non_decreasing() {
        let percents: Vec<u8> = ORDER.iter().map(|p| p.percent()).collect();
        assert!(percents.windows(2).all(|w| w[0] <= w[1]), "{percents:?}");
        assert_eq!(percents.first(), Some(&0));
        assert_eq!(percents.last(), Some(&100));
    }

    #[tokio::test]
    async fn test_reporter_forwards_notifications() {
        let (reporter, mut receiver) = progress_channel(4);
        reporter.report(Phase::ResolvingIdentifier);
        reporter.report(Phase::Done);
        assert_eq!(receiver.recv().await.unwrap().phase, Phase::ResolvingIdentifier);
        assert_eq!(receiver.recv().await.unwrap().percent, 100);
    }

    #[test]
    fn test_full_or_closed_channel_is_swallowed() {
        let (reporter, receiver) = progress_channel(1);
        reporter.report(Phase::ResolvingIdentifier);
        reporter.report(Phase::SearchingCatalog);
        drop(receiver);
        reporter.report(Phase::Done);
        ProgressReporter::disabled().report(Phase::Done);
    }
}
