use std::sync::Arc;
use tokio::sync::watch;

/// Countdown that completes once every guard minted at construction has been dropped.
///
/// Guards can't be created afterwards, so the latch tolerates exactly `expected`
/// completions. A guard signals when dropped, including while a panicking task unwinds.
#[derive(Debug, Clone)]
pub struct CompletionLatch {
    expected: usize,
    remaining: Arc<watch::Sender<usize>>,
}

#[derive(Debug)]
pub struct CompletionGuard {
    remaining: Arc<watch::Sender<usize>>,
}

impl CompletionLatch {
    pub fn new(expected: usize) -> (Self, Vec<CompletionGuard>) {
        let remaining = Arc::new(watch::Sender::new(expected));
        let guards = (0..expected)
            .map(|_| CompletionGuard {
                remaining: remaining.clone(),
            })
            .collect();
        (
            Self {
                expected,
                remaining,
            },
            guards,
        )
    }

    pub fn expected(&self) -> usize {
        self.expected
    }

    pub fn remaining(&self) -> usize {
        *self.remaining.borrow()
    }

    pub fn completed(&self) -> usize {
        self.expected - self.remaining()
    }

    pub fn is_done(&self) -> bool {
        self.remaining() == 0
    }

    /// Resolves once all guards are gone. Returns immediately for a latch of zero.
    pub async fn wait(&self) {
        let mut receiver = self.remaining.subscribe();
        // The sender lives in `self`, so the channel cannot close while waiting.
        let _ = receiver.wait_for(|remaining| *remaining == 0).await;
    }
}

impl CompletionGuard {
    /// Signals completion now instead of at the end of the owning scope.
    pub fn complete(self) {}
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        self.remaining.send_modify(|remaining| {
            *remaining = remaining.saturating_sub(1);
        });
    }
}
