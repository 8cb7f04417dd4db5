//! Process-wide crawl state
//!
//! At most one crawl run may be active. The stop flag is the only
//! cancellation signal; crawl tasks poll it and wind down cooperatively.

use std::sync::atomic::{AtomicBool, Ordering};

/// Start/stop/in-progress flags shared by every crawl component
#[derive(Debug, Default)]
pub struct CrawlControl {
    in_progress: AtomicBool,
    stop_requested: AtomicBool,
}

impl CrawlControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the single crawl slot
    ///
    /// Returns false if a run is already active. On success any stale stop
    /// request is cleared.
    pub fn try_start(&self) -> bool {
        let claimed = self
            .in_progress
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if claimed {
            self.stop_requested.store(false, Ordering::Release);
        }
        claimed
    }

    /// Signal every crawl task to stop; does not wait for them
    pub fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::Release);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::Acquire)
    }

    pub fn is_in_progress(&self) -> bool {
        self.in_progress.load(Ordering::Acquire)
    }

    /// Release the crawl slot once all tasks have terminated
    pub fn reset(&self) {
        self.stop_requested.store(false, Ordering::Release);
        self.in_progress.store(false, Ordering::Release);
    }
}
