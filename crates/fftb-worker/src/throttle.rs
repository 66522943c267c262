//! Rate limit for progress notifications.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use fftb_models::{Progress, ProgressStep};

/// Lets one report per step through every `interval`.
///
/// The first report of a step and a completed step always pass, so the
/// dealer renews the lock at every stage boundary.
#[derive(Debug)]
pub struct NotifyThrottle {
    interval: Duration,
    last_sent: HashMap<ProgressStep, Instant>,
}

impl NotifyThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_sent: HashMap::new(),
        }
    }

    pub fn should_send(&mut self, progress: &Progress) -> bool {
        self.should_send_at(progress, Instant::now())
    }

    fn should_send_at(&mut self, progress: &Progress, now: Instant) -> bool {
        let due = match self.last_sent.get(&progress.step) {
            None => true,
            Some(_) if progress.percent >= 1.0 => true,
            Some(last) => now.duration_since(*last) >= self.interval,
        };

        if due {
            self.last_sent.insert(progress.step, now);
        }

        due
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_one_report_per_interval() {
        let mut throttle = NotifyThrottle::new(Duration::from_secs(2));
        let start = Instant::now();
        let p = |percent| Progress::new(ProgressStep::Processing, percent);

        assert!(throttle.should_send_at(&p(0.1), start));
        assert!(!throttle.should_send_at(&p(0.2), start + Duration::from_secs(1)));
        assert!(throttle.should_send_at(&p(0.3), start + Duration::from_secs(2)));
        assert!(throttle.should_send_at(&p(1.0), start + Duration::from_secs(2)));
    }

    #[test]
    fn test_steps_are_independent() {
        let mut throttle = NotifyThrottle::new(Duration::from_secs(2));
        let now = Instant::now();

        assert!(throttle.should_send_at(&Progress::new(ProgressStep::DownloadingInput, 0.5), now));
        assert!(throttle.should_send_at(&Progress::new(ProgressStep::Processing, 0.0), now));
        assert!(!throttle.should_send_at(&Progress::new(ProgressStep::Processing, 0.1), now));
    }
}
