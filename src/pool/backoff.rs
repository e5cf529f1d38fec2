use rand::Rng;
use std::time::{Duration, Instant};

const INITIAL_INTERVAL: Duration = Duration::from_millis(500);
const MAX_INTERVAL: Duration = Duration::from_secs(60);
const MULTIPLIER: f64 = 2.0;
/// Each delay is picked at random in `[interval * (1 - f), interval * (1 + f)]`.
const RANDOMIZATION_FACTOR: f64 = 0.5;

/// Exponential backoff bounded by a total time budget.
///
/// The budget is measured from the moment the backoff is created: once sleeping for the
/// next delay would overshoot it, [`ExponentialBackoff::next_backoff`] gives up.
#[derive(Debug)]
pub(crate) struct ExponentialBackoff {
    current_interval: Duration,
    randomization_factor: f64,
    max_elapsed_time: Duration,
    started_at: Instant,
}

impl ExponentialBackoff {
    pub(crate) fn new(max_elapsed_time: Duration) -> Self {
        Self {
            current_interval: INITIAL_INTERVAL,
            randomization_factor: RANDOMIZATION_FACTOR,
            max_elapsed_time,
            started_at: Instant::now(),
        }
    }

    #[cfg(test)]
    fn without_jitter(mut self) -> Self {
        self.randomization_factor = 0.0;
        self
    }

    /// Time left before the budget runs out.
    pub(crate) fn remaining(&self) -> Duration {
        self.max_elapsed_time
            .saturating_sub(self.started_at.elapsed())
    }

    /// How long to wait before the next attempt, `None` once the budget is exhausted.
    pub(crate) fn next_backoff(&mut self) -> Option<Duration> {
        self.next_backoff_after(self.started_at.elapsed())
    }

    fn next_backoff_after(&mut self, elapsed: Duration) -> Option<Duration> {
        let delay = randomize(self.current_interval, self.randomization_factor);
        self.current_interval = self.current_interval.mul_f64(MULTIPLIER).min(MAX_INTERVAL);

        if elapsed + delay > self.max_elapsed_time {
            None
        } else {
            Some(delay)
        }
    }
}

fn randomize(interval: Duration, factor: f64) -> Duration {
    if factor == 0.0 {
        return interval;
    }
    let delta = interval.as_secs_f64() * factor;
    let seconds = rand::thread_rng()
        .gen_range(interval.as_secs_f64() - delta..=interval.as_secs_f64() + delta);
    Duration::from_secs_f64(seconds)
}
