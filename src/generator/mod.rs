use std::time::Duration;
use tokio::time;
use tracing::{debug, info};

use crate::client::{self, RequestOutcome};
use crate::config::Config;
use crate::connection_pool::ConnectionPool;

/// Aggregate tally across the whole run. Owned by the run loop; mutated
/// once per resolved request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Counters {
    pub requests: u64,
    pub successes: u64,
    pub errors: u64,
}

impl Counters {
    /// Every resolution bumps `requests`. A full response is a success. A
    /// transport failure counts as an error only when the attempt had both
    /// started and received response data; failures before the first byte
    /// are tallied as requests but left unclassified.
    pub fn record(&mut self, outcome: &RequestOutcome) {
        self.requests += 1;

        if outcome.completed && !outcome.errored {
            self.successes += 1;
        } else if outcome.errored && outcome.started && outcome.received_data {
            self.errors += 1;
        }
    }
}

/// Closed-loop generator: one request at a time against a single target,
/// back-to-back, until the run deadline fires.
pub struct LoadGenerator {
    pool: ConnectionPool,
    host: String,
    duration: Duration,
}

impl LoadGenerator {
    pub fn new(config: &Config) -> Self {
        Self {
            pool: ConnectionPool::new(config.target.addr, config.pool.max_idle),
            host: config.target.addr.to_string(),
            duration: Duration::from_secs(config.run.duration_secs),
        }
    }

    /// Issues requests sequentially until the deadline, then returns the
    /// counters. Outcome i is fully resolved and recorded before request
    /// i+1 is issued, so counter updates never race. At most one request
    /// can be in flight when the deadline fires; it is dropped uncounted.
    pub async fn run(self) -> Counters {
        let mut counters = Counters::default();

        let deadline = time::sleep(self.duration);
        tokio::pin!(deadline);

        info!(
            "Generating load against {} for {}s",
            self.pool.target(),
            self.duration.as_secs()
        );

        loop {
            tokio::select! {
                _ = &mut deadline => {
                    debug!("Run deadline reached");
                    break;
                }
                outcome = client::issue_request(&self.pool, &self.host) => {
                    counters.record(&outcome);
                }
            }
        }

        counters
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(
        started: bool,
        received_data: bool,
        errored: bool,
        completed: bool,
    ) -> RequestOutcome {
        RequestOutcome {
            started,
            received_data,
            errored,
            completed,
            status: None,
        }
    }

    #[test]
    fn full_response_counts_as_success() {
        let mut counters = Counters::default();
        counters.record(&outcome(true, true, false, true));
        assert_eq!(counters.requests, 1);
        assert_eq!(counters.successes, 1);
        assert_eq!(counters.errors, 0);
    }

    #[test]
    fn failure_after_data_counts_as_error() {
        let mut counters = Counters::default();
        counters.record(&outcome(true, true, true, false));
        assert_eq!(counters.requests, 1);
        assert_eq!(counters.successes, 0);
        assert_eq!(counters.errors, 1);
    }

    #[test]
    fn failure_before_any_data_is_left_unclassified() {
        let mut counters = Counters::default();
        // refused connection: never started, no data
        counters.record(&outcome(false, false, true, false));
        // connected but failed before the first response byte
        counters.record(&outcome(true, false, true, false));
        assert_eq!(counters.requests, 2);
        assert_eq!(counters.successes, 0);
        assert_eq!(counters.errors, 0);
    }

    #[test]
    fn every_resolution_is_tallied_as_a_request() {
        let mut counters = Counters::default();
        counters.record(&outcome(true, true, false, true));
        counters.record(&outcome(false, false, true, false));
        counters.record(&outcome(true, true, true, false));
        assert_eq!(counters.requests, 3);
        assert_eq!(counters.successes, 1);
        assert_eq!(counters.errors, 1);
    }
}
