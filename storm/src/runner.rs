use crate::certs::SharedCertPool;
use crate::dispatcher::task_failure;
use crate::params::TrialParameters;
use crate::report;
use crate::transport::TransportFactory;
use crate::trial::{TrialResult, TrialRunner};
use crate::utils::latch::CompletionLatch;
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub launched: u32,
    pub completed: usize,
    /// Ordered by trial id.
    pub trials: Vec<TrialResult>,
    pub elapsed: Duration,
}

impl RunSummary {
    pub fn successes(&self) -> usize {
        self.trials.iter().map(TrialResult::successes).sum()
    }

    pub fn failures(&self) -> usize {
        self.trials.iter().map(TrialResult::failures).sum()
    }
}

/// Launches independent trials concurrently and waits for all of them.
pub struct RunOrchestrator {
    params: Arc<TrialParameters>,
    cert_pool: SharedCertPool,
    addresses: Arc<[String]>,
    factory: Arc<dyn TransportFactory>,
    request_timeout: Duration,
}

impl RunOrchestrator {
    pub fn new(
        params: TrialParameters,
        cert_pool: SharedCertPool,
        addresses: Vec<String>,
        factory: Arc<dyn TransportFactory>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            params: Arc::new(params),
            cert_pool,
            addresses: addresses.into(),
            factory,
            request_timeout,
        }
    }

    pub async fn run(&self, count: NonZeroU32) -> RunSummary {
        let started = Instant::now();
        let launched = count.get();
        info!(
            "Starting {launched} trial(s) against {} address(es)...",
            self.addresses.len()
        );
        if let Err(error) = report::print_banner(launched, self.addresses.len()) {
            warn!("Failed to print the run banner: {error}");
        }

        let (latch, guards) = CompletionLatch::new(launched as usize);
        let mut trials = JoinSet::new();
        let mut trial_ids = HashMap::with_capacity(launched as usize);
        for (trial_id, guard) in (1..=launched).zip(guards) {
            let runner = TrialRunner::new(
                trial_id,
                self.params.clone(),
                self.cert_pool.clone(),
                self.addresses.clone(),
                self.factory.clone(),
                self.request_timeout,
            );
            let handle = trials.spawn(runner.run(guard));
            trial_ids.insert(handle.id(), trial_id);
        }

        latch.wait().await;
        info!("All {} trial(s) signaled completion.", latch.completed());

        let mut results = Vec::with_capacity(launched as usize);
        while let Some(joined) = trials.join_next().await {
            match joined {
                Ok(result) => results.push(result),
                Err(error) => {
                    let Some(&trial_id) = trial_ids.get(&error.id()) else {
                        error!("Unknown trial task {} failed: {error}", error.id());
                        continue;
                    };
                    let reason = task_failure(error);
                    error!("Trial #{trial_id} failed: {reason}");
                    results.push(TrialResult::panicked(trial_id, &self.addresses, &reason));
                }
            }
        }

        for trial_id in 1..=launched {
            if results.iter().any(|result| result.trial_id == trial_id) {
                continue;
            }

            error!("Trial #{trial_id} did not report.");
            results.push(TrialResult::panicked(
                trial_id,
                &self.addresses,
                "trial did not report",
            ));
        }
        results.sort_by_key(|result| result.trial_id);

        let summary = RunSummary {
            launched,
            completed: latch.completed(),
            trials: results,
            elapsed: started.elapsed(),
        };
        if let Err(error) = report::print_summary(&summary) {
            warn!("Failed to print the run summary: {error}");
        }
        summary
    }
}
