use crate::certs::SharedCertPool;
use crate::config::TransportConfig;
use crate::dispatcher::{dispatch, RequestOutcome};
use crate::error::RequestError;
use crate::params::TrialParameters;
use crate::report;
use crate::transport::TransportFactory;
use crate::utils::latch::CompletionGuard;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrialState {
    Created,
    ConfigBuilding,
    Dispatching,
    Draining,
    Completed,
}

#[derive(Debug, Clone)]
pub struct TrialResult {
    pub trial_id: u32,
    pub outcomes: Vec<RequestOutcome>,
    /// States the trial went through, starting with `Created`.
    pub path: Vec<TrialState>,
    pub elapsed: Duration,
}

impl TrialResult {
    /// Result of a trial whose task died before it could report, every address failed.
    pub fn panicked(trial_id: u32, addresses: &[String], reason: &str) -> Self {
        Self {
            trial_id,
            outcomes: addresses
                .iter()
                .map(|address| {
                    RequestOutcome::failed(address, RequestError::Panicked(reason.to_owned()))
                })
                .collect(),
            path: vec![TrialState::Created, TrialState::Completed],
            elapsed: Duration::ZERO,
        }
    }

    pub fn successes(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|outcome| outcome.is_success())
            .count()
    }

    pub fn failures(&self) -> usize {
        self.outcomes.len() - self.successes()
    }

    pub fn received_bytes(&self) -> u64 {
        self.outcomes
            .iter()
            .filter_map(|outcome| outcome.result.as_ref().ok())
            .map(|delivery| delivery.bytes)
            .sum()
    }

    pub fn dispatched(&self) -> bool {
        self.path.contains(&TrialState::Dispatching)
    }
}

/// Runs one trial: build the transport configuration, dispatch every address, release the configuration.
pub struct TrialRunner {
    trial_id: u32,
    params: Arc<TrialParameters>,
    cert_pool: SharedCertPool,
    addresses: Arc<[String]>,
    factory: Arc<dyn TransportFactory>,
    request_timeout: Duration,
    state: TrialState,
    path: Vec<TrialState>,
}

impl TrialRunner {
    pub fn new(
        trial_id: u32,
        params: Arc<TrialParameters>,
        cert_pool: SharedCertPool,
        addresses: Arc<[String]>,
        factory: Arc<dyn TransportFactory>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            trial_id,
            params,
            cert_pool,
            addresses,
            factory,
            request_timeout,
            state: TrialState::Created,
            path: vec![TrialState::Created],
        }
    }

    pub fn state(&self) -> TrialState {
        self.state
    }

    /// The guard signals completion when it goes out of scope, on every path.
    pub async fn run(mut self, completion: CompletionGuard) -> TrialResult {
        let started = Instant::now();
        self.transition(TrialState::ConfigBuilding);
        let config = TransportConfig::build(
            self.trial_id,
            &self.params,
            &self.cert_pool,
            self.factory.as_ref(),
        );

        let outcomes = match config {
            Ok(config) => {
                self.transition(TrialState::Dispatching);
                let outcomes = dispatch(&config, &self.addresses, self.request_timeout).await;
                self.transition(TrialState::Draining);
                config.close().await;
                outcomes
            }
            Err(error) => {
                error!(
                    "Trial #{} cannot build its transport configuration: {error}",
                    self.trial_id
                );
                let reason = error.to_string();
                self.addresses
                    .iter()
                    .map(|address| {
                        RequestOutcome::failed(address, RequestError::Configuration(reason.clone()))
                    })
                    .collect()
            }
        };
        self.transition(TrialState::Completed);

        let result = TrialResult {
            trial_id: self.trial_id,
            outcomes,
            path: std::mem::take(&mut self.path),
            elapsed: started.elapsed(),
        };
        info!(
            "Trial #{} completed: {} succeeded, {} failed.",
            result.trial_id,
            result.successes(),
            result.failures()
        );

        if let Err(error) = report::print_trial(&result, self.params.quiet()) {
            warn!(
                "Failed to print the results of trial #{}: {error}",
                self.trial_id
            );
        }
        completion.complete();
        result
    }

    fn transition(&mut self, next: TrialState) {
        if self.state == TrialState::Completed {
            warn!(
                "Trial #{} is already completed, ignoring transition to {next:?}",
                self.trial_id
            );
            return;
        }

        debug!("Trial #{}: {:?} -> {next:?}", self.trial_id, self.state);
        self.state = next;
        self.path.push(next);
    }
}
