use crate::harness::{addresses, quiet_params};
use h3_storm::error::RequestError;
use h3_storm::params::TrialParameters;
use h3_storm::trial::{TrialRunner, TrialState};
use h3_storm::utils::latch::CompletionLatch;
use integration::empty_cert_pool;
use integration::mock_transport::{Behavior, MockTransportFactory};
use serial_test::parallel;
use std::sync::Arc;
use std::time::Duration;

fn runner(factory: &MockTransportFactory, params: TrialParameters, targets: &[&str]) -> TrialRunner {
    TrialRunner::new(
        7,
        Arc::new(params),
        empty_cert_pool(),
        addresses(targets).into(),
        Arc::new(factory.clone()),
        Duration::from_millis(200),
    )
}

#[tokio::test(flavor = "multi_thread")]
#[parallel]
async fn should_walk_every_state_and_signal_completion() {
    let factory = MockTransportFactory::new(Behavior::ok(20));
    let runner = runner(&factory, quiet_params(), &["https://a/", "https://b/"]);
    assert_eq!(runner.state(), TrialState::Created);
    let (latch, mut guards) = CompletionLatch::new(1);

    let result = runner.run(guards.remove(0)).await;

    assert!(latch.is_done());
    assert_eq!(result.trial_id, 7);
    assert_eq!(
        result.path,
        [
            TrialState::Created,
            TrialState::ConfigBuilding,
            TrialState::Dispatching,
            TrialState::Draining,
            TrialState::Completed,
        ]
    );
    assert_eq!(result.successes(), 2);
    assert_eq!(result.received_bytes(), 40);
    assert_eq!(factory.stats.created(), 1);
    assert_eq!(factory.stats.closed(), 1);
}

#[tokio::test(flavor = "multi_thread")]
#[parallel]
async fn should_fail_every_address_when_the_transport_cannot_be_built() {
    let factory = MockTransportFactory::new(Behavior::ok(20)).failing_creation(7);
    let runner = runner(&factory, quiet_params(), &["https://a/", "https://b/"]);
    let (latch, mut guards) = CompletionLatch::new(1);

    let result = runner.run(guards.remove(0)).await;

    assert!(latch.is_done());
    assert!(!result.dispatched());
    assert_eq!(
        result.path,
        [
            TrialState::Created,
            TrialState::ConfigBuilding,
            TrialState::Completed
        ]
    );
    assert_eq!(result.outcomes.len(), 2);
    assert!(result
        .outcomes
        .iter()
        .all(|outcome| matches!(outcome.result, Err(RequestError::Configuration(_)))));
    assert_eq!(factory.stats.requests(), 0);
}

#[tokio::test(flavor = "multi_thread")]
#[parallel]
async fn should_fail_the_trial_when_the_key_log_cannot_be_opened() {
    let directory = tempfile::tempdir().unwrap();
    let params = TrialParameters::builder()
        .quiet(true)
        .key_log_path(directory.path().join("missing").join("keys.log"))
        .build()
        .unwrap();
    let factory = MockTransportFactory::new(Behavior::ok(1));
    let runner = runner(&factory, params, &["https://a/"]);
    let (latch, mut guards) = CompletionLatch::new(1);

    let result = runner.run(guards.remove(0)).await;

    assert!(latch.is_done());
    assert!(matches!(
        result.outcomes[0].result,
        Err(RequestError::Configuration(_))
    ));
    assert_eq!(factory.stats.created(), 0);
}

#[tokio::test(flavor = "multi_thread")]
#[parallel]
async fn should_pass_trial_parameters_to_the_transport() {
    let directory = tempfile::tempdir().unwrap();
    let key_log = directory.path().join("keys.log");
    let params = TrialParameters::builder()
        .quiet(true)
        .insecure_skip_verify(true)
        .send_initial_after_handshake(true)
        .initial_retransmit_count(0)
        .max_idle_timeout(Duration::from_secs(3))
        .key_log_path(&key_log)
        .enable_tracing(true)
        .trace_dir(directory.path())
        .build()
        .unwrap();
    let factory = MockTransportFactory::new(Behavior::ok(1));
    let (_latch, mut guards) = CompletionLatch::new(1);

    runner(&factory, params, &["https://a/"])
        .run(guards.remove(0))
        .await;

    let settings = factory.stats.settings.lock().unwrap();
    let settings = &settings[0];
    assert_eq!(settings.trial_id, 7);
    assert!(settings.insecure_skip_verify);
    assert!(!settings.only_send_initial);
    assert_eq!(settings.initial_replays, Some(0));
    assert_eq!(settings.max_idle_timeout, Some(Duration::from_secs(3)));
    assert!(settings.key_log.is_some());
    assert!(settings.tracer.is_some());
    assert!(key_log.exists());
}
