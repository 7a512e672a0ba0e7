use crate::harness::{addresses, quiet_params};
use h3_storm::error::RequestError;
use h3_storm::runner::RunOrchestrator;
use integration::empty_cert_pool;
use integration::mock_transport::{Behavior, MockTransportFactory};
use serial_test::parallel;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

fn orchestrator(factory: &MockTransportFactory, targets: &[&str], timeout: Duration) -> RunOrchestrator {
    RunOrchestrator::new(
        quiet_params(),
        empty_cert_pool(),
        addresses(targets),
        Arc::new(factory.clone()),
        timeout,
    )
}

fn count(value: u32) -> NonZeroU32 {
    NonZeroU32::new(value).unwrap()
}

#[tokio::test(flavor = "multi_thread")]
#[parallel]
async fn should_complete_every_trial_with_a_success_and_a_timeout() {
    let timeout = Duration::from_millis(300);
    let factory = MockTransportFactory::new(Behavior::ok(200)).with("https://b/", Behavior::Hang);
    let orchestrator = orchestrator(&factory, &["https://a/", "https://b/"], timeout);

    let summary = orchestrator.run(count(3)).await;

    assert_eq!(summary.launched, 3);
    assert_eq!(summary.completed, 3);
    let ids: Vec<_> = summary.trials.iter().map(|trial| trial.trial_id).collect();
    assert_eq!(ids, [1, 2, 3]);
    for trial in &summary.trials {
        assert_eq!(trial.outcomes.len(), 2);
        assert_eq!(trial.outcomes[0].result.as_ref().unwrap().bytes, 200);
        assert_eq!(trial.outcomes[1].result, Err(RequestError::Timeout(timeout)));
    }
    assert_eq!(summary.successes(), 3);
    assert_eq!(summary.failures(), 3);
    assert_eq!(factory.stats.created(), 3);
    assert_eq!(factory.stats.closed(), 3);
}

#[tokio::test(flavor = "multi_thread")]
#[parallel]
async fn should_complete_a_single_trial_like_many() {
    let factory = MockTransportFactory::new(Behavior::ok(8));
    let orchestrator = orchestrator(&factory, &["https://a/"], Duration::from_secs(1));

    let summary = orchestrator.run(count(1)).await;

    assert_eq!(summary.completed, 1);
    assert_eq!(summary.trials.len(), 1);
    assert_eq!(summary.trials[0].trial_id, 1);
    assert_eq!(summary.successes(), 1);
}

#[tokio::test(flavor = "multi_thread")]
#[parallel]
async fn should_finish_without_addresses() {
    let factory = MockTransportFactory::new(Behavior::Hang);
    let orchestrator = orchestrator(&factory, &[], Duration::from_secs(1));

    let summary = tokio::time::timeout(Duration::from_secs(5), orchestrator.run(count(1)))
        .await
        .expect("run without addresses should not hang");

    assert_eq!(summary.completed, 1);
    assert!(summary.trials[0].outcomes.is_empty());
    assert_eq!(factory.stats.requests(), 0);
}

#[tokio::test(flavor = "multi_thread")]
#[parallel]
async fn should_complete_trials_whose_transport_cannot_be_created() {
    let factory = MockTransportFactory::new(Behavior::ok(1)).failing_creation(2);
    let orchestrator = orchestrator(&factory, &["https://a/"], Duration::from_secs(1));

    let summary = orchestrator.run(count(3)).await;

    assert_eq!(summary.completed, 3);
    assert!(matches!(
        summary.trials[1].outcomes[0].result,
        Err(RequestError::Configuration(_))
    ));
    assert!(summary.trials[0].outcomes[0].is_success());
    assert!(summary.trials[2].outcomes[0].is_success());
    assert_eq!(factory.stats.closed(), 2);
}

#[tokio::test(flavor = "multi_thread")]
#[parallel]
async fn should_report_a_panicking_trial_under_its_own_id() {
    let factory = MockTransportFactory::new(Behavior::ok(4)).panicking_creation(2);
    let orchestrator = orchestrator(
        &factory,
        &["https://a/", "https://b/"],
        Duration::from_secs(1),
    );

    let summary = orchestrator.run(count(3)).await;

    assert_eq!(summary.completed, 3);
    let ids: Vec<_> = summary.trials.iter().map(|trial| trial.trial_id).collect();
    assert_eq!(ids, [1, 2, 3]);
    for trial in &summary.trials {
        assert_eq!(trial.outcomes.len(), 2);
        if trial.trial_id != 2 {
            assert_eq!(trial.successes(), 2);
            continue;
        }

        for outcome in &trial.outcomes {
            match &outcome.result {
                Err(RequestError::Panicked(reason)) => assert!(reason.contains("trial #2")),
                other => panic!("unexpected outcome: {other:?}"),
            }
        }
    }
    assert_eq!(factory.stats.created(), 2);
}

#[tokio::test(flavor = "multi_thread")]
#[parallel]
async fn should_signal_exactly_once_per_trial_under_load() {
    let targets = [
        "https://ok/",
        "https://slow/",
        "https://hang/",
        "https://refused/",
        "https://reset/",
        "https://boom/",
    ];
    let factory = MockTransportFactory::new(Behavior::ok(1))
        .with(
            "https://slow/",
            Behavior::Delayed {
                delay: Duration::from_millis(20),
                bytes: 64,
            },
        )
        .with("https://hang/", Behavior::Hang)
        .with(
            "https://refused/",
            Behavior::Fail(RequestError::Connect("refused".to_owned())),
        )
        .with("https://reset/", Behavior::FailRead { after: 32 })
        .with("https://boom/", Behavior::Panic);
    let orchestrator = orchestrator(&factory, &targets, Duration::from_millis(250));

    let summary = orchestrator.run(count(40)).await;

    assert_eq!(summary.launched, 40);
    assert_eq!(summary.completed, 40);
    assert_eq!(summary.trials.len(), 40);
    for trial in &summary.trials {
        assert_eq!(trial.outcomes.len(), targets.len());
        assert_eq!(trial.successes(), 2);
        let codes: Vec<_> = trial
            .outcomes
            .iter()
            .filter_map(|outcome| outcome.result.as_ref().err())
            .map(RequestError::as_code)
            .collect();
        assert_eq!(codes, ["timeout", "connect", "read", "panicked"]);
    }
    assert_eq!(factory.stats.closed(), 40);
}
