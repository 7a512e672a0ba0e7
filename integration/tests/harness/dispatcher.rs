use crate::harness::{addresses, quiet_params};
use h3_storm::config::TransportConfig;
use h3_storm::dispatcher::dispatch;
use h3_storm::error::RequestError;
use h3_storm::params::TrialParameters;
use integration::empty_cert_pool;
use integration::mock_transport::{Behavior, MockTransportFactory};
use serial_test::parallel;
use std::time::{Duration, Instant};

const TIMEOUT: Duration = Duration::from_millis(200);

#[tokio::test(flavor = "multi_thread")]
#[parallel]
async fn should_return_one_outcome_per_address_in_input_order() {
    let factory = MockTransportFactory::new(Behavior::ok(10))
        .with("https://b/", Behavior::Fail(RequestError::Connect("refused".to_owned())))
        .with(
            "https://a/",
            Behavior::Delayed {
                delay: Duration::from_millis(50),
                bytes: 3,
            },
        );
    let config = TransportConfig::build(1, &quiet_params(), &empty_cert_pool(), &factory).unwrap();
    let targets = addresses(&["https://a/", "https://b/", "https://c/"]);

    let outcomes = dispatch(&config, &targets, TIMEOUT).await;
    config.close().await;

    let order: Vec<_> = outcomes.iter().map(|outcome| outcome.address.as_str()).collect();
    assert_eq!(order, ["https://a/", "https://b/", "https://c/"]);
    assert_eq!(outcomes[0].result.as_ref().unwrap().bytes, 3);
    assert_eq!(
        outcomes[1].result,
        Err(RequestError::Connect("refused".to_owned()))
    );
    assert_eq!(outcomes[2].result.as_ref().unwrap().bytes, 10);
    assert_eq!(factory.stats.requests(), 3);
}

#[tokio::test(flavor = "multi_thread")]
#[parallel]
async fn should_time_out_hanging_requests_without_blocking_others() {
    let factory = MockTransportFactory::new(Behavior::ok(200)).with("https://slow/", Behavior::Hang);
    let config = TransportConfig::build(1, &quiet_params(), &empty_cert_pool(), &factory).unwrap();
    let targets = addresses(&["https://fast/", "https://slow/"]);

    let started = Instant::now();
    let outcomes = dispatch(&config, &targets, TIMEOUT).await;
    config.close().await;

    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(outcomes[0].result.as_ref().unwrap().bytes, 200);
    assert_eq!(outcomes[1].result, Err(RequestError::Timeout(TIMEOUT)));
}

#[tokio::test(flavor = "multi_thread")]
#[parallel]
async fn should_report_invalid_addresses_without_calling_the_transport() {
    let factory = MockTransportFactory::new(Behavior::ok(1));
    let config = TransportConfig::build(1, &quiet_params(), &empty_cert_pool(), &factory).unwrap();
    let targets = addresses(&["not a uri"]);

    let outcomes = dispatch(&config, &targets, TIMEOUT).await;
    config.close().await;

    assert!(matches!(outcomes[0].result, Err(RequestError::InvalidAddress(_))));
    assert_eq!(factory.stats.requests(), 0);
}

#[tokio::test(flavor = "multi_thread")]
#[parallel]
async fn should_report_read_failures_after_a_response() {
    let factory = MockTransportFactory::new(Behavior::FailRead { after: 40 });
    let config = TransportConfig::build(1, &quiet_params(), &empty_cert_pool(), &factory).unwrap();

    let outcomes = dispatch(&config, &addresses(&["https://a/"]), TIMEOUT).await;
    config.close().await;

    assert!(matches!(outcomes[0].result, Err(RequestError::Read(_))));
}

#[tokio::test(flavor = "multi_thread")]
#[parallel]
async fn should_turn_panicking_requests_into_failures() {
    let factory = MockTransportFactory::new(Behavior::ok(5)).with("https://boom/", Behavior::Panic);
    let config = TransportConfig::build(1, &quiet_params(), &empty_cert_pool(), &factory).unwrap();
    let targets = addresses(&["https://boom/", "https://ok/"]);

    let outcomes = dispatch(&config, &targets, TIMEOUT).await;
    config.close().await;

    assert_eq!(outcomes.len(), 2);
    assert!(matches!(outcomes[0].result, Err(RequestError::Panicked(_))));
    assert!(outcomes[1].is_success());
}

#[tokio::test(flavor = "multi_thread")]
#[parallel]
async fn should_keep_each_panic_reason_with_its_own_address() {
    let targets = ["https://p1/", "https://p2/", "https://ok/", "https://p3/"];
    let factory = MockTransportFactory::new(Behavior::ok(5))
        .with("https://p1/", Behavior::Panic)
        .with("https://p2/", Behavior::Panic)
        .with("https://p3/", Behavior::Panic);
    let config = TransportConfig::build(1, &quiet_params(), &empty_cert_pool(), &factory).unwrap();

    let outcomes = dispatch(&config, &addresses(&targets), TIMEOUT).await;
    config.close().await;

    assert_eq!(outcomes.len(), targets.len());
    for (outcome, address) in outcomes.iter().zip(targets) {
        assert_eq!(outcome.address, address);
        if address == "https://ok/" {
            assert!(outcome.is_success());
            continue;
        }

        match &outcome.result {
            Err(RequestError::Panicked(reason)) => assert!(
                reason.contains(address),
                "{address} got the reason of another request: {reason}"
            ),
            other => panic!("unexpected outcome for {address}: {other:?}"),
        }
    }
}

#[tokio::test(flavor = "multi_thread")]
#[parallel]
async fn should_drain_bodies_when_quiet_and_keep_them_otherwise() {
    let quiet_factory = MockTransportFactory::new(Behavior::ok(300));
    let config =
        TransportConfig::build(1, &quiet_params(), &empty_cert_pool(), &quiet_factory).unwrap();
    let outcomes = dispatch(&config, &addresses(&["https://a/"]), TIMEOUT).await;
    config.close().await;

    let delivery = outcomes[0].result.as_ref().unwrap();
    assert_eq!(delivery.bytes, 300);
    assert!(delivery.body.is_none());
    assert_eq!(quiet_factory.stats.drained(), 1);

    let loud_factory = MockTransportFactory::new(Behavior::ok(300));
    let params = TrialParameters::builder().build().unwrap();
    let config = TransportConfig::build(1, &params, &empty_cert_pool(), &loud_factory).unwrap();
    let outcomes = dispatch(&config, &addresses(&["https://a/"]), TIMEOUT).await;
    config.close().await;

    let delivery = outcomes[0].result.as_ref().unwrap();
    assert_eq!(delivery.body.as_ref().map(|body| body.len()), Some(300));
    assert_eq!(loud_factory.stats.drained(), 1);
}

#[tokio::test(flavor = "multi_thread")]
#[parallel]
async fn should_resolve_immediately_without_addresses() {
    let factory = MockTransportFactory::new(Behavior::Hang);
    let config = TransportConfig::build(1, &quiet_params(), &empty_cert_pool(), &factory).unwrap();

    let outcomes = dispatch(&config, &[], TIMEOUT).await;
    config.close().await;

    assert!(outcomes.is_empty());
    assert_eq!(factory.stats.closed(), 1);
}
