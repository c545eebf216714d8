//! End-to-end probe runs against local hyper servers. Each test stands up
//! a throwaway server on an ephemeral port, points a scenario at it
//! through the environment, and asserts on the run outcome.
use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Response, Server, StatusCode};

use lb_probe::executor::run_scenario;
use lb_probe::models::metrics::ERRORS_COUNTER;
use lb_probe::models::scenario::{ScenarioConfig, Threshold, ThresholdExpr};

async fn spawn_server(status: StatusCode) -> (SocketAddr, Arc<AtomicU64>) {
    let hits = Arc::new(AtomicU64::new(0));
    let hits_for_service = Arc::clone(&hits);

    let make_svc = make_service_fn(move |_conn| {
        let hits = Arc::clone(&hits_for_service);
        async move {
            Ok::<_, Infallible>(service_fn(move |_req| {
                let hits = Arc::clone(&hits);
                async move {
                    hits.fetch_add(1, Ordering::Relaxed);
                    Ok::<_, Infallible>(
                        Response::builder()
                            .status(status)
                            .body(Body::empty())
                            .expect("static response builds"),
                    )
                }
            }))
        }
    });

    let server = Server::bind(&SocketAddr::from(([127, 0, 0, 1], 0))).serve(make_svc);
    let addr = server.local_addr();
    tokio::spawn(server);
    (addr, hits)
}

fn scenario(
    name: &str,
    target_env: &str,
    vus: u64,
    duration: Duration,
    pacing: Option<Duration>,
    abort_on_fail: bool,
) -> ScenarioConfig {
    ScenarioConfig {
        name: name.to_string(),
        target_env: target_env.to_string(),
        vus,
        duration,
        pacing,
        timeout: Some(Duration::from_millis(500)),
        thresholds: HashMap::from([(
            ERRORS_COUNTER.to_string(),
            vec![Threshold {
                threshold: ThresholdExpr::eq(0),
                abort_on_fail,
            }],
        )]),
    }
}

#[tokio::test]
async fn healthy_target_passes_with_zero_errors() {
    let (addr, hits) = spawn_server(StatusCode::OK).await;
    std::env::set_var("LB_PROBE_IT_HEALTHY", addr.to_string());

    let config = scenario(
        "healthy",
        "LB_PROBE_IT_HEALTHY",
        4,
        Duration::from_millis(300),
        Some(Duration::from_millis(20)),
        false,
    );

    let outcome = run_scenario(config).await;

    assert!(outcome.passed());
    assert!(!outcome.aborted);
    assert_eq!(outcome.metrics.failed_checks, 0);
    assert!(outcome.metrics.total_requests > 0);
    assert_eq!(outcome.thresholds.len(), 1);
    assert_eq!(outcome.thresholds[0].count, 0);
    assert!(hits.load(Ordering::Relaxed) > 0);
}

#[tokio::test]
async fn abort_on_fail_stops_the_run_at_the_first_failure() {
    let (addr, _hits) = spawn_server(StatusCode::INTERNAL_SERVER_ERROR).await;
    std::env::set_var("LB_PROBE_IT_ABORT", addr.to_string());

    let config = scenario(
        "abort",
        "LB_PROBE_IT_ABORT",
        1,
        Duration::from_secs(5),
        None,
        true,
    );

    let started = Instant::now();
    let outcome = run_scenario(config).await;

    assert!(outcome.aborted);
    assert!(!outcome.passed());
    assert_eq!(outcome.thresholds[0].count, 1);
    assert!(outcome.thresholds[0].aborted_run);
    assert!(
        started.elapsed() < Duration::from_secs(3),
        "abort-on-fail must end the run well before the 5s deadline"
    );
}

#[tokio::test]
async fn failing_target_without_abort_runs_to_completion() {
    let (addr, _hits) = spawn_server(StatusCode::INTERNAL_SERVER_ERROR).await;
    std::env::set_var("LB_PROBE_IT_NOABORT", addr.to_string());

    let duration = Duration::from_millis(400);
    let config = scenario(
        "no-abort",
        "LB_PROBE_IT_NOABORT",
        2,
        duration,
        Some(Duration::from_millis(50)),
        false,
    );

    let started = Instant::now();
    let outcome = run_scenario(config).await;

    assert!(!outcome.aborted);
    assert!(!outcome.passed());
    assert!(started.elapsed() >= duration);
    assert_eq!(outcome.metrics.successful_checks, 0);
    assert_eq!(outcome.metrics.failed_checks, outcome.metrics.total_requests);
    assert_eq!(outcome.thresholds[0].count, outcome.metrics.total_requests);
}

#[tokio::test]
async fn abort_threshold_tolerates_errors_below_its_bound() {
    let (addr, _hits) = spawn_server(StatusCode::INTERNAL_SERVER_ERROR).await;
    std::env::set_var("LB_PROBE_IT_BOUND", addr.to_string());

    let mut config = scenario(
        "bounded",
        "LB_PROBE_IT_BOUND",
        1,
        Duration::from_secs(5),
        None,
        false,
    );
    config.thresholds = HashMap::from([(
        ERRORS_COUNTER.to_string(),
        vec![Threshold {
            threshold: "count < 3".parse().expect("valid threshold"),
            abort_on_fail: true,
        }],
    )]);

    let outcome = run_scenario(config).await;

    // A single sequential virtual user records the third error and only
    // then crosses `count < 3`.
    assert!(outcome.aborted);
    assert!(!outcome.passed());
    assert_eq!(outcome.thresholds[0].count, 3);
}

#[tokio::test]
async fn pacing_bounds_the_iteration_rate() {
    let (addr, _hits) = spawn_server(StatusCode::OK).await;
    std::env::set_var("LB_PROBE_IT_PACED", addr.to_string());

    let config = scenario(
        "paced",
        "LB_PROBE_IT_PACED",
        2,
        Duration::from_millis(450),
        Some(Duration::from_millis(100)),
        false,
    );

    let outcome = run_scenario(config).await;

    // Each virtual user can start an iteration at most every 100ms, so
    // two of them fit no more than ~10 iterations into 450ms.
    assert!(outcome.metrics.total_requests >= 2);
    assert!(outcome.metrics.total_requests <= 10);
    assert!(outcome.passed());
}

#[tokio::test]
async fn unresolvable_target_counts_errors_instead_of_crashing() {
    // Deliberately unset: the target resolves to http://undefined.
    let mut config = scenario(
        "unset-env",
        "LB_PROBE_IT_NO_SUCH_VAR",
        1,
        Duration::from_secs(1),
        Some(Duration::from_millis(100)),
        false,
    );
    // Keep the request timeout well under the run duration so the first
    // iteration always records before the deadline, even if name
    // resolution stalls instead of failing fast.
    config.timeout = Some(Duration::from_millis(200));

    let outcome = run_scenario(config).await;

    assert!(!outcome.passed());
    assert!(!outcome.aborted);
    assert!(outcome.thresholds[0].count >= 1);
    assert_eq!(outcome.metrics.successful_checks, 0);
    assert_eq!(outcome.metrics.target_url, "http://undefined");
}
