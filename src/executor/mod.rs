use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::task;
use tokio::time::{sleep, timeout};

use chrono::Local;
use colored::*;
use hyper::StatusCode;

use crate::client::{build_client, send_request};
use crate::models::metrics::{Counter, Metrics, RunOutcome, ThresholdReport};
use crate::models::scenario::ScenarioConfig;

const CHECK_NAME: &str = "status is 200 (OK)";

/// Run one scenario to completion: spawn the virtual users, drive the
/// probe loop in each, then evaluate thresholds over the final error
/// count and print the summary.
pub async fn run_scenario(config: ScenarioConfig) -> RunOutcome {
    let client = Arc::new(build_client());
    let config = Arc::new(config);
    let target = Arc::new(config.resolve_target());

    let errors = Arc::new(Counter::new());
    let metrics = Arc::new(Mutex::new(Metrics {
        fastest_response: f64::MAX,
        slowest_response: f64::MIN,
        status_counts: HashMap::new(),
        ..Default::default()
    }));

    let response_times = Arc::new(Mutex::new(Vec::new()));
    let running = Arc::new(AtomicBool::new(true));
    let aborted = Arc::new(AtomicBool::new(false));
    let abort_thresholds = Arc::new(config.abort_thresholds());

    let started = Instant::now();
    let end_time = started + config.duration;
    let max_request_duration = config.request_timeout();

    let mut handles = Vec::new();

    for _ in 0..config.vus {
        let client = Arc::clone(&client);
        let config = Arc::clone(&config);
        let target = Arc::clone(&target);
        let errors = Arc::clone(&errors);
        let metrics = Arc::clone(&metrics);
        let response_times = Arc::clone(&response_times);
        let running = Arc::clone(&running);
        let aborted = Arc::clone(&aborted);
        let abort_thresholds = Arc::clone(&abort_thresholds);

        let handle = task::spawn(async move {
            while running.load(Ordering::Relaxed) && Instant::now() < end_time {
                let request_start = Instant::now();

                let result = timeout(max_request_duration, send_request(&client, &target)).await;

                let elapsed = request_start.elapsed().as_secs_f64() * 1000.0;

                {
                    let mut rt = response_times.lock().unwrap();
                    rt.push(elapsed);
                }

                let (check_ok, status_key) = match &result {
                    Ok(Ok((status, _))) => {
                        (*status == StatusCode::OK, status.as_u16().to_string())
                    }
                    Ok(Err(_)) => (false, "REQUEST_ERROR".to_string()),
                    Err(_) => (false, "TIMEOUT".to_string()),
                };

                // The one shared metric: every iteration records its check
                // result, counting only failures.
                errors.add(!check_ok);

                {
                    let mut m = metrics.lock().unwrap();
                    m.total_requests += 1;
                    m.total_duration += elapsed;
                    if check_ok {
                        m.successful_checks += 1;
                    } else {
                        m.failed_checks += 1;
                    }
                    *m.status_counts.entry(status_key.clone()).or_insert(0) += 1;
                    if elapsed < m.fastest_response {
                        m.fastest_response = elapsed;
                    }
                    if elapsed > m.slowest_response {
                        m.slowest_response = elapsed;
                    }
                }

                if check_ok {
                    println!(
                        "{} {} {} {}",
                        "status :".green().bold(),
                        status_key.bold(),
                        "| duration :".blue().bold(),
                        format!("{:.0}ms", elapsed).bold()
                    );
                } else {
                    eprintln!(
                        "{} {} {} {}",
                        "check  :".red().bold(),
                        format!("{} FAILED ({})", CHECK_NAME, status_key).red().bold(),
                        "| duration :".blue().bold(),
                        format!("{:.0}ms", elapsed).bold()
                    );
                }

                if !check_ok
                    && abort_thresholds
                        .iter()
                        .any(|t| !t.threshold.eval(errors.count()))
                {
                    if !aborted.swap(true, Ordering::Relaxed) {
                        eprintln!(
                            "{} {}",
                            "abort  :".red().bold(),
                            format!("Errors threshold crossed (count = {})", errors.count())
                                .red()
                                .bold()
                        );
                    }
                    running.store(false, Ordering::Relaxed);
                    break;
                }

                if let Some(pacing) = config.pacing {
                    sleep(pacing).await;
                }
            }
        });

        handles.push(handle);
    }

    // Wait for the deadline or for an abort-on-fail threshold to stop the
    // run, then cut down any virtual user still mid-request or mid-sleep.
    while running.load(Ordering::Relaxed) && Instant::now() < end_time {
        sleep(Duration::from_millis(20)).await;
    }

    for handle in handles.iter() {
        handle.abort();
    }

    for handle in handles {
        let _ = handle.await;
    }

    let was_aborted = aborted.load(Ordering::Relaxed);
    let final_count = errors.count();

    let mut final_metrics = std::mem::take(&mut *metrics.lock().unwrap());
    let response_times = response_times.lock().unwrap();

    let elapsed_secs = started
        .elapsed()
        .as_secs_f64()
        .min(config.duration.as_secs_f64());
    let run_secs = if elapsed_secs > 0.0 { elapsed_secs } else { 1.0 };

    final_metrics.scenario = config.name.clone();
    final_metrics.target_url = target.as_str().to_string();
    final_metrics.duration_secs = elapsed_secs;
    final_metrics.vus = config.vus;
    final_metrics.throughput = final_metrics.total_requests as f64 / run_secs;
    final_metrics.median_response_time = calculate_median(&response_times);
    final_metrics.timestamp = Local::now().format("%Y/%m/%d %H:%M:%S").to_string();

    if final_metrics.total_requests == 0 {
        final_metrics.fastest_response = 0.0;
        final_metrics.slowest_response = 0.0;
    }

    let thresholds = evaluate_thresholds(&config, final_count, was_aborted);

    print_summary(&final_metrics, &thresholds, was_aborted);

    RunOutcome {
        metrics: final_metrics,
        thresholds,
        aborted: was_aborted,
    }
}

fn evaluate_thresholds(
    config: &ScenarioConfig,
    final_count: u64,
    was_aborted: bool,
) -> Vec<ThresholdReport> {
    let mut reports = Vec::new();
    for (counter, list) in &config.thresholds {
        for t in list {
            let passed = t.threshold.eval(final_count);
            reports.push(ThresholdReport {
                counter: counter.clone(),
                expression: t.threshold.source().to_string(),
                count: final_count,
                passed,
                aborted_run: was_aborted && t.abort_on_fail && !passed,
            });
        }
    }
    reports
}

fn print_summary(metrics: &Metrics, thresholds: &[ThresholdReport], aborted: bool) {
    println!();
    println!("{}", "🔥 ======== PROBE RESULTS ======== 🔥".bold().white().on_blue());
    println!("{}{}", "⏰ Timestamp                : ".blue().bold(), metrics.timestamp.bold());
    println!("{}{}", "🎯 Scenario                 : ".blue().bold(), metrics.scenario.bold());
    println!("{}{}", "🌐 Target                   : ".blue().bold(), metrics.target_url.bold());
    println!("{}{}", "👥 Virtual users            : ".blue().bold(), metrics.vus.to_string().bold());
    println!("{}{}", "✅ Total requests           : ".green().bold(), metrics.total_requests.to_string().bold());
    println!("{}{}", "✅ Successful checks        : ".green().bold(), metrics.successful_checks.to_string().bold());
    println!("{}{}", "❌ Failed checks            : ".red().bold(), metrics.failed_checks.to_string().bold());
    println!("{}{}", "⚡ Fastest response (ms)    : ".cyan().bold(), format!("{:.2}", metrics.fastest_response).bold());
    println!("{}{}", "🐢 Slowest response (ms)    : ".yellow().bold(), format!("{:.2}", metrics.slowest_response).bold());
    println!("{}{}", "📊 Median response time (ms): ".magenta().bold(), format!("{:.2}", metrics.median_response_time).bold());
    println!("{}{}", "📈 Requests per second (RPS): ".blue().bold(), format!("{:.2}", metrics.throughput).bold());

    println!();
    println!("{}", "📦 ======== STATUS BREAKDOWN ========".bold().white().on_blue());
    for (status, count) in &metrics.status_counts {
        println!("{}", format!("• {}: {}", status, count).bold());
    }

    println!();
    println!("{}", "🚦 ======== THRESHOLDS ========".bold().white().on_blue());
    for t in thresholds {
        let line = format!("• {}: {} (count = {})", t.counter, t.expression, t.count);
        if t.passed {
            println!("{} {}", line.bold(), "PASSED".green().bold());
        } else {
            println!("{} {}", line.bold(), "FAILED".red().bold());
        }
    }
    if aborted {
        println!("{}", "run aborted early by threshold".red().bold());
    }
}

fn calculate_median(data: &[f64]) -> f64 {
    let mut sorted = data.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let len = sorted.len();
    if len == 0 {
        return 0.0;
    }
    if len % 2 == 0 {
        (sorted[len / 2 - 1] + sorted[len / 2]) / 2.0
    } else {
        sorted[len / 2]
    }
}
