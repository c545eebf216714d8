use clap::{App, Arg};
use colored::*;

use lb_probe::executor::run_scenario;
use lb_probe::models::scenario::ScenarioConfig;
use lb_probe::utils::hardware::get_hardware_info;

#[tokio::main]
async fn main() {
    let matches = App::new("lb-probe")
        .version("0.1.0")
        .about("HTTP load probe for load-balancer end-to-end checks")
        .subcommand(
            App::new("app")
                .about("Probe the APP_LB_DNS endpoint: 10 VUs, 180s, abort on first failure"),
        )
        .subcommand(
            App::new("echoserver")
                .about("Probe the ECHOSERVER_LB_DNS endpoint: 10 VUs, 30s, 1s pacing"),
        )
        .subcommand(
            App::new("run").about("Run a scenario from a JSON file").arg(
                Arg::new("config")
                    .short('c')
                    .long("config")
                    .value_name("FILE")
                    .help("Path to the scenario file")
                    .required(true),
            ),
        )
        .subcommand_required(true)
        .arg_required_else_help(true)
        .get_matches();

    let config = match matches.subcommand() {
        Some(("app", _)) => ScenarioConfig::app(),
        Some(("echoserver", _)) => ScenarioConfig::echoserver(),
        Some(("run", sub)) => {
            let path = sub.get_one::<String>("config").expect("config is required");
            match ScenarioConfig::from_file(path) {
                Ok(config) => config,
                Err(e) => {
                    eprintln!("{} {}", "invalid scenario config:".red().bold(), e);
                    std::process::exit(2);
                }
            }
        }
        _ => unreachable!("subcommand_required is set"),
    };

    let hw = get_hardware_info();
    println!(
        "{} {} cores | {} MB free / {} MB total",
        "worker   :".cyan().bold(),
        hw.cpu_cores,
        hw.free_mem_mb,
        hw.total_mem_mb
    );
    println!(
        "{} {} ({} VUs, {:?})",
        "scenario :".cyan().bold(),
        config.name.bold(),
        config.vus,
        config.duration
    );

    let outcome = run_scenario(config).await;

    if !outcome.passed() {
        std::process::exit(1);
    }
}
