use anyhow::{Context, Result};
use clap::{Arg, Command};
use log::info;

mod scenario;

use scenario::Scenario;

fn main() -> Result<()> {
    let matches = Command::new("ndn-mock-sim")
        .version("0.1.0")
        .about("Run a producer/consumer scenario through the in-memory NDN forwarder")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Scenario file path")
                .default_value("ndn-mock-sim/scenarios/basic.toml"),
        )
        .arg(
            Arg::new("rounds")
                .short('r')
                .long("rounds")
                .value_name("N")
                .help("Override the number of event-pump rounds")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Log forwarding decisions")
                .action(clap::ArgAction::SetTrue),
        )
        .get_matches();

    let config_path = matches
        .get_one::<String>("config")
        .context("Missing scenario path")?;
    let mut scenario = Scenario::load(config_path)?;
    if let Some(rounds) = matches.get_one::<usize>("rounds") {
        scenario.rounds = *rounds;
    }

    let level = if matches.get_flag("verbose") {
        "debug"
    } else {
        scenario.logging.level.as_str()
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    info!("Running scenario {}", config_path);
    let report = scenario::run(&scenario)?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
