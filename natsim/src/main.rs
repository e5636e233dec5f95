// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

#![deny(clippy::all, clippy::pedantic)]
#![deny(rustdoc::all)]
#![allow(rustdoc::missing_crate_level_docs)]

mod args;

use crate::args::{CmdArgs, Parser, Preset};

use sim::{Scenario, ScenarioConfig, SimError};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::process::ExitCode;
use tracectl::{LevelFilter, get_log_ctl, log_component};
use tracing::{error, info};

log_component!("natsim", LevelFilter::INFO, &["natsim"]);

fn scenario_config(args: &CmdArgs) -> Result<ScenarioConfig, SimError> {
    let mut config = match args.scenario() {
        Some(path) => ScenarioConfig::load(path)?,
        None => match args.preset() {
            Preset::StaticNatTcp => ScenarioConfig::static_nat_tcp(),
            Preset::StaticNatUdp => ScenarioConfig::static_nat_udp(),
            Preset::TcpEcho => ScenarioConfig::tcp_echo(args.use_ipv6()),
        },
    };
    for client in &mut config.clients {
        if let Some(max_packets) = args.max_packets() {
            client.max_packets = max_packets;
        }
        if let Some(size) = args.packet_size() {
            client.packet_size = size;
        }
        if let Some(interval) = args.interval_ms() {
            client.interval_ms = interval;
        }
    }
    Ok(config)
}

fn write_rules(scenario: &Scenario, path: &Path) -> Result<(), SimError> {
    let Some(nat) = scenario.router.and_then(|router| scenario.sim.nat(router)) else {
        return Err(SimError::Scenario(
            "no translator in this scenario".to_owned(),
        ));
    };
    let mut out = BufWriter::new(File::create(path)?);
    nat.print_table(&mut out)?;
    info!("Wrote translation rules to {}", path.display());
    Ok(())
}

fn run(args: &CmdArgs) -> Result<(), SimError> {
    let config = scenario_config(args)?;
    if args.print_scenario() {
        print!("{}", config.to_yaml()?);
        return Ok(());
    }
    let mut scenario = config.build(None)?;
    let report = scenario.run();
    if let Some(path) = args.rules_out() {
        write_rules(&scenario, path)?;
    }
    print!("{report}");
    Ok(())
}

fn main() -> ExitCode {
    let args = CmdArgs::parse();
    let logctl = get_log_ctl();
    if let Some(tracing) = args.tracing()
        && let Err(e) = logctl.setup_from_string(tracing)
    {
        error!("Invalid tracing configuration: {e}");
        return ExitCode::FAILURE;
    }
    if args.show_tracing_tags() {
        println!("{}", logctl.describe_by_tag());
        return ExitCode::SUCCESS;
    }
    if args.show_tracing_targets() {
        println!("{}", logctl.describe());
        return ExitCode::SUCCESS;
    }

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
