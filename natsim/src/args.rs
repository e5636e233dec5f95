// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

pub(crate) use clap::Parser;
use clap::ValueEnum;
use std::path::{Path, PathBuf};

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub(crate) enum Preset {
    StaticNatTcp,
    StaticNatUdp,
    TcpEcho,
}

#[derive(Parser)]
#[command(name = "natsim")]
#[command(version = "0.1")]
#[command(about = "Simulated static NAT router with echo traffic", long_about = None)]
pub(crate) struct CmdArgs {
    #[arg(long, value_name = "YAML file describing the scenario", conflicts_with = "preset")]
    scenario: Option<PathBuf>,
    #[arg(long, value_enum, default_value_t = Preset::StaticNatUdp)]
    preset: Preset,
    #[arg(long, default_value_t = false, help = "use IPv6 (tcp-echo preset only)")]
    use_ipv6: bool,
    #[arg(long, value_name = "packets per client")]
    max_packets: Option<u32>,
    #[arg(long, value_name = "payload bytes")]
    packet_size: Option<usize>,
    #[arg(long, value_name = "milliseconds between packets")]
    interval_ms: Option<u64>,
    #[arg(long, value_name = "tracing configuration (e.g. nat=debug,echo=trace)")]
    tracing: Option<String>,
    #[arg(long, default_value_t = false, help = "show the log components and exit")]
    show_tracing_targets: bool,
    #[arg(long, default_value_t = false, help = "show the log components by tag and exit")]
    show_tracing_tags: bool,
    #[arg(long, default_value_t = false, help = "print the scenario as YAML and exit")]
    print_scenario: bool,
    #[arg(long, value_name = "file to write the translation rules to")]
    rules_out: Option<PathBuf>,
}

impl CmdArgs {
    pub fn scenario(&self) -> Option<&Path> {
        self.scenario.as_deref()
    }
    pub fn preset(&self) -> Preset {
        self.preset
    }
    pub fn use_ipv6(&self) -> bool {
        self.use_ipv6
    }
    pub fn max_packets(&self) -> Option<u32> {
        self.max_packets
    }
    pub fn packet_size(&self) -> Option<usize> {
        self.packet_size
    }
    pub fn interval_ms(&self) -> Option<u64> {
        self.interval_ms
    }
    pub fn tracing(&self) -> Option<&str> {
        self.tracing.as_deref()
    }
    pub fn show_tracing_targets(&self) -> bool {
        self.show_tracing_targets
    }
    pub fn show_tracing_tags(&self) -> bool {
        self.show_tracing_tags
    }
    pub fn print_scenario(&self) -> bool {
        self.print_scenario
    }
    pub fn rules_out(&self) -> Option<&Path> {
        self.rules_out.as_deref()
    }
}
