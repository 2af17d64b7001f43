//! CLI flags and resolved simulator configuration.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

/// Skymesh constellation simulator daemon.
#[derive(Parser, Debug)]
#[command(name = "skymesh-sim", about = "Satellite constellation and ground segment simulator")]
pub struct Cli {
    /// Scenario JSON (interfaces, links, positions).
    #[arg(long)]
    pub scenario: Option<PathBuf>,

    /// Transceiver catalog JSON.
    #[arg(long)]
    pub transceivers: Option<PathBuf>,

    /// Simulation tick interval in milliseconds.
    #[arg(long, default_value_t = 1000)]
    pub tick_interval_ms: u64,

    /// Advance simulated time as fast as the loop schedules ticks.
    #[arg(long, default_value_t = false)]
    pub accelerated: bool,

    /// Minimum ground-station elevation in degrees.
    #[arg(long, default_value_t = 10.0)]
    pub min_elevation_deg: f64,

    /// Agent telemetry interval in simulated seconds; 0 disables telemetry.
    #[arg(long, default_value_t = 1)]
    pub telemetry_interval_s: u64,

    /// Controller replanning interval in simulated seconds.
    #[arg(long, default_value_t = 300)]
    pub replan_interval_s: u64,

    /// Prometheus metrics listen address (e.g. 127.0.0.1:9091).
    #[arg(long)]
    pub metrics_addr: Option<SocketAddr>,

    /// Destination prefix per node for the built-in route planner, as
    /// `node=cidr`. May be repeated.
    #[arg(long = "route-prefix", value_name = "NODE=CIDR")]
    pub route_prefixes: Vec<String>,

    /// Log filter when RUST_LOG is not set (e.g. info, skymesh_core=debug).
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

/// Resolved configuration consumed by the runtime.
#[derive(Debug, Clone)]
pub struct SimConfig {
    pub scenario_path: Option<PathBuf>,
    pub catalog_path: Option<PathBuf>,
    pub tick_interval: Duration,
    pub accelerated: bool,
    pub min_elevation_deg: f64,
    pub telemetry_interval: Duration,
    pub telemetry_enabled: bool,
    pub replan_interval: Duration,
    pub metrics_addr: Option<SocketAddr>,
    pub route_prefixes: HashMap<String, String>,
}

impl Default for SimConfig {
    fn default() -> Self {
        SimConfig {
            scenario_path: None,
            catalog_path: None,
            tick_interval: Duration::from_secs(1),
            accelerated: false,
            min_elevation_deg: 10.0,
            telemetry_interval: Duration::from_secs(1),
            telemetry_enabled: true,
            replan_interval: Duration::from_secs(300),
            metrics_addr: None,
            route_prefixes: HashMap::new(),
        }
    }
}

impl Cli {
    pub fn resolve(self) -> Result<SimConfig, String> {
        if self.tick_interval_ms == 0 {
            return Err("tick interval must be positive".into());
        }
        let mut route_prefixes = HashMap::new();
        for spec in &self.route_prefixes {
            let Some((node, prefix)) = spec.split_once('=') else {
                return Err(format!("malformed --route-prefix {spec}, expected NODE=CIDR"));
            };
            if node.is_empty() || prefix.is_empty() {
                return Err(format!("malformed --route-prefix {spec}, expected NODE=CIDR"));
            }
            route_prefixes.insert(node.to_string(), prefix.to_string());
        }
        Ok(SimConfig {
            scenario_path: self.scenario,
            catalog_path: self.transceivers,
            tick_interval: Duration::from_millis(self.tick_interval_ms),
            accelerated: self.accelerated,
            min_elevation_deg: self.min_elevation_deg,
            telemetry_interval: Duration::from_secs(self.telemetry_interval_s),
            telemetry_enabled: self.telemetry_interval_s > 0,
            replan_interval: Duration::from_secs(self.replan_interval_s.max(1)),
            metrics_addr: self.metrics_addr,
            route_prefixes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_resolve() {
        let cli = Cli::parse_from(["skymesh-sim"]);
        let config = cli.resolve().unwrap();
        assert_eq!(config.tick_interval, Duration::from_secs(1));
        assert!(!config.accelerated);
        assert!(config.telemetry_enabled);
        assert_eq!(config.replan_interval, Duration::from_secs(300));
        assert!(config.route_prefixes.is_empty());
    }

    #[test]
    fn zero_telemetry_disables() {
        let cli = Cli::parse_from(["skymesh-sim", "--telemetry-interval-s", "0"]);
        let config = cli.resolve().unwrap();
        assert!(!config.telemetry_enabled);
    }

    #[test]
    fn zero_tick_interval_rejected() {
        let cli = Cli::parse_from(["skymesh-sim", "--tick-interval-ms", "0"]);
        assert!(cli.resolve().is_err());
    }

    #[test]
    fn route_prefixes_parse() {
        let cli = Cli::parse_from([
            "skymesh-sim",
            "--route-prefix",
            "gs-1=10.1.0.0/24",
            "--route-prefix",
            "sat-1=10.2.0.0/24",
        ]);
        let config = cli.resolve().unwrap();
        assert_eq!(config.route_prefixes.len(), 2);
        assert_eq!(config.route_prefixes["gs-1"], "10.1.0.0/24");
    }

    #[test]
    fn malformed_route_prefix_rejected() {
        let cli = Cli::parse_from(["skymesh-sim", "--route-prefix", "nonsense"]);
        assert!(cli.resolve().is_err());
    }

    #[test]
    fn accelerated_flag() {
        let cli = Cli::parse_from(["skymesh-sim", "--accelerated"]);
        assert!(cli.resolve().unwrap().accelerated);
    }
}
