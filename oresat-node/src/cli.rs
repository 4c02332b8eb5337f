//! Command line surface (spec section 6). Parsed with `clap`'s derive API,
//! mirroring the way the teacher's own example binaries build their
//! argument structs.

use std::path::PathBuf;

use canopen_node::dictionary::parse_number;
use clap::Parser;

/// OreSat CANopen node runtime.
#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
	/// CAN bus interface name.
	#[arg(short, long, default_value = "vcan0")]
	pub bus: String,

	/// Node ID, decimal or `0x`-prefixed hex. `0` resolves from the
	/// configuration file, falling back to `0x7C`.
	#[arg(short = 'n', long = "node-id", default_value = "0", value_parser = parse_node_id)]
	pub node_id: u8,

	/// Path to the EDS/DCF file describing this node's Object Dictionary.
	#[arg(short, long)]
	pub eds: Option<PathBuf>,

	/// Increase log verbosity (-v, -vv, -vvv).
	#[arg(short, long, action = clap::ArgAction::Count)]
	pub verbose: u8,

	/// Route logs to the system journal instead of stderr.
	#[arg(short, long)]
	pub log: bool,

	/// Comma-separated list of hardware interfaces to mock, or `all`.
	#[arg(short, long, value_delimiter = ',')]
	pub mock_hw: Vec<String>,

	/// REST API bind address.
	#[arg(short, long, default_value = "127.0.0.1")]
	pub address: String,

	/// REST API bind port.
	#[arg(short, long, default_value_t = 8000)]
	pub port: u16,
}

fn parse_node_id(s: &str) -> Result<u8, String> {
	Ok(parse_number::<u8>(s))
}

impl Cli {
	/// Whether `--mock-hw all` (or an empty invocation of the flag) was given.
	pub fn mock_all_hw(&self) -> bool {
		self.mock_hw.iter().any(|name| name.eq_ignore_ascii_case("all"))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn defaults_match_spec() {
		let cli = Cli::parse_from(["oresat-node"]);
		assert_eq!(cli.bus, "vcan0");
		assert_eq!(cli.node_id, 0);
		assert_eq!(cli.address, "127.0.0.1");
		assert_eq!(cli.port, 8000);
	}

	#[test]
	fn node_id_accepts_hex_and_decimal() {
		let cli = Cli::parse_from(["oresat-node", "-n", "0x10"]);
		assert_eq!(cli.node_id, 0x10);

		let cli = Cli::parse_from(["oresat-node", "-n", "16"]);
		assert_eq!(cli.node_id, 16);
	}

	#[test]
	fn mock_hw_splits_on_commas() {
		let cli = Cli::parse_from(["oresat-node", "-m", "imu,gps"]);
		assert_eq!(cli.mock_hw, vec!["imu", "gps"]);
		assert!(!cli.mock_all_hw());

		let cli = Cli::parse_from(["oresat-node", "-m", "all"]);
		assert!(cli.mock_all_hw());
	}
}
