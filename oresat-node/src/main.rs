//! `oresat-node`: CANopen node runtime binary. Parses the CLI surface
//! (spec section 6), loads the Object Dictionary, and runs the bus
//! supervisor to completion, translating its exit disposition into the
//! process exit code the surrounding init system acts on.

mod cli;
mod paths;
mod resource;
mod runtime;
mod supervisor;

use clap::Parser;

use cli::Cli;
use runtime::NodeRuntime;
use supervisor::{BusSupervisor, NodeStop};

const DEFAULT_EDS: &str = include_str!("../default.eds");

#[tokio::main]
async fn main() {
	let cli = Cli::parse();
	init_logging(&cli);

	let node_id = resolve_node_id(cli.node_id, &cli.eds);
	let eds_content = load_eds(cli.eds.as_deref());
	let privileged = paths::is_privileged();

	log::info!("starting node {node_id:#04X} on {:?}", cli.bus);

	let supervisor = BusSupervisor::new(cli.bus.clone(), node_id, eds_content, privileged);
	let resources = resource::ResourceHost::new();
	let runtime = NodeRuntime::new(supervisor, resources);

	let disposition = runtime.run().await;
	log::info!("node has ended with disposition {disposition:?}");
	std::process::exit(exit_code(disposition));
}

fn init_logging(cli: &Cli) {
	let level = match cli.verbose {
		0 => log::LevelFilter::Info,
		1 => log::LevelFilter::Debug,
		_ => log::LevelFilter::Trace,
	};
	env_logger::Builder::new().filter_level(level).init();
	if cli.log {
		log::warn!("routing logs to the system journal is not implemented in this build; logging to stderr");
	}
}

/// Node ID resolution precedence (spec section 3): explicit CLI override >
/// value embedded in the configuration file > default `0x7C`. A CLI value of
/// `0` means "let the file or default decide".
fn resolve_node_id(cli_node_id: u8, eds_path: &Option<std::path::PathBuf>) -> u8 {
	if cli_node_id != 0 {
		return cli_node_id;
	}
	if let Some(path) = eds_path {
		if let Ok(content) = std::fs::read_to_string(path) {
			if let Some(id) = node_id_from_eds(&content) {
				return id;
			}
		}
	}
	0x7C
}

fn node_id_from_eds(content: &str) -> Option<u8> {
	for line in content.lines() {
		let line = line.trim();
		if let Some(value) = line.strip_prefix("NodeID=").or_else(|| line.strip_prefix("NodeId=")) {
			return Some(canopen_node::dictionary::parse_number(value.trim()));
		}
	}
	None
}

fn load_eds(path: Option<&std::path::Path>) -> String {
	match path {
		Some(path) => match std::fs::read_to_string(path) {
			Ok(content) => content,
			Err(e) => {
				log::warn!("failed to read {path:?}: {e}, falling back to the built-in backup object dictionary");
				DEFAULT_EDS.to_string()
			}
		},
		None => DEFAULT_EDS.to_string(),
	}
}

fn exit_code(disposition: NodeStop) -> i32 {
	disposition as i32
}
