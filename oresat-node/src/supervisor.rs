//! Bus/network supervision (spec section 4.5): a 1 Hz control loop that
//! classifies the underlying CAN interface into one of four states and
//! drives CANopen stack start/stop/restart transitions, optionally
//! shelling out to a privileged link-reset command.
//!
//! Grounded in the original node core's `_monitor_can`/`_restart_bus`/
//! `_restart_network`/`_disable_network`, translated from a threaded
//! `while not event.is_set(): ... event.wait(1)` loop into a tokio task.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use can_socket::CanInterface;
use canopen_node::dictionary::OdStore;
use canopen_node::emcy::EmcyCode;
use canopen_node::CanOpenNode;
use tokio::sync::Notify;

/// Built-in backup Object Dictionary, loaded when `eds_content` is missing or
/// fails to parse (spec section 9: "Invalid parse -> caller substitutes the
/// built-in backup OD").
const BACKUP_EDS: &str = include_str!("../default.eds");

/// The four states `BusSupervisor` classifies the link into (spec section 3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusState {
	NotFound,
	Down,
	UpNetDown,
	UpNetUp,
}

/// The disposition `run()` returns (spec section 3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum NodeStop {
	SoftReset = 1,
	HardReset = 2,
	FactoryReset = 3,
	PowerOff = 4,
}

impl NodeStop {
	fn from_u8(raw: u8) -> Self {
		match raw {
			2 => Self::HardReset,
			3 => Self::FactoryReset,
			4 => Self::PowerOff,
			_ => Self::SoftReset,
		}
	}
}

/// Link state of the underlying interface, as reported by a [`LinkProbe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
	Missing,
	Down,
	Up,
}

/// Test seam over `CanInterface::exists`/`is_up`, so the state machine can be
/// exercised without a real (or virtual) CAN interface.
pub trait LinkProbe: Send {
	fn probe(&mut self, bus: &str) -> LinkState;
}

/// Probes a real (or virtual) SocketCAN interface by name.
#[derive(Debug, Default)]
pub struct SocketCanProbe;

impl LinkProbe for SocketCanProbe {
	fn probe(&mut self, bus: &str) -> LinkState {
		if !CanInterface::exists(bus) {
			return LinkState::Missing;
		}
		match CanInterface::is_up(bus) {
			Ok(true) => LinkState::Up,
			Ok(false) => LinkState::Down,
			Err(_) => LinkState::Missing,
		}
	}
}

/// Privileged link-reset command sequence, wrapped behind a trait so tests
/// can inject a fake (spec section 9's explicit recommendation).
pub trait LinkResetter: Send {
	fn reset<'a>(&'a self, bus: &'a str) -> Pin<Box<dyn Future<Output = std::io::Result<()>> + Send + 'a>>;
}

/// Resets the link by shelling out to `ip link set <bus> down; ... type can
/// bitrate 1000000; ... up`, the sequence spec section 4.5 names.
#[derive(Debug, Default)]
pub struct CommandLineLinkResetter;

impl LinkResetter for CommandLineLinkResetter {
	fn reset<'a>(&'a self, bus: &'a str) -> Pin<Box<dyn Future<Output = std::io::Result<()>> + Send + 'a>> {
		Box::pin(async move {
			for args in [
				vec!["link", "set", bus, "down"],
				vec!["link", "set", bus, "type", "can", "bitrate", "1000000"],
				vec!["link", "set", bus, "up"],
			] {
				let status = tokio::process::Command::new("ip").args(&args).status().await?;
				if !status.success() {
					log::warn!("ip {} exited with {status}", args.join(" "));
				}
			}
			Ok(())
		})
	}
}

/// No-op resetter for unit tests and unprivileged runs.
#[derive(Debug, Default)]
pub struct NullLinkResetter;

impl LinkResetter for NullLinkResetter {
	fn reset<'a>(&'a self, _bus: &'a str) -> Pin<Box<dyn Future<Output = std::io::Result<()>> + Send + 'a>> {
		Box::pin(async { Ok(()) })
	}
}

/// Callback invoked once a fresh [`CanOpenNode`] is brought up (transition
/// DOWN -> UP_NET_DOWN), so the runtime can start resources against it. The
/// callback receives a shared handle it may hold onto past the call, e.g. to
/// bind a `send_tpdo` closure for a resource.
pub type OnNetworkUp = Box<dyn FnMut(Arc<CanOpenNode>) + Send>;

/// Callback invoked right before a [`CanOpenNode`] is torn down, so the
/// runtime can stop resources before the OD underneath them disappears.
pub type OnNetworkDown = Box<dyn FnMut() + Send>;

/// The bus/network supervisor control loop.
pub struct BusSupervisor {
	bus: String,
	node_id: u8,
	eds_content: String,
	privileged: bool,
	probe: Option<Box<dyn LinkProbe>>,
	link_resetter: Box<dyn LinkResetter>,
	state: BusState,
	down_logged: bool,
	restart_logged: bool,
	recovering_from_down: bool,
	tcp_tunnel_started: bool,
	node: Option<Arc<CanOpenNode>>,
	stop_signal: Arc<Notify>,
	reset: Arc<AtomicU8>,
	on_network_up: Option<OnNetworkUp>,
	on_network_down: Option<OnNetworkDown>,
}

impl std::fmt::Debug for BusSupervisor {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("BusSupervisor")
			.field("bus", &self.bus)
			.field("node_id", &self.node_id)
			.field("state", &self.state)
			.finish_non_exhaustive()
	}
}

impl BusSupervisor {
	/// A supervisor that probes a real SocketCAN interface by name.
	pub fn new(bus: impl Into<String>, node_id: u8, eds_content: impl Into<String>, privileged: bool) -> Self {
		Self::with_probe_and_resetter(
			bus,
			node_id,
			eds_content,
			privileged,
			Some(Box::new(SocketCanProbe)),
			if privileged { Box::new(CommandLineLinkResetter) } else { Box::new(NullLinkResetter) },
		)
	}

	/// A supervisor for a TCP-tunneled transport: link probing is skipped,
	/// the link is assumed always up, and the network restarts exactly once
	/// at supervisor entry (spec section 4.5's "Special transport" clause).
	pub fn new_tcp_tunnel(bus: impl Into<String>, node_id: u8, eds_content: impl Into<String>) -> Self {
		Self::with_probe_and_resetter(bus, node_id, eds_content, false, None, Box::new(NullLinkResetter))
	}

	fn with_probe_and_resetter(
		bus: impl Into<String>,
		node_id: u8,
		eds_content: impl Into<String>,
		privileged: bool,
		probe: Option<Box<dyn LinkProbe>>,
		link_resetter: Box<dyn LinkResetter>,
	) -> Self {
		Self {
			bus: bus.into(),
			node_id,
			eds_content: eds_content.into(),
			privileged,
			probe,
			link_resetter,
			state: BusState::NotFound,
			down_logged: false,
			restart_logged: false,
			recovering_from_down: false,
			tcp_tunnel_started: false,
			node: None,
			stop_signal: Arc::new(Notify::new()),
			reset: Arc::new(AtomicU8::new(NodeStop::SoftReset as u8)),
			on_network_up: None,
			on_network_down: None,
		}
	}

	/// Inject a fake [`LinkProbe`] (test seam).
	pub fn set_probe(&mut self, probe: Box<dyn LinkProbe>) {
		self.probe = Some(probe);
	}

	/// Inject a fake [`LinkResetter`] (test seam).
	pub fn set_link_resetter(&mut self, resetter: Box<dyn LinkResetter>) {
		self.link_resetter = resetter;
	}

	pub fn set_on_network_up(&mut self, callback: OnNetworkUp) {
		self.on_network_up = Some(callback);
	}

	pub fn set_on_network_down(&mut self, callback: OnNetworkDown) {
		self.on_network_down = Some(callback);
	}

	pub fn state(&self) -> BusState {
		self.state
	}

	/// A handle other tasks can use to request a stop (spec section 5's
	/// "stopping sets a shared event").
	pub fn stop_handle(&self) -> (Arc<Notify>, Arc<AtomicU8>) {
		(self.stop_signal.clone(), self.reset.clone())
	}

	/// Request the loop to exit, carrying `disposition` out of `run()`.
	pub fn stop(&self, disposition: NodeStop) {
		self.reset.store(disposition as u8, Ordering::SeqCst);
		self.stop_signal.notify_waiters();
	}

	/// Run the 1 Hz control loop until [`Self::stop`] is called. Returns the
	/// disposition passed to `stop` (or `SoftReset` if the loop was aborted
	/// externally without one).
	pub async fn run(mut self) -> NodeStop {
		let mut interval = tokio::time::interval(Duration::from_secs(1));
		loop {
			tokio::select! {
				_ = interval.tick() => self.tick().await,
				_ = self.stop_signal.notified() => break,
			}
		}
		self.teardown_network();
		NodeStop::from_u8(self.reset.load(Ordering::SeqCst))
	}

	async fn tick(&mut self) {
		let new_state = self.classify();
		if new_state != self.state {
			self.transition(self.state, new_state).await;
		}
		self.state = new_state;
	}

	fn classify(&mut self) -> BusState {
		let Some(probe) = self.probe.as_mut() else {
			// TCP-tunneled transport: always up, restart once at entry.
			return if self.tcp_tunnel_started { BusState::UpNetUp } else { BusState::UpNetDown };
		};
		match probe.probe(&self.bus) {
			LinkState::Missing => BusState::NotFound,
			LinkState::Down => BusState::Down,
			LinkState::Up if self.node.is_none() => BusState::UpNetDown,
			LinkState::Up => BusState::UpNetUp,
		}
	}

	async fn transition(&mut self, from: BusState, to: BusState) {
		match to {
			BusState::NotFound => {
				self.teardown_network();
				if !self.down_logged {
					log::error!("CAN interface {:?} not found", self.bus);
				}
				self.down_logged = true;
			}
			BusState::Down => {
				self.teardown_network();
				if self.privileged {
					if !self.restart_logged {
						log::warn!("attempting to reset link {:?}", self.bus);
					}
					self.restart_logged = true;
					if let Err(e) = self.link_resetter.reset(&self.bus).await {
						log::warn!("link reset for {:?} failed: {e}", self.bus);
					}
				} else if !self.down_logged {
					log::warn!("CAN interface {:?} is down", self.bus);
				}
				self.down_logged = true;
				self.recovering_from_down = true;
			}
			BusState::UpNetDown => {
				self.bring_up_network(from == BusState::Down || self.recovering_from_down).await;
				self.recovering_from_down = false;
			}
			BusState::UpNetUp => {
				self.down_logged = false;
				self.restart_logged = false;
			}
		}
	}

	async fn bring_up_network(&mut self, was_recovering: bool) {
		let od = match OdStore::load(self.node_id, &self.eds_content) {
			Ok(od) => od,
			Err(e) => {
				log::error!("failed to parse object dictionary: {e}, falling back to the built-in backup object dictionary");
				match OdStore::load(self.node_id, BACKUP_EDS) {
					Ok(od) => od,
					Err(e) => {
						log::error!("built-in backup object dictionary also failed to parse, cannot bring up network: {e}");
						return;
					}
				}
			}
		};
		let socket = match can_socket::tokio::CanSocket::bind(&self.bus) {
			Ok(socket) => socket,
			Err(e) => {
				log::error!("failed to bind {:?}: {e}", self.bus);
				return;
			}
		};
		let mut node = CanOpenNode::new(socket, od);
		node.start().await;

		if was_recovering {
			if let Err(e) = node.send_emcy(EmcyCode::COMM_RECOVERED_BUS, &[], false).await {
				log::warn!("failed to emit recovered-bus EMCY: {e}");
			}
		}

		let node = Arc::new(node);
		if let Some(callback) = self.on_network_up.as_mut() {
			callback(node.clone());
		}
		self.node = Some(node);
		self.tcp_tunnel_started = true;
	}

	fn teardown_network(&mut self) {
		if self.node.take().is_some() {
			if let Some(callback) = self.on_network_down.as_mut() {
				callback();
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::collections::VecDeque;

	struct ScriptedProbe(VecDeque<LinkState>);

	impl LinkProbe for ScriptedProbe {
		fn probe(&mut self, _bus: &str) -> LinkState {
			self.0.pop_front().unwrap_or(LinkState::Up)
		}
	}

	fn minimal_eds() -> &'static str {
		"[1001]\nParameterName=Error register\nObjectType=0x7\nDataType=0x5\nAcessType=ro\nDefaultValue=0\n\n\
		 [1017]\nParameterName=Producer heartbeat time\nObjectType=0x7\nDataType=0x6\nAcessType=rw\nDefaultValue=0\n"
	}

	#[tokio::test]
	async fn classification_walks_through_states_on_successive_ticks() {
		let mut supervisor = BusSupervisor::new("vcan-test-sup", 0x10, minimal_eds(), false);
		supervisor.set_probe(Box::new(ScriptedProbe(VecDeque::from([
			LinkState::Missing,
			LinkState::Down,
		]))));

		supervisor.tick().await;
		assert_eq!(supervisor.state(), BusState::NotFound);
		assert!(supervisor.down_logged);

		supervisor.tick().await;
		assert_eq!(supervisor.state(), BusState::Down);
		assert!(supervisor.recovering_from_down);
	}

	#[tokio::test]
	async fn stop_carries_disposition_out_of_run() {
		let mut supervisor = BusSupervisor::new("vcan-test-sup2", 0x10, minimal_eds(), false);
		supervisor.set_probe(Box::new(ScriptedProbe(VecDeque::new())));
		let (stop_signal, reset) = supervisor.stop_handle();
		reset.store(NodeStop::FactoryReset as u8, Ordering::SeqCst);
		stop_signal.notify_waiters();

		let disposition = supervisor.run().await;
		assert_eq!(disposition, NodeStop::FactoryReset);
	}
}
