//! Resource lifecycle hosting (spec section 4.7): `Resource` is the
//! extension point application code implements to publish telemetry and
//! accept commands. `ResourceHost` starts resources in registration order
//! and stops them in reverse, and tracks OS daemons by name.
//!
//! Styled after the teacher's pluggable trait-based extension point (a
//! trait with lifecycle methods, implementors holding a handle back into
//! the node) generalized from a single device profile into an open set of
//! application resources.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::process::Stdio;
use std::sync::Arc;

use tokio::process::Command;

/// A closure bound to a particular node, used by resources to trigger a
/// TPDO send without holding a handle to the whole node.
pub type SendTpdo = Arc<dyn Fn(u8) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// What a resource is given at `start()`: the file-transfer cache
/// directories and a bound `send_tpdo` closure (spec section 4.7).
#[derive(Clone)]
pub struct ResourceContext {
	pub fread_dir: PathBuf,
	pub fwrite_dir: PathBuf,
	pub send_tpdo: SendTpdo,
}

/// Failure starting a resource. Logged and skipped; does not abort the
/// rest of the host's start sequence.
#[derive(Debug, thiserror::Error)]
pub enum ResourceError {
	#[error("{0}")]
	Other(String),
}

/// A unit of application logic hosted by the node runtime.
pub trait Resource: Send {
	/// A short name used only for log messages.
	fn name(&self) -> &str;

	/// Called once, in registration order, when the node comes up.
	fn start(&mut self, ctx: &ResourceContext) -> Result<(), ResourceError>;

	/// Called once, in reverse registration order, when the node goes down.
	fn end(&mut self) {}
}

/// Orchestrates resource start/stop order and external daemon status.
pub struct ResourceHost {
	resources: Vec<Box<dyn Resource>>,
	daemons: Vec<Daemon>,
}

impl std::fmt::Debug for ResourceHost {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ResourceHost")
			.field("resources", &self.resources.iter().map(|r| r.name()).collect::<Vec<_>>())
			.field("daemons", &self.daemons.iter().map(|d| d.name()).collect::<Vec<_>>())
			.finish()
	}
}

impl ResourceHost {
	pub fn new() -> Self {
		Self { resources: Vec::new(), daemons: Vec::new() }
	}

	/// Register a resource. Start order follows registration order.
	pub fn add_resource(&mut self, resource: Box<dyn Resource>) {
		self.resources.push(resource);
	}

	/// Register an external daemon this host should track by name.
	pub fn add_daemon(&mut self, name: impl Into<String>) {
		self.daemons.push(Daemon::new(name));
	}

	pub fn daemon(&self, name: &str) -> Option<&Daemon> {
		self.daemons.iter().find(|d| d.name() == name)
	}

	/// Start every registered resource in registration order. A resource
	/// that fails to start is logged and skipped; the rest still start.
	pub fn start_all(&mut self, ctx: &ResourceContext) {
		for resource in &mut self.resources {
			if let Err(e) = resource.start(ctx) {
				log::warn!("resource {:?} failed to start: {e}", resource.name());
			}
		}
	}

	/// Stop every registered resource in reverse registration order.
	pub fn stop_all(&mut self) {
		for resource in self.resources.iter_mut().rev() {
			resource.end();
		}
	}
}

impl Default for ResourceHost {
	fn default() -> Self {
		Self::new()
	}
}

/// The state a [`Daemon`]'s service manager reports it in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonStatus {
	Active,
	Inactive,
	Failed,
	Unknown,
}

/// Failure managing an external daemon through the service manager.
#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
	#[error("failed to run systemctl: {0}")]
	Spawn(#[from] std::io::Error),
}

/// An external OS daemon tracked by name, mapped onto `systemctl`.
#[derive(Debug, Clone)]
pub struct Daemon {
	name: String,
}

impl Daemon {
	pub fn new(name: impl Into<String>) -> Self {
		Self { name: name.into() }
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub async fn status(&self) -> Result<DaemonStatus, DaemonError> {
		let output = Command::new("systemctl")
			.args(["is-active", &self.name])
			.stdout(Stdio::piped())
			.stderr(Stdio::null())
			.output()
			.await?;
		let stdout = String::from_utf8_lossy(&output.stdout);
		Ok(match stdout.trim() {
			"active" => DaemonStatus::Active,
			"inactive" => DaemonStatus::Inactive,
			"failed" => DaemonStatus::Failed,
			_ => DaemonStatus::Unknown,
		})
	}

	pub async fn start(&self) -> Result<(), DaemonError> {
		self.run("start").await
	}

	pub async fn stop(&self) -> Result<(), DaemonError> {
		self.run("stop").await
	}

	pub async fn restart(&self) -> Result<(), DaemonError> {
		self.run("restart").await
	}

	async fn run(&self, action: &str) -> Result<(), DaemonError> {
		let status = Command::new("systemctl").args([action, &self.name]).status().await?;
		if !status.success() {
			log::warn!("systemctl {action} {} exited with {status}", self.name);
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::atomic::{AtomicU32, Ordering};

	struct Recorder {
		name: &'static str,
		log: Arc<std::sync::Mutex<Vec<&'static str>>>,
	}

	impl Resource for Recorder {
		fn name(&self) -> &str {
			self.name
		}

		fn start(&mut self, _ctx: &ResourceContext) -> Result<(), ResourceError> {
			self.log.lock().unwrap().push(self.name);
			Ok(())
		}

		fn end(&mut self) {
			self.log.lock().unwrap().push(self.name);
		}
	}

	fn test_context() -> ResourceContext {
		ResourceContext {
			fread_dir: PathBuf::from("/tmp/fread"),
			fwrite_dir: PathBuf::from("/tmp/fwrite"),
			send_tpdo: Arc::new(|_n| Box::pin(async {})),
		}
	}

	#[test]
	fn start_order_follows_registration_stop_order_is_reversed() {
		let log = Arc::new(std::sync::Mutex::new(Vec::new()));
		let mut host = ResourceHost::new();
		host.add_resource(Box::new(Recorder { name: "a", log: log.clone() }));
		host.add_resource(Box::new(Recorder { name: "b", log: log.clone() }));
		host.add_resource(Box::new(Recorder { name: "c", log: log.clone() }));

		host.start_all(&test_context());
		assert_eq!(*log.lock().unwrap(), vec!["a", "b", "c"]);

		log.lock().unwrap().clear();
		host.stop_all();
		assert_eq!(*log.lock().unwrap(), vec!["c", "b", "a"]);
	}

	#[test]
	fn failing_resource_does_not_block_the_rest() {
		struct Failing;
		impl Resource for Failing {
			fn name(&self) -> &str {
				"failing"
			}
			fn start(&mut self, _ctx: &ResourceContext) -> Result<(), ResourceError> {
				Err(ResourceError::Other("boom".into()))
			}
		}

		let count = Arc::new(AtomicU32::new(0));
		struct Counter(Arc<AtomicU32>);
		impl Resource for Counter {
			fn name(&self) -> &str {
				"counter"
			}
			fn start(&mut self, _ctx: &ResourceContext) -> Result<(), ResourceError> {
				self.0.fetch_add(1, Ordering::SeqCst);
				Ok(())
			}
		}

		let mut host = ResourceHost::new();
		host.add_resource(Box::new(Failing));
		host.add_resource(Box::new(Counter(count.clone())));
		host.start_all(&test_context());
		assert_eq!(count.load(Ordering::SeqCst), 1);
	}
}
