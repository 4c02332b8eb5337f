//! `NodeRuntime` (spec section 2/4.7): composes the bus supervisor and the
//! resource host, brings resources up and down in step with the CANopen
//! network, and exposes the top-level `run()` entry point.

use std::sync::Arc;

use canopen_node::CanOpenNode;

use crate::paths;
use crate::resource::{ResourceContext, ResourceHost};
use crate::supervisor::{BusSupervisor, NodeStop};

/// Owns the supervisor and resource host for one node lifetime.
pub struct NodeRuntime {
	supervisor: BusSupervisor,
	resources: Arc<std::sync::Mutex<ResourceHost>>,
}

impl std::fmt::Debug for NodeRuntime {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("NodeRuntime").field("supervisor", &self.supervisor).finish()
	}
}

impl NodeRuntime {
	pub fn new(mut supervisor: BusSupervisor, resources: ResourceHost) -> Self {
		let resources = Arc::new(std::sync::Mutex::new(resources));

		let start_resources = resources.clone();
		supervisor.set_on_network_up(Box::new(move |node: Arc<CanOpenNode>| {
			let ctx = resource_context(&node);
			start_resources.lock().unwrap().start_all(&ctx);
		}));

		let stop_resources = resources.clone();
		supervisor.set_on_network_down(Box::new(move || {
			stop_resources.lock().unwrap().stop_all();
		}));

		Self { supervisor, resources }
	}

	/// Create the work/cache directories, then run the supervisor loop to
	/// completion, returning the disposition the caller should act on.
	pub async fn run(self) -> NodeStop {
		if let Err(e) = paths::ensure_layout().await {
			log::warn!("failed to create filesystem layout: {e}");
		}
		let disposition = self.supervisor.run().await;
		self.resources.lock().unwrap().stop_all();
		disposition
	}
}

fn resource_context(node: &Arc<CanOpenNode>) -> ResourceContext {
	let node = node.clone();
	ResourceContext {
		fread_dir: paths::fread_dir(),
		fwrite_dir: paths::fwrite_dir(),
		send_tpdo: Arc::new(move |n| {
			let node = node.clone();
			Box::pin(async move {
				if let Err(e) = node.send_tpdo(n, false).await {
					log::warn!("resource-triggered TPDO{n} failed: {e}");
				}
			})
		}),
	}
}
