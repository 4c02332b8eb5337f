//! Filesystem layout (spec section 6): a work directory and a cache
//! directory, each holding `fread/`/`fwrite/` subdirectories for the file
//! caches `ResourceHost` hands to resources. Grounded in the identical
//! `geteuid() == 0` branch the original node core and app module both use.

use std::path::PathBuf;

/// Whether the current process is running as root.
pub fn is_privileged() -> bool {
	// SAFETY: geteuid takes no arguments and cannot fail.
	unsafe { libc::geteuid() == 0 }
}

/// The node's persistent work directory.
pub fn work_dir() -> PathBuf {
	if is_privileged() {
		PathBuf::from("/var/lib/oresat")
	} else {
		home_dir().join(".oresat")
	}
}

/// The node's cache directory, holding the file-transfer caches.
pub fn cache_dir() -> PathBuf {
	if is_privileged() {
		PathBuf::from("/var/cache/oresat")
	} else {
		home_dir().join(".cache/oresat")
	}
}

/// The cache directory for files read from the node by a remote client.
pub fn fread_dir() -> PathBuf {
	cache_dir().join("fread")
}

/// The cache directory for files written to the node by a remote client.
pub fn fwrite_dir() -> PathBuf {
	cache_dir().join("fwrite")
}

/// Create `work_dir()`, `cache_dir()`, `fread_dir()`, and `fwrite_dir()` if
/// they don't already exist.
pub async fn ensure_layout() -> std::io::Result<()> {
	tokio::fs::create_dir_all(work_dir()).await?;
	tokio::fs::create_dir_all(fread_dir()).await?;
	tokio::fs::create_dir_all(fwrite_dir()).await?;
	Ok(())
}

fn home_dir() -> PathBuf {
	std::env::var_os("HOME").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn unprivileged_layout_is_under_home() {
		if is_privileged() {
			return;
		}
		assert!(work_dir().ends_with(".oresat"));
		assert!(cache_dir().ends_with(".cache/oresat"));
		assert!(fread_dir().ends_with("cache/oresat/fread"));
		assert!(fwrite_dir().ends_with("cache/oresat/fwrite"));
	}
}
