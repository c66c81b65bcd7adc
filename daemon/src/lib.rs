//! Client side of the storage daemon's HTTP RPC interface.
//!
//! Every outbound call is individually time-boxed and every failure is mapped
//! onto one [`FailureKind`]. Callers match on the kind rather than on message
//! text, so this crate is the only place that knows what an expired grant
//! looks like.

mod client;
mod error;
mod types;

use async_trait::async_trait;

pub use client::{CallTimeouts, DaemonClient, DEFAULT_DAEMON_URL};
pub use error::{classify_failure, DaemonError, FailureKind, AUTH_FAILURE_MARKERS};
pub use types::{fs_name, Capacity, DirEntry, VersionInfo};

/// The RPC surface the controller relies on.
#[async_trait]
pub trait Daemon: Send + Sync {
    /// Names of all configured remotes, without the trailing colon.
    async fn list_remotes(&self) -> Result<Vec<String>, DaemonError>;

    async fn about(&self, remote: &str) -> Result<Capacity, DaemonError>;

    /// Asks the daemon to refresh the remote's credentials.
    async fn reconnect(&self, remote: &str) -> Result<(), DaemonError>;

    /// Readiness probe.
    async fn version(&self) -> Result<VersionInfo, DaemonError>;

    async fn list_entries(&self, remote: &str, path: &str) -> Result<Vec<DirEntry>, DaemonError>;
}
