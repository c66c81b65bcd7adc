//! In-memory daemon used by the unit tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use skyshelf_daemon::{Capacity, Daemon, DaemonError, DirEntry, FailureKind, VersionInfo};
use std::{
    collections::HashMap,
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};

pub fn capacity(total: u64, used: u64) -> Capacity {
    Capacity {
        total: Some(total),
        used: Some(used),
        free: Some(total - used),
    }
}

fn error_for(call: &'static str, kind: FailureKind, message: &str) -> DaemonError {
    let message = message.to_string();
    match kind {
        FailureKind::AuthExpired => DaemonError::AuthExpired { call, message },
        FailureKind::UpstreamError => DaemonError::Upstream {
            call,
            status: 500,
            message,
        },
        FailureKind::Unreachable => DaemonError::Unreachable { call, message },
    }
}

#[derive(Default)]
pub struct FakeDaemon {
    remotes: Mutex<Option<Vec<String>>>,
    capacities: Mutex<HashMap<String, Capacity>>,
    failures: Mutex<HashMap<String, (FailureKind, String)>>,
    reconnect_failure: Mutex<Option<(FailureKind, String)>>,
    reconnected: Mutex<Vec<String>>,
    probe_delay: Mutex<Duration>,
    list_delay: Mutex<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    list_calls: AtomicUsize,
    about_calls: AtomicUsize,
    version_calls: AtomicUsize,
}

impl FakeDaemon {
    /// Every remote starts healthy at 1000 bytes total, 100 used.
    pub fn with_remotes(names: &[&str]) -> Self {
        let fake = FakeDaemon::default();
        *fake.remotes.lock() = Some(names.iter().map(|n| n.to_string()).collect());
        for name in names {
            fake.set_capacity(name, capacity(1000, 100));
        }
        fake
    }

    pub fn set_capacity(&self, remote: &str, cap: Capacity) {
        self.capacities.lock().insert(remote.to_string(), cap);
    }

    pub fn fail(&self, remote: &str, kind: FailureKind, message: &str) {
        self.failures
            .lock()
            .insert(remote.to_string(), (kind, message.to_string()));
    }

    pub fn recover(&self, remote: &str) {
        self.failures.lock().remove(remote);
    }

    pub fn fail_listing(&self) {
        *self.remotes.lock() = None;
    }

    pub fn fail_reconnect(&self, kind: FailureKind, message: &str) {
        *self.reconnect_failure.lock() = Some((kind, message.to_string()));
    }

    pub fn set_probe_delay(&self, delay: Duration) {
        *self.probe_delay.lock() = delay;
    }

    pub fn set_list_delay(&self, delay: Duration) {
        *self.list_delay.lock() = delay;
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn about_calls(&self) -> usize {
        self.about_calls.load(Ordering::SeqCst)
    }

    pub fn version_calls(&self) -> usize {
        self.version_calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn reconnected(&self) -> Vec<String> {
        self.reconnected.lock().clone()
    }
}

#[async_trait]
impl Daemon for FakeDaemon {
    async fn list_remotes(&self) -> Result<Vec<String>, DaemonError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.list_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let remotes = self.remotes.lock().clone();
        remotes.ok_or_else(|| {
            error_for("config/listremotes", FailureKind::Unreachable, "connection refused")
        })
    }

    async fn about(&self, remote: &str) -> Result<Capacity, DaemonError> {
        self.about_calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = *self.probe_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if let Some((kind, message)) = self.failures.lock().get(remote).cloned() {
            return Err(error_for("operations/about", kind, &message));
        }
        self.capacities
            .lock()
            .get(remote)
            .copied()
            .ok_or_else(|| {
                error_for(
                    "operations/about",
                    FailureKind::UpstreamError,
                    "didn't find section in config file",
                )
            })
    }

    async fn reconnect(&self, remote: &str) -> Result<(), DaemonError> {
        if let Some((kind, message)) = self.reconnect_failure.lock().clone() {
            return Err(error_for("config/reconnect", kind, &message));
        }
        self.reconnected.lock().push(remote.to_string());
        Ok(())
    }

    async fn version(&self) -> Result<VersionInfo, DaemonError> {
        self.version_calls.fetch_add(1, Ordering::SeqCst);
        Ok(VersionInfo {
            version: "v1.66.0".into(),
            go_version: None,
            os: Some("linux".into()),
            arch: None,
        })
    }

    async fn list_entries(&self, remote: &str, path: &str) -> Result<Vec<DirEntry>, DaemonError> {
        if let Some((kind, message)) = self.failures.lock().get(remote).cloned() {
            return Err(error_for("operations/list", kind, &message));
        }
        let dir = path.trim_matches('/');
        Ok(vec![DirEntry {
            path: format!("{}/report.pdf", dir),
            name: "report.pdf".into(),
            size: 2048,
            mime_type: Some("application/pdf".into()),
            mod_time: None,
            is_dir: false,
        }])
    }
}

// -----------------------------------------------------------------------------
// Router fixtures
// -----------------------------------------------------------------------------

pub const TOKEN: &str = "secret-token";

pub fn state_with(fake: std::sync::Arc<FakeDaemon>) -> crate::SharedState {
    let tokens = HashMap::from([(TOKEN.to_string(), "alice".to_string())]);
    std::sync::Arc::new(crate::ControllerState::new(
        fake,
        crate::scheduler::SchedulerSettings::default(),
        Duration::from_secs(30),
        tokens,
    ))
}

pub fn router(state: crate::SharedState) -> axum::Router {
    crate::build_router(state, None)
}

pub fn request(method: &str, uri: &str, authed: bool) -> axum::http::Request<axum::body::Body> {
    let mut builder = axum::http::Request::builder().method(method).uri(uri);
    if authed {
        builder = builder.header("authorization", format!("Bearer {}", TOKEN));
    }
    builder
        .body(axum::body::Body::empty())
        .expect("request builds")
}

pub async fn json_body(resp: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("body reads");
    serde_json::from_slice(&bytes).expect("body is json")
}

/// Yields until the scheduler has run `cycles` cycles and is idle again.
pub async fn settle(state: &crate::SharedState, fake: &FakeDaemon, cycles: usize) {
    while fake.list_calls() < cycles || state.scheduler.is_running() {
        tokio::task::yield_now().await;
    }
}
