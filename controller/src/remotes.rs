use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use skyshelf_daemon::{Capacity, Daemon, DirEntry, FailureKind};
use tracing::{info, warn};

use crate::{auth::AuthenticatedUser, error::ApiError, SharedState};

// -----------------------------------------------------------------------------
// Health
// -----------------------------------------------------------------------------

#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    TokenExpired,
    Error,
}

impl From<FailureKind> for HealthStatus {
    fn from(kind: FailureKind) -> Self {
        match kind {
            FailureKind::AuthExpired => HealthStatus::TokenExpired,
            FailureKind::UpstreamError | FailureKind::Unreachable => HealthStatus::Error,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub remote: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Capacity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Probes `remote` once. The cache is not touched.
pub async fn check_health(daemon: &dyn Daemon, remote: &str) -> HealthReport {
    match daemon.about(remote).await {
        Ok(capacity) => HealthReport {
            status: HealthStatus::Healthy,
            remote: remote.to_string(),
            data: Some(capacity),
            message: None,
        },
        Err(err) => HealthReport {
            status: err.kind().into(),
            remote: remote.to_string(),
            data: None,
            message: Some(err.message().to_string()),
        },
    }
}

/// GET /api/remotes/:remote/health
pub async fn health(
    State(state): State<SharedState>,
    _user: AuthenticatedUser,
    Path(remote): Path<String>,
) -> Json<HealthReport> {
    let report = check_health(state.daemon.as_ref(), &remote).await;
    if report.status != HealthStatus::Healthy {
        warn!("health check for {}: {:?}", remote, report.status);
    }
    Json(report)
}

// -----------------------------------------------------------------------------
// Reconnect
// -----------------------------------------------------------------------------

#[derive(Debug, Deserialize, Default)]
pub struct ReconnectQuery {
    /// Also submit a refresh cycle once the daemon has reconnected.
    #[serde(default)]
    pub refresh: bool,
}

#[derive(Debug, Serialize)]
pub struct ReconnectResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// POST /api/remotes/:remote/reconnect
/// Asks the daemon to refresh the remote's credentials. Cached data is left
/// as is until the next cycle, or the one requested with `?refresh=true`.
pub async fn reconnect(
    State(state): State<SharedState>,
    user: AuthenticatedUser,
    Path(remote): Path<String>,
    Query(query): Query<ReconnectQuery>,
) -> Json<ReconnectResponse> {
    info!("{} requested reconnect of {}", user.name, remote);

    match state.daemon.reconnect(&remote).await {
        Ok(()) => {
            if query.refresh {
                drop(state.scheduler.trigger_now());
            }
            Json(ReconnectResponse {
                success: true,
                message: Some(format!("Reconnected {}", remote)),
                details: None,
            })
        }
        Err(err) => {
            warn!("reconnect of {} failed ({:?}): {}", remote, err.kind(), err.message());
            Json(ReconnectResponse {
                success: false,
                message: None,
                details: Some(err.message().to_string()),
            })
        }
    }
}

// -----------------------------------------------------------------------------
// Directory listing
// -----------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct EntriesQuery {
    #[serde(default)]
    pub path: String,
}

#[derive(Debug, Serialize)]
pub struct EntriesResponse {
    pub success: bool,
    pub remote: String,
    pub path: String,
    pub entries: Vec<DirEntry>,
}

/// GET /api/remotes/:remote/entries?path=
pub async fn entries(
    State(state): State<SharedState>,
    _user: AuthenticatedUser,
    Path(remote): Path<String>,
    Query(query): Query<EntriesQuery>,
) -> Result<Json<EntriesResponse>, ApiError> {
    let entries = state.daemon.list_entries(&remote, &query.path).await?;

    Ok(Json(EntriesResponse {
        success: true,
        remote,
        path: query.path,
        entries,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{json_body, request, router, settle, state_with, FakeDaemon};
    use axum::http::StatusCode;
    use std::sync::Arc;
    use tower::ServiceExt;

    #[tokio::test]
    async fn healthy_remote_reports_capacity() {
        let fake = FakeDaemon::with_remotes(&["gdrive"]);
        let report = check_health(&fake, "gdrive").await;
        assert_eq!(report.status, HealthStatus::Healthy);
        assert_eq!(report.data.unwrap().total, Some(1000));
    }

    #[tokio::test]
    async fn expired_grant_reports_token_expired() {
        let fake = Arc::new(FakeDaemon::with_remotes(&["x"]));
        fake.fail("x", FailureKind::AuthExpired, "oauth2: \"invalid_grant\"");
        let state = state_with(fake.clone());

        // the scheduled probe records the failure...
        state.scheduler.clone().run_cycle().await;
        let record = state.cache.get("x").unwrap();
        assert_eq!(record.error_kind(), Some(FailureKind::AuthExpired));

        // ...and the health check agrees
        let resp = router(state)
            .oneshot(request("GET", "/api/remotes/x/health", true))
            .await
            .unwrap();
        let body = json_body(resp).await;
        assert_eq!(body["status"], "token_expired");
        assert_eq!(body["remote"], "x");
        assert!(body.get("data").is_none());
    }

    #[tokio::test]
    async fn other_failures_report_error() {
        let fake = FakeDaemon::with_remotes(&["s3"]);
        fake.fail("s3", FailureKind::Unreachable, "timeout");
        assert_eq!(check_health(&fake, "s3").await.status, HealthStatus::Error);
    }

    #[tokio::test]
    async fn reconnect_leaves_the_cache_alone() {
        let fake = Arc::new(FakeDaemon::with_remotes(&["x"]));
        fake.fail("x", FailureKind::AuthExpired, "invalid_grant");
        let state = state_with(fake.clone());
        state.scheduler.clone().run_cycle().await;
        fake.recover("x");

        let resp = router(state.clone())
            .oneshot(request("POST", "/api/remotes/x/reconnect", true))
            .await
            .unwrap();
        let body = json_body(resp).await;
        assert_eq!(body["success"], true);
        assert!(body["message"].is_string());
        assert_eq!(fake.reconnected(), vec!["x".to_string()]);

        tokio::task::yield_now().await;
        assert!(state.cache.get("x").unwrap().is_failed());
        assert_eq!(fake.list_calls(), 1);
    }

    #[tokio::test]
    async fn reconnect_with_refresh_repopulates_the_cache() {
        let fake = Arc::new(FakeDaemon::with_remotes(&["x"]));
        fake.fail("x", FailureKind::AuthExpired, "invalid_grant");
        let state = state_with(fake.clone());
        state.scheduler.clone().run_cycle().await;
        fake.recover("x");

        let resp = router(state.clone())
            .oneshot(request("POST", "/api/remotes/x/reconnect?refresh=true", true))
            .await
            .unwrap();
        assert_eq!(json_body(resp).await["success"], true);

        settle(&state, &fake, 2).await;
        let record = state.cache.get("x").unwrap();
        assert!(!record.is_failed());
        assert_eq!(record.total(), Some(1000));
    }

    #[tokio::test]
    async fn failed_reconnect_returns_details() {
        let fake = Arc::new(FakeDaemon::with_remotes(&["x"]));
        fake.fail_reconnect(FailureKind::UpstreamError, "reconnect not supported");
        let state = state_with(fake);

        let resp = router(state)
            .oneshot(request("POST", "/api/remotes/x/reconnect", true))
            .await
            .unwrap();
        let body = json_body(resp).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["details"], "reconnect not supported");
    }

    #[tokio::test]
    async fn entries_pass_through() {
        let state = state_with(Arc::new(FakeDaemon::with_remotes(&["gdrive"])));
        let resp = router(state)
            .oneshot(request("GET", "/api/remotes/gdrive/entries?path=docs", true))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = json_body(resp).await;
        assert_eq!(body["path"], "docs");
        assert_eq!(body["entries"][0]["Name"], "report.pdf");
    }

    #[tokio::test]
    async fn entries_map_expired_grants_to_unauthorized() {
        let fake = Arc::new(FakeDaemon::with_remotes(&["x"]));
        fake.fail("x", FailureKind::AuthExpired, "invalid_grant");
        let resp = router(state_with(fake))
            .oneshot(request("GET", "/api/remotes/x/entries", true))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(resp).await["code"], "token_expired");
    }

    #[tokio::test]
    async fn entries_map_unreachable_daemon_to_503() {
        let fake = Arc::new(FakeDaemon::with_remotes(&["x"]));
        fake.fail("x", FailureKind::Unreachable, "connection refused");
        let resp = router(state_with(fake))
            .oneshot(request("GET", "/api/remotes/x/entries", true))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
