// Control surface HTTP routes
//
// Decision: Plain-text bodies, matching what an operator types into a browser bar
// Decision: Request errors become HTTP error responses; they never stop the process

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Query, State},
    http::{StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use serde::Deserialize;
use swapdb_harness::{with_timeout, KvStore, StoreError, VerificationFlag};

/// App state for control routes
#[derive(Clone)]
pub struct AppState {
    /// Handle swaps and single-key reads go through
    pub store: Arc<dyn KvStore>,
    /// The only place the verification flag is flipped from
    pub verification: Arc<VerificationFlag>,
    /// Deadline for each store call made on behalf of a request
    pub op_timeout: Duration,
}

/// Control request errors
#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    /// Missing or malformed query parameter
    #[error("invalid {param}: {reason}")]
    InvalidParam { param: &'static str, reason: String },

    /// Requested key does not exist
    #[error("key not found: {0}")]
    NotFound(String),

    /// Store call failed
    #[error("store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for ControlError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

impl ControlError {
    fn status(&self) -> StatusCode {
        match self {
            Self::InvalidParam { .. } => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Store(StoreError::Timeout { .. }) => StatusCode::GATEWAY_TIMEOUT,
            Self::Store(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ControlError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Control request failed: {}", self);
        } else {
            tracing::warn!("Control request rejected: {}", self);
        }
        (status, self.to_string()).into_response()
    }
}

/// Create control routes
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/swap", get(swap))
        .route("/log", get(toggle_log))
        .route("/get", get(get_key))
        .fallback(fallback)
        .with_state(state)
}

/// GET / - Liveness
async fn index() -> &'static str {
    "ok"
}

#[derive(Debug, Deserialize)]
pub struct SwapParams {
    db1: Option<String>,
    db2: Option<String>,
}

fn parse_db(param: &'static str, raw: Option<&str>) -> Result<u32, ControlError> {
    let raw = raw.ok_or(ControlError::InvalidParam {
        param,
        reason: "missing".to_string(),
    })?;
    raw.trim()
        .parse()
        .map_err(|e: std::num::ParseIntError| ControlError::InvalidParam {
            param,
            reason: format!("'{}': {}", raw, e),
        })
}

/// GET /swap?db1=&db2= - Swap two logical databases
async fn swap(
    State(state): State<AppState>,
    Query(params): Query<SwapParams>,
) -> Result<&'static str, ControlError> {
    let db1 = parse_db("db1", params.db1.as_deref())?;
    let db2 = parse_db("db2", params.db2.as_deref())?;

    with_timeout(
        "swapdb",
        state.op_timeout,
        state.store.swap_databases(db1, db2),
    )
    .await?;

    tracing::info!(db1, db2, "SWAP!");
    Ok("swap ok")
}

/// GET /log - Toggle mismatch logging
async fn toggle_log(State(state): State<AppState>) -> String {
    let enabled = state.verification.toggle();
    tracing::info!(enabled, "Verification logging toggled");
    format!("log change ok. {}", enabled)
}

#[derive(Debug, Deserialize)]
pub struct GetParams {
    key: Option<String>,
}

/// GET /get?key= - Read one key directly
async fn get_key(
    State(state): State<AppState>,
    Query(params): Query<GetParams>,
) -> Result<String, ControlError> {
    let key = params.key.ok_or(ControlError::InvalidParam {
        param: "key",
        reason: "missing".to_string(),
    })?;

    let value = with_timeout("get", state.op_timeout, state.store.get(&key))
        .await?
        .ok_or_else(|| ControlError::NotFound(key.clone()))?;

    Ok(format!("get ok. {}", value))
}

/// Everything else: favicon requests get a fixed answer, other paths an empty 200
async fn fallback(uri: Uri) -> &'static str {
    if uri.path().contains("favicon") {
        "favicon NG"
    } else {
        ""
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::{body::Body, http::Request};
    use http_body_util::BodyExt;
    use swapdb_harness::{InMemoryKeyspace, InMemoryStore};
    use tower::ServiceExt;

    fn test_app(keyspace: &Arc<InMemoryKeyspace>) -> (Router, Arc<VerificationFlag>) {
        let verification = Arc::new(VerificationFlag::new());
        let state = AppState {
            store: Arc::new(keyspace.store(0)),
            verification: Arc::clone(&verification),
            op_timeout: Duration::from_secs(1),
        };
        (routes(state), verification)
    }

    async fn call(app: &Router, uri: &str) -> (StatusCode, String) {
        let response = app
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();

        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    /// Store whose calls never finish
    struct StuckStore;

    #[async_trait]
    impl KvStore for StuckStore {
        fn db(&self) -> u32 {
            0
        }

        async fn get(&self, _: &str) -> Result<Option<String>, StoreError> {
            std::future::pending().await
        }

        async fn set(&self, _: &str, _: &str, _: Option<Duration>) -> Result<(), StoreError> {
            std::future::pending().await
        }

        async fn swap_databases(&self, _: u32, _: u32) -> Result<(), StoreError> {
            Err(StoreError::Backend("ERR DB index is out of range".to_string()))
        }
    }

    fn stuck_app() -> Router {
        routes(AppState {
            store: Arc::new(StuckStore),
            verification: Arc::new(VerificationFlag::new()),
            op_timeout: Duration::from_millis(20),
        })
    }

    async fn seed(store: &InMemoryStore, key: &str, value: &str) {
        store.set(key, value, None).await.unwrap();
    }

    #[tokio::test]
    async fn test_index() {
        let (app, _) = test_app(&InMemoryKeyspace::new());

        assert_eq!(call(&app, "/").await, (StatusCode::OK, "ok".to_string()));
    }

    #[tokio::test]
    async fn test_favicon_and_unknown_paths() {
        let (app, _) = test_app(&InMemoryKeyspace::new());

        assert_eq!(
            call(&app, "/favicon.ico").await,
            (StatusCode::OK, "favicon NG".to_string())
        );
        assert_eq!(
            call(&app, "/static/favicon-32.png").await,
            (StatusCode::OK, "favicon NG".to_string())
        );
        assert_eq!(call(&app, "/nothing").await, (StatusCode::OK, String::new()));
    }

    #[tokio::test]
    async fn test_log_toggles_flag() {
        let (app, flag) = test_app(&InMemoryKeyspace::new());

        assert_eq!(call(&app, "/log").await.1, "log change ok. true");
        assert!(flag.is_enabled());
        assert_eq!(call(&app, "/log").await.1, "log change ok. false");
        assert!(!flag.is_enabled());
    }

    #[tokio::test]
    async fn test_get_key() {
        let keyspace = InMemoryKeyspace::new();
        seed(&keyspace.store(0), "key:10", "value-0:10").await;
        let (app, _) = test_app(&keyspace);

        assert_eq!(
            call(&app, "/get?key=key:10").await,
            (StatusCode::OK, "get ok. value-0:10".to_string())
        );
        assert_eq!(call(&app, "/get?key=key:11").await.0, StatusCode::NOT_FOUND);
        assert_eq!(call(&app, "/get").await.0, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_swap_then_get() {
        let keyspace = InMemoryKeyspace::new();
        seed(&keyspace.store(0), "key:10", "value-0:10").await;
        seed(&keyspace.store(1), "key:10", "value-1:10").await;
        let (app, _) = test_app(&keyspace);

        assert_eq!(
            call(&app, "/swap?db1=0&db2=1").await,
            (StatusCode::OK, "swap ok".to_string())
        );
        assert_eq!(call(&app, "/get?key=key:10").await.1, "get ok. value-1:10");

        call(&app, "/swap?db1=1&db2=0").await;
        assert_eq!(call(&app, "/get?key=key:10").await.1, "get ok. value-0:10");
    }

    #[tokio::test]
    async fn test_swap_rejects_bad_params_and_keeps_serving() {
        let (app, _) = test_app(&InMemoryKeyspace::new());

        let (status, body) = call(&app, "/swap?db1=zero&db2=1").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.starts_with("invalid db1"));

        let (status, body) = call(&app, "/swap?db1=0").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, "invalid db2: missing");

        assert_eq!(call(&app, "/swap?db1=-1&db2=1").await.0, StatusCode::BAD_REQUEST);

        // Still alive
        assert_eq!(call(&app, "/").await.0, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_store_failures_map_to_gateway_errors() {
        let app = stuck_app();

        let (status, body) = call(&app, "/get?key=key:1").await;
        assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
        assert!(body.contains("timed out"));

        let (status, body) = call(&app, "/swap?db1=0&db2=99").await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(body.contains("out of range"));
    }
}
