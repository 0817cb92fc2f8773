use crate::constants::{INVALID_MESSAGE, MINED_MESSAGE, VALID_MESSAGE};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use ledger_core::{Block, CancelOnDrop, CancelToken, Ledger, LedgerError, SearchMode};
use serde::Serialize;
use std::{sync::Arc, time::Duration};
use thiserror::Error;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

#[derive(Clone)]
pub(crate) struct AppState {
    pub ledger: Arc<Ledger>,
    pub search: SearchMode,
    pub mine_timeout: Duration,
    /// Parent of every per-request mining token; cancelled on shutdown.
    pub shutdown: CancelToken,
}

#[derive(Serialize)]
struct Health {
    status: &'static str,
}

#[derive(Serialize)]
struct Mined {
    message: &'static str,
    #[serde(flatten)]
    block: Block,
}

#[derive(Serialize)]
struct ChainView {
    chain: Vec<Block>,
    length: u64,
}

#[derive(Serialize)]
struct Validity {
    message: &'static str,
    valid: bool,
}

#[derive(Debug, Error)]
pub(crate) enum ApiError {
    #[error("mining timed out after {0:?}")]
    MineTimeout(Duration),
    #[error("mining cancelled")]
    Cancelled,
    #[error("mining worker failed: {0}")]
    Worker(String),
    #[error(transparent)]
    Ledger(LedgerError),
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Cancelled => ApiError::Cancelled,
            other => ApiError::Ledger(other),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            ApiError::MineTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Worker(_) | ApiError::Ledger(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

pub(crate) fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { Json(Health { status: "ok" }) }))
        .route("/mine_block", get(mine_block))
        .route("/get_chain", get(get_chain))
        .route("/is_valid", get(is_valid))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn mine_block(State(state): State<AppState>) -> Result<Json<Mined>, ApiError> {
    // Dropping the guard (timeout, client gone, early return) stops the search.
    let guard = CancelOnDrop::new(state.shutdown.child());
    let token = guard.token().clone();
    let ledger = state.ledger.clone();
    let mode = state.search;

    let task = tokio::task::spawn_blocking(move || ledger.mine_with(mode, &token));
    let block = match tokio::time::timeout(state.mine_timeout, task).await {
        Ok(joined) => joined.map_err(|e| ApiError::Worker(e.to_string()))??,
        Err(_) => {
            warn!(timeout = ?state.mine_timeout, "mining timed out");
            return Err(ApiError::MineTimeout(state.mine_timeout));
        }
    };
    drop(guard);

    info!(index = block.index, proof = block.proof, "served mined block");
    Ok(Json(Mined {
        message: MINED_MESSAGE,
        block,
    }))
}

async fn get_chain(State(state): State<AppState>) -> Result<Json<ChainView>, ApiError> {
    let chain = state.ledger.chain()?;
    let length = chain.len() as u64;
    Ok(Json(ChainView { chain, length }))
}

async fn is_valid(State(state): State<AppState>) -> Result<Json<Validity>, ApiError> {
    let valid = state.ledger.is_valid()?;
    let message = if valid { VALID_MESSAGE } else { INVALID_MESSAGE };
    Ok(Json(Validity { message, valid }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use serde_json::Value;
    use tower::ServiceExt;

    fn test_state(ledger: Ledger) -> AppState {
        AppState {
            ledger: Arc::new(ledger),
            search: SearchMode::Sequential,
            mine_timeout: Duration::from_secs(30),
            shutdown: CancelToken::new(),
        }
    }

    async fn get(router: &Router, path: &str) -> (StatusCode, Value) {
        let req = Request::builder().uri(path).body(Body::empty()).unwrap();
        let resp = router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let router = router(test_state(Ledger::new()));
        let (status, json) = get(&router, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "ok");
    }

    #[tokio::test]
    async fn get_chain_reports_genesis() {
        let router = router(test_state(Ledger::new()));
        let (status, json) = get(&router, "/get_chain").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["length"], 1);
        let genesis = &json["chain"][0];
        assert_eq!(genesis["index"], 1);
        assert_eq!(genesis["proof"], 1);
        assert_eq!(genesis["previous_hash"], "0");
        assert_eq!(genesis.as_object().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn mine_block_reports_the_new_block() {
        let state = test_state(Ledger::new());
        let genesis_hash = state.ledger.tail_block().unwrap().hash();
        let router = router(state);

        let (status, json) = get(&router, "/mine_block").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["message"], "Congratulations you just mine a block!");
        assert_eq!(json["index"], 2);
        assert_eq!(json["proof"], 533);
        assert_eq!(json["previous_hash"], genesis_hash.as_str());
        assert!(json["timestamp"].is_string());
    }

    #[tokio::test]
    async fn mine_get_validate_scenario() {
        let state = test_state(Ledger::new());
        let router = router(state.clone());

        for expected in [2, 3] {
            let (status, json) = get(&router, "/mine_block").await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(json["index"], expected);
        }

        let (_, json) = get(&router, "/get_chain").await;
        assert_eq!(json["length"], 3);
        let indices: Vec<u64> = json["chain"]
            .as_array()
            .unwrap()
            .iter()
            .map(|b| b["index"].as_u64().unwrap())
            .collect();
        assert_eq!(indices, vec![1, 2, 3]);

        let (status, json) = get(&router, "/is_valid").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["message"], VALID_MESSAGE);
        assert_eq!(json["valid"], true);
    }

    #[tokio::test]
    async fn is_valid_flags_a_bad_proof() {
        let ledger = Ledger::new();
        let genesis = ledger.tail_block().unwrap();
        ledger.create_block(2, genesis.hash()).unwrap();
        let router = router(test_state(ledger));

        let (status, json) = get(&router, "/is_valid").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["message"], INVALID_MESSAGE);
        assert_eq!(json["valid"], false);
    }

    #[tokio::test]
    async fn mine_block_times_out_without_appending() {
        let ledger = Ledger::new();
        let genesis = ledger.tail_block().unwrap();
        // The first proof for seed 124 is 589976, far beyond the timeout.
        ledger.create_block(124, genesis.hash()).unwrap();
        let mut state = test_state(ledger);
        state.mine_timeout = Duration::from_millis(10);
        let router = router(state.clone());

        let (status, json) = get(&router, "/mine_block").await;
        assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
        assert!(json["error"].as_str().unwrap().contains("timed out"));
        assert_eq!(state.ledger.len().unwrap(), 2);
    }

    #[tokio::test]
    async fn mine_block_after_shutdown_is_unavailable() {
        let state = test_state(Ledger::new());
        state.shutdown.cancel();
        let router = router(state.clone());

        let (status, json) = get(&router, "/mine_block").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json["error"], "mining cancelled");
        assert_eq!(state.ledger.len().unwrap(), 1);
    }
}
