// Copyright (c) 2026 Driftmesh
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![forbid(unsafe_code)]

//! Sync server: the four RPCs plus `/metrics` and `/healthz` on one axum
//! router. All policy enforcement happens in the engine; handlers only
//! translate between wire types and engine calls.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use prometheus::{Encoder, TextEncoder};
use tracing::debug;

use crate::core::engine::{Engine, EngineError};
use crate::networking::messages::{
    BundleSummary, FetchRequest, FetchResponse, IndexRequest, IndexResponse, PullRequest,
    PullResponse, PushRequest, PushResponse, PushResult,
};

/// Build the sync router around an engine handle.
pub fn router(engine: Engine) -> Router {
    Router::new()
        .route("/sync/index", post(index))
        .route("/sync/request", post(request))
        .route("/sync/push", post(push))
        .route("/sync/pull", post(pull))
        .route("/metrics", get(metrics))
        .route("/healthz", get(healthz))
        .with_state(engine)
}

/// Serve until the listener closes or `shutdown` resolves.
pub async fn serve(
    engine: Engine,
    listener: tokio::net::TcpListener,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    axum::serve(listener, router(engine))
        .with_graceful_shutdown(shutdown)
        .await
}

fn internal(e: EngineError) -> Response {
    debug!(?e, "sync rpc failed");
    StatusCode::INTERNAL_SERVER_ERROR.into_response()
}

async fn index(
    State(engine): State<Engine>,
    Json(req): Json<IndexRequest>,
) -> Result<Json<IndexResponse>, Response> {
    let snapshot = engine
        .forwarding_snapshot(req.queues.as_deref(), req.limit)
        .map_err(internal)?;
    let entries = snapshot
        .iter()
        .map(|(_, bundle, size)| BundleSummary::of(bundle, *size))
        .collect();
    Ok(Json(IndexResponse { entries }))
}

async fn request(
    State(engine): State<Engine>,
    Json(req): Json<FetchRequest>,
) -> Result<Json<FetchResponse>, Response> {
    let bundles = engine
        .serve_request(&req.ids, &req.peer, Utc::now())
        .map_err(internal)?;
    Ok(Json(FetchResponse { bundles }))
}

async fn push(
    State(engine): State<Engine>,
    Json(req): Json<PushRequest>,
) -> Result<Json<PushResponse>, Response> {
    let mut results = Vec::with_capacity(req.bundles.len());
    for bundle in req.bundles {
        let bundle_id = bundle.bundle_id;
        let disposition = engine.receive(bundle).map_err(internal)?;
        results.push(PushResult {
            bundle_id,
            accepted: disposition.accepted(),
            reason: disposition.reason_code().map(str::to_string),
        });
    }
    Ok(Json(PushResponse { results }))
}

async fn pull(
    State(engine): State<Engine>,
    Json(req): Json<PullRequest>,
) -> Result<Json<PullResponse>, Response> {
    let bundles = engine
        .serve_pull(req.max, &req.peer, Utc::now())
        .map_err(internal)?;
    Ok(Json(PullResponse { bundles }))
}

async fn metrics(State(engine): State<Engine>) -> Result<String, Response> {
    engine.refresh_cache_gauge();
    let families = engine.metrics().registry.gather();
    let mut buf = Vec::new();
    TextEncoder::new()
        .encode(&families, &mut buf)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())?;
    String::from_utf8(buf).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

async fn healthz() -> &'static str {
    "ok"
}
