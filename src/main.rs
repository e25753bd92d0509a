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
#![warn(missing_docs)]

//! Driftmesh node entrypoint (systemd-friendly).
//! Opens the engine, spawns the TTL reaper, serves the sync listener.

use anyhow::{Context, Result};
use tracing::info;

use driftmesh::core::engine::Engine;
use driftmesh::core::reaper;
use driftmesh::core::types::NodeConfig;
use driftmesh::networking::server;

fn load_config() -> Result<NodeConfig> {
    let path = std::env::var("DRIFTMESH_CONFIG").unwrap_or_else(|_| "driftmesh.toml".to_string());
    match std::fs::read_to_string(&path) {
        Ok(raw) => toml::from_str(&raw).with_context(|| format!("parse {path}")),
        // No file: run on defaults (a valid single-node configuration).
        Err(_) => Ok(NodeConfig::default()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .compact()
        .try_init();

    let cfg = load_config()?;
    let engine = Engine::open(&cfg).context("engine open failed")?;
    let info = engine.node_info();
    info!(
        name = %cfg.node.name,
        fingerprint = %info.fingerprint,
        "driftmesh node starting"
    );

    let reaper_task = reaper::spawn(engine.clone());

    let listener = tokio::net::TcpListener::bind(&cfg.http.listen_addr)
        .await
        .with_context(|| format!("bind {}", cfg.http.listen_addr))?;
    info!(addr = %cfg.http.listen_addr, "sync listener up");

    let shutdown_engine = engine.clone();
    server::serve(engine, listener, async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("shutdown signal received");
        shutdown_engine.shutdown();
    })
    .await
    .context("sync listener failed")?;

    reaper_task.abort();
    Ok(())
}
