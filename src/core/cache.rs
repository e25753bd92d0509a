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

//! Cache budget manager: byte budget enforcement and the five-stage eviction
//! order. `outbox` and `delivered` are never touched.

use thiserror::Error;
use tracing::info;

use crate::core::store::{QueueStore, StoreError};
use crate::core::types::{Audience, Priority, PublicKey, Queue};

/// Budget errors.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("over budget")]
    OverBudget,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// What an eviction pass freed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EvictionReport {
    /// Bundles deleted.
    pub evicted: u64,
    /// Bytes returned to the budget.
    pub bytes_freed: u64,
}

impl EvictionReport {
    fn add(&mut self, bytes: u64) {
        self.evicted += 1;
        self.bytes_freed += bytes;
    }
}

/// Byte budget over the store.
#[derive(Clone, Copy, Debug)]
pub struct CacheBudget {
    budget_bytes: u64,
}

impl CacheBudget {
    /// New budget of `budget_bytes` total.
    pub fn new(budget_bytes: u64) -> Self {
        Self { budget_bytes }
    }

    /// Configured budget.
    pub fn budget_bytes(&self) -> u64 {
        self.budget_bytes
    }

    /// The 95% eviction watermark.
    pub fn watermark(&self) -> u64 {
        self.budget_bytes / 100 * 95
    }

    /// Admission check for an incoming record of `incoming` bytes.
    ///
    /// Runs eviction when the admission would push usage past the watermark;
    /// refuses with `OverBudget` when it would still push past 100%.
    pub fn admit(
        &self,
        store: &QueueStore,
        incoming: u64,
        node_key: &PublicKey,
    ) -> Result<EvictionReport, CacheError> {
        let mut report = EvictionReport::default();
        if store.total_bytes()?.saturating_add(incoming) > self.watermark() {
            let target = self.watermark().saturating_sub(incoming);
            report = self.evict_until(store, target, node_key)?;
        }
        if store.total_bytes()?.saturating_add(incoming) > self.budget_bytes {
            return Err(CacheError::OverBudget);
        }
        Ok(report)
    }

    /// Evict until usage drops to `target` bytes, in the fixed stage order:
    ///
    /// 1. `expired`, oldest expiry first
    /// 2. `quarantine`, oldest first
    /// 3. `low` priority in `inbox`/`pending`, oldest first
    /// 4. `normal` public/local in `inbox`/`pending`, oldest first
    /// 5. remaining non-authored bundles, oldest first
    pub fn evict_until(
        &self,
        store: &QueueStore,
        target: u64,
        node_key: &PublicKey,
    ) -> Result<EvictionReport, CacheError> {
        let report = self.run_stages(store, target, node_key)?;
        if report.evicted > 0 {
            info!(
                evicted = report.evicted,
                bytes = report.bytes_freed,
                "eviction pass"
            );
        }
        Ok(report)
    }

    fn run_stages(
        &self,
        store: &QueueStore,
        target: u64,
        node_key: &PublicKey,
    ) -> Result<EvictionReport, CacheError> {
        let mut report = EvictionReport::default();

        for (id, _) in store.expiry_scan(Queue::Expired)? {
            if store.total_bytes()? <= target {
                return Ok(report);
            }
            match store.delete_from(&id, Queue::Expired) {
                Ok(n) => report.add(n),
                Err(StoreError::NotFound) => {}
                Err(e) => return Err(e.into()),
            }
        }

        for (id, _) in store.age_scan(Queue::Quarantine)? {
            if store.total_bytes()? <= target {
                return Ok(report);
            }
            match store.delete_from(&id, Queue::Quarantine) {
                Ok(n) => report.add(n),
                Err(StoreError::NotFound) => {}
                Err(e) => return Err(e.into()),
            }
        }

        let mut merged: Vec<(Queue, crate::core::types::BundleId, u64)> = Vec::new();
        for queue in [Queue::Inbox, Queue::Pending] {
            for (id, created) in store.age_scan(queue)? {
                merged.push((queue, id, created));
            }
        }
        merged.sort_by_key(|(_, id, created)| (*created, *id));

        // Stage 3: low priority.
        for (queue, id, _) in &merged {
            if store.total_bytes()? <= target {
                return Ok(report);
            }
            let Some(b) = store.get_in(*queue, id)? else {
                continue;
            };
            if b.priority == Priority::Low {
                match store.delete_from(id, *queue) {
                    Ok(n) => report.add(n),
                    Err(StoreError::NotFound) => {}
                    Err(e) => return Err(e.into()),
                }
            }
        }

        // Stage 4: normal public/local.
        for (queue, id, _) in &merged {
            if store.total_bytes()? <= target {
                return Ok(report);
            }
            let Some(b) = store.get_in(*queue, id)? else {
                continue;
            };
            if b.priority == Priority::Normal
                && matches!(b.audience, Audience::Public | Audience::Local)
            {
                match store.delete_from(id, *queue) {
                    Ok(n) => report.add(n),
                    Err(StoreError::NotFound) => {}
                    Err(e) => return Err(e.into()),
                }
            }
        }

        // Stage 5: anything left that this node did not author.
        for (queue, id, _) in &merged {
            if store.total_bytes()? <= target {
                return Ok(report);
            }
            let Some(b) = store.get_in(*queue, id)? else {
                continue;
            };
            if b.author_public_key != *node_key {
                match store.delete_from(id, *queue) {
                    Ok(n) => report.add(n),
                    Err(StoreError::NotFound) => {}
                    Err(e) => return Err(e.into()),
                }
            }
        }

        Ok(report)
    }
}
