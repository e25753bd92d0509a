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

//! Durable six-queue bundle store over sled.
//!
//! Layout: the `bundles` tree maps `[queue_tag][id]` to the encoded record;
//! the `index` tree carries every secondary key family plus the running byte
//! total. Each mutator is one serializable transaction across both trees, so
//! a crash mid-move leaves the bundle in exactly one queue.
//!
//! Index families (all range-scannable in O(log N)):
//! - `o [queue][priority rank][created][id]` - list order (priority desc, created asc)
//! - `c [queue][created][id]`               - age order (eviction scans)
//! - `e [queue][expires][id]`               - expiry order (reaper, eviction)
//! - `t [topic 0x00][queue][id]`            - topic lookup
//! - `l [id][queue] -> size`                - location + byte accounting
//! - `m`                                    - total stored bytes

use chrono::{DateTime, Utc};
use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::Transactional;
use std::path::Path;
use thiserror::Error;

use crate::core::bundle::Bundle;
use crate::core::codec::{decode_record, encode_record};
use crate::core::types::{BundleId, Queue};

/// Store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("db open")]
    DbOpen,
    #[error("db io")]
    DbIo,
    #[error("tx conflict")]
    TxConflict,
    #[error("codec")]
    Codec,
    #[error("duplicate")]
    Duplicate,
    #[error("not found")]
    NotFound,
}

/// Durable queue store handle. Cheap to clone.
#[derive(Clone)]
pub struct QueueStore {
    bundles: sled::Tree,
    index: sled::Tree,
}

const META_TOTAL: &[u8] = b"m";
const EMPTY: &[u8] = &[];

fn millis(t: DateTime<Utc>) -> u64 {
    t.timestamp_millis().max(0) as u64
}

fn bundle_key(queue: Queue, id: &BundleId) -> Vec<u8> {
    let mut k = Vec::with_capacity(33);
    k.push(queue.tag());
    k.extend_from_slice(id.as_bytes());
    k
}

fn order_key(queue: Queue, b: &Bundle) -> Vec<u8> {
    let mut k = Vec::with_capacity(43);
    k.push(b'o');
    k.push(queue.tag());
    k.push(b.priority.index_rank());
    k.extend_from_slice(&millis(b.created_at).to_be_bytes());
    k.extend_from_slice(b.bundle_id.as_bytes());
    k
}

fn age_key(queue: Queue, b: &Bundle) -> Vec<u8> {
    let mut k = Vec::with_capacity(42);
    k.push(b'c');
    k.push(queue.tag());
    k.extend_from_slice(&millis(b.created_at).to_be_bytes());
    k.extend_from_slice(b.bundle_id.as_bytes());
    k
}

fn expiry_key(queue: Queue, b: &Bundle) -> Vec<u8> {
    let mut k = Vec::with_capacity(42);
    k.push(b'e');
    k.push(queue.tag());
    k.extend_from_slice(&millis(b.expires_at).to_be_bytes());
    k.extend_from_slice(b.bundle_id.as_bytes());
    k
}

fn topic_key(queue: Queue, b: &Bundle) -> Vec<u8> {
    let mut k = Vec::with_capacity(b.topic.len() + 35);
    k.push(b't');
    k.extend_from_slice(b.topic.as_bytes());
    k.push(0);
    k.push(queue.tag());
    k.extend_from_slice(b.bundle_id.as_bytes());
    k
}

fn location_key(id: &BundleId, queue: Queue) -> Vec<u8> {
    let mut k = Vec::with_capacity(34);
    k.push(b'l');
    k.extend_from_slice(id.as_bytes());
    k.push(queue.tag());
    k
}

fn id_from_tail(key: &[u8]) -> Option<BundleId> {
    if key.len() < 32 {
        return None;
    }
    let mut out = [0u8; 32];
    out.copy_from_slice(&key[key.len() - 32..]);
    Some(BundleId::from_digest(out))
}

fn u64_from(iv: &[u8]) -> u64 {
    let mut b = [0u8; 8];
    if iv.len() == 8 {
        b.copy_from_slice(iv);
    }
    u64::from_be_bytes(b)
}

/// The only pair of queues allowed to hold the same id at once: the engine
/// may keep its authored copy in `outbox` while a relayed echo sits in `inbox`.
fn coexist_allowed(a: Queue, b: Queue) -> bool {
    matches!(
        (a, b),
        (Queue::Outbox, Queue::Inbox) | (Queue::Inbox, Queue::Outbox)
    )
}

type TxResult<T> = Result<T, ConflictableTransactionError<StoreError>>;

fn abort<T>(e: StoreError) -> TxResult<T> {
    Err(ConflictableTransactionError::Abort(e))
}

fn run_tx<T>(
    r: Result<T, TransactionError<StoreError>>,
) -> Result<T, StoreError> {
    match r {
        Ok(v) => Ok(v),
        Err(TransactionError::Abort(e)) => Err(e),
        Err(TransactionError::Storage(_)) => Err(StoreError::DbIo),
    }
}

impl QueueStore {
    /// Open (or create) the store inside `path`.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let db = sled::open(path).map_err(|_| StoreError::DbOpen)?;
        let bundles = db.open_tree("bundles").map_err(|_| StoreError::DbOpen)?;
        let index = db.open_tree("index").map_err(|_| StoreError::DbOpen)?;
        Ok(Self { bundles, index })
    }

    /// Insert a new bundle into `queue`. Returns the stored record size.
    ///
    /// Fails with `Duplicate` if the id already exists anywhere except the
    /// allowed `outbox`/`inbox` pairing.
    pub fn create(&self, bundle: &Bundle, queue: Queue) -> Result<u64, StoreError> {
        let record = encode_record(bundle).map_err(|_| StoreError::Codec)?;
        let size = record.len() as u64;
        let id = bundle.bundle_id;

        let res = (&self.bundles, &self.index).transaction(move |(tb, ti)| -> TxResult<u64> {
            for other in Queue::ALL {
                if ti.get(location_key(&id, other))?.is_some()
                    && (other == queue || !coexist_allowed(queue, other))
                {
                    return abort(StoreError::Duplicate);
                }
            }

            tb.insert(bundle_key(queue, &id), record.clone())?;
            ti.insert(order_key(queue, bundle), EMPTY)?;
            ti.insert(age_key(queue, bundle), EMPTY)?;
            ti.insert(expiry_key(queue, bundle), EMPTY)?;
            ti.insert(topic_key(queue, bundle), EMPTY)?;
            ti.insert(location_key(&id, queue), &size.to_be_bytes()[..])?;

            let total = ti.get(META_TOTAL)?.map(|v| u64_from(&v)).unwrap_or(0);
            ti.insert(META_TOTAL, &total.saturating_add(size).to_be_bytes()[..])?;
            Ok(size)
        });
        run_tx(res)
    }

    /// Atomically relocate a bundle between queues.
    ///
    /// Fails with `NotFound` when `from` does not hold the id. If `to`
    /// already holds the id (only reachable for the outbox/inbox echo pair
    /// converging), the source copy is merged away.
    pub fn move_bundle(&self, id: &BundleId, from: Queue, to: Queue) -> Result<(), StoreError> {
        let id = *id;
        let res = (&self.bundles, &self.index).transaction(move |(tb, ti)| -> TxResult<()> {
            let Some(size_iv) = ti.get(location_key(&id, from))? else {
                return abort(StoreError::NotFound);
            };
            let size = u64_from(&size_iv);

            let Some(record) = tb.get(bundle_key(from, &id))? else {
                return abort(StoreError::NotFound);
            };
            let bundle: Bundle = match decode_record(&record) {
                Ok(b) => b,
                Err(_) => return abort(StoreError::Codec),
            };

            tb.remove(bundle_key(from, &id))?;
            ti.remove(order_key(from, &bundle))?;
            ti.remove(age_key(from, &bundle))?;
            ti.remove(expiry_key(from, &bundle))?;
            ti.remove(topic_key(from, &bundle))?;
            ti.remove(location_key(&id, from))?;

            if ti.get(location_key(&id, to))?.is_some() {
                // Merge: destination copy wins, source bytes are freed.
                let total = ti.get(META_TOTAL)?.map(|v| u64_from(&v)).unwrap_or(0);
                ti.insert(META_TOTAL, &total.saturating_sub(size).to_be_bytes()[..])?;
                return Ok(());
            }

            tb.insert(bundle_key(to, &id), record)?;
            ti.insert(order_key(to, &bundle), EMPTY)?;
            ti.insert(age_key(to, &bundle), EMPTY)?;
            ti.insert(expiry_key(to, &bundle), EMPTY)?;
            ti.insert(topic_key(to, &bundle), EMPTY)?;
            ti.insert(location_key(&id, to), &size.to_be_bytes()[..])?;
            Ok(())
        });
        run_tx(res)
    }

    /// Remove one copy of a bundle from a specific queue. Returns bytes freed.
    pub fn delete_from(&self, id: &BundleId, queue: Queue) -> Result<u64, StoreError> {
        let id = *id;
        let res = (&self.bundles, &self.index).transaction(move |(tb, ti)| -> TxResult<u64> {
            let Some(size_iv) = ti.get(location_key(&id, queue))? else {
                return abort(StoreError::NotFound);
            };
            let size = u64_from(&size_iv);

            let Some(record) = tb.get(bundle_key(queue, &id))? else {
                return abort(StoreError::NotFound);
            };
            let bundle: Bundle = match decode_record(&record) {
                Ok(b) => b,
                Err(_) => return abort(StoreError::Codec),
            };

            tb.remove(bundle_key(queue, &id))?;
            ti.remove(order_key(queue, &bundle))?;
            ti.remove(age_key(queue, &bundle))?;
            ti.remove(expiry_key(queue, &bundle))?;
            ti.remove(topic_key(queue, &bundle))?;
            ti.remove(location_key(&id, queue))?;

            let total = ti.get(META_TOTAL)?.map(|v| u64_from(&v)).unwrap_or(0);
            ti.insert(META_TOTAL, &total.saturating_sub(size).to_be_bytes()[..])?;
            Ok(size)
        });
        run_tx(res)
    }

    /// Remove every copy of a bundle, wherever it sits. Returns bytes freed
    /// (zero when the id was unknown).
    pub fn delete(&self, id: &BundleId) -> Result<u64, StoreError> {
        let mut freed = 0;
        for (queue, _) in self.locations(id)? {
            match self.delete_from(id, queue) {
                Ok(n) => freed += n,
                Err(StoreError::NotFound) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(freed)
    }

    /// Every queue currently holding the id, with stored record sizes.
    pub fn locations(&self, id: &BundleId) -> Result<Vec<(Queue, u64)>, StoreError> {
        let mut prefix = Vec::with_capacity(33);
        prefix.push(b'l');
        prefix.extend_from_slice(id.as_bytes());

        let mut out = Vec::new();
        for item in self.index.scan_prefix(&prefix) {
            let (k, v) = item.map_err(|_| StoreError::DbIo)?;
            let Some(&tag) = k.last() else { continue };
            let Some(queue) = Queue::from_tag(tag) else {
                continue;
            };
            out.push((queue, u64_from(&v)));
        }
        Ok(out)
    }

    /// Predicate: does the id sit in any of `queues`?
    pub fn exists_in(&self, id: &BundleId, queues: &[Queue]) -> Result<bool, StoreError> {
        let locations = self.locations(id)?;
        Ok(locations.iter().any(|(q, _)| queues.contains(q)))
    }

    /// Fetch a bundle from a specific queue.
    pub fn get_in(&self, queue: Queue, id: &BundleId) -> Result<Option<Bundle>, StoreError> {
        let Some(record) = self
            .bundles
            .get(bundle_key(queue, id))
            .map_err(|_| StoreError::DbIo)?
        else {
            return Ok(None);
        };
        decode_record(&record).map(Some).map_err(|_| StoreError::Codec)
    }

    /// Fetch a bundle from whichever queue holds it (lowest tag first, so an
    /// inbox echo is preferred over the authored outbox copy).
    pub fn get(&self, id: &BundleId) -> Result<Option<(Queue, Bundle)>, StoreError> {
        let mut locations = self.locations(id)?;
        locations.sort_by_key(|(q, _)| q.tag());
        let Some((queue, _)) = locations.first().copied() else {
            return Ok(None);
        };
        Ok(self.get_in(queue, id)?.map(|b| (queue, b)))
    }

    /// Bundles in `queue`, ordered by priority descending then created
    /// ascending, with pagination.
    pub fn list(&self, queue: Queue, limit: usize, offset: usize) -> Result<Vec<Bundle>, StoreError> {
        let prefix = [b'o', queue.tag()];
        let mut out = Vec::new();
        for item in self.index.scan_prefix(prefix).skip(offset) {
            if out.len() >= limit {
                break;
            }
            let (k, _) = item.map_err(|_| StoreError::DbIo)?;
            let Some(id) = id_from_tail(&k) else { continue };
            if let Some(b) = self.get_in(queue, &id)? {
                out.push(b);
            }
        }
        Ok(out)
    }

    /// Number of bundles in `queue`.
    pub fn count(&self, queue: Queue) -> Result<u64, StoreError> {
        let prefix = [b'c', queue.tag()];
        let mut n = 0u64;
        for item in self.index.scan_prefix(prefix) {
            item.map_err(|_| StoreError::DbIo)?;
            n += 1;
        }
        Ok(n)
    }

    /// Ids in `queue` whose `expires_at` is strictly before `now`.
    pub fn expired_in(&self, queue: Queue, now: DateTime<Utc>) -> Result<Vec<BundleId>, StoreError> {
        let cutoff = millis(now);
        let mut out = Vec::new();
        for item in self.index.scan_prefix([b'e', queue.tag()]) {
            let (k, _) = item.map_err(|_| StoreError::DbIo)?;
            let at = u64_from(&k[2..10]);
            if at >= cutoff {
                break;
            }
            if let Some(id) = id_from_tail(&k) {
                out.push(id);
            }
        }
        Ok(out)
    }

    /// Full expiry-ordered scan of `queue`: `(id, expires_at millis)`.
    pub fn expiry_scan(&self, queue: Queue) -> Result<Vec<(BundleId, u64)>, StoreError> {
        let mut out = Vec::new();
        for item in self.index.scan_prefix([b'e', queue.tag()]) {
            let (k, _) = item.map_err(|_| StoreError::DbIo)?;
            if let Some(id) = id_from_tail(&k) {
                out.push((id, u64_from(&k[2..10])));
            }
        }
        Ok(out)
    }

    /// Full age-ordered scan of `queue`: `(id, created_at millis)`.
    pub fn age_scan(&self, queue: Queue) -> Result<Vec<(BundleId, u64)>, StoreError> {
        let mut out = Vec::new();
        for item in self.index.scan_prefix([b'c', queue.tag()]) {
            let (k, _) = item.map_err(|_| StoreError::DbIo)?;
            if let Some(id) = id_from_tail(&k) {
                out.push((id, u64_from(&k[2..10])));
            }
        }
        Ok(out)
    }

    /// Bundles carrying `topic`, as `(queue, id)` pairs.
    pub fn list_topic(&self, topic: &str, limit: usize) -> Result<Vec<(Queue, BundleId)>, StoreError> {
        let mut prefix = Vec::with_capacity(topic.len() + 2);
        prefix.push(b't');
        prefix.extend_from_slice(topic.as_bytes());
        prefix.push(0);

        let mut out = Vec::new();
        for item in self.index.scan_prefix(&prefix) {
            if out.len() >= limit {
                break;
            }
            let (k, _) = item.map_err(|_| StoreError::DbIo)?;
            let tag_pos = prefix.len();
            let Some(queue) = k.get(tag_pos).copied().and_then(Queue::from_tag) else {
                continue;
            };
            if let Some(id) = id_from_tail(&k) {
                out.push((queue, id));
            }
        }
        Ok(out)
    }

    /// Current stored footprint in bytes.
    pub fn total_bytes(&self) -> Result<u64, StoreError> {
        Ok(self
            .index
            .get(META_TOTAL)
            .map_err(|_| StoreError::DbIo)?
            .map(|v| u64_from(&v))
            .unwrap_or(0))
    }

    /// Flush dirty pages to disk (shutdown path).
    pub fn flush(&self) -> Result<(), StoreError> {
        self.bundles.flush().map_err(|_| StoreError::DbIo)?;
        self.index.flush().map_err(|_| StoreError::DbIo)?;
        Ok(())
    }
}
