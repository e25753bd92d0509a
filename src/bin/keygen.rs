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

//! Offline node key generation. Usage: `keygen [data_dir]`.
//! Writes `node.key` and prints the armored public key and fingerprint.

use anyhow::Result;
use std::path::PathBuf;

use driftmesh::core::security::keystore::Keystore;

fn main() -> Result<()> {
    let out_dir = std::env::args().nth(1).unwrap_or_else(|| "data".to_string());
    let mut key_path = PathBuf::from(out_dir);
    std::fs::create_dir_all(&key_path)?;
    key_path.push("node.key");

    let ks = Keystore::open(&key_path)?;
    println!("{}", ks.node_public_key().armored());
    println!("{}", ks.node_fingerprint());
    Ok(())
}
