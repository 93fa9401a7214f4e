// Copyright (c) 2023 RBB S.r.l
// opensource@mintlayer.org
// SPDX-License-Identifier: MIT
// Licensed under the MIT License;
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// https://github.com/mintlayer/mintlayer-core/blob/master/LICENSE
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Mempool block projection engine.
//!
//! Given the current unconfirmed transaction set of a node, this crate
//! continuously projects what the next several blocks a miner would
//! assemble are likely to contain. The projection honors weight-based
//! block limits, lifts low-fee ancestors through their fee-bumping
//! descendants (CPFP), and publishes deterministic snapshots together with
//! per-block deltas so downstream consumers can push compact updates.
//!
//! Two projection paths exist:
//! - a synchronous fast path ([`BlockProjector::update_mempool_blocks`])
//!   that resolves relatives in fee order and greedily packs blocks, and
//! - a background template path ([`BlockProjector::make_block_templates`],
//!   [`BlockProjector::update_block_templates`]) that runs a cluster-aware
//!   ancestor-set selection on a dedicated worker thread.

pub mod config;
pub mod error;
pub mod fees;
pub mod projector;
pub mod tx;

pub use projector::BlockProjector;
