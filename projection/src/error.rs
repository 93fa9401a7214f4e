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

use thiserror::Error;

/// Top-level projection engine error.
#[derive(Error, Debug, PartialEq, Eq, Clone)]
pub enum Error {
    #[error("Template worker error: {0}")]
    Worker(#[from] WorkerError),
}

/// Failures of the background template worker.
///
/// None of these are fatal: the orchestrator drops its worker handle and
/// respawns lazily on the next projection call.
#[derive(Error, Debug, PartialEq, Eq, Clone)]
pub enum WorkerError {
    #[error("Failed to spawn the worker thread: {0}")]
    Spawn(String),
    #[error("Worker channel closed before a reply was received")]
    ChannelClosed,
}

/// Errors decoding a transaction id from its hex representation.
#[derive(Error, Debug, PartialEq, Clone)]
pub enum TxidError {
    #[error("Invalid hex encoding: {0}")]
    Hex(#[from] hex::FromHexError),
    #[error("Invalid txid length: {0} hex characters where 64 are expected")]
    InvalidLength(usize),
}
