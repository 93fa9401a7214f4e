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

use static_assertions::const_assert;

/// Weight budget of a single projected block, in weight units.
pub const BLOCK_WEIGHT_UNITS: u64 = 4_000_000;

/// Maximum number of projected blocks. The last one absorbs everything
/// that did not fit into the preceding ones.
pub const MEMPOOL_BLOCKS_AMOUNT: usize = 8;

/// Percentile of a block's effective fee rates reported as its median fee.
pub const RECOMMENDED_FEE_PERCENTILE: f64 = 50.0;

/// Fixed percentiles sampled for a block's fee range, low to high.
pub const FEE_RANGE_PERCENTILES: [f64; 7] = [0.0, 10.0, 25.0, 50.0, 75.0, 90.0, 100.0];

/// Client-facing transaction lists are cut off at this multiple of the
/// block weight budget.
pub const CLIENT_BLOCK_WEIGHT_FACTOR: f64 = 1.2;

/// Floor for recommended fee estimates, in sat/vB.
pub const DEFAULT_MIN_FEE: f64 = 1.0;

/// Consecutive failures to fit a package before the template builder
/// treats the current block as full.
pub const MAX_SELECTION_ATTEMPTS: usize = 500;

const_assert!(MEMPOOL_BLOCKS_AMOUNT >= 1);
const_assert!(BLOCK_WEIGHT_UNITS > 0);
const_assert!(MAX_SELECTION_ATTEMPTS > 0);
