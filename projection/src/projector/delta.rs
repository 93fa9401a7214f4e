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

//! Block-by-block diffing of two successive projection snapshots.

use std::collections::{BTreeMap, BTreeSet};

use crate::tx::{
    MempoolBlockDelta, MempoolBlockWithTransactions, StrippedTransaction, TxRateChange, Txid,
};

/// Diff `prev` against `new_blocks` index by index, over the client-facing
/// transaction lists. A transaction that moved between blocks shows up as
/// removed at its old index and added at its new one.
pub fn compute_deltas(
    prev: &[MempoolBlockWithTransactions],
    new_blocks: &[MempoolBlockWithTransactions],
) -> Vec<MempoolBlockDelta> {
    (0..prev.len().max(new_blocks.len()))
        .map(|index| match (prev.get(index), new_blocks.get(index)) {
            (None, Some(new)) => MempoolBlockDelta {
                added: new.transactions.clone(),
                removed: Vec::new(),
                changed: Vec::new(),
            },
            (Some(prev), None) => MempoolBlockDelta {
                added: Vec::new(),
                removed: prev.transactions.iter().map(|tx| tx.txid).collect(),
                changed: Vec::new(),
            },
            (Some(prev), Some(new)) => diff_block(&prev.transactions, &new.transactions),
            (None, None) => MempoolBlockDelta::default(),
        })
        .collect()
}

fn diff_block(prev: &[StrippedTransaction], new: &[StrippedTransaction]) -> MempoolBlockDelta {
    let prev_rates: BTreeMap<Txid, Option<f64>> =
        prev.iter().map(|tx| (tx.txid, tx.rate)).collect();
    let new_ids: BTreeSet<Txid> = new.iter().map(|tx| tx.txid).collect();

    let removed = prev
        .iter()
        .map(|tx| tx.txid)
        .filter(|txid| !new_ids.contains(txid))
        .collect();

    let mut added = Vec::new();
    let mut changed = Vec::new();
    for tx in new {
        match prev_rates.get(&tx.txid) {
            None => added.push(tx.clone()),
            Some(prev_rate) if *prev_rate != tx.rate => changed.push(TxRateChange {
                txid: tx.txid,
                rate: tx.rate,
            }),
            Some(_) => (),
        }
    }

    MempoolBlockDelta { added, removed, changed }
}
