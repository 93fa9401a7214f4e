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

//! The projection orchestrator: owns the published snapshot, drives the
//! synchronous fast path and the background template path, and serves
//! read-only views to downstream consumers.

use std::{
    collections::BTreeMap,
    sync::atomic::{AtomicU64, Ordering::Relaxed},
};

use parking_lot::RwLock;

use logging::log;
use utils::tap_error_log::LogError;

use crate::{
    config::{BLOCK_WEIGHT_UNITS, MEMPOOL_BLOCKS_AMOUNT},
    error::Error,
    fees::{self, RecommendedFees},
    tx::{
        cmp_rate_desc, BlockPosition, Mempool, MempoolBlock, MempoolBlockDelta,
        MempoolBlockWithTransactions, TemplateTransaction, ThreadTransaction, TxSummary, Txid,
    },
};

pub mod delta;
pub mod packer;
pub mod relatives;
pub mod template;

use template::{worker::TemplateWorkerHandle, TemplateCommand, TemplateResult};

/// Projects the contents of the next blocks from the current mempool.
///
/// Exactly one snapshot (blocks plus the deltas that produced it) is
/// published at a time; both parts are replaced together so readers always
/// observe a consistent generation.
pub struct BlockProjector {
    snapshot: RwLock<Snapshot>,
    worker: Option<TemplateWorkerHandle>,
    stale_drops: AtomicU64,
}

#[derive(Default)]
struct Snapshot {
    blocks: Vec<MempoolBlockWithTransactions>,
    deltas: Vec<MempoolBlockDelta>,
}

impl Default for BlockProjector {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockProjector {
    pub fn new() -> Self {
        Self {
            snapshot: RwLock::new(Snapshot::default()),
            worker: None,
            stale_drops: AtomicU64::new(0),
        }
    }

    /// Summaries of the published projected blocks.
    pub fn mempool_blocks(&self) -> Vec<MempoolBlock> {
        self.snapshot.read().blocks.iter().map(|block| block.summary()).collect()
    }

    /// The published projected blocks with their transaction lists.
    pub fn mempool_blocks_with_transactions(&self) -> Vec<MempoolBlockWithTransactions> {
        self.snapshot.read().blocks.clone()
    }

    /// The deltas between the previously published projection and the
    /// current one.
    pub fn mempool_block_deltas(&self) -> Vec<MempoolBlockDelta> {
        self.snapshot.read().deltas.clone()
    }

    /// Fee estimates derived from the published projection.
    pub fn recommended_fees(&self) -> RecommendedFees {
        fees::recommended_fees(&self.mempool_blocks())
    }

    /// Number of worker-result transactions dropped because they had left
    /// the mempool by the time the reply arrived.
    pub fn stale_drop_count(&self) -> u64 {
        self.stale_drops.load(Relaxed)
    }

    /// Synchronous fast-path projection: resolve CPFP relatives in fee
    /// order, then greedily pack by effective fee rate.
    ///
    /// Mutates the mempool records as a side effect: effective rates,
    /// relative lists, and projected positions.
    pub fn update_mempool_blocks(
        &self,
        mempool: &mut Mempool,
        save_results: bool,
    ) -> Vec<MempoolBlockWithTransactions> {
        let mut order: Vec<(f64, Txid)> = mempool
            .values()
            .filter(|tx| tx.delete_after.is_none())
            .map(|tx| (tx.fee_per_vsize, tx.txid))
            .collect();
        order.sort_by(|a, b| cmp_rate_desc(a.0, a.1, b.0, b.1));

        // Resolution stops once the projection window is full; the long
        // tail keeps its plain fee rate.
        let weight_cap = BLOCK_WEIGHT_UNITS * MEMPOOL_BLOCKS_AMOUNT as u64;
        let mut running_weight = 0u64;
        for (_, txid) in &order {
            if running_weight < weight_cap {
                relatives::set_relatives_and_get_cpfp_info(txid, mempool);
            }
            running_weight += mempool[txid].weight;
        }

        let mut packing_order: Vec<(f64, Txid)> = mempool
            .values()
            .filter(|tx| tx.delete_after.is_none())
            .map(|tx| (tx.effective_fee_per_vsize, tx.txid))
            .collect();
        packing_order.sort_by(|a, b| cmp_rate_desc(a.0, a.1, b.0, b.1));
        let ordered: Vec<Txid> = packing_order.into_iter().map(|(_, txid)| txid).collect();

        let blocks = packer::pack_into_blocks(&ordered, mempool);
        log::debug!("Projected {} blocks from {} transactions", blocks.len(), ordered.len());

        if save_results {
            self.publish(blocks.clone());
        }
        blocks
    }

    /// Full template rebuild on the background worker.
    ///
    /// On any worker failure the handle is dropped (a fresh worker is
    /// spawned on the next call) and the last published snapshot is
    /// returned unchanged.
    pub async fn make_block_templates(
        &mut self,
        mempool: &mut Mempool,
        save_results: bool,
    ) -> Vec<MempoolBlockWithTransactions> {
        let stripped: BTreeMap<Txid, ThreadTransaction> = mempool
            .values()
            .filter(|tx| tx.delete_after.is_none())
            .map(|tx| (tx.txid, ThreadTransaction::from_mempool_tx(tx)))
            .collect();

        match self
            .worker_request(TemplateCommand::Set { mempool: stripped })
            .await
            .log_err_pfx("Block template rebuild failed")
        {
            Ok(result) => self.process_template_result(result, mempool, save_results),
            Err(_) => self.mempool_blocks_with_transactions(),
        }
    }

    /// Incremental template update on the background worker. With no live
    /// worker (first call, or the previous one failed) this falls back to
    /// a full rebuild.
    pub async fn update_block_templates(
        &mut self,
        mempool: &mut Mempool,
        added: &[Txid],
        removed: &[Txid],
        save_results: bool,
    ) {
        if self.worker.is_none() {
            self.make_block_templates(mempool, save_results).await;
            return;
        }

        let added: Vec<ThreadTransaction> = added
            .iter()
            .filter_map(|txid| mempool.get(txid))
            .filter(|tx| tx.delete_after.is_none())
            .map(ThreadTransaction::from_mempool_tx)
            .collect();
        let command = TemplateCommand::Update {
            added,
            removed: removed.to_vec(),
        };

        if let Ok(result) =
            self.worker_request(command).await.log_err_pfx("Block template update failed")
        {
            self.process_template_result(result, mempool, save_results);
        }
    }

    async fn worker_request(&mut self, command: TemplateCommand) -> Result<TemplateResult, Error> {
        if self.worker.is_none() {
            self.worker = Some(TemplateWorkerHandle::spawn()?);
        }
        let worker = self.worker.as_ref().expect("the worker was just spawned");
        match worker.request(command).await {
            Ok(result) => Ok(result),
            Err(err) => {
                // The thread is gone; drop the handle so the next call
                // starts over with a fresh full snapshot.
                self.worker = None;
                Err(err.into())
            }
        }
    }

    /// Turn a worker reply into the published block form: filter out
    /// transactions that have left the mempool, patch the live records
    /// (position, effective rate, cluster relatives), and build summaries.
    fn process_template_result(
        &self,
        result: TemplateResult,
        mempool: &mut Mempool,
        save_results: bool,
    ) -> Vec<MempoolBlockWithTransactions> {
        let TemplateResult { blocks, clusters } = result;

        let mut stale = 0u64;
        let live_blocks: Vec<Vec<TemplateTransaction>> = blocks
            .into_iter()
            .map(|block| {
                block
                    .into_iter()
                    .filter(|tx| {
                        let live = mempool.contains_key(&tx.txid);
                        if !live {
                            stale += 1;
                        }
                        live
                    })
                    .collect()
            })
            .collect();
        if stale > 0 {
            log::warn!("Dropped {stale} stale transactions from the block templates");
            self.stale_drops.fetch_add(stale, Relaxed);
        }

        let mut id_blocks: Vec<Vec<Txid>> = Vec::with_capacity(live_blocks.len());
        for (block_index, block) in live_blocks.iter().enumerate() {
            let mut running_vsize = 0f64;
            for tx in block {
                apply_template_patch(tx, block_index, &mut running_vsize, &clusters, mempool);
            }
            id_blocks.push(block.iter().map(|tx| tx.txid).collect());
        }

        let blocks: Vec<MempoolBlockWithTransactions> = id_blocks
            .iter()
            .map(|ids| packer::build_mempool_blocks(ids, mempool))
            .collect();

        if save_results {
            self.publish(blocks.clone());
        }
        blocks
    }

    /// Replace the published snapshot: the new blocks and the deltas
    /// leading to them swap in under one write lock.
    fn publish(&self, blocks: Vec<MempoolBlockWithTransactions>) {
        let mut snapshot = self.snapshot.write();
        let deltas = delta::compute_deltas(&snapshot.blocks, &blocks);
        *snapshot = Snapshot { blocks, deltas };
    }

    #[cfg(test)]
    fn drop_worker(&mut self) {
        self.worker = None;
    }

    #[cfg(test)]
    fn has_worker(&self) -> bool {
        self.worker.is_some()
    }
}

/// Apply one worker result entry to the live mempool record.
fn apply_template_patch(
    result: &TemplateTransaction,
    block: usize,
    running_vsize: &mut f64,
    clusters: &BTreeMap<Txid, Vec<Txid>>,
    mempool: &mut Mempool,
) {
    let relatives = result
        .cpfp_root
        .and_then(|root| clusters.get(&root))
        .map(|members| split_cluster(result.txid, members, mempool));

    let Some(tx) = mempool.get_mut(&result.txid) else {
        return;
    };
    let vsize = tx.vsize();
    tx.position = Some(BlockPosition {
        block,
        vsize: *running_vsize + vsize / 2.0,
    });
    *running_vsize += vsize;

    if let Some(rate) = result.effective_fee_per_vsize {
        tx.effective_fee_per_vsize = rate;
    }
    if let Some((ancestors, descendants)) = relatives {
        tx.ancestors = ancestors;
        tx.descendants = descendants;
        tx.best_descendant = None;
    }
    tx.cpfp_checked = result.cpfp_checked;
}

/// Split a cluster member list around `pivot` into ancestor and descendant
/// summaries, skipping members that have left the mempool.
fn split_cluster(
    pivot: Txid,
    members: &[Txid],
    mempool: &Mempool,
) -> (Vec<TxSummary>, Vec<TxSummary>) {
    let mut ancestors = Vec::new();
    let mut descendants = Vec::new();
    let mut seen_pivot = false;
    for member in members {
        if *member == pivot {
            seen_pivot = true;
            continue;
        }
        let Some(tx) = mempool.get(member) else {
            log::warn!("Cluster member {member} is missing from the mempool, skipping");
            continue;
        };
        if seen_pivot {
            descendants.push(tx.summary());
        } else {
            ancestors.push(tx.summary());
        }
    }
    (ancestors, descendants)
}
