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

//! Greedy weight-bounded packing of fee-sorted transactions into projected
//! blocks, and construction of the outward block summaries.

use crate::{
    config::{BLOCK_WEIGHT_UNITS, CLIENT_BLOCK_WEIGHT_FACTOR, MEMPOOL_BLOCKS_AMOUNT},
    fees,
    tx::{BlockPosition, Mempool, MempoolBlockWithTransactions, MempoolTransaction, Txid},
};

/// Pack `ordered` (effective-rate descending) into at most
/// [`MEMPOOL_BLOCKS_AMOUNT`] blocks, assigning every transaction its
/// projected mid-point position. The final block absorbs everything that
/// did not fit into the preceding ones.
pub fn pack_into_blocks(ordered: &[Txid], mempool: &mut Mempool) -> Vec<MempoolBlockWithTransactions> {
    let mut block_id_lists: Vec<Vec<Txid>> = Vec::new();
    let mut current: Vec<Txid> = Vec::new();
    let mut block_weight = 0u64;
    let mut block_vsize = 0f64;

    for txid in ordered {
        let block_index = block_id_lists.len();
        let Some(tx) = mempool.get_mut(txid) else {
            continue;
        };
        if block_weight + tx.weight <= BLOCK_WEIGHT_UNITS
            || block_index == MEMPOOL_BLOCKS_AMOUNT - 1
        {
            tx.position = Some(BlockPosition {
                block: block_index,
                vsize: block_vsize + tx.vsize() / 2.0,
            });
            block_weight += tx.weight;
            block_vsize += tx.vsize();
            current.push(*txid);
        } else {
            if !current.is_empty() {
                block_id_lists.push(std::mem::take(&mut current));
            }
            tx.position = Some(BlockPosition {
                block: block_id_lists.len(),
                vsize: tx.vsize() / 2.0,
            });
            block_weight = tx.weight;
            block_vsize = tx.vsize();
            current.push(*txid);
        }
    }
    if !current.is_empty() {
        block_id_lists.push(current);
    }

    block_id_lists.iter().map(|ids| build_mempool_blocks(ids, mempool)).collect()
}

/// Build the outward summary of one packed block: totals and fee statistics
/// over all packed transactions, plus the client-facing stripped subset cut
/// off at the relaxed weight cap.
pub fn build_mempool_blocks(ids: &[Txid], mempool: &Mempool) -> MempoolBlockWithTransactions {
    let txs: Vec<&MempoolTransaction> = ids.iter().filter_map(|id| mempool.get(id)).collect();

    let block_size: u64 = txs.iter().map(|tx| tx.size).sum();
    let block_weight: u64 = txs.iter().map(|tx| tx.weight).sum();
    let total_fees: u64 = txs.iter().map(|tx| tx.fee).sum();
    let stats = fees::effective_fee_statistics(txs.iter().copied());

    let client_cap = (BLOCK_WEIGHT_UNITS as f64 * CLIENT_BLOCK_WEIGHT_FACTOR) as u64;
    let mut running_weight = 0u64;
    let mut transactions = Vec::new();
    for tx in &txs {
        running_weight += tx.weight;
        if running_weight <= client_cap {
            transactions.push(fees::strip_transaction(tx));
        }
    }

    MempoolBlockWithTransactions {
        block_size,
        block_vsize: block_weight as f64 / 4.0,
        n_tx: txs.len(),
        total_fees,
        median_fee: stats.median_fee,
        fee_range: stats.fee_range,
        transaction_ids: ids.to_vec(),
        transactions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tx::MempoolTransaction;

    fn txid(tag: u8) -> Txid {
        Txid::new([tag; 32])
    }

    fn insert_tx(mempool: &mut Mempool, tag: u8, fee: u64, weight: u64) {
        mempool.insert(
            txid(tag),
            MempoolTransaction::new(txid(tag), fee, weight, weight / 4, vec![]),
        );
    }

    #[test]
    fn single_transaction_block() {
        let mut mempool = Mempool::new();
        insert_tx(&mut mempool, 1, 1000, 400);

        let blocks = pack_into_blocks(&[txid(1)], &mut mempool);

        assert_eq!(blocks.len(), 1);
        let block = &blocks[0];
        assert_eq!(block.n_tx, 1);
        assert_eq!(block.block_size, 100);
        assert_eq!(block.block_vsize, 100.0);
        assert_eq!(block.total_fees, 1000);
        assert_eq!(block.transaction_ids, vec![txid(1)]);
        assert_eq!(block.transactions.len(), 1);

        let position = mempool[&txid(1)].position.unwrap();
        assert_eq!(position.block, 0);
        assert_eq!(position.vsize, 50.0);
    }

    #[test]
    fn positions_are_mid_points_of_the_running_vsize() {
        let mut mempool = Mempool::new();
        insert_tx(&mut mempool, 1, 3000, 400);
        insert_tx(&mut mempool, 2, 2000, 800);
        insert_tx(&mut mempool, 3, 1000, 400);
        let order = [txid(1), txid(2), txid(3)];

        pack_into_blocks(&order, &mut mempool);

        assert_eq!(mempool[&txid(1)].position.unwrap().vsize, 50.0);
        assert_eq!(mempool[&txid(2)].position.unwrap().vsize, 200.0);
        assert_eq!(mempool[&txid(3)].position.unwrap().vsize, 350.0);
    }

    #[test]
    fn overflow_spills_into_new_blocks_until_the_last() {
        // Half-block-weight transactions: two per block, with the final
        // block absorbing all the rest.
        let mut mempool = Mempool::new();
        let count = 2 * MEMPOOL_BLOCKS_AMOUNT + 4;
        let order: Vec<Txid> = (0..count as u8)
            .map(|tag| {
                insert_tx(&mut mempool, tag, 10_000 * (count as u64 - tag as u64), BLOCK_WEIGHT_UNITS / 2);
                txid(tag)
            })
            .collect();

        let blocks = pack_into_blocks(&order, &mut mempool);

        assert_eq!(blocks.len(), MEMPOOL_BLOCKS_AMOUNT);
        for block in &blocks[..MEMPOOL_BLOCKS_AMOUNT - 1] {
            assert_eq!(block.n_tx, 2);
        }
        let last = blocks.last().unwrap();
        assert_eq!(last.n_tx, count - 2 * (MEMPOOL_BLOCKS_AMOUNT - 1));
        assert!(last.block_vsize * 4.0 > BLOCK_WEIGHT_UNITS as f64);

        for (tag, id) in order.iter().enumerate() {
            let expected_block = (tag / 2).min(MEMPOOL_BLOCKS_AMOUNT - 1);
            assert_eq!(mempool[id].position.unwrap().block, expected_block);
        }
    }

    #[test]
    fn no_transaction_appears_twice() {
        let mut mempool = Mempool::new();
        let order: Vec<Txid> = (0..30u8)
            .map(|tag| {
                insert_tx(&mut mempool, tag, 100_000, 396_000);
                txid(tag)
            })
            .collect();

        let blocks = pack_into_blocks(&order, &mut mempool);

        let mut seen = std::collections::BTreeSet::new();
        for block in &blocks {
            for id in &block.transaction_ids {
                assert!(seen.insert(*id), "{id} packed twice");
            }
        }
        assert_eq!(seen.len(), 30);
        assert!(blocks.len() <= MEMPOOL_BLOCKS_AMOUNT);
    }

    #[test]
    fn client_subset_stops_at_the_relaxed_cap() {
        // 13 transactions of 400k weight each: the packer lets ten into the
        // first block (4M) and the client subset of the overflow-absorbing
        // final blocks still cuts at 1.2x.
        let mut mempool = Mempool::new();
        let order: Vec<Txid> = (0..13u8)
            .map(|tag| {
                insert_tx(&mut mempool, tag, 50_000, 400_000);
                txid(tag)
            })
            .collect();

        let blocks = pack_into_blocks(&order, &mut mempool);

        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].n_tx, 10);
        assert_eq!(blocks[0].transactions.len(), 10);
        assert_eq!(blocks[1].n_tx, 3);

        // A single overlong pseudo-block: all ids retained, but the
        // stripped list is cut once the running weight passes 4.8M.
        let big_order: Vec<Txid> = (100..114u8)
            .map(|tag| {
                insert_tx(&mut mempool, tag, 50_000, 400_000);
                txid(tag)
            })
            .collect();
        let block = build_mempool_blocks(&big_order, &mempool);
        assert_eq!(block.transaction_ids.len(), 14);
        assert_eq!(block.transactions.len(), 12);
    }
}
