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

//! CPFP relative resolution for the synchronous fast path.

use std::collections::BTreeSet;

use crate::tx::{Mempool, TxSummary, Txid};

/// Walk the unconfirmed ancestry of `txid`, record it on the transaction,
/// maintain the walked ancestors' best-descendant pointers, and recompute
/// the transaction's effective fee rate from its fee package.
///
/// The package consists of the transaction itself, the ancestors paying a
/// lower rate than it does (they would have to be dragged into the same
/// block), and its best descendant (the one bumping it). Inputs not found
/// in the mempool are confirmed or unknown and are skipped. Transactions
/// already checked are not revisited, so pathological reference cycles
/// cannot loop.
pub fn set_relatives_and_get_cpfp_info(txid: &Txid, mempool: &mut Mempool) {
    match mempool.get(txid) {
        Some(tx) if !tx.cpfp_checked => (),
        _ => return,
    }

    let ancestors = find_all_parents(txid, mempool);

    let tx = mempool.get_mut(txid).expect("the transaction was found above");
    let mut package_fee = tx.fee;
    let mut package_weight = tx.weight;
    for ancestor in &ancestors {
        if ancestor.fee_per_vsize() < tx.effective_fee_per_vsize {
            package_fee += ancestor.fee;
            package_weight += ancestor.weight;
        }
    }
    if let Some(bd) = tx.best_descendant {
        package_fee += bd.fee;
        package_weight += bd.weight;
    }
    tx.ancestors = ancestors;
    tx.effective_fee_per_vsize = (package_fee as f64 / (package_weight as f64 / 4.0)).max(0.0);
    tx.cpfp_checked = true;
}

/// Depth-first walk over the in-mempool parents of `txid`, collecting
/// ancestor summaries and offering each parent its walk-child as a new
/// best descendant along the way. The walk keeps an explicit stack of
/// child-to-parent edges, so ancestor chains of any depth stay off the
/// call stack.
fn find_all_parents(txid: &Txid, mempool: &mut Mempool) -> Vec<TxSummary> {
    let mut visited = BTreeSet::from([*txid]);
    let mut ancestors = Vec::new();
    let mut edges = parent_edges(*txid, mempool);

    while let Some((child_id, parent_id)) = edges.pop() {
        if !visited.insert(parent_id) {
            continue;
        }
        if !mempool.contains_key(&parent_id) {
            continue;
        }

        // The offer to this parent: the child alone, or the child merged
        // with its own best descendant when that combination pays the
        // better rate. The child's pointer may have been set earlier in
        // this very walk, so it is read fresh here.
        let child = &mempool[&child_id];
        let candidate = match child.best_descendant {
            Some(bd) if bd.fee_per_vsize() > child.fee_per_vsize => TxSummary {
                txid: child_id,
                fee: child.fee + bd.fee,
                weight: child.weight + bd.weight,
            },
            _ => child.summary(),
        };

        let parent = mempool.get_mut(&parent_id).expect("presence checked above");
        let improves = candidate.fee_per_vsize() > parent.fee_per_vsize
            && parent
                .best_descendant
                .map_or(true, |current| candidate.fee_per_vsize() > current.fee_per_vsize());
        if improves {
            parent.best_descendant = Some(candidate);
        }
        ancestors.push(parent.summary());

        edges.extend(parent_edges(parent_id, mempool));
    }

    ancestors
}

/// Child-to-parent edges of one transaction, reversed so that popping them
/// off the walk stack visits the inputs in their original order.
fn parent_edges(child: Txid, mempool: &Mempool) -> Vec<(Txid, Txid)> {
    mempool.get(&child).map_or_else(Vec::new, |tx| {
        tx.vin.iter().rev().map(|parent| (child, *parent)).collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tx::MempoolTransaction;

    fn txid(tag: u8) -> Txid {
        Txid::new([tag; 32])
    }

    fn insert_tx(mempool: &mut Mempool, tag: u8, fee: u64, weight: u64, vin: &[u8]) {
        let vin = vin.iter().map(|parent| txid(*parent)).collect();
        mempool.insert(
            txid(tag),
            MempoolTransaction::new(txid(tag), fee, weight, weight / 4, vin),
        );
    }

    #[test]
    fn zero_fee_parent_is_lifted_by_its_child() {
        let mut mempool = Mempool::new();
        insert_tx(&mut mempool, 1, 0, 400, &[]);
        insert_tx(&mut mempool, 2, 2000, 400, &[1]);

        // Resolution runs in descending fee-rate order: the child first.
        set_relatives_and_get_cpfp_info(&txid(2), &mut mempool);
        set_relatives_and_get_cpfp_info(&txid(1), &mut mempool);

        let parent = &mempool[&txid(1)];
        let child = &mempool[&txid(2)];
        assert_eq!(child.effective_fee_per_vsize, 10.0);
        assert_eq!(parent.effective_fee_per_vsize, 10.0);
        assert_eq!(parent.best_descendant.unwrap().txid, txid(2));
        assert_eq!(child.ancestors.len(), 1);
        assert_eq!(child.ancestors[0].txid, txid(1));
        assert!(parent.cpfp_checked && child.cpfp_checked);
    }

    #[test]
    fn ancestry_is_collected_transitively() {
        let mut mempool = Mempool::new();
        insert_tx(&mut mempool, 1, 1000, 400, &[]);
        insert_tx(&mut mempool, 2, 1000, 400, &[1]);
        insert_tx(&mut mempool, 3, 4000, 400, &[2]);

        set_relatives_and_get_cpfp_info(&txid(3), &mut mempool);

        let gchild = &mempool[&txid(3)];
        let mut ancestor_ids: Vec<Txid> =
            gchild.ancestors.iter().map(|summary| summary.txid).collect();
        ancestor_ids.sort();
        assert_eq!(ancestor_ids, vec![txid(1), txid(2)]);

        // The middle transaction points at the grandchild; the eldest is
        // offered the middle one merged with its new best descendant.
        assert_eq!(mempool[&txid(2)].best_descendant.unwrap().txid, txid(3));
        let eldest_bd = mempool[&txid(1)].best_descendant.unwrap();
        assert_eq!(eldest_bd.txid, txid(2));
        assert_eq!(eldest_bd.fee, 5000);
        assert_eq!(eldest_bd.weight, 800);
    }

    #[test]
    fn chained_packages_converge_on_one_rate() {
        let mut mempool = Mempool::new();
        insert_tx(&mut mempool, 1, 0, 400, &[]);
        insert_tx(&mut mempool, 2, 400, 400, &[1]);
        insert_tx(&mut mempool, 3, 4000, 400, &[2]);

        // Descending fee-rate order: grandchild, child, parent.
        set_relatives_and_get_cpfp_info(&txid(3), &mut mempool);
        set_relatives_and_get_cpfp_info(&txid(2), &mut mempool);
        set_relatives_and_get_cpfp_info(&txid(1), &mut mempool);

        let package_rate = 4400.0 / 300.0;
        let parent_bd = mempool[&txid(1)].best_descendant.unwrap();
        assert_eq!(parent_bd.txid, txid(2));
        assert_eq!(parent_bd.fee, 4400);
        assert_eq!(parent_bd.weight, 800);
        assert_eq!(mempool[&txid(1)].effective_fee_per_vsize, package_rate);
        assert_eq!(mempool[&txid(2)].effective_fee_per_vsize, package_rate);
        assert_eq!(mempool[&txid(3)].effective_fee_per_vsize, package_rate);
    }

    #[test]
    fn confirmed_inputs_are_skipped() {
        let mut mempool = Mempool::new();
        insert_tx(&mut mempool, 2, 2000, 400, &[1]);

        set_relatives_and_get_cpfp_info(&txid(2), &mut mempool);

        let tx = &mempool[&txid(2)];
        assert!(tx.ancestors.is_empty());
        assert_eq!(tx.effective_fee_per_vsize, 20.0);
    }

    #[test]
    fn reference_cycles_terminate() {
        let mut mempool = Mempool::new();
        insert_tx(&mut mempool, 1, 1000, 400, &[2]);
        insert_tx(&mut mempool, 2, 1000, 400, &[1]);

        set_relatives_and_get_cpfp_info(&txid(1), &mut mempool);

        let tx = &mempool[&txid(1)];
        assert_eq!(tx.ancestors.len(), 1);
        assert!(tx.cpfp_checked);
    }

    #[test]
    fn deep_ancestor_chains_resolve() {
        let mut mempool = Mempool::new();
        let depth = 1500u16;
        let deep_txid = |tag: u16| {
            let mut bytes = [0u8; 32];
            bytes[..2].copy_from_slice(&tag.to_be_bytes());
            Txid::new(bytes)
        };
        mempool.insert(
            deep_txid(0),
            MempoolTransaction::new(deep_txid(0), 1000, 400, 100, vec![]),
        );
        for n in 1..depth {
            mempool.insert(
                deep_txid(n),
                MempoolTransaction::new(deep_txid(n), 1000, 400, 100, vec![deep_txid(n - 1)]),
            );
        }

        set_relatives_and_get_cpfp_info(&deep_txid(depth - 1), &mut mempool);

        let tip = &mempool[&deep_txid(depth - 1)];
        assert_eq!(tip.ancestors.len(), depth as usize - 1);
        assert!(tip.cpfp_checked);
    }

    #[test]
    fn checked_transactions_are_not_revisited() {
        let mut mempool = Mempool::new();
        insert_tx(&mut mempool, 1, 1000, 400, &[]);
        set_relatives_and_get_cpfp_info(&txid(1), &mut mempool);

        mempool.get_mut(&txid(1)).unwrap().effective_fee_per_vsize = 99.0;
        set_relatives_and_get_cpfp_info(&txid(1), &mut mempool);
        assert_eq!(mempool[&txid(1)].effective_fee_per_vsize, 99.0);
    }
}
