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

//! Worker-side block template construction.
//!
//! The builder keeps a mirror of the mempool in stripped form and, for
//! every command, runs an ancestor-set selection over it: packages (a
//! transaction together with its not-yet-selected ancestors) are pulled in
//! descending ancestor-score order, and descendant scores are recomputed as
//! their ancestors make it into blocks. This is the selection miners
//! actually approximate, so it projects CPFP clusters properly where the
//! fast path only lifts rates.

use std::collections::{BTreeMap, BTreeSet};

use priority_queue::PriorityQueue;

use crate::{
    config::{BLOCK_WEIGHT_UNITS, MAX_SELECTION_ATTEMPTS, MEMPOOL_BLOCKS_AMOUNT},
    tx::{TemplateTransaction, ThreadTransaction, Txid},
};

pub mod worker;

/// Messages accepted by the template worker.
#[derive(Debug)]
pub enum TemplateCommand {
    /// Replace the worker's entire view of the mempool.
    Set {
        mempool: BTreeMap<Txid, ThreadTransaction>,
    },
    /// Apply an incremental diff to the worker's view.
    Update {
        added: Vec<ThreadTransaction>,
        removed: Vec<Txid>,
    },
}

/// One reply per command: the projected blocks in packing order and the
/// CPFP clusters keyed by their root transaction.
#[derive(Debug, Default)]
pub struct TemplateResult {
    pub blocks: Vec<Vec<TemplateTransaction>>,
    pub clusters: BTreeMap<Txid, Vec<Txid>>,
}

/// The worker's long-lived state: the mempool mirror.
#[derive(Default)]
pub struct TemplateBuilder {
    mempool: BTreeMap<Txid, ThreadTransaction>,
}

impl TemplateBuilder {
    /// Apply one command to the mirror and rebuild the templates.
    pub fn handle(&mut self, command: TemplateCommand) -> TemplateResult {
        match command {
            TemplateCommand::Set { mempool } => self.mempool = mempool,
            TemplateCommand::Update { added, removed } => {
                for tx in added {
                    self.mempool.insert(tx.txid, tx);
                }
                for txid in &removed {
                    self.mempool.remove(txid);
                }
            }
        }
        self.make_templates()
    }

    fn make_templates(&self) -> TemplateResult {
        let mut pool = build_audit_pool(&self.mempool);
        let ids: Vec<Txid> = pool.keys().copied().collect();
        for txid in ids {
            set_relatives(txid, &mut pool);
        }

        // Main queue: a stack sorted so that the best package is on top.
        let mut stack: Vec<Txid> = pool.keys().copied().collect();
        stack.sort_by(|a, b| priority_of(&pool, *a).cmp(&priority_of(&pool, *b)));
        let mut modified: PriorityQueue<Txid, TxPriority> = PriorityQueue::new();
        let mut overflow: Vec<Txid> = Vec::new();

        let mut result = TemplateResult::default();
        let mut current: Vec<TemplateTransaction> = Vec::new();
        let mut block_weight = 0u64;
        let mut failures = 0usize;

        loop {
            let Some(txid) = next_candidate(&mut stack, &mut modified, &pool) else {
                // The queues are drained. Anything left in overflow starts
                // the next block, unless only the unbounded tail block
                // remains (which cannot have overflow by construction).
                if overflow.is_empty() || result.blocks.len() >= MEMPOOL_BLOCKS_AMOUNT - 1 {
                    break;
                }
                result.blocks.push(std::mem::take(&mut current));
                block_weight = 0;
                failures = 0;
                recycle_overflow(&mut overflow, &mut stack, &mut modified, &pool);
                continue;
            };

            let package_weight = pool[&txid].ancestor_weight;
            let is_final_block = result.blocks.len() >= MEMPOOL_BLOCKS_AMOUNT - 1;

            if block_weight + package_weight <= BLOCK_WEIGHT_UNITS || is_final_block {
                block_weight += select_package(
                    txid,
                    &mut pool,
                    &mut modified,
                    &mut current,
                    &mut result.clusters,
                );
                failures = 0;
            } else {
                overflow.push(txid);
                failures += 1;
            }

            let nearly_full = block_weight >= BLOCK_WEIGHT_UNITS - BLOCK_WEIGHT_UNITS / 1000;
            if failures >= MAX_SELECTION_ATTEMPTS
                && nearly_full
                && result.blocks.len() < MEMPOOL_BLOCKS_AMOUNT - 1
            {
                result.blocks.push(std::mem::take(&mut current));
                block_weight = 0;
                failures = 0;
                recycle_overflow(&mut overflow, &mut stack, &mut modified, &pool);
            }
        }

        if !current.is_empty() {
            result.blocks.push(current);
        }
        result
    }
}

/// Requeue everything that failed to fit the closed block.
fn recycle_overflow(
    overflow: &mut Vec<Txid>,
    stack: &mut Vec<Txid>,
    modified: &mut PriorityQueue<Txid, TxPriority>,
    pool: &BTreeMap<Txid, AuditTx>,
) {
    while let Some(txid) = overflow.pop() {
        let tx = &pool[&txid];
        if tx.used {
            continue;
        }
        if tx.modified {
            modified.push_increase(txid, priority_of(pool, txid));
        } else {
            stack.push(txid);
        }
    }
}

/// Per-run selection bookkeeping for one mirror entry. `ancestors` and the
/// ancestor totals cover the not-yet-selected ancestor closure plus the
/// transaction itself.
struct AuditTx {
    fee: u64,
    weight: u64,
    parents: BTreeSet<Txid>,
    children: BTreeSet<Txid>,
    ancestors: BTreeSet<Txid>,
    ancestor_fee: u64,
    ancestor_weight: u64,
    score: f64,
    dependency_rate: f64,
    used: bool,
    modified: bool,
    relatives_set: bool,
}

/// Queue priority: higher score wins, smaller txid wins a tie.
#[derive(Clone, Copy, PartialEq)]
struct TxPriority {
    score: f64,
    txid: Txid,
}

impl Eq for TxPriority {}

impl Ord for TxPriority {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.score
            .total_cmp(&other.score)
            .then_with(|| other.txid.cmp(&self.txid))
    }
}

impl PartialOrd for TxPriority {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

fn priority_of(pool: &BTreeMap<Txid, AuditTx>, txid: Txid) -> TxPriority {
    TxPriority {
        score: pool[&txid].score,
        txid,
    }
}

fn build_audit_pool(mirror: &BTreeMap<Txid, ThreadTransaction>) -> BTreeMap<Txid, AuditTx> {
    mirror
        .values()
        .map(|tx| {
            let parents = tx
                .vin
                .iter()
                .filter(|parent| **parent != tx.txid && mirror.contains_key(*parent))
                .copied()
                .collect();
            let entry = AuditTx {
                fee: tx.fee,
                weight: tx.weight,
                parents,
                children: BTreeSet::new(),
                ancestors: BTreeSet::new(),
                ancestor_fee: 0,
                ancestor_weight: 0,
                score: 0.0,
                dependency_rate: f64::INFINITY,
                used: false,
                modified: false,
                relatives_set: false,
            };
            (tx.txid, entry)
        })
        .collect()
}

/// One step of the iterative relatives walk.
enum Visit {
    Enter(Txid),
    Fold(Txid),
}

/// Walk the in-mempool ancestors of `txid`, recording child links and the
/// ancestor fee/weight totals that make up its package score.
///
/// The walk is a post-order DFS on an explicit stack: a transaction folds
/// its totals only after its parents have folded theirs, and ancestor
/// chains of any depth stay off the call stack.
fn set_relatives(txid: Txid, pool: &mut BTreeMap<Txid, AuditTx>) {
    let mut visited = BTreeSet::new();
    let mut walk = vec![Visit::Enter(txid)];

    while let Some(step) = walk.pop() {
        match step {
            Visit::Enter(id) => {
                if !visited.insert(id) {
                    continue;
                }
                let Some(tx) = pool.get(&id) else {
                    continue;
                };
                if tx.relatives_set {
                    continue;
                }
                walk.push(Visit::Fold(id));
                for parent in &tx.parents {
                    if !visited.contains(parent) {
                        walk.push(Visit::Enter(*parent));
                    }
                }
            }
            Visit::Fold(id) => fold_relatives(id, pool),
        }
    }
}

/// Fold the (now finished) parents of `txid` into its ancestor set and
/// package totals.
fn fold_relatives(txid: Txid, pool: &mut BTreeMap<Txid, AuditTx>) {
    let parents = match pool.get(&txid) {
        Some(tx) => tx.parents.clone(),
        None => return,
    };

    let mut ancestors = BTreeSet::new();
    for parent_id in parents {
        let Some(parent) = pool.get_mut(&parent_id) else {
            continue;
        };
        parent.children.insert(txid);
        ancestors.insert(parent_id);
        ancestors.extend(parent.ancestors.iter().copied());
    }
    // A pathological reference cycle must not fold a transaction into its
    // own ancestor set.
    ancestors.remove(&txid);

    let mut ancestor_fee = 0u64;
    let mut ancestor_weight = 0u64;
    for id in &ancestors {
        let ancestor = &pool[id];
        ancestor_fee += ancestor.fee;
        ancestor_weight += ancestor.weight;
    }

    let tx = pool.get_mut(&txid).expect("audit entry was just read");
    tx.ancestors = ancestors;
    tx.ancestor_fee = tx.fee + ancestor_fee;
    tx.ancestor_weight = tx.weight + ancestor_weight;
    tx.score = tx.ancestor_fee as f64 / (tx.ancestor_weight as f64 / 4.0);
    tx.relatives_set = true;
}

/// Pop used entries off both queue heads, then take the better of the two.
fn next_candidate(
    stack: &mut Vec<Txid>,
    modified: &mut PriorityQueue<Txid, TxPriority>,
    pool: &BTreeMap<Txid, AuditTx>,
) -> Option<Txid> {
    let stack_head = loop {
        let Some(txid) = stack.last().copied() else {
            break None;
        };
        let tx = &pool[&txid];
        // Re-scored entries live in the modified queue.
        if tx.used || tx.modified {
            stack.pop();
        } else {
            break Some(txid);
        }
    };
    let modified_head = loop {
        let Some(txid) = modified.peek().map(|(txid, _)| *txid) else {
            break None;
        };
        if pool[&txid].used {
            modified.pop();
        } else {
            break Some(txid);
        }
    };

    match (stack_head, modified_head) {
        (None, None) => None,
        (Some(from_stack), None) => {
            stack.pop();
            Some(from_stack)
        }
        (None, Some(from_modified)) => {
            modified.pop();
            Some(from_modified)
        }
        (Some(from_stack), Some(from_modified)) => {
            if priority_of(pool, from_stack) > priority_of(pool, from_modified) {
                stack.pop();
                Some(from_stack)
            } else {
                modified.pop();
                Some(from_modified)
            }
        }
    }
}

/// Select `txid` together with its remaining ancestors into the current
/// block, export the cluster when the package has more than one member, and
/// re-score the descendants left behind. Returns the package weight.
fn select_package(
    txid: Txid,
    pool: &mut BTreeMap<Txid, AuditTx>,
    modified: &mut PriorityQueue<Txid, TxPriority>,
    current: &mut Vec<TemplateTransaction>,
    clusters: &mut BTreeMap<Txid, Vec<Txid>>,
) -> u64 {
    let tx = &pool[&txid];
    let package_rate = tx.dependency_rate.min(tx.score);

    // Ancestors first: within a package the ancestor-set size orders
    // members topologically, with txid breaking ties between siblings.
    let mut members: Vec<(usize, Txid)> = vec![(tx.ancestors.len(), txid)];
    for ancestor_id in &tx.ancestors {
        members.push((pool[ancestor_id].ancestors.len(), *ancestor_id));
    }
    members.sort_unstable();

    let cpfp_root = (members.len() > 1).then_some(txid);
    if members.len() > 1 {
        clusters.insert(txid, members.iter().map(|(_, member)| *member).collect());
    }

    let mut package_weight = 0u64;
    for (_, member_id) in &members {
        let member = pool.get_mut(member_id).expect("package members exist");
        if member.used {
            continue;
        }
        member.used = true;
        if member.modified {
            modified.remove(member_id);
        }
        package_weight += member.weight;
        current.push(TemplateTransaction {
            txid: *member_id,
            effective_fee_per_vsize: Some(package_rate),
            cpfp_root,
            cpfp_checked: true,
        });
    }

    for (_, member_id) in &members {
        update_descendants(*member_id, pool, modified, package_rate);
    }

    package_weight
}

/// Remove a selected ancestor from the remaining descendants' package data
/// and move the re-scored descendants to the modified queue.
fn update_descendants(
    root_id: Txid,
    pool: &mut BTreeMap<Txid, AuditTx>,
    modified: &mut PriorityQueue<Txid, TxPriority>,
    package_rate: f64,
) {
    let root = &pool[&root_id];
    let root_fee = root.fee;
    let root_weight = root.weight;
    let mut stack: Vec<Txid> = root.children.iter().copied().collect();
    let mut visited: BTreeSet<Txid> = stack.iter().copied().collect();

    while let Some(descendant_id) = stack.pop() {
        let Some(tx) = pool.get_mut(&descendant_id) else {
            continue;
        };
        for child in &tx.children {
            if visited.insert(*child) {
                stack.push(*child);
            }
        }

        if tx.ancestors.remove(&root_id) {
            tx.dependency_rate = tx.dependency_rate.min(package_rate);
            tx.ancestor_fee -= root_fee;
            tx.ancestor_weight -= root_weight;
            let old_score = tx.score;
            tx.score = tx.ancestor_fee as f64 / (tx.ancestor_weight as f64 / 4.0);

            if !tx.used && tx.score != old_score {
                tx.modified = true;
                let priority = TxPriority {
                    score: tx.score,
                    txid: descendant_id,
                };
                if tx.score < old_score {
                    modified.push_decrease(descendant_id, priority);
                } else {
                    modified.push_increase(descendant_id, priority);
                }
            }
        }
    }
}
