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

//! The projection data model: transaction records in their mempool-resident,
//! worker, and client-facing forms, plus projected block summaries and the
//! deltas between successive projections.

use std::{cmp::Ordering, collections::BTreeMap, fmt, str::FromStr, time::Duration};

use serde::{Serialize, Serializer};

use crate::error::TxidError;

/// Transaction identifier, kept as raw bytes and rendered as lowercase hex.
///
/// The derived byte-wise ordering coincides with the lexicographic ordering
/// of the lowercase hex rendering, which the deterministic sorts rely on.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Txid([u8; 32]);

impl Txid {
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for Txid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for Txid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Txid({self})")
    }
}

impl FromStr for Txid {
    type Err = TxidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        utils::ensure!(s.len() == 64, TxidError::InvalidLength(s.len()));
        let bytes = hex::decode(s)?;
        let bytes =
            <[u8; 32]>::try_from(bytes.as_slice()).map_err(|_| TxidError::InvalidLength(s.len()))?;
        Ok(Self(bytes))
    }
}

impl Serialize for Txid {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Order `(rate, txid)` pairs by rate descending, breaking ties by txid
/// ascending. Every ordering decision in the engine goes through this so
/// that two projections of the same mempool are identical.
pub fn cmp_rate_desc(a_rate: f64, a_txid: Txid, b_rate: f64, b_txid: Txid) -> Ordering {
    b_rate.total_cmp(&a_rate).then_with(|| a_txid.cmp(&b_txid))
}

/// Compact `{txid, fee, weight}` summary of a CPFP cluster member.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct TxSummary {
    pub txid: Txid,
    pub fee: u64,
    pub weight: u64,
}

impl TxSummary {
    pub fn fee_per_vsize(&self) -> f64 {
        self.fee as f64 / (self.weight as f64 / 4.0)
    }
}

/// A transaction's mid-point vsize offset within its projected block.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct BlockPosition {
    pub block: usize,
    pub vsize: f64,
}

/// The full mempool-resident transaction record.
///
/// The `fee_per_vsize` rate is fixed at construction; the projection paths
/// maintain `effective_fee_per_vsize`, the relative lists, and `position`
/// as side effects of each run.
#[derive(Clone, Debug)]
pub struct MempoolTransaction {
    pub txid: Txid,
    /// Fee in satoshis.
    pub fee: u64,
    /// Weight units: 4x base bytes plus witness bytes.
    pub weight: u64,
    /// Serialized size in bytes.
    pub size: u64,
    /// Txids of the transactions whose outputs this one spends.
    pub vin: Vec<Txid>,
    pub fee_per_vsize: f64,
    pub effective_fee_per_vsize: f64,
    pub ancestors: Vec<TxSummary>,
    pub descendants: Vec<TxSummary>,
    pub best_descendant: Option<TxSummary>,
    pub cpfp_checked: bool,
    pub position: Option<BlockPosition>,
    /// Tombstone set by the ingestion layer; bearers are excluded from
    /// projection inputs.
    pub delete_after: Option<Duration>,
}

impl MempoolTransaction {
    pub fn new(txid: Txid, fee: u64, weight: u64, size: u64, vin: Vec<Txid>) -> Self {
        let fee_per_vsize = fee as f64 / (weight as f64 / 4.0);
        Self {
            txid,
            fee,
            weight,
            size,
            vin,
            fee_per_vsize,
            effective_fee_per_vsize: fee_per_vsize,
            ancestors: Vec::new(),
            descendants: Vec::new(),
            best_descendant: None,
            cpfp_checked: false,
            position: None,
            delete_after: None,
        }
    }

    pub fn vsize(&self) -> f64 {
        self.weight as f64 / 4.0
    }

    pub fn summary(&self) -> TxSummary {
        TxSummary {
            txid: self.txid,
            fee: self.fee,
            weight: self.weight,
        }
    }
}

/// The unconfirmed transaction set, keyed by txid.
pub type Mempool = BTreeMap<Txid, MempoolTransaction>;

/// The stripped-down record the template worker operates on. Snapshots of
/// these are sent to the worker by value; the worker never sees the full
/// mempool records.
#[derive(Clone, Debug, PartialEq)]
pub struct ThreadTransaction {
    pub txid: Txid,
    pub fee: u64,
    pub weight: u64,
    pub fee_per_vsize: f64,
    pub effective_fee_per_vsize: f64,
    pub vin: Vec<Txid>,
}

impl ThreadTransaction {
    pub fn from_mempool_tx(tx: &MempoolTransaction) -> Self {
        Self {
            txid: tx.txid,
            fee: tx.fee,
            weight: tx.weight,
            fee_per_vsize: tx.fee_per_vsize,
            effective_fee_per_vsize: tx.effective_fee_per_vsize,
            vin: tx.vin.clone(),
        }
    }
}

/// One entry of a worker-produced block template.
#[derive(Clone, Debug, PartialEq)]
pub struct TemplateTransaction {
    pub txid: Txid,
    pub effective_fee_per_vsize: Option<f64>,
    /// Root of the CPFP cluster this transaction was selected with, if any.
    pub cpfp_root: Option<Txid>,
    pub cpfp_checked: bool,
}

/// The compact client-facing projection of a transaction.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StrippedTransaction {
    pub txid: Txid,
    pub fee: u64,
    pub vsize: f64,
    /// Effective fee rate at the time the snapshot was taken.
    pub rate: Option<f64>,
}

/// Summary of one projected block.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MempoolBlock {
    pub block_size: u64,
    pub block_vsize: f64,
    pub n_tx: usize,
    pub total_fees: u64,
    pub median_fee: f64,
    pub fee_range: Vec<f64>,
}

/// A projected block together with its contents: the complete txid list in
/// packing order and the client-facing stripped subset.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MempoolBlockWithTransactions {
    pub block_size: u64,
    pub block_vsize: f64,
    pub n_tx: usize,
    pub total_fees: u64,
    pub median_fee: f64,
    pub fee_range: Vec<f64>,
    pub transaction_ids: Vec<Txid>,
    pub transactions: Vec<StrippedTransaction>,
}

impl MempoolBlockWithTransactions {
    pub fn summary(&self) -> MempoolBlock {
        MempoolBlock {
            block_size: self.block_size,
            block_vsize: self.block_vsize,
            n_tx: self.n_tx,
            total_fees: self.total_fees,
            median_fee: self.median_fee,
            fee_range: self.fee_range.clone(),
        }
    }
}

/// A rate change of a transaction that stayed in the same projected block.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TxRateChange {
    pub txid: Txid,
    pub rate: Option<f64>,
}

/// Per-block difference between two successive projections.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct MempoolBlockDelta {
    pub added: Vec<StrippedTransaction>,
    pub removed: Vec<Txid>,
    pub changed: Vec<TxRateChange>,
}

impl MempoolBlockDelta {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn txid_hex_round_trip() {
        let hex_id = "2a000000dc54bcdc99390c01cbc27bed78693233e54a9eda6cd316d87ed8d18f";
        let txid = Txid::from_str(hex_id).unwrap();
        assert_eq!(txid.to_string(), hex_id);
        assert_eq!(txid.as_bytes()[0], 0x2a);
    }

    #[test]
    fn txid_rejects_bad_input() {
        let not_hex = "zz".repeat(32);
        assert!(matches!(Txid::from_str(&not_hex), Err(TxidError::Hex(_))));
        assert_eq!(Txid::from_str("2a2a"), Err(TxidError::InvalidLength(4)));
    }

    #[test]
    fn rate_ordering_breaks_ties_by_txid() {
        let lo = Txid::new([1; 32]);
        let hi = Txid::new([2; 32]);
        assert_eq!(cmp_rate_desc(2.0, hi, 1.0, lo), Ordering::Less);
        assert_eq!(cmp_rate_desc(1.0, hi, 2.0, lo), Ordering::Greater);
        assert_eq!(cmp_rate_desc(1.0, lo, 1.0, hi), Ordering::Less);
        assert_eq!(cmp_rate_desc(1.0, hi, 1.0, lo), Ordering::Greater);
    }

    #[test]
    fn fee_rates_allow_fractional_vsize() {
        let tx = MempoolTransaction::new(Txid::new([7; 32]), 300, 600, 150, vec![]);
        assert_eq!(tx.vsize(), 150.0);
        assert_eq!(tx.fee_per_vsize, 2.0);
        assert_eq!(tx.effective_fee_per_vsize, 2.0);
    }
}
