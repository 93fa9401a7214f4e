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

//! Effective-fee statistics shared by both projection paths, and the fee
//! estimates derived from the published projection.

use itertools::Itertools;
use serde::Serialize;

use crate::{
    config::{DEFAULT_MIN_FEE, FEE_RANGE_PERCENTILES, RECOMMENDED_FEE_PERCENTILE},
    tx::{MempoolBlock, MempoolTransaction, StrippedTransaction},
};

/// A block is considered nearly empty below this vsize when estimating fees.
const HALF_BLOCK_VSIZE: f64 = 500_000.0;
/// Vsize of a weight-saturated block.
const FULL_BLOCK_VSIZE: f64 = 1_000_000.0;

/// Median fee and fee range of one projected block.
#[derive(Debug, Clone, PartialEq)]
pub struct FeeStatistics {
    pub median_fee: f64,
    pub fee_range: Vec<f64>,
}

/// Fee estimates derived from the current projection.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendedFees {
    pub fastest_fee: f64,
    pub half_hour_fee: f64,
    pub hour_fee: f64,
    pub economy_fee: f64,
    pub minimum_fee: f64,
}

/// Pick the `percentile` (0..=100) entry of the ascending-sorted `rates`.
///
/// The 50th percentile averages the two middle entries for even-sized
/// input; all others use the floored rank.
pub fn percentile(sorted_rates: &[f64], percentile: f64) -> f64 {
    if sorted_rates.is_empty() {
        return 0.0;
    }
    if percentile == 50.0 {
        return median_from_sorted(sorted_rates);
    }
    let index = (sorted_rates.len() as f64 * percentile / 100.0).floor() as usize;
    sorted_rates[index.min(sorted_rates.len() - 1)]
}

fn median_from_sorted(sorted: &[f64]) -> f64 {
    let n = sorted.len();
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    }
}

/// Compute the fee statistics of a packed block over the effective fee
/// rates of all its transactions.
pub fn effective_fee_statistics<'a>(
    txs: impl Iterator<Item = &'a MempoolTransaction>,
) -> FeeStatistics {
    let sorted: Vec<f64> = txs
        .map(|tx| tx.effective_fee_per_vsize)
        .sorted_by(|a, b| a.total_cmp(b))
        .collect();
    if sorted.is_empty() {
        return FeeStatistics {
            median_fee: 0.0,
            fee_range: Vec::new(),
        };
    }
    FeeStatistics {
        median_fee: percentile(&sorted, RECOMMENDED_FEE_PERCENTILE),
        fee_range: FEE_RANGE_PERCENTILES.iter().map(|p| percentile(&sorted, *p)).collect(),
    }
}

/// Project a mempool record into its compact client-facing form.
pub fn strip_transaction(tx: &MempoolTransaction) -> StrippedTransaction {
    StrippedTransaction {
        txid: tx.txid,
        fee: tx.fee,
        vsize: tx.vsize(),
        rate: Some(tx.effective_fee_per_vsize),
    }
}

/// Derive fee estimates from the projected block summaries.
///
/// Estimates beyond the first block are blended with the preceding raw
/// estimate; the `DEFAULT_MIN_FEE` floor clamps only the published fields,
/// never the values fed into the next blend. A nearly empty target block
/// drags its estimate down to the floor so that clients are not told to
/// outbid a block that would confirm them anyway; a last block between
/// half full and full scales its median by how full it is.
pub fn recommended_fees(blocks: &[MempoolBlock]) -> RecommendedFees {
    let fastest = damped_median(blocks.first(), blocks.get(1), None);
    let half_hour = damped_median(blocks.get(1), blocks.get(2), Some(fastest));
    let hour = damped_median(blocks.get(2), blocks.get(3), Some(half_hour));
    let economy = (2.0 * DEFAULT_MIN_FEE).min(hour).max(DEFAULT_MIN_FEE);
    RecommendedFees {
        fastest_fee: fastest.max(DEFAULT_MIN_FEE),
        half_hour_fee: half_hour.max(DEFAULT_MIN_FEE),
        hour_fee: hour.max(DEFAULT_MIN_FEE),
        economy_fee: economy,
        minimum_fee: DEFAULT_MIN_FEE,
    }
}

fn damped_median(
    block: Option<&MempoolBlock>,
    next_block: Option<&MempoolBlock>,
    previous: Option<f64>,
) -> f64 {
    let Some(block) = block else {
        return DEFAULT_MIN_FEE;
    };
    let use_fee = match previous {
        Some(previous) => (block.median_fee + previous) / 2.0,
        None => block.median_fee,
    };
    if block.block_vsize <= HALF_BLOCK_VSIZE {
        return DEFAULT_MIN_FEE;
    }
    if block.block_vsize <= FULL_BLOCK_VSIZE && next_block.is_none() {
        let multiplier = (block.block_vsize - HALF_BLOCK_VSIZE) / HALF_BLOCK_VSIZE;
        return (use_fee * multiplier).round().max(DEFAULT_MIN_FEE);
    }
    use_fee
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::tx::Txid;

    fn block(median_fee: f64, block_vsize: f64) -> MempoolBlock {
        MempoolBlock {
            block_size: 0,
            block_vsize,
            n_tx: 0,
            total_fees: 0,
            median_fee,
            fee_range: Vec::new(),
        }
    }

    #[rstest]
    #[case(&[1.0, 2.0, 3.0], 50.0, 2.0)]
    #[case(&[1.0, 2.0, 3.0, 4.0], 50.0, 2.5)]
    #[case(&[1.0, 2.0, 3.0, 4.0], 0.0, 1.0)]
    #[case(&[1.0, 2.0, 3.0, 4.0], 100.0, 4.0)]
    #[case(&[1.0, 2.0, 3.0, 4.0], 75.0, 4.0)]
    #[case(&[10.0], 90.0, 10.0)]
    fn percentile_selection(#[case] rates: &[f64], #[case] p: f64, #[case] expected: f64) {
        assert_eq!(percentile(rates, p), expected);
    }

    #[test]
    fn percentile_of_empty_is_zero() {
        assert_eq!(percentile(&[], 50.0), 0.0);
    }

    #[test]
    fn statistics_over_effective_rates() {
        let txs: Vec<_> = [(1000, 400), (3000, 400), (2000, 400)]
            .iter()
            .enumerate()
            .map(|(i, (fee, weight))| {
                MempoolTransaction::new(Txid::new([i as u8; 32]), *fee, *weight, 100, vec![])
            })
            .collect();

        let stats = effective_fee_statistics(txs.iter());
        assert_eq!(stats.median_fee, 20.0);
        assert_eq!(stats.fee_range.len(), FEE_RANGE_PERCENTILES.len());
        assert_eq!(stats.fee_range[0], 10.0);
        assert_eq!(*stats.fee_range.last().unwrap(), 30.0);
    }

    #[test]
    fn statistics_of_empty_block() {
        let stats = effective_fee_statistics(std::iter::empty());
        assert_eq!(stats.median_fee, 0.0);
        assert!(stats.fee_range.is_empty());
    }

    #[test]
    fn strip_keeps_the_effective_rate() {
        let mut tx = MempoolTransaction::new(Txid::new([9; 32]), 1000, 400, 250, vec![]);
        tx.effective_fee_per_vsize = 12.5;
        let stripped = strip_transaction(&tx);
        assert_eq!(stripped.txid, tx.txid);
        assert_eq!(stripped.fee, 1000);
        assert_eq!(stripped.vsize, 100.0);
        assert_eq!(stripped.rate, Some(12.5));
    }

    #[test]
    fn no_projection_means_floor_fees() {
        let fees = recommended_fees(&[]);
        assert_eq!(fees.fastest_fee, DEFAULT_MIN_FEE);
        assert_eq!(fees.half_hour_fee, DEFAULT_MIN_FEE);
        assert_eq!(fees.hour_fee, DEFAULT_MIN_FEE);
        assert_eq!(fees.economy_fee, DEFAULT_MIN_FEE);
    }

    #[test]
    fn saturated_blocks_report_their_medians() {
        let blocks = vec![
            block(30.0, 1_000_000.0),
            block(20.0, 1_000_000.0),
            block(10.0, 1_000_000.0),
            block(5.0, 1_000_000.0),
        ];
        let fees = recommended_fees(&blocks);
        assert_eq!(fees.fastest_fee, 30.0);
        assert_eq!(fees.half_hour_fee, 25.0);
        assert_eq!(fees.hour_fee, 17.5);
        assert_eq!(fees.economy_fee, 2.0);
        assert_eq!(fees.minimum_fee, DEFAULT_MIN_FEE);
    }

    #[test]
    fn nearly_empty_next_block_is_damped_to_the_floor() {
        let blocks = vec![block(40.0, 300_000.0)];
        let fees = recommended_fees(&blocks);
        assert_eq!(fees.fastest_fee, DEFAULT_MIN_FEE);
    }

    #[test]
    fn partially_filled_last_block_scales_its_median() {
        let blocks = vec![block(40.0, 750_000.0)];
        let fees = recommended_fees(&blocks);
        // Half way between the damping thresholds: half the median.
        assert_eq!(fees.fastest_fee, 20.0);
    }
}
