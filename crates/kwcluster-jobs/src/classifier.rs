//! Result-overlap deduplication of keyword records.
//!
//! Records are scanned in `sequence_index` order. Each still-active record is
//! compared with every later active record; when their result links share at
//! least `threshold` URLs the two are merged. The record with the larger
//! current search volume wins (earlier input order on ties) and absorbs the
//! loser. A record that loses stops being scanned immediately. Whatever is
//! still active at the end becomes primary.
//!
//! The scan works over a stable arena of positions with an `active` flag per
//! position instead of removing elements from a live list. Merge decisions are
//! made first against a private volume ledger, then applied to the records.

use std::cmp::Reverse;
use std::collections::HashSet;

use tracing::debug;

use kwcluster_core::{defaults, Classification, KeywordRecord, MergedKeyword};

/// Counts from one classification pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClassificationSummary {
    pub primary_count: usize,
    pub auxiliary_count: usize,
    pub merge_count: usize,
}

/// One absorption, as arena positions.
#[derive(Debug, Clone, Copy)]
struct Merge {
    winner: usize,
    loser: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct SimilarityClassifier {
    threshold: usize,
}

impl Default for SimilarityClassifier {
    fn default() -> Self {
        Self::new(defaults::OVERLAP_THRESHOLD)
    }
}

impl SimilarityClassifier {
    /// `threshold` is the minimum shared-link count; values below 1 are raised
    /// to 1 so records without links can never merge.
    pub fn new(threshold: usize) -> Self {
        Self {
            threshold: threshold.max(1),
        }
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Classify `records` in place.
    ///
    /// Slice order does not matter; the scan follows `sequence_index`.
    pub fn classify(&self, records: &mut [KeywordRecord]) -> ClassificationSummary {
        let mut order: Vec<usize> = (0..records.len()).collect();
        order.sort_by_key(|&k| records[k].sequence_index);

        let (merges, active) = self.plan(records, &order);

        for merge in &merges {
            absorb(records, order[merge.winner], order[merge.loser]);
        }

        let mut summary = ClassificationSummary {
            merge_count: merges.len(),
            ..Default::default()
        };
        for (pos, &k) in order.iter().enumerate() {
            if active[pos] {
                records[k].classification = Classification::Primary;
                summary.primary_count += 1;
            } else {
                records[k].classification = Classification::Auxiliary;
                summary.auxiliary_count += 1;
            }
        }
        summary
    }

    /// Decide every merge without touching the records.
    fn plan(&self, records: &[KeywordRecord], order: &[usize]) -> (Vec<Merge>, Vec<bool>) {
        let n = order.len();
        let links: Vec<HashSet<&str>> = order.iter().map(|&k| records[k].link_set()).collect();
        let mut volume: Vec<i64> = order.iter().map(|&k| records[k].search_volume).collect();
        let rank = |pos: usize, volume: &[i64]| {
            (volume[pos], Reverse(records[order[pos]].sequence_index))
        };

        let mut active = vec![true; n];
        let mut merges = Vec::new();

        for i in 0..n {
            if !active[i] || links[i].len() < self.threshold {
                continue;
            }
            for j in (i + 1)..n {
                if !active[j] {
                    continue;
                }
                let overlap = links[i].intersection(&links[j]).count();
                if overlap < self.threshold {
                    continue;
                }

                let (winner, loser) = if rank(i, &volume) > rank(j, &volume) {
                    (i, j)
                } else {
                    (j, i)
                };
                debug!(
                    subsystem = "jobs",
                    component = "classifier",
                    winner = %records[order[winner]].keyword,
                    loser = %records[order[loser]].keyword,
                    overlap,
                    "Merging keywords"
                );
                volume[winner] = volume[winner].saturating_add(volume[loser]);
                active[loser] = false;
                merges.push(Merge { winner, loser });

                if loser == i {
                    break;
                }
            }
        }
        (merges, active)
    }
}

/// Move `loser` (and anything it already absorbed) into `winner`.
fn absorb(records: &mut [KeywordRecord], winner: usize, loser: usize) {
    let loser_record = &mut records[loser];
    let entry = MergedKeyword {
        keyword: loser_record.keyword.clone(),
        original_search_volume: loser_record.original_search_volume,
    };
    let inherited = std::mem::take(&mut loser_record.merged_keywords);
    let moved_volume = loser_record.search_volume;
    loser_record.search_volume = loser_record.original_search_volume;

    let winner_record = &mut records[winner];
    winner_record.search_volume = winner_record.search_volume.saturating_add(moved_volume);
    winner_record.merged_keywords.push(entry);
    winner_record.merged_keywords.extend(inherited);
}
