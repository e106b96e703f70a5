//! Brute-force Hamming matching with ratio test and fallbacks.

use serde::{Deserialize, Serialize};

use crate::feature::keypoint::Descriptors;
use crate::util::math::hamming_bytes;

#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// Correspondence between a query (target) row and a train (base) row.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DMatch {
    pub query: usize,
    pub train: usize,
    pub distance: u32,
}

/// Which rung of the matching ladder produced the final match set.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStage {
    /// Nothing to match (an empty side).
    #[default]
    Skipped,
    Ratio,
    RelaxedRatio,
    CrossCheck,
}

/// Ratio-test ladder settings.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LadderParams {
    pub ratio: f32,
    /// Second ratio tried when the first leaves fewer than `min_matches`.
    pub relaxed_ratio: Option<f32>,
    /// Mutual-best fallback cap; `None` disables the rung.
    pub cross_check_limit: Option<usize>,
    pub min_matches: usize,
}

#[derive(Clone, Copy, Debug)]
struct Neighbors {
    best: DMatch,
    second: Option<u32>,
}

fn nearest_two(query: usize, row: &[u8], train: &Descriptors) -> Option<Neighbors> {
    let mut best: Option<DMatch> = None;
    let mut second: Option<u32> = None;
    for (t, candidate) in train.iter().enumerate() {
        let d = hamming_bytes(row, candidate);
        match best {
            Some(b) if d >= b.distance => {
                if second.map_or(true, |s| d < s) {
                    second = Some(d);
                }
            }
            _ => {
                second = best.map(|b| b.distance);
                best = Some(DMatch {
                    query,
                    train: t,
                    distance: d,
                });
            }
        }
    }
    best.map(|best| Neighbors { best, second })
}

/// Two nearest train rows for every query row, in query order.
fn knn2(query: &Descriptors, train: &Descriptors) -> Vec<Neighbors> {
    #[cfg(feature = "rayon")]
    let found: Vec<Option<Neighbors>> = (0..query.rows())
        .into_par_iter()
        .map(|q| query.row(q).and_then(|row| nearest_two(q, row, train)))
        .collect();

    #[cfg(not(feature = "rayon"))]
    let found: Vec<Option<Neighbors>> = query
        .iter()
        .enumerate()
        .map(|(q, row)| nearest_two(q, row, train))
        .collect();

    found.into_iter().flatten().collect()
}

/// Keeps a match iff `d1 < ratio * d2`. Queries with a single neighbour
/// are ambiguous-free but unverifiable and are dropped.
fn ratio_filter(neighbors: &[Neighbors], ratio: f32) -> Vec<DMatch> {
    neighbors
        .iter()
        .filter_map(|n| {
            let second = n.second?;
            ((n.best.distance as f32) < ratio * second as f32).then_some(n.best)
        })
        .collect()
}

/// Mutual best matches sorted by distance, at most `limit`.
pub fn cross_check(query: &Descriptors, train: &Descriptors, limit: usize) -> Vec<DMatch> {
    let forward = knn2(query, train);
    let backward = knn2(train, query);
    let mut matches: Vec<DMatch> = forward
        .iter()
        .filter(|n| {
            backward
                .get(n.best.train)
                .is_some_and(|back| back.best.train == n.best.query)
        })
        .map(|n| n.best)
        .collect();
    matches.sort_by(|a, b| a.distance.cmp(&b.distance).then(a.query.cmp(&b.query)));
    matches.truncate(limit);
    matches
}

/// Runs the ratio test, then the fallback rungs while too few matches
/// survive. Returns the last rung's matches.
pub fn match_descriptors(
    query: &Descriptors,
    train: &Descriptors,
    params: &LadderParams,
) -> (Vec<DMatch>, MatchStage) {
    if query.is_empty() || train.is_empty() {
        return (Vec::new(), MatchStage::Skipped);
    }
    let neighbors = knn2(query, train);

    let mut matches = ratio_filter(&neighbors, params.ratio);
    let mut stage = MatchStage::Ratio;
    if matches.len() >= params.min_matches {
        return (matches, stage);
    }

    if let Some(relaxed) = params.relaxed_ratio {
        matches = ratio_filter(&neighbors, relaxed);
        stage = MatchStage::RelaxedRatio;
        if matches.len() >= params.min_matches {
            return (matches, stage);
        }
    }

    if let Some(limit) = params.cross_check_limit {
        let mutual = cross_check(query, train, limit);
        if mutual.len() > matches.len() {
            return (mutual, MatchStage::CrossCheck);
        }
    }
    (matches, stage)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::keypoint::DESCRIPTOR_BYTES;

    fn row(fill: u8) -> [u8; DESCRIPTOR_BYTES] {
        [fill; DESCRIPTOR_BYTES]
    }

    fn params(min_matches: usize) -> LadderParams {
        LadderParams {
            ratio: 0.75,
            relaxed_ratio: Some(0.9),
            cross_check_limit: Some(50),
            min_matches,
        }
    }

    #[test]
    fn distinct_rows_pass_ratio_test() {
        let train = Descriptors::from_rows(&[row(0x00), row(0xff), row(0x0f)]);
        let query = Descriptors::from_rows(&[row(0xff), row(0x00)]);
        let (matches, stage) = match_descriptors(&query, &train, &params(1));
        assert_eq!(stage, MatchStage::Ratio);
        assert_eq!(
            matches.iter().map(|m| (m.query, m.train)).collect::<Vec<_>>(),
            vec![(0, 1), (1, 0)]
        );
    }

    #[test]
    fn ambiguous_rows_fall_back_to_cross_check() {
        // Two identical train rows make every ratio test fail.
        let train = Descriptors::from_rows(&[row(0x01), row(0x01)]);
        let query = Descriptors::from_rows(&[row(0x01)]);
        let (matches, stage) = match_descriptors(&query, &train, &params(1));
        assert_eq!(stage, MatchStage::CrossCheck);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].distance, 0);
    }

    #[test]
    fn empty_side_is_skipped() {
        let train = Descriptors::default();
        let query = Descriptors::from_rows(&[row(1)]);
        let (matches, stage) = match_descriptors(&query, &train, &params(1));
        assert!(matches.is_empty());
        assert_eq!(stage, MatchStage::Skipped);
    }
}
