//! Sorted set data structure: dual-indexed by member and by (score, member).
//!
//! The member index is a `BTreeMap` so lexicographic ranges come for free;
//! the score index orders entries by score and breaks ties by member bytes.
//! A [`RankTree`] over the same entries answers rank queries.

mod rank_tree;

use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;

use bytes::Bytes;
use ordered_float::OrderedFloat;

use rank_tree::RankTree;

/// Member position inside the score index. The sentinels sort before and
/// after every real member sharing the same score, which turns inclusive and
/// exclusive score bounds into plain half-open ranges.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum Slot {
    BeforeAll,
    Member(Bytes),
    AfterAll,
}

type ScoreKey = (OrderedFloat<f64>, Slot);

/// One end of a score range, e.g. `5`, `(5` or `-inf`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreBound {
    pub value: f64,
    pub exclusive: bool,
}

impl ScoreBound {
    pub fn inclusive(value: f64) -> Self {
        ScoreBound {
            value,
            exclusive: false,
        }
    }

    pub fn exclusive(value: f64) -> Self {
        ScoreBound {
            value,
            exclusive: true,
        }
    }

    fn lower_key(&self) -> ScoreKey {
        let slot = if self.exclusive {
            Slot::AfterAll
        } else {
            Slot::BeforeAll
        };
        (OrderedFloat(self.value), slot)
    }

    fn upper_key(&self) -> ScoreKey {
        let slot = if self.exclusive {
            Slot::BeforeAll
        } else {
            Slot::AfterAll
        };
        (OrderedFloat(self.value), slot)
    }
}

/// One end of a lexicographic range: `-`, `+`, `[member` or `(member`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LexBound {
    Min,
    Max,
    Inclusive(Bytes),
    Exclusive(Bytes),
}

#[derive(Debug, Clone, Default)]
pub struct SortedSet {
    by_member: BTreeMap<Bytes, f64>,
    by_score: BTreeSet<ScoreKey>,
    ranks: RankTree<ScoreKey>,
}

impl PartialEq for SortedSet {
    fn eq(&self, other: &Self) -> bool {
        self.by_member == other.by_member
    }
}

impl SortedSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.by_member.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_member.is_empty()
    }

    pub fn contains(&self, member: &[u8]) -> bool {
        self.by_member.contains_key(member)
    }

    pub fn score(&self, member: &[u8]) -> Option<f64> {
        self.by_member.get(member).copied()
    }

    /// Inserts `member` or updates its score. Returns true if the member
    /// was not present before.
    pub fn add(&mut self, member: Bytes, score: f64) -> bool {
        let old_score = self.by_member.insert(member.clone(), score);
        if let Some(old_score) = old_score {
            let old_key = (OrderedFloat(old_score), Slot::Member(member.clone()));
            self.by_score.remove(&old_key);
            self.ranks.remove(&old_key);
        }
        let key = (OrderedFloat(score), Slot::Member(member));
        self.by_score.insert(key.clone());
        self.ranks.insert(key);
        old_score.is_none()
    }

    pub fn remove(&mut self, member: &[u8]) -> bool {
        match self.by_member.remove(member) {
            Some(score) => {
                let key = (OrderedFloat(score), Slot::Member(Bytes::copy_from_slice(member)));
                self.by_score.remove(&key);
                self.ranks.remove(&key);
                true
            }
            None => false,
        }
    }

    /// 0-based position of `member` in (score, member) order.
    pub fn rank(&self, member: &[u8]) -> Option<usize> {
        let score = self.score(member)?;
        let key = (
            OrderedFloat(score),
            Slot::Member(Bytes::copy_from_slice(member)),
        );
        Some(self.ranks.rank(&key))
    }

    /// Members in (score, member) order.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (&Bytes, f64)> + '_ {
        self.by_score.iter().filter_map(|(score, slot)| match slot {
            Slot::Member(member) => Some((member, score.0)),
            _ => None,
        })
    }

    /// Members with their scores, in member order.
    pub fn items(&self) -> impl Iterator<Item = (&Bytes, f64)> + '_ {
        self.by_member.iter().map(|(member, score)| (member, *score))
    }

    pub fn count_by_score(&self, lower: &ScoreBound, upper: &ScoreBound) -> usize {
        self.score_range(lower, upper).count()
    }

    pub fn range_by_score(
        &self,
        lower: &ScoreBound,
        upper: &ScoreBound,
        reverse: bool,
    ) -> Vec<(Bytes, f64)> {
        let entries = self.score_range(lower, upper);
        if reverse {
            entries.rev().collect()
        } else {
            entries.collect()
        }
    }

    /// Members between ranks `start` and `stop` inclusive. Negative indices
    /// count from the end; out-of-order ranges are empty.
    pub fn range_by_rank(&self, start: i64, stop: i64, reverse: bool) -> Vec<(Bytes, f64)> {
        let Some((start, stop)) = fix_range(start, stop, self.len()) else {
            return Vec::new();
        };
        let take = stop - start;
        let first = if reverse { self.len() - 1 - start } else { start };
        let Some(first) = self.ranks.select(first).cloned() else {
            return Vec::new();
        };
        let entries = |(score, slot): &ScoreKey| match slot {
            Slot::Member(member) => Some((member.clone(), score.0)),
            _ => None,
        };
        if reverse {
            self.by_score.range(..=first).rev().filter_map(entries).take(take).collect()
        } else {
            self.by_score.range(first..).filter_map(entries).take(take).collect()
        }
    }

    pub fn range_by_lex(&self, lower: &LexBound, upper: &LexBound, reverse: bool) -> Vec<Bytes> {
        let Some(range) = lex_range(lower, upper) else {
            return Vec::new();
        };
        let members = self
            .by_member
            .range::<[u8], _>(range)
            .map(|(member, _)| member.clone());
        if reverse {
            members.rev().collect()
        } else {
            members.collect()
        }
    }

    pub fn lex_count(&self, lower: &LexBound, upper: &LexBound) -> usize {
        match lex_range(lower, upper) {
            Some(range) => self.by_member.range::<[u8], _>(range).count(),
            None => 0,
        }
    }

    fn score_range(
        &self,
        lower: &ScoreBound,
        upper: &ScoreBound,
    ) -> impl DoubleEndedIterator<Item = (Bytes, f64)> + '_ {
        let lower = lower.lower_key();
        let upper = upper.upper_key();
        let range = if lower < upper {
            Some(self.by_score.range(lower..upper))
        } else {
            None
        };
        range.into_iter().flatten().filter_map(|(score, slot)| match slot {
            Slot::Member(member) => Some((member.clone(), score.0)),
            _ => None,
        })
    }
}

/// Resolves a `[start, stop]` index pair against `length` into a half-open
/// range, or `None` if it selects nothing.
pub fn fix_range(start: i64, stop: i64, length: usize) -> Option<(usize, usize)> {
    let length = length as i64;
    let start = if start < 0 { (start + length).max(0) } else { start };
    let stop = if stop < 0 { stop + length } else { stop };
    if start > stop || start >= length {
        return None;
    }
    let stop = stop.min(length - 1);
    Some((start as usize, stop as usize + 1))
}

fn lex_range<'a>(lower: &'a LexBound, upper: &'a LexBound) -> Option<(Bound<&'a [u8]>, Bound<&'a [u8]>)> {
    let lower = match lower {
        LexBound::Min => Bound::Unbounded,
        LexBound::Max => return None,
        LexBound::Inclusive(value) => Bound::Included(value.as_ref()),
        LexBound::Exclusive(value) => Bound::Excluded(value.as_ref()),
    };
    let upper = match upper {
        LexBound::Min => return None,
        LexBound::Max => Bound::Unbounded,
        LexBound::Inclusive(value) => Bound::Included(value.as_ref()),
        LexBound::Exclusive(value) => Bound::Excluded(value.as_ref()),
    };

    let endpoints = |bound: &Bound<&'a [u8]>| match bound {
        Bound::Included(value) => Some((*value, false)),
        Bound::Excluded(value) => Some((*value, true)),
        Bound::Unbounded => None,
    };
    if let (Some((low, low_excluded)), Some((high, high_excluded))) =
        (endpoints(&lower), endpoints(&upper))
    {
        if low > high || (low == high && (low_excluded || high_excluded)) {
            return None;
        }
    }
    Some((lower, upper))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn zset(entries: &[(&'static str, f64)]) -> SortedSet {
        let mut set = SortedSet::new();
        for (member, score) in entries {
            set.add(Bytes::from_static(member.as_bytes()), *score);
        }
        set
    }

    fn members(entries: Vec<(Bytes, f64)>) -> Vec<Bytes> {
        entries.into_iter().map(|(member, _)| member).collect()
    }

    fn b(value: &'static str) -> Bytes {
        Bytes::from_static(value.as_bytes())
    }

    #[test]
    fn test_add_update_and_remove() {
        let mut set = zset(&[("a", 1.0), ("b", 2.0)]);

        assert!(!set.add(b("a"), 3.0));
        assert!(set.add(b("c"), 0.5));
        assert_eq!(set.score(b"a"), Some(3.0));
        assert_eq!(members(set.range_by_rank(0, -1, false)), vec![b("c"), b("b"), b("a")]);

        assert!(set.remove(b"b"));
        assert!(!set.remove(b"b"));
        assert_eq!(set.len(), 2);
        assert_eq!(set.rank(b"a"), Some(1));
        assert_eq!(set.rank(b"b"), None);
    }

    #[test]
    fn test_ties_break_by_member() {
        let set = zset(&[("c", 1.0), ("a", 1.0), ("b", 1.0)]);

        assert_eq!(members(set.range_by_rank(0, -1, false)), vec![b("a"), b("b"), b("c")]);
        assert_eq!(members(set.range_by_rank(0, -1, true)), vec![b("c"), b("b"), b("a")]);
    }

    #[test]
    fn test_range_by_score_bounds() {
        let set = zset(&[("a", 1.0), ("b", 2.0), ("c", 3.0), ("d", 3.0)]);
        let test_cases = vec![
            (ScoreBound::inclusive(2.0), ScoreBound::inclusive(3.0), vec!["b", "c", "d"]),
            (ScoreBound::exclusive(2.0), ScoreBound::inclusive(3.0), vec!["c", "d"]),
            (ScoreBound::inclusive(1.0), ScoreBound::exclusive(3.0), vec!["a", "b"]),
            (
                ScoreBound::inclusive(f64::NEG_INFINITY),
                ScoreBound::inclusive(f64::INFINITY),
                vec!["a", "b", "c", "d"],
            ),
            (ScoreBound::inclusive(3.0), ScoreBound::inclusive(1.0), vec![]),
            (ScoreBound::exclusive(2.0), ScoreBound::exclusive(2.0), vec![]),
        ];

        for (lower, upper, expected) in test_cases {
            let expected: Vec<Bytes> = expected.into_iter().map(b).collect();
            assert_eq!(
                members(set.range_by_score(&lower, &upper, false)),
                expected,
                "range {:?}..{:?}",
                lower,
                upper
            );
            assert_eq!(set.count_by_score(&lower, &upper), expected.len());

            let mut reversed = expected.clone();
            reversed.reverse();
            assert_eq!(members(set.range_by_score(&lower, &upper, true)), reversed);
        }
    }

    #[test]
    fn test_range_by_rank_clamps() {
        let set = zset(&[("a", 1.0), ("b", 2.0), ("c", 3.0)]);
        let test_cases = vec![
            ((0, 1), vec!["a", "b"]),
            ((-2, -1), vec!["b", "c"]),
            ((-100, 100), vec!["a", "b", "c"]),
            ((2, 1), vec![]),
            ((5, 10), vec![]),
        ];

        for ((start, stop), expected) in test_cases {
            let expected: Vec<Bytes> = expected.into_iter().map(b).collect();
            assert_eq!(
                members(set.range_by_rank(start, stop, false)),
                expected,
                "rank range {}..{}",
                start,
                stop
            );
        }

        assert_eq!(members(set.range_by_rank(0, 0, true)), vec![b("c")]);
    }

    #[test]
    fn test_range_by_lex() {
        let set = zset(&[("a", 0.0), ("b", 0.0), ("c", 0.0), ("d", 0.0)]);
        let test_cases = vec![
            (LexBound::Min, LexBound::Max, vec!["a", "b", "c", "d"]),
            (LexBound::Inclusive(b("b")), LexBound::Exclusive(b("d")), vec!["b", "c"]),
            (LexBound::Exclusive(b("a")), LexBound::Inclusive(b("b")), vec!["b"]),
            (LexBound::Max, LexBound::Min, vec![]),
            (LexBound::Inclusive(b("c")), LexBound::Inclusive(b("a")), vec![]),
            (LexBound::Exclusive(b("b")), LexBound::Inclusive(b("b")), vec![]),
        ];

        for (lower, upper, expected) in test_cases {
            let expected: Vec<Bytes> = expected.into_iter().map(b).collect();
            assert_eq!(set.range_by_lex(&lower, &upper, false), expected);
            assert_eq!(set.lex_count(&lower, &upper), expected.len());
        }
    }

    /// Builds a randomly populated set along with the same entries sorted by
    /// (score, member). Some members are re-scored or removed on the way.
    fn random_zset(rng: &mut StdRng, distinct_scores: i32) -> (SortedSet, Vec<(f64, Bytes)>) {
        let mut set = SortedSet::new();
        let mut model = BTreeMap::new();
        for _ in 0..300 {
            let member = Bytes::from(format!("m{:02}", rng.random_range(0..80)));
            if rng.random_range(0..5) == 0 {
                assert_eq!(set.remove(&member), model.remove(&member).is_some());
            } else {
                let score = f64::from(rng.random_range(0..distinct_scores) - distinct_scores / 2);
                assert_eq!(set.add(member.clone(), score), model.insert(member, score).is_none());
            }
        }

        let mut reference: Vec<(f64, Bytes)> =
            model.into_iter().map(|(member, score)| (score, member)).collect();
        reference.sort_by(|x, y| x.0.total_cmp(&y.0).then_with(|| x.1.cmp(&y.1)));
        (set, reference)
    }

    fn in_direction<T: Clone>(items: &[T], reverse: bool) -> Vec<T> {
        let mut items = items.to_vec();
        if reverse {
            items.reverse();
        }
        items
    }

    #[test]
    fn test_score_ranges_match_sorted_reference() {
        let mut rng = StdRng::seed_from_u64(11);
        let (set, reference) = random_zset(&mut rng, 9);
        let values = [f64::NEG_INFINITY, -5.0, -4.0, -2.0, -1.5, 0.0, 1.0, 3.0, 4.0, 5.0, f64::INFINITY];

        for low in values {
            for high in values {
                for (low_excl, high_excl) in [(false, false), (true, false), (false, true), (true, true)] {
                    let lower = ScoreBound { value: low, exclusive: low_excl };
                    let upper = ScoreBound { value: high, exclusive: high_excl };
                    let expected: Vec<(Bytes, f64)> = reference
                        .iter()
                        .filter(|(score, _)| {
                            let above = if low_excl { *score > low } else { *score >= low };
                            let below = if high_excl { *score < high } else { *score <= high };
                            above && below
                        })
                        .map(|(score, member)| (member.clone(), *score))
                        .collect();

                    assert_eq!(set.count_by_score(&lower, &upper), expected.len());
                    for reverse in [false, true] {
                        assert_eq!(
                            set.range_by_score(&lower, &upper, reverse),
                            in_direction(&expected, reverse),
                            "score range {:?}..{:?} reverse={}",
                            lower,
                            upper,
                            reverse
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn test_rank_ranges_match_sorted_reference() {
        let mut rng = StdRng::seed_from_u64(23);
        let (set, reference) = random_zset(&mut rng, 7);
        let length = reference.len() as i64;
        assert_eq!(set.len(), reference.len());

        for (index, (_, member)) in reference.iter().enumerate() {
            assert_eq!(set.rank(member), Some(index), "rank of {:?}", member);
        }

        let normalize = |index: i64| if index < 0 { index + length } else { index };
        for start in -length - 3..length + 3 {
            for stop in -length - 3..length + 3 {
                for reverse in [false, true] {
                    let ordered = in_direction(&reference, reverse);
                    let expected: Vec<(Bytes, f64)> = ordered
                        .iter()
                        .enumerate()
                        .filter(|(index, _)| {
                            let index = *index as i64;
                            index >= normalize(start) && index <= normalize(stop)
                        })
                        .map(|(_, (score, member))| (member.clone(), *score))
                        .collect();

                    assert_eq!(
                        set.range_by_rank(start, stop, reverse),
                        expected,
                        "rank range {}..{} reverse={}",
                        start,
                        stop,
                        reverse
                    );
                }
            }
        }
    }

    #[test]
    fn test_lex_ranges_match_sorted_reference() {
        let mut rng = StdRng::seed_from_u64(5);
        let (set, reference) = random_zset(&mut rng, 1);
        let members: Vec<Bytes> = reference.into_iter().map(|(_, member)| member).collect();

        let mut bounds = vec![LexBound::Min, LexBound::Max];
        for probe in ["m", "m00", "m17", "m175", "m40", "m41", "m79", "n"] {
            bounds.push(LexBound::Inclusive(b(probe)));
            bounds.push(LexBound::Exclusive(b(probe)));
        }
        let above = |member: &Bytes, bound: &LexBound| match bound {
            LexBound::Min => true,
            LexBound::Max => false,
            LexBound::Inclusive(value) => member >= value,
            LexBound::Exclusive(value) => member > value,
        };
        let below = |member: &Bytes, bound: &LexBound| match bound {
            LexBound::Min => false,
            LexBound::Max => true,
            LexBound::Inclusive(value) => member <= value,
            LexBound::Exclusive(value) => member < value,
        };

        for lower in &bounds {
            for upper in &bounds {
                let expected: Vec<Bytes> = members
                    .iter()
                    .filter(|member| above(member, lower) && below(member, upper))
                    .cloned()
                    .collect();

                assert_eq!(set.lex_count(lower, upper), expected.len());
                for reverse in [false, true] {
                    assert_eq!(
                        set.range_by_lex(lower, upper, reverse),
                        in_direction(&expected, reverse),
                        "lex range {:?}..{:?} reverse={}",
                        lower,
                        upper,
                        reverse
                    );
                }
            }
        }
    }
}
