pub const DISPLAY_TARGET: usize = 50;

pub const Q1: f64 = 0.25;
pub const MEDIAN: f64 = 0.5;
pub const Q3: f64 = 0.75;

pub fn percentile_index(len: usize, p: f64) -> Option<usize> {
    if len == 0 {
        return None;
    }
    let pos = (len - 1) as f64 * p.clamp(0.0, 1.0);
    Some((pos.round() as usize).min(len - 1))
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

pub fn population_std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let avg = mean(values);
    let variance = values.iter().map(|v| (v - avg).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuartileIndices {
    pub q1: usize,
    pub median: usize,
    pub q3: usize,
}

impl QuartileIndices {
    pub fn for_len(len: usize) -> Option<Self> {
        Some(Self {
            q1: percentile_index(len, Q1)?,
            median: percentile_index(len, MEDIAN)?,
            q3: percentile_index(len, Q3)?,
        })
    }

    pub fn retained(&self) -> Vec<usize> {
        let mut retained = Vec::with_capacity(3);
        for idx in [self.q1, self.median, self.q3] {
            if !retained.contains(&idx) {
                retained.push(idx);
            }
        }
        retained
    }
}

/// Indices into a list of `len` scenarios sorted by final value, in display
/// order: `retained` first, then the rest. When the rest would overflow
/// [`DISPLAY_TARGET`] it is sampled at an even stride.
pub fn display_selection(len: usize, retained: &[usize]) -> Vec<usize> {
    let remaining: Vec<usize> = (0..len).filter(|idx| !retained.contains(idx)).collect();
    let slots = DISPLAY_TARGET.saturating_sub(retained.len());

    let mut selection = retained.to_vec();
    if remaining.len() <= slots {
        selection.extend(remaining);
        return selection;
    }

    let stride = (remaining.len() / slots).max(1);
    selection.extend(remaining.into_iter().step_by(stride).take(slots));
    selection
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::{prop_assert, prop_assert_eq, proptest};

    #[test]
    fn median_uses_nearest_rank_rounding_half_up() {
        let cases = [(1, 0), (2, 1), (3, 1), (50, 25), (1000, 500)];
        for (len, expected) in cases {
            assert_eq!(percentile_index(len, MEDIAN), Some(expected), "len {len}");
        }
        assert_eq!(percentile_index(0, MEDIAN), None);
    }

    #[test]
    fn quartiles_of_small_lists_collapse() {
        let single = QuartileIndices::for_len(1).expect("non-empty");
        assert_eq!(single.retained(), vec![0]);

        let pair = QuartileIndices::for_len(2).expect("non-empty");
        assert_eq!((pair.q1, pair.median, pair.q3), (0, 1, 1));
        assert_eq!(pair.retained(), vec![0, 1]);

        let hundred = QuartileIndices::for_len(100).expect("non-empty");
        assert_eq!((hundred.q1, hundred.median, hundred.q3), (25, 50, 74));
    }

    #[test]
    fn population_std_dev_matches_textbook_example() {
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert_eq!(mean(&values), 5.0);
        assert_eq!(population_std_dev(&values), 2.0);
        assert_eq!(population_std_dev(&[]), 0.0);
        assert_eq!(mean(&[]), 0.0);
    }

    #[test]
    fn small_batches_are_returned_whole() {
        let retained = QuartileIndices::for_len(10).expect("non-empty").retained();
        let selection = display_selection(10, &retained);
        assert_eq!(selection.len(), 10);
        assert_eq!(&selection[..3], retained.as_slice());
    }

    #[test]
    fn large_batches_are_thinned_to_target() {
        let retained = QuartileIndices::for_len(1000).expect("non-empty").retained();
        let selection = display_selection(1000, &retained);
        assert_eq!(selection.len(), DISPLAY_TARGET);
        assert_eq!(&selection[..3], retained.as_slice());
        // 997 remaining over 47 slots: stride 21 starting from the lowest.
        assert_eq!(selection[3], 0);
        assert_eq!(selection[4], 21);
    }

    proptest! {
        #[test]
        fn display_selection_is_bounded_and_unique(len in 1usize..3_000) {
            let retained = QuartileIndices::for_len(len).expect("non-empty").retained();
            let selection = display_selection(len, &retained);

            prop_assert!(selection.len() <= DISPLAY_TARGET);
            prop_assert_eq!(selection.len(), len.min(DISPLAY_TARGET));
            let mut unique = selection.clone();
            unique.sort_unstable();
            unique.dedup();
            prop_assert_eq!(unique.len(), selection.len());
            prop_assert!(selection.iter().all(|idx| *idx < len));
        }
    }
}
