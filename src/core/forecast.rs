use rayon::prelude::*;
use tracing::{info, warn};

use crate::data::HistoricalDataset;

use super::engine::{run_scenario, simulate_sequence};
use super::stats::{self, QuartileIndices};
use super::types::{
    Allocation, ForecastOptions, ForecastScenario, ForecastSummary, PercentileResult, ReturnWindow,
};

pub fn block_combinations(blocks: &[u32], window: ReturnWindow) -> Vec<Vec<u32>> {
    let mut sequences: Vec<Vec<u32>> = vec![Vec::new()];
    for _ in 0..window.block_count() {
        let mut extended = Vec::with_capacity(sequences.len() * blocks.len());
        for prefix in &sequences {
            for &block in blocks {
                if prefix.contains(&block) {
                    continue;
                }
                let mut next = prefix.clone();
                next.push(block);
                extended.push(next);
            }
        }
        sequences = extended;
    }
    sequences
}

#[derive(Debug, Clone)]
struct ScenarioOutline {
    block_numbers: Vec<u32>,
    final_value: f64,
    cagr: f64,
}

/// Runs the allocation over every block sequence the window allows and
/// summarizes the outcome distribution.
///
/// The batch first computes end values only; the scenarios picked for display
/// are then rerun with their full yearly detail.
pub fn run_all_scenarios(
    dataset: &HistoricalDataset,
    starting_amount: f64,
    allocations: &[Allocation],
    options: &ForecastOptions,
) -> ForecastSummary {
    let blocks = dataset.block_numbers(options.exclude_incomplete_blocks);
    let sequences = block_combinations(&blocks, options.window);
    let evaluated = sequences.len();

    let mut outlines: Vec<ScenarioOutline> = sequences
        .into_par_iter()
        .filter_map(|sequence| {
            match simulate_sequence(dataset, starting_amount, allocations, &sequence, options, None)
            {
                Ok(totals) => Some(ScenarioOutline {
                    final_value: totals.final_value,
                    cagr: totals.cagr_percent(),
                    block_numbers: sequence,
                }),
                Err(err) => {
                    warn!(blocks = ?sequence, error = %err, "skipping scenario");
                    None
                }
            }
        })
        .collect();
    let skipped = evaluated - outlines.len();

    outlines.sort_by(|a, b| {
        a.final_value
            .total_cmp(&b.final_value)
            .then_with(|| a.block_numbers.cmp(&b.block_numbers))
    });

    let cagrs: Vec<f64> = outlines.iter().map(|o| o.cagr).collect();
    let finals: Vec<f64> = outlines.iter().map(|o| o.final_value).collect();
    let quartiles = QuartileIndices::for_len(outlines.len());
    let percentile = |idx: usize| PercentileResult {
        value: outlines[idx].final_value,
        block_numbers: outlines[idx].block_numbers.clone(),
    };

    let retained = quartiles.map(|q| q.retained()).unwrap_or_default();
    let selection = stats::display_selection(outlines.len(), &retained);
    let scenarios: Vec<ForecastScenario> = selection
        .par_iter()
        .filter_map(|&idx| {
            run_scenario(
                dataset,
                starting_amount,
                allocations,
                &outlines[idx].block_numbers,
                options,
            )
            .map_err(|err| warn!(error = %err, "display scenario rerun failed"))
            .ok()
        })
        .collect();

    let summary = ForecastSummary {
        scenarios,
        median: quartiles.map(|q| percentile(q.median)),
        q1: quartiles.map(|q| percentile(q.q1)),
        q3: quartiles.map(|q| percentile(q.q3)),
        average_cagr: stats::mean(&cagrs),
        final_value_std_dev: stats::population_std_dev(&finals),
        scenario_count: outlines.len(),
        skipped,
    };

    info!(
        window = options.window.years(),
        scenarios = summary.scenario_count,
        skipped = summary.skipped,
        median = summary.median.as_ref().map(|m| m.value),
        average_cagr = summary.average_cagr,
        "forecast batch complete"
    );
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{AssetClass, Block};
    use crate::data::fixture::{
        INCOMPLETE_BLOCK, SAMPLE_BLOCKS, sample_dataset, sample_dataset_with_incomplete,
    };
    use proptest::prelude::{prop_assert, prop_assert_eq, proptest};

    fn allocation(key: AssetClass, value: f64) -> Allocation {
        Allocation {
            label: key.key(),
            key,
            value,
        }
    }

    fn balanced() -> Vec<Allocation> {
        vec![
            allocation(AssetClass::Sp500, 50.0),
            allocation(AssetClass::Treasury10Year, 30.0),
            allocation(AssetClass::Gold, 20.0),
        ]
    }

    fn options(window: ReturnWindow) -> ForecastOptions {
        ForecastOptions {
            window,
            rebalance: true,
            base_year: 2030,
            ..ForecastOptions::default()
        }
    }

    #[test]
    fn twenty_year_window_uses_ordered_pairs_of_distinct_blocks() {
        let combos = block_combinations(&[1, 2, 3], ReturnWindow::TwentyYears);
        assert_eq!(
            combos,
            vec![
                vec![1, 2],
                vec![1, 3],
                vec![2, 1],
                vec![2, 3],
                vec![3, 1],
                vec![3, 2]
            ]
        );
        assert!(block_combinations(&[], ReturnWindow::TenYears).is_empty());
        assert!(block_combinations(&[4], ReturnWindow::TwentyYears).is_empty());
    }

    #[test]
    fn ten_year_batch_covers_every_block() {
        let dataset = sample_dataset();
        let summary = run_all_scenarios(
            &dataset,
            100_000.0,
            &balanced(),
            &options(ReturnWindow::TenYears),
        );

        assert_eq!(summary.scenario_count, SAMPLE_BLOCKS as usize);
        assert_eq!(summary.skipped, 0);
        assert_eq!(summary.scenarios.len(), SAMPLE_BLOCKS as usize);

        let q1 = summary.q1.as_ref().expect("q1");
        let median = summary.median.as_ref().expect("median");
        let q3 = summary.q3.as_ref().expect("q3");
        assert!(q1.value <= median.value && median.value <= q3.value);
        assert_eq!(summary.scenarios[0].block_numbers, q1.block_numbers);
        assert_eq!(summary.scenarios[1].block_numbers, median.block_numbers);
        assert_eq!(summary.scenarios[2].block_numbers, q3.block_numbers);
        assert!(summary.final_value_std_dev > 0.0);
        assert!(summary.scenarios.iter().all(|s| s.results.len() == 10));

        let mean_cagr: f64 =
            summary.scenarios.iter().map(|s| s.cagr).sum::<f64>() / summary.scenarios.len() as f64;
        assert!((mean_cagr - summary.average_cagr).abs() < 1e-9);
    }

    #[test]
    fn thirty_year_batch_is_thinned_for_display() {
        let dataset = sample_dataset();
        let summary = run_all_scenarios(
            &dataset,
            100_000.0,
            &balanced(),
            &options(ReturnWindow::ThirtyYears),
        );

        assert_eq!(summary.scenario_count, 6 * 5 * 4);
        assert_eq!(summary.scenarios.len(), stats::DISPLAY_TARGET);
        assert!(summary.scenarios.iter().all(|s| s.results.len() == 30));
    }

    #[test]
    fn batches_are_deterministic() {
        let dataset = sample_dataset();
        let opts = options(ReturnWindow::TwentyYears);
        let first = run_all_scenarios(&dataset, 75_000.0, &balanced(), &opts);
        let second = run_all_scenarios(&dataset, 75_000.0, &balanced(), &opts);
        assert_eq!(first, second);
    }

    #[test]
    fn incomplete_blocks_are_excluded_on_request() {
        let dataset = sample_dataset_with_incomplete();
        let mut opts = options(ReturnWindow::TenYears);

        let excluded = run_all_scenarios(&dataset, 100_000.0, &balanced(), &opts);
        assert_eq!(excluded.scenario_count, SAMPLE_BLOCKS as usize);
        assert!(
            excluded
                .scenarios
                .iter()
                .all(|s| !s.block_numbers.contains(&INCOMPLETE_BLOCK))
        );

        opts.exclude_incomplete_blocks = false;
        let included = run_all_scenarios(&dataset, 100_000.0, &balanced(), &opts);
        assert_eq!(included.scenario_count, SAMPLE_BLOCKS as usize + 1);
    }

    #[test]
    fn blocks_without_records_are_skipped_and_counted() {
        let mut dataset = sample_dataset();
        dataset.insert_block(Block {
            number: 9,
            records: Vec::new(),
        });

        let summary = run_all_scenarios(
            &dataset,
            100_000.0,
            &balanced(),
            &options(ReturnWindow::TenYears),
        );

        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.scenario_count, SAMPLE_BLOCKS as usize);
        assert!(summary.scenarios.iter().all(|s| !s.block_numbers.contains(&9)));
    }

    #[test]
    fn empty_dataset_yields_empty_summary() {
        let summary = run_all_scenarios(
            &HistoricalDataset::new(),
            100_000.0,
            &balanced(),
            &options(ReturnWindow::TenYears),
        );
        assert_eq!(summary.scenario_count, 0);
        assert!(summary.scenarios.is_empty());
        assert!(summary.median.is_none());
        assert_eq!(summary.average_cagr, 0.0);
    }

    proptest! {
        #[test]
        fn combination_counts_follow_permutation_formula(n in 0usize..9, years in 1u32..=3) {
            let blocks: Vec<u32> = (1..=n as u32).collect();
            let window = ReturnWindow::try_from(years * 10).expect("valid window");
            let combos = block_combinations(&blocks, window);

            let expected = match window {
                ReturnWindow::TenYears => n,
                ReturnWindow::TwentyYears => n * n.saturating_sub(1),
                ReturnWindow::ThirtyYears => n * n.saturating_sub(1) * n.saturating_sub(2),
            };
            prop_assert_eq!(combos.len(), expected);
            for combo in &combos {
                prop_assert_eq!(combo.len(), window.block_count());
                let mut unique = combo.clone();
                unique.sort_unstable();
                unique.dedup();
                prop_assert!(unique.len() == combo.len());
            }
        }
    }
}
