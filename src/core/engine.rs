use std::collections::BTreeMap;

use tracing::debug;

use crate::data::HistoricalDataset;

use super::ledger::IncomeLedger;
use super::rebalance::{Holding, Holdings, RebalanceOutcome, rebalance, total_value};
use super::types::{
    Allocation, AnnualRecord, AnnualResult, AssetClass, Block, ForecastError, ForecastOptions,
    ForecastScenario, IncomeRole, allocation_targets,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulationTotals {
    pub starting_amount: f64,
    pub years: u32,
    pub total_taxes: f64,
    pub final_value: f64,
}

impl SimulationTotals {
    pub fn calculate_cagr(&self) -> f64 {
        calculate_cagr(self.starting_amount, self.final_value, self.years)
    }

    pub fn cagr_percent(&self) -> f64 {
        self.calculate_cagr() * 100.0
    }
}

#[derive(Debug, Default)]
struct YearIncome {
    ordinary: f64,
    dividends: f64,
}

pub fn run_scenario(
    dataset: &HistoricalDataset,
    starting_amount: f64,
    allocations: &[Allocation],
    block_sequence: &[u32],
    options: &ForecastOptions,
) -> Result<ForecastScenario, ForecastError> {
    let mut results = Vec::with_capacity(block_sequence.len() * super::BLOCK_LENGTH);
    let totals = simulate_sequence(
        dataset,
        starting_amount,
        allocations,
        block_sequence,
        options,
        Some(&mut results),
    )?;

    Ok(ForecastScenario {
        block_numbers: block_sequence.to_vec(),
        results,
        taxes: totals.total_taxes,
        final_value: totals.final_value,
        cagr: totals.cagr_percent(),
    })
}

/// Year-by-year evolution of one portfolio. Per-year results are pushed to
/// `trace` when one is supplied.
pub fn simulate_sequence(
    dataset: &HistoricalDataset,
    starting_amount: f64,
    allocations: &[Allocation],
    block_sequence: &[u32],
    options: &ForecastOptions,
    mut trace: Option<&mut Vec<AnnualResult>>,
) -> Result<SimulationTotals, ForecastError> {
    let blocks = block_sequence
        .iter()
        .map(|&number| match dataset.series(number) {
            Some(block) if !block.records.is_empty() => Ok(block),
            _ => Err(ForecastError::MissingHistoricalData(number)),
        })
        .collect::<Result<Vec<&Block>, _>>()?;

    let targets = allocation_targets(allocations);
    let mut holdings: Holdings = targets
        .iter()
        .map(|(asset, percent)| (asset.clone(), Holding::new(starting_amount * percent / 100.0)))
        .collect();
    let mut ledgers: BTreeMap<AssetClass, IncomeLedger> = BTreeMap::new();

    let mut current_value = starting_amount;
    let mut total_taxes = 0.0;
    let mut year: u32 = 0;

    for block in blocks {
        for record in &block.records {
            year += 1;
            let start_value = current_value;
            let historical_year = dataset
                .historical_year(block.number, record.year)
                .unwrap_or_else(|| {
                    debug!(
                        block = block.number,
                        index = record.year,
                        "record has no calendar year"
                    );
                    0
                });

            let mut income = YearIncome::default();
            let mut end_value = 0.0;
            for (asset, holding) in holdings.iter_mut() {
                let asset_start = holding.value;
                let mut pct = asset_return(dataset, record, asset, year, options);
                if options.inflation_adjusted {
                    pct = real_return(pct, record.inflation);
                }

                match asset.income_role() {
                    IncomeRole::Interest => income.ordinary += asset_start * pct / 100.0,
                    IncomeRole::Coupon => {
                        let prevailing = dataset
                            .yield_for(historical_year, asset)
                            .unwrap_or_else(|| {
                                debug!(%asset, historical_year, "no prevailing yield, assuming 0");
                                0.0
                            });
                        let ledger = ledgers.entry(asset.clone()).or_default();
                        income.ordinary += ledger.reinvest_for_year(year, asset_start, prevailing);
                    }
                    IncomeRole::LargeCapDividend => {
                        income.dividends += asset_start * record.sp500_dividend_yield / 100.0;
                    }
                    IncomeRole::SmallCapDividend => {
                        income.dividends +=
                            asset_start * record.us_small_cap_dividend_yield / 100.0;
                    }
                    IncomeRole::None => {}
                }

                holding.value = asset_start * (1.0 + pct / 100.0);
                end_value += holding.value;
            }

            let realized = if options.rebalance {
                rebalance(&mut holdings, &targets)
            } else {
                RebalanceOutcome::default()
            };

            let taxes = options.tax.calculate_taxes(
                income.ordinary,
                income.dividends + realized.capital_gains,
                realized.collectible_gains,
            );
            total_taxes += taxes;

            if let Some(rows) = trace.as_deref_mut() {
                rows.push(AnnualResult {
                    year,
                    historical_year,
                    start_value,
                    end_value,
                    growth: end_value - start_value,
                    taxes,
                    ordinary_income: income.ordinary,
                    dividend_income: income.dividends,
                    capital_gains: realized.capital_gains,
                    collectible_gains: realized.collectible_gains,
                    percentage_allocations: allocation_snapshot(allocations, &holdings, end_value),
                });
            }

            current_value = total_value(&holdings);
        }
    }

    Ok(SimulationTotals {
        starting_amount,
        years: year,
        total_taxes,
        final_value: current_value,
    })
}

fn asset_return(
    dataset: &HistoricalDataset,
    record: &AnnualRecord,
    asset: &AssetClass,
    year: u32,
    options: &ForecastOptions,
) -> f64 {
    if asset.crypto_symbol().is_some() && !options.crypto_use_historical_price {
        let start_year = i32::try_from(year)
            .ok()
            .and_then(|t| options.base_year.checked_add(t - 1));
        return start_year
            .and_then(|start| dataset.power_law_return(asset, options.power_law_band, start))
            .unwrap_or_else(|| {
                debug!(%asset, ?start_year, "power-law return undefined, assuming 0");
                0.0
            });
    }
    record.return_for(asset).unwrap_or(0.0)
}

fn real_return(nominal_pct: f64, inflation_pct: f64) -> f64 {
    ((1.0 + nominal_pct / 100.0) / (1.0 + inflation_pct / 100.0) - 1.0) * 100.0
}

fn allocation_snapshot(
    allocations: &[Allocation],
    holdings: &Holdings,
    end_value: f64,
) -> Vec<Allocation> {
    let weight = |value: f64| {
        if end_value > 0.0 {
            value / end_value * 100.0
        } else {
            0.0
        }
    };

    let mut snapshot: Vec<Allocation> = allocations
        .iter()
        .map(|allocation| Allocation {
            value: weight(holdings.get(&allocation.key).map_or(0.0, |h| h.value)),
            ..allocation.clone()
        })
        .collect();
    for (asset, holding) in holdings {
        if !allocations.iter().any(|allocation| &allocation.key == asset) {
            snapshot.push(Allocation {
                key: asset.clone(),
                label: asset.display_name(),
                value: weight(holding.value),
            });
        }
    }
    snapshot
}

pub fn calculate_cagr(starting_amount: f64, final_value: f64, years: u32) -> f64 {
    if starting_amount <= 0.0 || years == 0 {
        return 0.0;
    }
    if final_value < 0.0 {
        return (final_value - starting_amount) / starting_amount;
    }
    (final_value / starting_amount).powf(1.0 / f64::from(years)) - 1.0
}
