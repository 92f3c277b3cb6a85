use std::collections::BTreeMap;

use super::types::{AllocationTargets, AssetClass};

// Pool residue below this share of the portfolio is rounding noise, not cash.
const SWEEP_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Holding {
    pub value: f64,
    pub cost_basis: f64,
}

impl Holding {
    pub fn new(value: f64) -> Self {
        Self {
            value,
            cost_basis: value,
        }
    }
}

pub type Holdings = BTreeMap<AssetClass, Holding>;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RebalanceOutcome {
    pub capital_gains: f64,
    pub collectible_gains: f64,
    pub swept_to_cash: f64,
}

pub fn total_value(holdings: &Holdings) -> f64 {
    holdings.values().map(|holding| holding.value).sum()
}

/// Restores target weights at year end, realizing gains on every sale.
///
/// Positions without a target are left alone. Cash left in the pool after
/// the buy pass lands in `TBill`.
pub fn rebalance(holdings: &mut Holdings, targets: &AllocationTargets) -> RebalanceOutcome {
    let total = total_value(holdings);
    let target_amounts: BTreeMap<&AssetClass, f64> = targets
        .iter()
        .map(|(asset, percent)| (asset, total * (percent / 100.0)))
        .collect();

    let mut outcome = RebalanceOutcome::default();
    let mut pool = 0.0;

    for (asset, target) in &target_amounts {
        let Some(holding) = holdings.get_mut(*asset) else {
            continue;
        };
        if holding.value <= *target {
            continue;
        }
        let excess = holding.value - target;
        let gain = execute_sale(excess, holding);
        if asset.is_collectible() {
            outcome.collectible_gains += gain;
        } else {
            outcome.capital_gains += gain;
        }
        pool += excess;
    }

    for (asset, target) in &target_amounts {
        if pool <= 0.0 {
            break;
        }
        let holding = holdings.entry((*asset).clone()).or_default();
        if holding.value >= *target {
            continue;
        }
        let bought = (target - holding.value).min(pool);
        holding.value += bought;
        holding.cost_basis += bought;
        pool -= bought;
    }

    if pool > total.abs() * SWEEP_TOLERANCE {
        let cash = holdings.entry(AssetClass::TBill).or_default();
        cash.value += pool;
        cash.cost_basis += pool;
        outcome.swept_to_cash = pool;
    }

    outcome
}

fn execute_sale(amount: f64, holding: &mut Holding) -> f64 {
    if amount <= 0.0 || holding.value <= 0.0 {
        return 0.0;
    }

    let sold = amount.min(holding.value);
    let basis_portion = holding.cost_basis * (sold / holding.value);
    holding.value -= sold;
    holding.cost_basis -= basis_portion;
    sold - basis_portion
}
