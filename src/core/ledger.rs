//! Reinvestment history for coupon-paying asset classes.
//!
//! Bond income is compounded at the yield prevailing when each coupon is
//! reinvested, not at the asset's own price-return series. Every purchase
//! ("vintage") keeps paying its locked-in yield for the rest of the run.

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LedgerEntry {
    pub reference_year: u32,
    pub purchase_amount: f64,
    pub yield_percent: f64,
}

impl LedgerEntry {
    fn annual_income(&self) -> f64 {
        self.purchase_amount * self.yield_percent / 100.0
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct IncomeLedger {
    entries: Vec<LedgerEntry>,
}

impl IncomeLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_purchase(&mut self, year: u32, amount: f64, yield_percent: f64) {
        self.entries.push(LedgerEntry {
            reference_year: year,
            purchase_amount: amount,
            yield_percent,
        });
    }

    pub fn income_generated_in_year(&self, year: u32) -> f64 {
        self.entries
            .iter()
            .filter(|entry| entry.reference_year <= year)
            .map(LedgerEntry::annual_income)
            .sum()
    }

    pub fn total_income(&self) -> f64 {
        self.entries.iter().map(LedgerEntry::annual_income).sum()
    }

    pub fn has_entries(&self) -> bool {
        !self.entries.is_empty()
    }

    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    pub fn reinvest_for_year(&mut self, year: u32, asset_value: f64, prevailing_yield: f64) -> f64 {
        let purchase = if self.has_entries() {
            self.income_generated_in_year(year.saturating_sub(1))
        } else {
            asset_value
        };
        self.record_purchase(year, purchase, prevailing_yield);
        self.income_generated_in_year(year)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::{prop_assert, proptest};

    const EPS: f64 = 1e-9;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= EPS,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn single_purchase_income_matches_yield() {
        let mut ledger = IncomeLedger::new();
        assert!(!ledger.has_entries());
        ledger.record_purchase(1, 10_000.0, 7.79);
        assert!(ledger.has_entries());
        assert_approx(ledger.total_income(), 779.0);
    }

    #[test]
    fn zero_amount_purchase_is_recorded() {
        let mut ledger = IncomeLedger::new();
        ledger.record_purchase(1, 0.0, 5.0);
        assert!(ledger.has_entries());
        assert_eq!(ledger.entries().len(), 1);
        assert_approx(ledger.total_income(), 0.0);
    }

    #[test]
    fn income_in_year_ignores_later_vintages() {
        let mut ledger = IncomeLedger::new();
        ledger.record_purchase(1, 1_000.0, 5.0);
        ledger.record_purchase(2, 50.0, 4.0);
        ledger.record_purchase(3, 52.0, 6.0);
        assert_approx(ledger.income_generated_in_year(0), 0.0);
        assert_approx(ledger.income_generated_in_year(1), 50.0);
        assert_approx(ledger.income_generated_in_year(2), 52.0);
        assert_approx(ledger.income_generated_in_year(3), 52.0 + 3.12);
        assert_approx(ledger.total_income(), ledger.income_generated_in_year(3));
    }

    #[test]
    fn reinvestment_locks_each_vintage_at_its_own_yield() {
        let mut ledger = IncomeLedger::new();
        // Seed year: whole position at 5%.
        assert_approx(ledger.reinvest_for_year(1, 100_000.0, 5.0), 5_000.0);
        // Year two: last year's 5_000 coupon reinvested at 4%.
        assert_approx(ledger.reinvest_for_year(2, 123_456.0, 4.0), 5_200.0);
        // Year three: 5_200 reinvested at 10%, older vintages keep 5% and 4%.
        assert_approx(ledger.reinvest_for_year(3, 0.0, 10.0), 5_200.0 + 520.0);
        let yields: Vec<f64> = ledger.entries().iter().map(|e| e.yield_percent).collect();
        assert_eq!(yields, vec![5.0, 4.0, 10.0]);
    }

    #[test]
    fn seeded_ledger_ignores_later_asset_values() {
        let mut a = IncomeLedger::new();
        let mut b = IncomeLedger::new();
        a.reinvest_for_year(1, 50_000.0, 3.0);
        b.reinvest_for_year(1, 50_000.0, 3.0);
        let income_a = a.reinvest_for_year(2, 10.0, 3.0);
        let income_b = b.reinvest_for_year(2, 10_000_000.0, 3.0);
        assert_approx(income_a, income_b);
    }

    proptest! {
        #[test]
        fn income_never_decreases_with_positive_yields(
            seed in 1.0f64..1_000_000.0,
            yields in proptest::collection::vec(0.01f64..15.0, 1..30),
        ) {
            let mut ledger = IncomeLedger::new();
            let mut previous = 0.0;
            for (idx, y) in yields.iter().enumerate() {
                let income = ledger.reinvest_for_year(idx as u32 + 1, seed, *y);
                prop_assert!(income > 0.0);
                prop_assert!(income + 1e-9 >= previous);
                previous = income;
            }
        }
    }
}
