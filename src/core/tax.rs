use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxBracket {
    pub rate: f64,
    pub start: f64,
    pub end: Option<f64>,
}

impl TaxBracket {
    const fn new(rate: f64, start: f64, end: Option<f64>) -> Self {
        Self { rate, start, end }
    }

    fn tax_on(&self, income: f64) -> f64 {
        if income <= self.start {
            return 0.0;
        }
        let upper = self.end.map_or(income, |end| income.min(end));
        (upper - self.start) * self.rate / 100.0
    }
}

pub const DEFAULT_BRACKETS: [TaxBracket; 6] = [
    TaxBracket::new(10.0, 0.0, Some(23_850.0)),
    TaxBracket::new(12.0, 23_850.0, Some(96_950.0)),
    TaxBracket::new(22.0, 96_950.0, Some(206_700.0)),
    TaxBracket::new(24.0, 206_700.0, Some(394_600.0)),
    TaxBracket::new(32.0, 394_600.0, Some(501_050.0)),
    TaxBracket::new(37.0, 501_050.0, None),
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TaxCalculator {
    pub brackets: Vec<TaxBracket>,
    pub long_term_rate: f64,
    pub niit_threshold: f64,
    pub niit_rate: f64,
    pub collectible_rate: f64,
}

impl Default for TaxCalculator {
    fn default() -> Self {
        Self {
            brackets: DEFAULT_BRACKETS.to_vec(),
            long_term_rate: 20.0,
            niit_threshold: 600_000.0,
            niit_rate: 3.8,
            collectible_rate: 28.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxBreakdown {
    pub ordinary: f64,
    pub capital_gains: f64,
    pub collectible: f64,
    pub surtax_applied: bool,
}

impl TaxBreakdown {
    pub fn total(&self) -> f64 {
        self.ordinary + self.capital_gains + self.collectible
    }
}

impl TaxCalculator {
    pub fn ordinary_income_tax(&self, income: f64) -> f64 {
        self.brackets.iter().map(|bracket| bracket.tax_on(income)).sum()
    }

    pub fn surtax_applies(
        &self,
        ordinary_income: f64,
        capital_gains: f64,
        collectible_gains: f64,
    ) -> bool {
        ordinary_income + capital_gains + collectible_gains > self.niit_threshold
    }

    pub fn breakdown(
        &self,
        ordinary_income: f64,
        capital_gains: f64,
        collectible_gains: f64,
    ) -> TaxBreakdown {
        let surtax_applied =
            self.surtax_applies(ordinary_income, capital_gains, collectible_gains);
        let surtax_rate = if surtax_applied { self.niit_rate } else { 0.0 };

        // The collectible bucket never carries the surtax, even when it is
        // what pushed combined income over the threshold.
        TaxBreakdown {
            ordinary: self.ordinary_income_tax(ordinary_income),
            capital_gains: capital_gains * (self.long_term_rate + surtax_rate) / 100.0,
            collectible: collectible_gains * self.collectible_rate / 100.0,
            surtax_applied,
        }
    }

    pub fn calculate_taxes(
        &self,
        ordinary_income: f64,
        capital_gains: f64,
        collectible_gains: f64,
    ) -> f64 {
        self.breakdown(ordinary_income, capital_gains, collectible_gains)
            .total()
    }
}
