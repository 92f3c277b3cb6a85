use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::types::PowerLawBand;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PowerLawParams {
    pub coefficient_a: f64,
    pub exponent_b: f64,
    pub offset_c: f64,
}

impl PowerLawParams {
    pub fn fair_value(&self, days_since_genesis: f64) -> f64 {
        self.coefficient_a * days_since_genesis.powf(self.exponent_b) + self.offset_c
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PowerLawFit {
    #[serde(flatten)]
    pub core: PowerLawParams,
    #[serde(default)]
    pub coefficient_a_ci_lower: Option<f64>,
    #[serde(default)]
    pub coefficient_a_ci_upper: Option<f64>,
    #[serde(default)]
    pub exponent_b_ci_lower: Option<f64>,
    #[serde(default)]
    pub exponent_b_ci_upper: Option<f64>,
    #[serde(default)]
    pub r_squared: Option<f64>,
    #[serde(default)]
    pub sample_size: Option<u32>,
}

impl PowerLawFit {
    pub fn new(core: PowerLawParams) -> Self {
        Self {
            core,
            coefficient_a_ci_lower: None,
            coefficient_a_ci_upper: None,
            exponent_b_ci_lower: None,
            exponent_b_ci_upper: None,
            r_squared: None,
            sample_size: None,
        }
    }

    pub fn params(&self, band: PowerLawBand) -> PowerLawParams {
        let (a, b) = match band {
            PowerLawBand::Core => (None, None),
            PowerLawBand::Lower => (self.coefficient_a_ci_lower, self.exponent_b_ci_lower),
            PowerLawBand::Upper => (self.coefficient_a_ci_upper, self.exponent_b_ci_upper),
        };
        PowerLawParams {
            coefficient_a: a.unwrap_or(self.core.coefficient_a),
            exponent_b: b.unwrap_or(self.core.exponent_b),
            offset_c: self.core.offset_c,
        }
    }
}

pub fn days_since_genesis(genesis: NaiveDate, year: i32) -> Option<f64> {
    let dec31 = NaiveDate::from_ymd_opt(year, 12, 31)?;
    Some((dec31 - genesis).num_days() as f64)
}

pub fn percentage_return(
    genesis: NaiveDate,
    params: PowerLawParams,
    start_year: i32,
    end_year: Option<i32>,
) -> Option<f64> {
    let end_year = match end_year {
        Some(year) => year,
        None => start_year.checked_add(1)?,
    };
    let start_days = days_since_genesis(genesis, start_year)?;
    let end_days = days_since_genesis(genesis, end_year)?;
    if start_days < 0.0 || end_days < 0.0 {
        return None;
    }

    let start_price = params.fair_value(start_days);
    let end_price = params.fair_value(end_days);
    if start_price == 0.0 || !start_price.is_finite() || !end_price.is_finite() {
        return None;
    }

    let percentage = (end_price - start_price) / start_price * 100.0;
    percentage.is_finite().then_some(percentage)
}
