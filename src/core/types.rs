use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::tax::TaxCalculator;

pub const BLOCK_LENGTH: usize = 10;

pub const FIRST_BLOCK_YEAR: i32 = 1970;

const CRYPTO_PREFIX: &str = "crypto:";

/// Asset classes a portfolio can hold.
///
/// Declaration order is the iteration order used by the simulator and the
/// rebalancer, so results stay reproducible.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum AssetClass {
    Sp500,
    UsSmallCap,
    TBill,
    Treasury10Year,
    BaaCorp,
    RealEstate,
    Gold,
    Bitcoin,
    InternationalEquity,
    EmergingMarkets,
    Nasdaq100,
    Crypto(String),
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum IncomeRole {
    Interest,
    Coupon,
    LargeCapDividend,
    SmallCapDividend,
    None,
}

impl AssetClass {
    pub const HISTORICAL: [AssetClass; 11] = [
        AssetClass::Sp500,
        AssetClass::UsSmallCap,
        AssetClass::TBill,
        AssetClass::Treasury10Year,
        AssetClass::BaaCorp,
        AssetClass::RealEstate,
        AssetClass::Gold,
        AssetClass::Bitcoin,
        AssetClass::InternationalEquity,
        AssetClass::EmergingMarkets,
        AssetClass::Nasdaq100,
    ];

    pub fn key(&self) -> String {
        let key = match self {
            AssetClass::Sp500 => "sp500",
            AssetClass::UsSmallCap => "usSmallCap",
            AssetClass::TBill => "TBill",
            AssetClass::Treasury10Year => "treasury10Year",
            AssetClass::BaaCorp => "baaCorp",
            AssetClass::RealEstate => "realEstate",
            AssetClass::Gold => "gold",
            AssetClass::Bitcoin => "bitcoin",
            AssetClass::InternationalEquity => "internationalEquity",
            AssetClass::EmergingMarkets => "emergingMarkets",
            AssetClass::Nasdaq100 => "nasdaq100",
            AssetClass::Crypto(symbol) => return format!("{CRYPTO_PREFIX}{symbol}"),
        };
        key.to_string()
    }

    pub fn income_role(&self) -> IncomeRole {
        match self {
            AssetClass::TBill => IncomeRole::Interest,
            AssetClass::Treasury10Year | AssetClass::BaaCorp => IncomeRole::Coupon,
            AssetClass::Sp500 => IncomeRole::LargeCapDividend,
            AssetClass::UsSmallCap => IncomeRole::SmallCapDividend,
            _ => IncomeRole::None,
        }
    }

    pub fn display_name(&self) -> String {
        let name = match self {
            AssetClass::Sp500 => "S&P 500",
            AssetClass::UsSmallCap => "US Small Cap",
            AssetClass::TBill => "T-Bills",
            AssetClass::Treasury10Year => "10 Year Treasury",
            AssetClass::BaaCorp => "BAA Corporate Bonds",
            AssetClass::RealEstate => "Real Estate",
            AssetClass::Gold => "Gold",
            AssetClass::Bitcoin => "Bitcoin",
            AssetClass::InternationalEquity => "International Equity",
            AssetClass::EmergingMarkets => "Emerging Markets",
            AssetClass::Nasdaq100 => "Nasdaq 100",
            AssetClass::Crypto(symbol) => return symbol.clone(),
        };
        name.to_string()
    }

    pub fn is_collectible(&self) -> bool {
        matches!(self, AssetClass::Gold)
    }

    pub fn crypto_symbol(&self) -> Option<&str> {
        match self {
            AssetClass::Bitcoin => Some("BTC"),
            AssetClass::Crypto(symbol) => Some(symbol),
            _ => None,
        }
    }
}

impl fmt::Display for AssetClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown asset class `{0}`")]
pub struct UnknownAssetClass(pub String);

impl FromStr for AssetClass {
    type Err = UnknownAssetClass;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Some(symbol) = trimmed.strip_prefix(CRYPTO_PREFIX) {
            let symbol = symbol.trim();
            if symbol.is_empty() {
                return Err(UnknownAssetClass(trimmed.to_string()));
            }
            return Ok(AssetClass::Crypto(symbol.to_ascii_uppercase()));
        }
        AssetClass::HISTORICAL
            .iter()
            .find(|asset| asset.key().eq_ignore_ascii_case(trimmed))
            .cloned()
            .ok_or_else(|| UnknownAssetClass(trimmed.to_string()))
    }
}

impl TryFrom<String> for AssetClass {
    type Error = UnknownAssetClass;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AssetClass> for String {
    fn from(value: AssetClass) -> Self {
        value.key()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnualRecord {
    pub year: u32,
    pub sp500: f64,
    pub us_small_cap: f64,
    #[serde(rename = "TBill")]
    pub t_bill: f64,
    #[serde(rename = "treasury10Year")]
    pub treasury_10_year: f64,
    pub baa_corp: f64,
    pub real_estate: f64,
    pub gold: f64,
    pub inflation: f64,
    pub sp500_dividend_yield: f64,
    pub us_small_cap_dividend_yield: f64,
    pub bitcoin: f64,
    pub international_equity: f64,
    pub emerging_markets: f64,
    pub nasdaq100: f64,
}

impl AnnualRecord {
    pub fn return_for(&self, asset: &AssetClass) -> Option<f64> {
        let value = match asset {
            AssetClass::Sp500 => self.sp500,
            AssetClass::UsSmallCap => self.us_small_cap,
            AssetClass::TBill => self.t_bill,
            AssetClass::Treasury10Year => self.treasury_10_year,
            AssetClass::BaaCorp => self.baa_corp,
            AssetClass::RealEstate => self.real_estate,
            AssetClass::Gold => self.gold,
            AssetClass::Bitcoin => self.bitcoin,
            AssetClass::InternationalEquity => self.international_equity,
            AssetClass::EmergingMarkets => self.emerging_markets,
            AssetClass::Nasdaq100 => self.nasdaq100,
            AssetClass::Crypto(_) => return None,
        };
        Some(value)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub number: u32,
    pub records: Vec<AnnualRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Allocation {
    pub key: AssetClass,
    #[serde(default)]
    pub label: String,
    #[serde(alias = "targetPercent")]
    pub value: f64,
}

pub type AllocationTargets = BTreeMap<AssetClass, f64>;

pub fn allocation_targets(allocations: &[Allocation]) -> AllocationTargets {
    let mut targets = AllocationTargets::new();
    for allocation in allocations {
        *targets.entry(allocation.key.clone()).or_insert(0.0) += allocation.value;
    }
    targets
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnualResult {
    pub year: u32,
    pub historical_year: i32,
    pub start_value: f64,
    pub end_value: f64,
    pub growth: f64,
    pub taxes: f64,
    pub ordinary_income: f64,
    pub dividend_income: f64,
    pub capital_gains: f64,
    pub collectible_gains: f64,
    pub percentage_allocations: Vec<Allocation>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ForecastScenario {
    pub block_numbers: Vec<u32>,
    pub results: Vec<AnnualResult>,
    pub taxes: f64,
    pub final_value: f64,
    pub cagr: f64,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum ReturnWindow {
    TenYears,
    TwentyYears,
    ThirtyYears,
}

impl ReturnWindow {
    pub fn years(self) -> u32 {
        match self {
            ReturnWindow::TenYears => 10,
            ReturnWindow::TwentyYears => 20,
            ReturnWindow::ThirtyYears => 30,
        }
    }

    pub fn block_count(self) -> usize {
        self.years() as usize / BLOCK_LENGTH
    }
}

impl TryFrom<u32> for ReturnWindow {
    type Error = String;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            10 => Ok(ReturnWindow::TenYears),
            20 => Ok(ReturnWindow::TwentyYears),
            30 => Ok(ReturnWindow::ThirtyYears),
            other => Err(format!("return window must be 10, 20 or 30 years, got {other}")),
        }
    }
}

impl From<ReturnWindow> for u32 {
    fn from(value: ReturnWindow) -> Self {
        value.years()
    }
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerLawBand {
    #[default]
    Core,
    Lower,
    Upper,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForecastOptions {
    pub rebalance: bool,
    pub inflation_adjusted: bool,
    pub window: ReturnWindow,
    pub crypto_use_historical_price: bool,
    pub exclude_incomplete_blocks: bool,
    pub power_law_band: PowerLawBand,
    pub base_year: i32,
    pub tax: TaxCalculator,
}

impl Default for ForecastOptions {
    fn default() -> Self {
        Self {
            rebalance: false,
            inflation_adjusted: false,
            window: ReturnWindow::TenYears,
            crypto_use_historical_price: false,
            exclude_incomplete_blocks: true,
            power_law_band: PowerLawBand::Core,
            base_year: current_year(),
            tax: TaxCalculator::default(),
        }
    }
}

pub fn current_year() -> i32 {
    use chrono::Datelike;
    chrono::Utc::now().year()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PercentileResult {
    pub value: f64,
    pub block_numbers: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ForecastSummary {
    pub scenarios: Vec<ForecastScenario>,
    pub median: Option<PercentileResult>,
    pub q1: Option<PercentileResult>,
    pub q3: Option<PercentileResult>,
    pub average_cagr: f64,
    pub final_value_std_dev: f64,
    pub scenario_count: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ForecastError {
    #[error("historical data for block {0} could not be found")]
    MissingHistoricalData(u32),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn asset_keys_parse_case_insensitively() {
        assert_eq!("SP500".parse::<AssetClass>(), Ok(AssetClass::Sp500));
        assert_eq!("tbill".parse::<AssetClass>(), Ok(AssetClass::TBill));
        assert_eq!(
            " crypto:doge ".parse::<AssetClass>(),
            Ok(AssetClass::Crypto("DOGE".to_string()))
        );
        assert!("crypto:".parse::<AssetClass>().is_err());
        assert!("bonds".parse::<AssetClass>().is_err());
        for asset in AssetClass::HISTORICAL {
            assert_eq!(asset.key().parse::<AssetClass>(), Ok(asset));
        }
    }

    #[test]
    fn allocations_deserialize_keys_and_percent_alias() {
        let allocation: Allocation =
            serde_json::from_str(r#"{"key": "crypto:sol", "targetPercent": 5}"#)
                .expect("valid allocation");
        assert_eq!(allocation.key, AssetClass::Crypto("SOL".to_string()));
        assert_eq!(allocation.value, 5.0);
        assert!(allocation.label.is_empty());

        let json = serde_json::to_value(&allocation).expect("serializable");
        assert_eq!(json["key"], "crypto:SOL");
    }

    #[test]
    fn repeated_allocation_keys_add_up() {
        let allocations = [
            Allocation {
                key: AssetClass::Gold,
                label: String::new(),
                value: 10.0,
            },
            Allocation {
                key: AssetClass::Gold,
                label: String::new(),
                value: 15.0,
            },
        ];
        let targets = allocation_targets(&allocations);
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[&AssetClass::Gold], 25.0);
    }

    #[test]
    fn return_windows_map_to_block_counts() {
        assert_eq!(ReturnWindow::try_from(30).map(|w| w.block_count()), Ok(3));
        assert!(ReturnWindow::try_from(25).is_err());
        assert_eq!(
            serde_json::to_string(&ReturnWindow::TwentyYears).expect("serializable"),
            "20"
        );
    }

    #[test]
    fn crypto_assets_have_no_historical_column() {
        let record = AnnualRecord {
            bitcoin: 40.0,
            ..AnnualRecord::default()
        };
        assert_eq!(record.return_for(&AssetClass::Bitcoin), Some(40.0));
        assert_eq!(record.return_for(&AssetClass::Crypto("SOL".into())), None);
        assert_eq!(AssetClass::Bitcoin.crypto_symbol(), Some("BTC"));
    }
}
