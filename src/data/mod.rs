mod loader;

#[cfg(test)]
pub(crate) mod fixture;

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::PathBuf;

use chrono::NaiveDate;
use tracing::info;

use crate::core::{
    AssetClass, Block, FIRST_BLOCK_YEAR, PowerLawBand, PowerLawFit, power_law,
};

pub use loader::{
    CryptoParameters, DEFAULT_SMALL_CAP_DIVIDEND_YIELD, DatasetError, ParsedBlocks,
    parse_blocks_csv, parse_crypto_json, parse_yields_csv,
};

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct YieldRecord {
    pub treasury_10_year: Option<f64>,
    pub baa_corp: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct DatasetPaths {
    pub blocks_csv: PathBuf,
    pub yields_csv: Option<PathBuf>,
    pub crypto_json: Option<PathBuf>,
}

pub fn historical_year(block_number: u32, year_index: u32) -> Option<i32> {
    if block_number < 1 || year_index < 1 {
        return None;
    }
    let offset = (block_number - 1).checked_add(year_index - 1)?;
    let offset = i32::try_from(offset).ok()?;
    FIRST_BLOCK_YEAR.checked_add(offset)
}

#[derive(Debug, Clone, Default)]
pub struct HistoricalDataset {
    blocks: BTreeMap<u32, Block>,
    incomplete: BTreeSet<u32>,
    yields: BTreeMap<i32, YieldRecord>,
    genesis_dates: HashMap<String, NaiveDate>,
    power_law_fits: HashMap<String, PowerLawFit>,
}

impl HistoricalDataset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(paths: &DatasetPaths) -> Result<Self, DatasetError> {
        let mut dataset = Self::new();

        let parsed = parse_blocks_csv(&loader::read_file(&paths.blocks_csv)?)?;
        dataset.extend_blocks(parsed);

        if let Some(path) = &paths.yields_csv {
            for (year, record) in parse_yields_csv(&loader::read_file(path)?)? {
                dataset.insert_yield(year, record);
            }
        }

        if let Some(path) = &paths.crypto_json {
            let crypto = parse_crypto_json(&loader::read_file(path)?)?;
            for (symbol, date) in crypto.genesis_dates {
                dataset.insert_genesis_date(&symbol, date);
            }
            for (symbol, fit) in crypto.power_law_fits {
                dataset.insert_power_law_fit(&symbol, fit);
            }
        }

        info!(
            blocks = dataset.blocks.len(),
            incomplete = dataset.incomplete.len(),
            yield_years = dataset.yields.len(),
            crypto_fits = dataset.power_law_fits.len(),
            "historical dataset loaded"
        );
        Ok(dataset)
    }

    pub fn extend_blocks(&mut self, parsed: ParsedBlocks) {
        for block in parsed.blocks {
            self.insert_block(block);
        }
        for number in parsed.incomplete {
            self.mark_incomplete(number);
        }
    }

    pub fn insert_block(&mut self, block: Block) {
        self.blocks.insert(block.number, block);
    }

    pub fn mark_incomplete(&mut self, block_number: u32) {
        self.incomplete.insert(block_number);
    }

    pub fn insert_yield(&mut self, year: i32, record: YieldRecord) {
        self.yields.insert(year, record);
    }

    pub fn insert_genesis_date(&mut self, symbol: &str, date: NaiveDate) {
        self.genesis_dates.insert(symbol.to_ascii_uppercase(), date);
    }

    pub fn insert_power_law_fit(&mut self, symbol: &str, fit: PowerLawFit) {
        self.power_law_fits.insert(symbol.to_ascii_uppercase(), fit);
    }

    pub fn series(&self, block_number: u32) -> Option<&Block> {
        self.blocks.get(&block_number)
    }

    pub fn historical_year(&self, block_number: u32, year_index: u32) -> Option<i32> {
        historical_year(block_number, year_index)
    }

    pub fn is_incomplete(&self, block_number: u32) -> bool {
        self.incomplete.contains(&block_number)
    }

    pub fn block_numbers(&self, exclude_incomplete: bool) -> Vec<u32> {
        self.blocks
            .keys()
            .copied()
            .filter(|number| !(exclude_incomplete && self.is_incomplete(*number)))
            .collect()
    }

    pub fn block_count(&self, exclude_incomplete: bool) -> usize {
        self.block_numbers(exclude_incomplete).len()
    }

    /// Prevailing yield for a fixed-income class. Corporate bonds fall back to
    /// the treasury yield when the year has no separate figure.
    pub fn yield_for(&self, calendar_year: i32, asset: &AssetClass) -> Option<f64> {
        let record = self.yields.get(&calendar_year)?;
        match asset {
            AssetClass::Treasury10Year => record.treasury_10_year,
            AssetClass::BaaCorp => record.baa_corp.or(record.treasury_10_year),
            _ => None,
        }
    }

    pub fn genesis_date(&self, symbol: &str) -> Option<NaiveDate> {
        self.genesis_dates.get(&symbol.to_ascii_uppercase()).copied()
    }

    pub fn power_law_fit(&self, symbol: &str) -> Option<&PowerLawFit> {
        self.power_law_fits.get(&symbol.to_ascii_uppercase())
    }

    pub fn power_law_return(
        &self,
        asset: &AssetClass,
        band: PowerLawBand,
        start_year: i32,
    ) -> Option<f64> {
        let symbol = asset.crypto_symbol()?;
        let genesis = self.genesis_date(symbol)?;
        let fit = self.power_law_fit(symbol)?;
        power_law::percentage_return(genesis, fit.params(band), start_year, None)
    }
}
