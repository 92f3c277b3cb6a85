use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

use crate::core::{AnnualRecord, BLOCK_LENGTH, Block, PowerLawFit};

use super::YieldRecord;

const MISSING_MARKER: &str = "#N/A";

const INCOMPLETE_MARKER_THRESHOLD: usize = 8;

pub const DEFAULT_SMALL_CAP_DIVIDEND_YIELD: f64 = 1.5;

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{file}: missing column `{column}`")]
    MissingColumn { file: &'static str, column: String },
    #[error("{file} line {line}: invalid number `{value}` in column `{column}`")]
    InvalidNumber {
        file: &'static str,
        line: usize,
        column: String,
        value: String,
    },
    #[error("blocks line {line}: invalid block number `{value}`")]
    InvalidBlockNumber { line: usize, value: String },
    #[error("{0} contains no data rows")]
    Empty(&'static str),
    #[error("crypto parameters JSON decode failed: {0}")]
    Json(#[from] serde_json::Error),
}

pub(crate) fn read_file(path: &Path) -> Result<String, DatasetError> {
    fs::read_to_string(path).map_err(|source| DatasetError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[derive(Debug, Default)]
pub struct ParsedBlocks {
    pub blocks: Vec<Block>,
    pub incomplete: Vec<u32>,
}

struct Columns {
    names: HashMap<String, usize>,
}

impl Columns {
    fn from_header(header: &str) -> Self {
        let names = split_row(header)
            .enumerate()
            .map(|(idx, name)| (name.to_ascii_lowercase(), idx))
            .collect();
        Self { names }
    }

    fn index(&self, file: &'static str, name: &str) -> Result<usize, DatasetError> {
        self.optional(name).ok_or_else(|| DatasetError::MissingColumn {
            file,
            column: name.to_string(),
        })
    }

    fn optional(&self, name: &str) -> Option<usize> {
        self.names.get(&name.to_ascii_lowercase()).copied()
    }
}

fn split_row(line: &str) -> impl Iterator<Item = &str> {
    line.split(',').map(str::trim)
}

fn parse_cell(
    file: &'static str,
    line: usize,
    column: &str,
    raw: Option<&str>,
) -> Result<Option<f64>, DatasetError> {
    let raw = raw.unwrap_or("").trim();
    if raw.is_empty() || raw.eq_ignore_ascii_case(MISSING_MARKER) {
        return Ok(None);
    }
    let cleaned = raw.trim_end_matches('%').trim();
    cleaned
        .parse::<f64>()
        .map(Some)
        .map_err(|_| DatasetError::InvalidNumber {
            file,
            line,
            column: column.to_string(),
            value: raw.to_string(),
        })
}

pub fn parse_blocks_csv(content: &str) -> Result<ParsedBlocks, DatasetError> {
    const FILE: &str = "blocks";

    let mut lines = content
        .lines()
        .enumerate()
        .map(|(idx, line)| (idx + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty());
    let Some((_, header)) = lines.next() else {
        return Err(DatasetError::Empty(FILE));
    };
    let columns = Columns::from_header(header);

    let block_col = columns.index(FILE, "block")?;
    let year_col = columns.index(FILE, "year")?;
    let return_cols = [
        "sp500",
        "usSmallCap",
        "TBill",
        "treasury10Year",
        "baaCorp",
        "realEstate",
        "gold",
        "inflation",
        "sp500DividendYield",
        "bitcoin",
        "internationalEquity",
        "emergingMarkets",
        "nasdaq100",
    ]
    .iter()
    .map(|name| columns.index(FILE, name).map(|idx| (*name, idx)))
    .collect::<Result<Vec<_>, _>>()?;
    let small_cap_yield_col = columns.optional("usSmallCapDividendYield");

    let mut grouped: BTreeMap<u32, Vec<AnnualRecord>> = BTreeMap::new();
    let mut incomplete = Vec::new();

    for (line_no, line) in lines {
        let cells: Vec<&str> = split_row(line).collect();
        let cell = |idx: usize| cells.get(idx).copied();

        let raw_block = cell(block_col).unwrap_or("");
        let block: u32 = raw_block
            .parse()
            .map_err(|_| DatasetError::InvalidBlockNumber {
                line: line_no,
                value: raw_block.to_string(),
            })?;
        let year = parse_cell(FILE, line_no, "year", cell(year_col))?.unwrap_or(0.0) as u32;

        let missing = cells
            .iter()
            .filter(|value| value.eq_ignore_ascii_case(MISSING_MARKER))
            .count();
        if missing >= INCOMPLETE_MARKER_THRESHOLD && !incomplete.contains(&block) {
            incomplete.push(block);
        }

        let mut values = HashMap::with_capacity(return_cols.len());
        for (name, idx) in &return_cols {
            let value = parse_cell(FILE, line_no, name, cell(*idx))?.unwrap_or(0.0);
            values.insert(*name, value);
        }
        let small_cap_dividend_yield = match small_cap_yield_col {
            Some(idx) => parse_cell(FILE, line_no, "usSmallCapDividendYield", cell(idx))?
                .unwrap_or(DEFAULT_SMALL_CAP_DIVIDEND_YIELD),
            None => DEFAULT_SMALL_CAP_DIVIDEND_YIELD,
        };

        grouped.entry(block).or_default().push(AnnualRecord {
            year,
            sp500: values["sp500"],
            us_small_cap: values["usSmallCap"],
            t_bill: values["TBill"],
            treasury_10_year: values["treasury10Year"],
            baa_corp: values["baaCorp"],
            real_estate: values["realEstate"],
            gold: values["gold"],
            inflation: values["inflation"],
            sp500_dividend_yield: values["sp500DividendYield"],
            us_small_cap_dividend_yield: small_cap_dividend_yield,
            bitcoin: values["bitcoin"],
            international_equity: values["internationalEquity"],
            emerging_markets: values["emergingMarkets"],
            nasdaq100: values["nasdaq100"],
        });
    }

    if grouped.is_empty() {
        return Err(DatasetError::Empty(FILE));
    }

    let blocks = grouped
        .into_iter()
        .map(|(number, mut records)| {
            records.sort_by_key(|record| record.year);
            if records.len() != BLOCK_LENGTH {
                warn!(
                    block = number,
                    records = records.len(),
                    "block does not hold a full decade, marking incomplete"
                );
                if !incomplete.contains(&number) {
                    incomplete.push(number);
                }
            }
            Block { number, records }
        })
        .collect();
    incomplete.sort_unstable();

    Ok(ParsedBlocks { blocks, incomplete })
}

pub fn parse_yields_csv(content: &str) -> Result<BTreeMap<i32, YieldRecord>, DatasetError> {
    const FILE: &str = "yields";

    let mut lines = content
        .lines()
        .enumerate()
        .map(|(idx, line)| (idx + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty())
        .peekable();

    let mut year_col = 0;
    let mut treasury_col = Some(1);
    let mut baa_col = Some(2);
    if let Some(&(_, first)) = lines.peek() {
        let first_cell = split_row(first).next().unwrap_or("");
        if first_cell.parse::<i32>().is_err() {
            let columns = Columns::from_header(first);
            year_col = columns.index(FILE, "year")?;
            treasury_col = columns.optional("treasury10Year");
            baa_col = columns.optional("baaCorp");
            lines.next();
        }
    }

    let mut yields = BTreeMap::new();
    for (line_no, line) in lines {
        let cells: Vec<&str> = split_row(line).collect();
        let cell = |idx: Option<usize>| idx.and_then(|i| cells.get(i).copied());

        let raw_year = cells.get(year_col).copied().unwrap_or("");
        let year: i32 = raw_year.parse().map_err(|_| DatasetError::InvalidNumber {
            file: FILE,
            line: line_no,
            column: "year".to_string(),
            value: raw_year.to_string(),
        })?;
        let record = YieldRecord {
            treasury_10_year: parse_cell(FILE, line_no, "treasury10Year", cell(treasury_col))?,
            baa_corp: parse_cell(FILE, line_no, "baaCorp", cell(baa_col))?,
        };
        yields.insert(year, record);
    }

    Ok(yields)
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CryptoParameters {
    pub genesis_dates: HashMap<String, NaiveDate>,
    pub power_law_fits: HashMap<String, PowerLawFit>,
}

pub fn parse_crypto_json(content: &str) -> Result<CryptoParameters, DatasetError> {
    let parsed: CryptoParameters = serde_json::from_str(content)?;
    for symbol in parsed.power_law_fits.keys() {
        if !parsed.genesis_dates.contains_key(symbol) {
            warn!(%symbol, "power-law fit has no genesis date and will never be used");
        }
    }
    Ok(parsed)
}
