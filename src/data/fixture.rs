use chrono::NaiveDate;

use crate::core::{AnnualRecord, BLOCK_LENGTH, Block, PowerLawFit, PowerLawParams};

use super::{HistoricalDataset, YieldRecord};

pub const SAMPLE_BLOCKS: u32 = 6;
pub const INCOMPLETE_BLOCK: u32 = 7;

fn synthetic_record(block: u32, year: u32) -> AnnualRecord {
    let phase = f64::from(block) * 1.7 + f64::from(year) * 0.9;
    AnnualRecord {
        year,
        sp500: 8.0 + 14.0 * phase.sin(),
        us_small_cap: 9.0 + 18.0 * (phase * 1.3).cos(),
        t_bill: 3.0 + 1.5 * (phase * 0.5).sin(),
        treasury_10_year: 4.0 + 6.0 * (phase * 0.7).cos(),
        baa_corp: 5.0 + 5.0 * (phase * 0.6).sin(),
        real_estate: 6.0 + 9.0 * (phase * 0.8).sin(),
        gold: 4.0 + 16.0 * (phase * 1.1).cos(),
        inflation: 3.0 + 2.0 * (phase * 0.4).sin(),
        sp500_dividend_yield: 2.0 + 0.5 * phase.cos(),
        us_small_cap_dividend_yield: 1.5,
        bitcoin: if block >= 4 { 60.0 * (phase * 0.9).sin() } else { 0.0 },
        international_equity: 7.0 + 12.0 * (phase * 0.95).cos(),
        emerging_markets: 9.0 + 20.0 * (phase * 1.05).sin(),
        nasdaq100: 11.0 + 22.0 * (phase * 1.2).sin(),
    }
}

fn with_yields_and_crypto(mut dataset: HistoricalDataset) -> HistoricalDataset {
    for year in 1970..=2100 {
        let phase = f64::from(year - 1970) * 0.35;
        dataset.insert_yield(
            year,
            YieldRecord {
                treasury_10_year: Some(5.0 + 2.0 * phase.sin()),
                baa_corp: Some(6.5 + 2.0 * phase.cos()),
            },
        );
    }

    dataset.insert_genesis_date("BTC", date(2009, 1, 3));
    dataset.insert_power_law_fit(
        "BTC",
        PowerLawFit::new(PowerLawParams {
            coefficient_a: 1.234_567_89e-7,
            exponent_b: 2.123_456_78,
            offset_c: 30.123_456_78,
        }),
    );
    dataset.insert_genesis_date("SOL", date(2020, 3, 16));
    dataset.insert_power_law_fit(
        "SOL",
        PowerLawFit::new(PowerLawParams {
            coefficient_a: 2.020_798_297_387_611_5e-7,
            exponent_b: 2.703_111_530_476_079,
            offset_c: 36.974_261_611_183_82,
        }),
    );
    dataset
}

fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid fixture date")
}

pub fn sample_dataset() -> HistoricalDataset {
    let mut dataset = HistoricalDataset::new();
    for number in 1..=SAMPLE_BLOCKS {
        let records = (1..=BLOCK_LENGTH as u32)
            .map(|year| synthetic_record(number, year))
            .collect();
        dataset.insert_block(Block { number, records });
    }
    with_yields_and_crypto(dataset)
}

pub fn sample_dataset_with_incomplete() -> HistoricalDataset {
    let mut dataset = sample_dataset();
    let records = (1..=BLOCK_LENGTH as u32)
        .map(|year| synthetic_record(INCOMPLETE_BLOCK, year))
        .collect();
    dataset.insert_block(Block {
        number: INCOMPLETE_BLOCK,
        records,
    });
    dataset.mark_incomplete(INCOMPLETE_BLOCK);
    dataset
}

pub fn uniform_dataset(
    blocks: u32,
    record: impl Fn(u32) -> AnnualRecord,
    bond_yield: f64,
) -> HistoricalDataset {
    let mut dataset = HistoricalDataset::new();
    for number in 1..=blocks {
        let records = (1..=BLOCK_LENGTH as u32)
            .map(|year| AnnualRecord {
                year,
                ..record(year)
            })
            .collect();
        dataset.insert_block(Block { number, records });
    }
    for year in 1960..=2100 {
        dataset.insert_yield(
            year,
            YieldRecord {
                treasury_10_year: Some(bond_yield),
                baa_corp: Some(bond_yield),
            },
        );
    }
    dataset
}
