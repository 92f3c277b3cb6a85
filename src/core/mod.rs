mod engine;
mod forecast;
mod ledger;
pub mod power_law;
mod rebalance;
pub mod stats;
mod tax;
mod types;

pub use engine::{SimulationTotals, calculate_cagr, run_scenario, simulate_sequence};
pub use forecast::{block_combinations, run_all_scenarios};
pub use ledger::{IncomeLedger, LedgerEntry};
pub use power_law::{PowerLawFit, PowerLawParams};
pub use rebalance::{Holding, Holdings, RebalanceOutcome, rebalance};
pub use tax::{DEFAULT_BRACKETS, TaxBracket, TaxBreakdown, TaxCalculator};
pub use types::{
    Allocation, AllocationTargets, AnnualRecord, AnnualResult, AssetClass, BLOCK_LENGTH, Block,
    FIRST_BLOCK_YEAR, ForecastError, ForecastOptions, ForecastScenario, ForecastSummary,
    IncomeRole, PercentileResult, PowerLawBand, ReturnWindow, UnknownAssetClass,
    allocation_targets, current_year,
};
