use axum::{
    Router,
    extract::{Json, Path, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::core::{
    Allocation, AnnualRecord, AssetClass, ForecastOptions, ForecastSummary, PowerLawBand,
    ReturnWindow, TaxBracket, TaxCalculator, current_year, run_all_scenarios, run_scenario,
};
use crate::data::{DatasetPaths, HistoricalDataset};

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliPowerLawBand {
    Core,
    Lower,
    Upper,
}

impl From<CliPowerLawBand> for PowerLawBand {
    fn from(value: CliPowerLawBand) -> Self {
        match value {
            CliPowerLawBand::Core => PowerLawBand::Core,
            CliPowerLawBand::Lower => PowerLawBand::Lower,
            CliPowerLawBand::Upper => PowerLawBand::Upper,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum ApiPowerLawBand {
    #[serde(alias = "CORE", alias = "fit")]
    Core,
    #[serde(alias = "LOWER", alias = "lowerBound", alias = "lower_bound")]
    Lower,
    #[serde(alias = "UPPER", alias = "upperBound", alias = "upper_bound")]
    Upper,
}

impl From<ApiPowerLawBand> for CliPowerLawBand {
    fn from(value: ApiPowerLawBand) -> Self {
        match value {
            ApiPowerLawBand::Core => CliPowerLawBand::Core,
            ApiPowerLawBand::Lower => CliPowerLawBand::Lower,
            ApiPowerLawBand::Upper => CliPowerLawBand::Upper,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "blockboot",
    about = "Back-tests a portfolio allocation against every sequence of historical decades"
)]
pub struct Cli {
    #[command(flatten)]
    pub dataset: DatasetArgs,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Args, Debug, Clone)]
pub struct DatasetArgs {
    #[arg(
        long,
        global = true,
        default_value = "data/blocks.csv",
        help = "CSV of ten-year return blocks"
    )]
    pub blocks_csv: PathBuf,
    #[arg(
        long,
        global = true,
        help = "CSV of prevailing bond yields by calendar year"
    )]
    pub yields_csv: Option<PathBuf>,
    #[arg(
        long,
        global = true,
        help = "JSON with crypto genesis dates and power-law fits"
    )]
    pub crypto_json: Option<PathBuf>,
}

impl DatasetArgs {
    pub fn paths(&self) -> DatasetPaths {
        DatasetPaths {
            blocks_csv: self.blocks_csv.clone(),
            yields_csv: self.yields_csv.clone(),
            crypto_json: self.crypto_json.clone(),
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run every block sequence for the window and print the summary.
    Forecast(ForecastArgs),
    /// Run one explicit block sequence and print its yearly detail.
    Scenario {
        #[arg(long, value_delimiter = ',', required = true)]
        blocks: Vec<u32>,
        #[command(flatten)]
        forecast: ForecastArgs,
    },
    /// Serve the JSON API.
    Serve {
        #[arg(long, default_value_t = 8080)]
        port: u16,
    },
}

#[derive(Args, Debug, Clone)]
pub struct ForecastArgs {
    #[arg(long, default_value_t = 100_000.0)]
    starting_amount: f64,
    #[arg(
        long = "allocation",
        value_parser = parse_allocation,
        default_values = ["sp500=60", "treasury10Year=40"],
        help = "Target weight as key=percent, e.g. sp500=60 or crypto:SOL=5; repeat per asset"
    )]
    allocations: Vec<Allocation>,
    #[arg(long, help = "Restore target weights at every year end")]
    rebalance: bool,
    #[arg(long, help = "Deflate every return by that year's inflation")]
    inflation_adjusted: bool,
    #[arg(long, default_value_t = 10, help = "Return window in years: 10, 20 or 30")]
    window: u32,
    #[arg(
        long,
        help = "Value crypto from its historical series instead of the power-law model"
    )]
    crypto_historical_price: bool,
    #[arg(long, help = "Also run blocks flagged as missing data")]
    include_incomplete_blocks: bool,
    #[arg(long, value_enum, default_value_t = CliPowerLawBand::Core)]
    power_law_band: CliPowerLawBand,
    #[arg(
        long,
        help = "Calendar year the power-law projection starts from; defaults to the current year"
    )]
    base_year: Option<i32>,
    #[arg(long, default_value_t = 20.0, help = "Long-term capital gains rate in percent")]
    long_term_rate: f64,
    #[arg(long, default_value_t = 600_000.0)]
    niit_threshold: f64,
    #[arg(long, default_value_t = 3.8, help = "Net investment income surtax in percent")]
    niit_rate: f64,
    #[arg(long, default_value_t = 28.0, help = "Collectible gains rate in percent")]
    collectible_rate: f64,
    #[arg(skip)]
    tax_brackets: Option<Vec<TaxBracket>>,
}

fn parse_allocation(raw: &str) -> Result<Allocation, String> {
    let (key, percent) = raw
        .rsplit_once('=')
        .ok_or_else(|| format!("expected key=percent, got `{raw}`"))?;
    let key: AssetClass = key.parse().map_err(|e| format!("{e}"))?;
    let value = percent
        .trim()
        .trim_end_matches('%')
        .parse::<f64>()
        .map_err(|_| format!("invalid percentage `{percent}` for {key}"))?;
    Ok(Allocation {
        label: key.display_name(),
        key,
        value,
    })
}

#[derive(Debug, Clone)]
struct ForecastRequest {
    starting_amount: f64,
    allocations: Vec<Allocation>,
    options: ForecastOptions,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ForecastPayload {
    starting_amount: Option<f64>,
    allocations: Option<Vec<Allocation>>,
    rebalance: Option<bool>,
    inflation_adjusted: Option<bool>,
    #[serde(alias = "returnWindow")]
    window: Option<u32>,
    crypto_use_historical_price: Option<bool>,
    exclude_incomplete_blocks: Option<bool>,
    power_law_band: Option<ApiPowerLawBand>,
    base_year: Option<i32>,
    tax: Option<TaxCalculator>,
    block_numbers: Option<Vec<u32>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ForecastResponse {
    starting_amount: f64,
    allocations: Vec<Allocation>,
    window: ReturnWindow,
    rebalance: bool,
    inflation_adjusted: bool,
    #[serde(flatten)]
    summary: ForecastSummary,
}

#[derive(Debug, Serialize)]
struct BlockResponse<'a> {
    block: &'a [AnnualRecord],
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    blocks: usize,
    complete_blocks: usize,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

fn build_forecast_request(args: ForecastArgs) -> Result<ForecastRequest, String> {
    if !args.starting_amount.is_finite() || args.starting_amount <= 0.0 {
        return Err("--starting-amount must be > 0".to_string());
    }

    if args.allocations.is_empty() {
        return Err("at least one --allocation is required".to_string());
    }

    let mut seen = BTreeSet::new();
    for allocation in &args.allocations {
        if !allocation.value.is_finite() || !(0.0..=100.0).contains(&allocation.value) {
            return Err(format!(
                "--allocation {} must be between 0 and 100",
                allocation.key
            ));
        }
        if !seen.insert(allocation.key.clone()) {
            return Err(format!(
                "--allocation {} is given more than once",
                allocation.key
            ));
        }
    }

    let total: f64 = args.allocations.iter().map(|a| a.value).sum();
    if (total - 100.0).abs() > 1e-6 {
        return Err(format!(
            "--allocation percentages must sum to 100, got {total}"
        ));
    }

    let window = ReturnWindow::try_from(args.window)
        .map_err(|_| format!("--window must be 10, 20 or 30, got {}", args.window))?;

    for (flag, rate) in [
        ("--long-term-rate", args.long_term_rate),
        ("--niit-rate", args.niit_rate),
        ("--collectible-rate", args.collectible_rate),
    ] {
        if !(0.0..=100.0).contains(&rate) {
            return Err(format!("{flag} must be between 0 and 100"));
        }
    }

    if !args.niit_threshold.is_finite() || args.niit_threshold < 0.0 {
        return Err("--niit-threshold must be >= 0".to_string());
    }

    let brackets = args
        .tax_brackets
        .unwrap_or_else(|| TaxCalculator::default().brackets);
    validate_brackets(&brackets)?;

    let base_year = args.base_year.unwrap_or_else(current_year);
    if !(1900..=3000).contains(&base_year) {
        return Err("--base-year must be between 1900 and 3000".to_string());
    }

    let allocations = args
        .allocations
        .into_iter()
        .map(|allocation| {
            if allocation.label.trim().is_empty() {
                Allocation {
                    label: allocation.key.display_name(),
                    ..allocation
                }
            } else {
                allocation
            }
        })
        .collect();

    Ok(ForecastRequest {
        starting_amount: args.starting_amount,
        allocations,
        options: ForecastOptions {
            rebalance: args.rebalance,
            inflation_adjusted: args.inflation_adjusted,
            window,
            crypto_use_historical_price: args.crypto_historical_price,
            exclude_incomplete_blocks: !args.include_incomplete_blocks,
            power_law_band: args.power_law_band.into(),
            base_year,
            tax: TaxCalculator {
                brackets,
                long_term_rate: args.long_term_rate,
                niit_threshold: args.niit_threshold,
                niit_rate: args.niit_rate,
                collectible_rate: args.collectible_rate,
            },
        },
    })
}

fn validate_brackets(brackets: &[TaxBracket]) -> Result<(), String> {
    if brackets.is_empty() {
        return Err("tax.brackets must not be empty".to_string());
    }
    for (idx, bracket) in brackets.iter().enumerate() {
        if !(0.0..=100.0).contains(&bracket.rate) {
            return Err(format!("tax.brackets[{idx}].rate must be between 0 and 100"));
        }
        if bracket.end.is_some_and(|end| end <= bracket.start) {
            return Err(format!("tax.brackets[{idx}].end must be > start"));
        }
    }
    Ok(())
}

pub async fn run(cli: Cli) -> Result<(), String> {
    let dataset = HistoricalDataset::load(&cli.dataset.paths()).map_err(|e| e.to_string())?;

    match cli.command {
        Command::Serve { port } => run_http_server(port, dataset)
            .await
            .map_err(|e| format!("server error: {e}")),
        Command::Forecast(args) => {
            let request = build_forecast_request(args)?;
            let summary = run_all_scenarios(
                &dataset,
                request.starting_amount,
                &request.allocations,
                &request.options,
            );
            print_json(&build_forecast_response(request, summary))
        }
        Command::Scenario { blocks, forecast } => {
            let request = build_forecast_request(forecast)?;
            validate_block_sequence(&blocks, request.options.window)?;
            let scenario = run_scenario(
                &dataset,
                request.starting_amount,
                &request.allocations,
                &blocks,
                &request.options,
            )
            .map_err(|e| e.to_string())?;
            print_json(&scenario)
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), String> {
    let rendered =
        serde_json::to_string_pretty(value).map_err(|e| format!("failed to render JSON: {e}"))?;
    println!("{rendered}");
    Ok(())
}

fn validate_block_sequence(blocks: &[u32], window: ReturnWindow) -> Result<(), String> {
    if blocks.len() != window.block_count() {
        return Err(format!(
            "blockNumbers must list {} block(s) for a {}-year window",
            window.block_count(),
            window.years()
        ));
    }
    let distinct: BTreeSet<&u32> = blocks.iter().collect();
    if distinct.len() != blocks.len() {
        return Err("blockNumbers must not repeat a block".to_string());
    }
    Ok(())
}

#[derive(Clone)]
struct AppState {
    dataset: Arc<HistoricalDataset>,
}

fn router(dataset: HistoricalDataset) -> Router {
    let state = AppState {
        dataset: Arc::new(dataset),
    };
    Router::new()
        .route(
            "/api/forecast",
            get(forecast_get_handler).post(forecast_post_handler),
        )
        .route("/api/scenario", post(scenario_handler))
        .route("/api/block/:number", get(block_handler))
        .route("/api/health", get(health_handler))
        .fallback(not_found_handler)
        .with_state(state)
}

pub async fn run_http_server(port: u16, dataset: HistoricalDataset) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let app = router(dataset);

    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "blockboot HTTP API listening");

    axum::serve(listener, app).await
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn health_handler(State(state): State<AppState>) -> Response {
    json_response(
        StatusCode::OK,
        HealthResponse {
            status: "ok",
            blocks: state.dataset.block_count(false),
            complete_blocks: state.dataset.block_count(true),
        },
    )
}

async fn block_handler(State(state): State<AppState>, Path(number): Path<u32>) -> Response {
    match state.dataset.series(number) {
        Some(block) => json_response(
            StatusCode::OK,
            BlockResponse {
                block: &block.records,
            },
        ),
        None => error_response(StatusCode::NOT_FOUND, &format!("block {number} not found")),
    }
}

async fn forecast_get_handler(
    State(state): State<AppState>,
    Query(payload): Query<ForecastPayload>,
) -> Response {
    forecast_handler_impl(state, payload).await
}

async fn forecast_post_handler(
    State(state): State<AppState>,
    Json(payload): Json<ForecastPayload>,
) -> Response {
    forecast_handler_impl(state, payload).await
}

async fn forecast_handler_impl(state: AppState, payload: ForecastPayload) -> Response {
    let request = match forecast_request_from_payload(payload) {
        Ok((request, _)) => request,
        Err(msg) => return error_response(StatusCode::BAD_REQUEST, &msg),
    };

    let dataset = Arc::clone(&state.dataset);
    let outcome = tokio::task::spawn_blocking(move || {
        let summary = run_all_scenarios(
            &dataset,
            request.starting_amount,
            &request.allocations,
            &request.options,
        );
        build_forecast_response(request, summary)
    })
    .await;

    match outcome {
        Ok(response) => json_response(StatusCode::OK, response),
        Err(err) => {
            error!(error = %err, "forecast task failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "forecast failed")
        }
    }
}

async fn scenario_handler(
    State(state): State<AppState>,
    Json(payload): Json<ForecastPayload>,
) -> Response {
    let (request, blocks) = match forecast_request_from_payload(payload) {
        Ok((request, Some(blocks))) => (request, blocks),
        Ok((_, None)) => return error_response(StatusCode::BAD_REQUEST, "blockNumbers is required"),
        Err(msg) => return error_response(StatusCode::BAD_REQUEST, &msg),
    };
    if let Err(msg) = validate_block_sequence(&blocks, request.options.window) {
        return error_response(StatusCode::BAD_REQUEST, &msg);
    }

    let dataset = Arc::clone(&state.dataset);
    let outcome = tokio::task::spawn_blocking(move || {
        run_scenario(
            &dataset,
            request.starting_amount,
            &request.allocations,
            &blocks,
            &request.options,
        )
    })
    .await;

    match outcome {
        Ok(Ok(scenario)) => json_response(StatusCode::OK, scenario),
        Ok(Err(err)) => error_response(StatusCode::NOT_FOUND, &err.to_string()),
        Err(err) => {
            error!(error = %err, "scenario task failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "scenario failed")
        }
    }
}

fn with_cache_control(mut response: Response) -> Response {
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        header::HeaderValue::from_static("no-store"),
    );
    response
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    with_cache_control((status, Json(body)).into_response())
}

fn error_response(status: StatusCode, msg: &str) -> Response {
    json_response(
        status,
        ErrorResponse {
            error: msg.to_string(),
        },
    )
}

#[cfg(test)]
fn forecast_request_from_json(json: &str) -> Result<(ForecastRequest, Option<Vec<u32>>), String> {
    let payload = serde_json::from_str::<ForecastPayload>(json)
        .map_err(|e| format!("Invalid API JSON payload: {e}"))?;
    forecast_request_from_payload(payload)
}

fn forecast_request_from_payload(
    payload: ForecastPayload,
) -> Result<(ForecastRequest, Option<Vec<u32>>), String> {
    let mut args = default_forecast_args();

    if let Some(v) = payload.starting_amount {
        args.starting_amount = v;
    }
    if let Some(v) = payload.allocations {
        args.allocations = v;
    }
    if let Some(v) = payload.rebalance {
        args.rebalance = v;
    }
    if let Some(v) = payload.inflation_adjusted {
        args.inflation_adjusted = v;
    }
    if let Some(v) = payload.window {
        args.window = v;
    }
    if let Some(v) = payload.crypto_use_historical_price {
        args.crypto_historical_price = v;
    }
    if let Some(v) = payload.exclude_incomplete_blocks {
        args.include_incomplete_blocks = !v;
    }
    if let Some(v) = payload.power_law_band {
        args.power_law_band = v.into();
    }
    if let Some(v) = payload.base_year {
        args.base_year = Some(v);
    }
    if let Some(tax) = payload.tax {
        args.long_term_rate = tax.long_term_rate;
        args.niit_threshold = tax.niit_threshold;
        args.niit_rate = tax.niit_rate;
        args.collectible_rate = tax.collectible_rate;
        args.tax_brackets = Some(tax.brackets);
    }

    let request = build_forecast_request(args)?;
    Ok((request, payload.block_numbers))
}

fn default_forecast_args() -> ForecastArgs {
    let taxes = TaxCalculator::default();
    ForecastArgs {
        starting_amount: 100_000.0,
        allocations: vec![
            Allocation {
                key: AssetClass::Sp500,
                label: AssetClass::Sp500.display_name(),
                value: 60.0,
            },
            Allocation {
                key: AssetClass::Treasury10Year,
                label: AssetClass::Treasury10Year.display_name(),
                value: 40.0,
            },
        ],
        rebalance: false,
        inflation_adjusted: false,
        window: 10,
        crypto_historical_price: false,
        include_incomplete_blocks: false,
        power_law_band: CliPowerLawBand::Core,
        base_year: None,
        long_term_rate: taxes.long_term_rate,
        niit_threshold: taxes.niit_threshold,
        niit_rate: taxes.niit_rate,
        collectible_rate: taxes.collectible_rate,
        tax_brackets: None,
    }
}

fn build_forecast_response(request: ForecastRequest, summary: ForecastSummary) -> ForecastResponse {
    ForecastResponse {
        starting_amount: request.starting_amount,
        allocations: request.allocations,
        window: request.options.window,
        rebalance: request.options.rebalance,
        inflation_adjusted: request.options.inflation_adjusted,
        summary,
    }
}
