use axum::{
    Router,
    extract::{Json, Query},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use clap::{Args, Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::core::{
    BaseAnchors, DriverStats, FixedStats, ForecastStats, GoalSeekConfig, GoalSeekEngine,
    GoalSeekResult, Horizon, SamplerConfig, StatsProvider, SummaryTable, sample,
};
use crate::report::{render_table, results_csv};

#[derive(Parser, Debug)]
#[command(
    name = "tsr-goalseek",
    about = "Monte Carlo TSR distribution and goal-seek of implied driver levels and share price"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Simulate, goal-seek and print the result table.
    Run(Box<RunArgs>),
    /// Serve the goal-seek HTTP API.
    Serve {
        #[arg(long, default_value_t = 8080)]
        port: u16,
    },
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    #[arg(long, default_value_t = 1630.0, help = "Base-year revenue (R0)")]
    revenue: f64,
    #[arg(long, default_value_t = 0.23, help = "Base-year EBITDA margin (M0)")]
    ebitda_margin: f64,
    #[arg(long, default_value_t = 16.45, help = "Base-year EV/EBITDA multiple (E0)")]
    ev_ebitda: f64,
    #[arg(long, default_value_t = 6164.0, help = "Base-year enterprise value (EV0)")]
    enterprise_value: f64,
    #[arg(long, default_value_t = 508.0, help = "Base-year net debt (D0)")]
    net_debt: f64,
    #[arg(long, default_value_t = 140.0, help = "Base-year shares outstanding (S0)")]
    shares: f64,
    #[arg(long, default_value_t = 0.0, help = "Terminal-year dividend yield (Y1)")]
    terminal_dividend_yield: f64,
    #[arg(long, default_value_t = 370.0, help = "Terminal-year net debt (D1)")]
    terminal_net_debt: f64,
    #[arg(long, default_value_t = 139.5833, help = "Terminal-year shares outstanding (S1)")]
    terminal_shares: f64,
    #[arg(long, default_value_t = 2.0, help = "Forecast horizon in years")]
    years: f64,

    #[arg(long, default_value_t = 1800.0)]
    revenue_median: f64,
    #[arg(long, default_value_t = 1600.0)]
    revenue_p10: f64,
    #[arg(long, default_value_t = 2000.0)]
    revenue_p90: f64,
    #[arg(long, default_value_t = 0.24)]
    margin_median: f64,
    #[arg(long, default_value_t = 0.20)]
    margin_p10: f64,
    #[arg(long, default_value_t = 0.28)]
    margin_p90: f64,
    #[arg(long, default_value_t = 15.0)]
    multiple_median: f64,
    #[arg(long, default_value_t = 12.0)]
    multiple_p10: f64,
    #[arg(long, default_value_t = 18.0)]
    multiple_p90: f64,

    #[arg(
        long,
        help = "CSV export of the forecast summary sheet; overrides the driver statistic flags"
    )]
    stats_csv: Option<PathBuf>,
    #[arg(long, help = "Ticker whose summary block is read from --stats-csv")]
    ticker: Option<String>,
    #[arg(long, default_value = "CY2026", help = "Forecast column tag, e.g. CY2026")]
    forecast_tag: String,

    #[arg(long, default_value_t = 10_000)]
    simulations: u32,
    #[arg(long, default_value_t = 42)]
    seed: u64,
    #[arg(
        long,
        value_delimiter = ',',
        default_values_t = [0.8, 0.5, 0.2],
        help = "Target TSR probabilities, comma separated"
    )]
    probabilities: Vec<f64>,
    #[arg(long, default_value_t = 1e-6)]
    tolerance: f64,
    #[arg(long, default_value_t = 100)]
    max_iterations: u32,
    #[arg(long, help = "Write the result table as CSV to this path")]
    output: Option<PathBuf>,
}

/// Everything one analysis needs, resolved and validated.
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    pub anchors: BaseAnchors,
    pub horizon: Horizon,
    pub stats: ForecastStats,
    pub sampler: SamplerConfig,
    pub goal_seek: GoalSeekConfig,
    pub probabilities: Vec<f64>,
}

#[derive(Debug, Clone)]
pub struct AnalysisReport {
    pub results: Vec<GoalSeekResult>,
    pub rejected_rows: usize,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct GoalSeekPayload {
    revenue: Option<f64>,
    ebitda_margin: Option<f64>,
    ev_ebitda: Option<f64>,
    enterprise_value: Option<f64>,
    net_debt: Option<f64>,
    shares: Option<f64>,
    terminal_dividend_yield: Option<f64>,
    terminal_net_debt: Option<f64>,
    terminal_shares: Option<f64>,
    years: Option<f64>,

    revenue_median: Option<f64>,
    revenue_p10: Option<f64>,
    revenue_p90: Option<f64>,
    margin_median: Option<f64>,
    margin_p10: Option<f64>,
    margin_p90: Option<f64>,
    multiple_median: Option<f64>,
    multiple_p10: Option<f64>,
    multiple_p90: Option<f64>,

    simulations: Option<u32>,
    seed: Option<u64>,
    probabilities: Option<ProbabilityList>,
    tolerance: Option<f64>,
    max_iterations: Option<u32>,
}

/// JSON bodies send an array; query strings send `0.8,0.5,0.2`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ProbabilityList {
    List(Vec<f64>),
    Delimited(String),
}

impl ProbabilityList {
    fn into_vec(self) -> Result<Vec<f64>, String> {
        match self {
            ProbabilityList::List(values) => Ok(values),
            ProbabilityList::Delimited(text) => text
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| {
                    s.parse::<f64>()
                        .map_err(|_| format!("probabilities: '{s}' is not a number"))
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GoalSeekResponse {
    anchors: BaseAnchors,
    years: Horizon,
    simulations: u32,
    seed: u64,
    rejected_rows: usize,
    results: Vec<GoalSeekResult>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

pub fn build_config(args: &RunArgs) -> Result<AnalysisConfig, String> {
    let anchors = BaseAnchors {
        revenue: args.revenue,
        ebitda_margin: args.ebitda_margin,
        ev_ebitda: args.ev_ebitda,
        enterprise_value: args.enterprise_value,
        net_debt: args.net_debt,
        shares: args.shares,
        terminal_dividend_yield: args.terminal_dividend_yield,
        terminal_net_debt: args.terminal_net_debt,
        terminal_shares: args.terminal_shares,
    };
    anchors.validate().map_err(|e| e.to_string())?;
    let horizon = Horizon::new(args.years).map_err(|e| e.to_string())?;

    let provider: Box<dyn StatsProvider> = match &args.stats_csv {
        Some(path) => {
            let Some(ticker) = args.ticker.as_deref() else {
                return Err("--ticker is required with --stats-csv".to_string());
            };
            let file = File::open(path)
                .map_err(|e| format!("failed to open {}: {e}", path.display()))?;
            Box::new(SummaryTable::from_reader(ticker, file).map_err(|e| e.to_string())?)
        }
        None => Box::new(FixedStats(ForecastStats {
            revenue: DriverStats {
                median: args.revenue_median,
                p10: args.revenue_p10,
                p90: args.revenue_p90,
            },
            ebitda_margin: DriverStats {
                median: args.margin_median,
                p10: args.margin_p10,
                p90: args.margin_p90,
            },
            ev_ebitda: DriverStats {
                median: args.multiple_median,
                p10: args.multiple_p10,
                p90: args.multiple_p90,
            },
        })),
    };
    let stats = provider
        .forecast_stats(&args.forecast_tag)
        .map_err(|e| e.to_string())?;

    if args.probabilities.is_empty() {
        return Err("--probabilities must list at least one value".to_string());
    }
    if let Some(p) = args
        .probabilities
        .iter()
        .find(|p| !(**p > 0.0 && **p < 1.0))
    {
        return Err(format!("--probabilities must be between 0 and 1, got {p}"));
    }

    let goal_seek = GoalSeekConfig {
        tolerance: args.tolerance,
        max_iterations: args.max_iterations,
    };
    goal_seek.validate().map_err(|e| e.to_string())?;

    if args.simulations == 0 {
        return Err("--simulations must be > 0".to_string());
    }

    Ok(AnalysisConfig {
        anchors,
        horizon,
        stats,
        sampler: SamplerConfig {
            simulations: args.simulations,
            seed: args.seed,
        },
        goal_seek,
        probabilities: args.probabilities.clone(),
    })
}

pub fn run_analysis(config: &AnalysisConfig) -> Result<AnalysisReport, String> {
    let table = sample(&config.stats, &config.sampler).map_err(|e| e.to_string())?;
    let engine = GoalSeekEngine::new(&table, config.anchors, config.horizon, config.goal_seek)
        .map_err(|e| e.to_string())?;
    let results = engine
        .solve(&config.probabilities)
        .map_err(|e| e.to_string())?;
    Ok(AnalysisReport {
        results,
        rejected_rows: engine.rejected_rows(),
    })
}

pub fn run_cli(args: &RunArgs) -> Result<(), String> {
    let config = build_config(args)?;
    let report = run_analysis(&config)?;

    print!("{}", render_table(&report.results));

    if let Some(path) = &args.output {
        let csv = results_csv(&report.results).map_err(|e| e.to_string())?;
        fs::write(path, csv).map_err(|e| format!("failed to write {}: {e}", path.display()))?;
        info!(path = %path.display(), "wrote goal-seek table");
    }
    Ok(())
}

pub async fn run_http_server(port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let app = Router::new()
        .route("/health", get(health_handler))
        .route(
            "/api/goal-seek",
            get(goal_seek_get_handler).post(goal_seek_post_handler),
        )
        .fallback(not_found_handler);

    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "goal-seek HTTP API listening");

    axum::serve(listener, app).await
}

async fn health_handler() -> impl IntoResponse {
    with_cache_control("ok")
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn goal_seek_get_handler(Query(payload): Query<GoalSeekPayload>) -> Response {
    goal_seek_handler_impl(payload).await
}

async fn goal_seek_post_handler(Json(payload): Json<GoalSeekPayload>) -> Response {
    goal_seek_handler_impl(payload).await
}

async fn goal_seek_handler_impl(payload: GoalSeekPayload) -> Response {
    let config = match api_config_from_payload(payload) {
        Ok(config) => config,
        Err(msg) => return error_response(StatusCode::BAD_REQUEST, &msg),
    };

    let job_config = config.clone();
    let report = match tokio::task::spawn_blocking(move || run_analysis(&job_config)).await {
        Ok(Ok(report)) => report,
        Ok(Err(msg)) => return error_response(StatusCode::BAD_REQUEST, &msg),
        Err(e) => {
            error!(error = %e, "goal-seek task failed");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "goal-seek task failed");
        }
    };

    json_response(StatusCode::OK, build_goal_seek_response(&config, report))
}

fn with_cache_control<R: IntoResponse>(response: R) -> Response {
    let mut response = response.into_response();
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        header::HeaderValue::from_static("no-store"),
    );
    response
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    with_cache_control((status, Json(body)))
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
fn api_config_from_json(json: &str) -> Result<AnalysisConfig, String> {
    let payload = serde_json::from_str::<GoalSeekPayload>(json)
        .map_err(|e| format!("Invalid API JSON payload: {e}"))?;
    api_config_from_payload(payload)
}

fn api_config_from_payload(payload: GoalSeekPayload) -> Result<AnalysisConfig, String> {
    let mut args = default_run_args();

    let overrides = [
        (payload.revenue, &mut args.revenue),
        (payload.ebitda_margin, &mut args.ebitda_margin),
        (payload.ev_ebitda, &mut args.ev_ebitda),
        (payload.enterprise_value, &mut args.enterprise_value),
        (payload.net_debt, &mut args.net_debt),
        (payload.shares, &mut args.shares),
        (
            payload.terminal_dividend_yield,
            &mut args.terminal_dividend_yield,
        ),
        (payload.terminal_net_debt, &mut args.terminal_net_debt),
        (payload.terminal_shares, &mut args.terminal_shares),
        (payload.years, &mut args.years),
        (payload.revenue_median, &mut args.revenue_median),
        (payload.revenue_p10, &mut args.revenue_p10),
        (payload.revenue_p90, &mut args.revenue_p90),
        (payload.margin_median, &mut args.margin_median),
        (payload.margin_p10, &mut args.margin_p10),
        (payload.margin_p90, &mut args.margin_p90),
        (payload.multiple_median, &mut args.multiple_median),
        (payload.multiple_p10, &mut args.multiple_p10),
        (payload.multiple_p90, &mut args.multiple_p90),
        (payload.tolerance, &mut args.tolerance),
    ];
    for (value, slot) in overrides {
        if let Some(v) = value {
            *slot = v;
        }
    }

    if let Some(v) = payload.simulations {
        args.simulations = v;
    }
    if let Some(v) = payload.seed {
        args.seed = v;
    }
    if let Some(v) = payload.max_iterations {
        args.max_iterations = v;
    }
    if let Some(list) = payload.probabilities {
        args.probabilities = list.into_vec()?;
    }

    build_config(&args)
}

fn default_run_args() -> RunArgs {
    RunArgs {
        revenue: 1630.0,
        ebitda_margin: 0.23,
        ev_ebitda: 16.45,
        enterprise_value: 6164.0,
        net_debt: 508.0,
        shares: 140.0,
        terminal_dividend_yield: 0.0,
        terminal_net_debt: 370.0,
        terminal_shares: 139.5833,
        years: 2.0,
        revenue_median: 1800.0,
        revenue_p10: 1600.0,
        revenue_p90: 2000.0,
        margin_median: 0.24,
        margin_p10: 0.20,
        margin_p90: 0.28,
        multiple_median: 15.0,
        multiple_p10: 12.0,
        multiple_p90: 18.0,
        stats_csv: None,
        ticker: None,
        forecast_tag: "CY2026".to_string(),
        simulations: 10_000,
        seed: 42,
        probabilities: vec![0.8, 0.5, 0.2],
        tolerance: 1e-6,
        max_iterations: 100,
        output: None,
    }
}

fn build_goal_seek_response(config: &AnalysisConfig, report: AnalysisReport) -> GoalSeekResponse {
    GoalSeekResponse {
        anchors: config.anchors,
        years: config.horizon,
        simulations: config.sampler.simulations,
        seed: config.sampler.seed,
        rejected_rows: report.rejected_rows,
        results: report.results,
    }
}
