mod error;
mod quantile;
mod sampler;
mod solver;
mod stats;
mod tsr;
mod types;

pub use error::{ConfigError, StatsError, TsrError};
pub use quantile::{SortedColumn, clamp_probability};
pub use sampler::{SamplerConfig, sample};
pub use solver::{GoalSeekConfig, GoalSeekEngine, RootOutcome, find_root, solve};
pub use stats::{FixedStats, StatsProvider, SummaryTable};
pub use tsr::{RejectedRow, TsrTable, compute_tsr, enrich_row};
pub use types::{
    BaseAnchors, Driver, DriverStats, EnrichedRow, ForecastStats, GoalSeekResult, Horizon,
    SimulatedRow, SimulatedTable, Solution, SolveStatus, result_for,
};
