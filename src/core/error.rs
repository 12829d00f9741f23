use thiserror::Error;

/// Precondition failures. Raised before any solving starts; the batch does not run.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("years must be finite and > 0, got {0}")]
    InvalidHorizon(f64),

    #[error("base anchor `{field}` must be finite, got {value}")]
    NonFiniteAnchor { field: &'static str, value: f64 },

    #[error("base anchor `{field}` must be > 0, got {value}")]
    NonPositiveAnchor { field: &'static str, value: f64 },

    #[error("base market cap (enterprise value - net debt) must be > 0, got {0}")]
    NonPositiveBaseMarketCap(f64),

    #[error("simulated table is empty")]
    EmptyTable,

    #[error("driver column `{0}` has no finite values")]
    NonNumericColumn(&'static str),

    #[error("target probability must be strictly between 0 and 1, got {0}")]
    InvalidProbability(f64),

    #[error("tolerance must be finite and in (0, 0.5), got {0}")]
    InvalidTolerance(f64),

    #[error("max_iterations must be > 0")]
    InvalidMaxIterations,

    #[error("simulations must be > 0")]
    InvalidSimulations,

    #[error("statistics for `{driver}` must be finite with p10 <= median <= p90, got {p10} / {median} / {p90}")]
    InvalidDriverStats {
        driver: &'static str,
        median: f64,
        p10: f64,
        p90: f64,
    },
}

/// Domain errors raised by the TSR transform for a single row.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum TsrError {
    #[error("{factor} ratio must be > 0 for a fractional power, got {ratio}")]
    NonPositiveRatio { factor: &'static str, ratio: f64 },

    #[error("TSR evaluated to a non-finite value ({0})")]
    NonFinite(f64),
}

#[derive(Debug, Error)]
pub enum StatsError {
    #[error("'{0}' not found in summary table")]
    TitleNotFound(String),

    #[error("could not find summary statistics rows below '{0}'")]
    NoSummaryRows(String),

    #[error("failed to read summary table: {0}")]
    Csv(#[from] csv::Error),
}
