use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, StandardNormal};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::error::ConfigError;
use super::types::{Driver, DriverStats, ForecastStats, SimulatedRow, SimulatedTable};

/// Standard normal 90th percentile.
const Z90: f64 = 1.281_551_565_544_600_4;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SamplerConfig {
    pub simulations: u32,
    pub seed: u64,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            simulations: 10_000,
            seed: 42,
        }
    }
}

/// Two-piece normal pinned to a `{median, p10, p90}` triple: each half of the
/// distribution gets its own scale so both percentiles land exactly.
#[derive(Debug, Clone, Copy, PartialEq)]
struct SplitNormal {
    median: f64,
    lower_scale: f64,
    upper_scale: f64,
}

impl SplitNormal {
    fn from_stats(driver: Driver, stats: DriverStats) -> Result<Self, ConfigError> {
        let DriverStats { median, p10, p90 } = stats;
        let finite = median.is_finite() && p10.is_finite() && p90.is_finite();
        if !finite || p10 > median || median > p90 {
            return Err(ConfigError::InvalidDriverStats {
                driver: driver.label(),
                median,
                p10,
                p90,
            });
        }
        Ok(Self {
            median,
            lower_scale: (median - p10) / Z90,
            upper_scale: (p90 - median) / Z90,
        })
    }

    fn draw(&self, rng: &mut StdRng) -> f64 {
        let z: f64 = StandardNormal.sample(rng);
        if z < 0.0 {
            self.median + self.lower_scale * z
        } else {
            self.median + self.upper_scale * z
        }
    }
}

/// Draws `config.simulations` independent scenarios of the three drivers.
/// Deterministic for a given seed.
pub fn sample(stats: &ForecastStats, config: &SamplerConfig) -> Result<SimulatedTable, ConfigError> {
    if config.simulations == 0 {
        return Err(ConfigError::InvalidSimulations);
    }

    let revenue = SplitNormal::from_stats(Driver::Revenue, stats.revenue)?;
    let ebitda_margin = SplitNormal::from_stats(Driver::EbitdaMargin, stats.ebitda_margin)?;
    let ev_ebitda = SplitNormal::from_stats(Driver::EvEbitda, stats.ev_ebitda)?;

    let mut rng = StdRng::seed_from_u64(config.seed);
    let table: SimulatedTable = (0..config.simulations)
        .map(|_| SimulatedRow {
            revenue: revenue.draw(&mut rng),
            ebitda_margin: ebitda_margin.draw(&mut rng),
            ev_ebitda: ev_ebitda.draw(&mut rng),
        })
        .collect();

    debug!(
        simulations = config.simulations,
        seed = config.seed,
        "sampled driver table"
    );
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::quantile::SortedColumn;

    fn assert_close(actual: f64, expected: f64, tol: f64) {
        assert!(
            (actual - expected).abs() <= tol,
            "expected {expected}, got {actual}, tolerance {tol}"
        );
    }

    #[test]
    fn same_seed_reproduces_the_table() {
        let config = SamplerConfig {
            simulations: 200,
            seed: 7,
        };
        let a = sample(&ForecastStats::default(), &config).expect("valid stats");
        let b = sample(&ForecastStats::default(), &config).expect("valid stats");
        assert_eq!(a, b);
    }

    #[test]
    fn different_seeds_differ() {
        let stats = ForecastStats::default();
        let a = sample(&stats, &SamplerConfig { simulations: 50, seed: 1 }).expect("valid");
        let b = sample(&stats, &SamplerConfig { simulations: 50, seed: 2 }).expect("valid");
        assert_ne!(a, b);
    }

    #[test]
    fn large_sample_matches_configured_percentiles() {
        let stats = ForecastStats::default();
        let table = sample(&stats, &SamplerConfig::default()).expect("valid stats");
        assert_eq!(table.len(), 10_000);

        for driver in Driver::ALL {
            let wanted = stats.get(driver);
            let column = SortedColumn::new(table.column(driver)).expect("finite column");
            let spread = wanted.p90 - wanted.p10;
            assert_close(column.quantile(0.5), wanted.median, 0.03 * spread);
            assert_close(column.quantile(0.1), wanted.p10, 0.03 * spread);
            assert_close(column.quantile(0.9), wanted.p90, 0.03 * spread);
        }
    }

    #[test]
    fn skewed_stats_produce_skewed_samples() {
        let stats = ForecastStats {
            revenue: DriverStats {
                median: 100.0,
                p10: 90.0,
                p90: 140.0,
            },
            ..ForecastStats::default()
        };
        let table = sample(&stats, &SamplerConfig::default()).expect("valid stats");
        let column = SortedColumn::new(table.column(Driver::Revenue)).expect("finite column");
        let median = column.quantile(0.5);
        assert!(column.quantile(0.9) - median > 2.0 * (median - column.quantile(0.1)));
    }

    #[test]
    fn zero_width_stats_give_a_constant_column() {
        let flat = DriverStats {
            median: 5.0,
            p10: 5.0,
            p90: 5.0,
        };
        let stats = ForecastStats {
            revenue: flat,
            ..ForecastStats::default()
        };
        let table = sample(&stats, &SamplerConfig { simulations: 20, seed: 3 }).expect("valid");
        assert!(table.column(Driver::Revenue).iter().all(|&v| v == 5.0));
    }

    #[test]
    fn rejects_unordered_or_nan_stats() {
        let mut stats = ForecastStats::default();
        stats.ebitda_margin.p10 = 0.3;
        assert!(matches!(
            sample(&stats, &SamplerConfig::default()),
            Err(ConfigError::InvalidDriverStats {
                driver: "EBITDA Margin",
                ..
            })
        ));

        let mut stats = ForecastStats::default();
        stats.ev_ebitda.median = f64::NAN;
        assert!(sample(&stats, &SamplerConfig::default()).is_err());
    }

    #[test]
    fn rejects_zero_simulations() {
        let config = SamplerConfig {
            simulations: 0,
            seed: 1,
        };
        assert_eq!(
            sample(&ForecastStats::default(), &config),
            Err(ConfigError::InvalidSimulations)
        );
    }
}
