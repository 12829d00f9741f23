use serde::{Deserialize, Serialize};

use super::error::ConfigError;

/// Base-year financials and terminal-year assumptions the TSR chain compounds from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BaseAnchors {
    pub revenue: f64,
    pub ebitda_margin: f64,
    pub ev_ebitda: f64,
    pub enterprise_value: f64,
    pub net_debt: f64,
    pub shares: f64,
    pub terminal_dividend_yield: f64,
    pub terminal_net_debt: f64,
    pub terminal_shares: f64,
}

impl BaseAnchors {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let fields = [
            ("revenue", self.revenue),
            ("ebitda_margin", self.ebitda_margin),
            ("ev_ebitda", self.ev_ebitda),
            ("enterprise_value", self.enterprise_value),
            ("net_debt", self.net_debt),
            ("shares", self.shares),
            ("terminal_dividend_yield", self.terminal_dividend_yield),
            ("terminal_net_debt", self.terminal_net_debt),
            ("terminal_shares", self.terminal_shares),
        ];
        for (field, value) in fields {
            if !value.is_finite() {
                return Err(ConfigError::NonFiniteAnchor { field, value });
            }
        }

        let positive = [
            ("revenue", self.revenue),
            ("ebitda_margin", self.ebitda_margin),
            ("ev_ebitda", self.ev_ebitda),
            ("enterprise_value", self.enterprise_value),
            ("shares", self.shares),
            ("terminal_shares", self.terminal_shares),
        ];
        for (field, value) in positive {
            if value <= 0.0 {
                return Err(ConfigError::NonPositiveAnchor { field, value });
            }
        }

        let base_market_cap = self.base_market_cap();
        if base_market_cap <= 0.0 {
            return Err(ConfigError::NonPositiveBaseMarketCap(base_market_cap));
        }
        Ok(())
    }

    pub fn base_market_cap(&self) -> f64 {
        self.enterprise_value - self.net_debt
    }
}

impl Default for BaseAnchors {
    fn default() -> Self {
        Self {
            revenue: 1630.0,
            ebitda_margin: 0.23,
            ev_ebitda: 16.45,
            enterprise_value: 6164.0,
            net_debt: 508.0,
            shares: 140.0,
            terminal_dividend_yield: 0.0,
            terminal_net_debt: 370.0,
            terminal_shares: 139.5833,
        }
    }
}

/// Forecast horizon in years. Always finite and strictly positive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Horizon(f64);

impl Horizon {
    pub fn new(years: f64) -> Result<Self, ConfigError> {
        if !years.is_finite() || years <= 0.0 {
            return Err(ConfigError::InvalidHorizon(years));
        }
        Ok(Self(years))
    }

    pub fn years(self) -> f64 {
        self.0
    }
}

/// One simulated scenario of the three uncertain drivers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulatedRow {
    pub revenue: f64,
    pub ebitda_margin: f64,
    pub ev_ebitda: f64,
}

impl SimulatedRow {
    pub fn implied_enterprise_value(&self) -> f64 {
        self.ev_ebitda * self.revenue * self.ebitda_margin
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Driver {
    Revenue,
    EbitdaMargin,
    EvEbitda,
}

impl Driver {
    pub const ALL: [Driver; 3] = [Driver::Revenue, Driver::EbitdaMargin, Driver::EvEbitda];

    pub fn label(self) -> &'static str {
        match self {
            Driver::Revenue => "Revenue",
            Driver::EbitdaMargin => "EBITDA Margin",
            Driver::EvEbitda => "EV/EBITDA",
        }
    }

    pub fn of(self, row: &SimulatedRow) -> f64 {
        match self {
            Driver::Revenue => row.revenue,
            Driver::EbitdaMargin => row.ebitda_margin,
            Driver::EvEbitda => row.ev_ebitda,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimulatedTable {
    rows: Vec<SimulatedRow>,
}

impl SimulatedTable {
    pub fn new(rows: Vec<SimulatedRow>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[SimulatedRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column(&self, driver: Driver) -> Vec<f64> {
        self.rows.iter().map(|row| driver.of(row)).collect()
    }
}

impl FromIterator<SimulatedRow> for SimulatedTable {
    fn from_iter<I: IntoIterator<Item = SimulatedRow>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// A simulated row plus the derived CAGR chain and TSR. Produced only by the TSR transform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnrichedRow {
    pub driver: SimulatedRow,
    pub cagr_revenue: f64,
    pub cagr_ebitda_margin: f64,
    pub cagr_ev_ebitda: f64,
    pub cagr_mktcap_ev: f64,
    pub cagr_shares: f64,
    pub dividend_return: f64,
    pub tsr: f64,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SolveStatus {
    Solved,
    /// f(a) and f(b) share a sign.
    NoBracket,
    /// The TSR chain hit a domain error or a non-finite value.
    NonFinite,
    /// The TSR range over the bracket has zero width.
    Degenerate,
    MaxIterations,
    /// No row of the simulated population produced a finite TSR.
    EmptyDistribution,
}

impl SolveStatus {
    pub fn is_solved(self) -> bool {
        self == SolveStatus::Solved
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Solution {
    /// Shared driver probability level `p_in`.
    pub probability: f64,
    pub revenue: f64,
    pub ebitda_margin: f64,
    pub ev_ebitda: f64,
    pub market_cap: f64,
    pub share_price: f64,
    pub iterations: u32,
}

/// One row of goal-seek output. `solution` is `None` whenever the scenario is unsolvable.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalSeekResult {
    pub probability: f64,
    /// Reported whenever a TSR distribution exists, solved or not. NaN only for `EmptyDistribution`.
    pub target_tsr: f64,
    pub status: SolveStatus,
    pub solution: Option<Solution>,
}

impl GoalSeekResult {
    pub fn unsolved(probability: f64, target_tsr: f64, status: SolveStatus) -> Self {
        Self {
            probability,
            target_tsr,
            status,
            solution: None,
        }
    }
}

/// Looks up the result for a requested probability in a solved batch.
pub fn result_for(results: &[GoalSeekResult], probability: f64) -> Option<&GoalSeekResult> {
    results.iter().find(|r| r.probability == probability)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverStats {
    pub median: f64,
    pub p10: f64,
    pub p90: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForecastStats {
    pub revenue: DriverStats,
    pub ebitda_margin: DriverStats,
    pub ev_ebitda: DriverStats,
}

impl ForecastStats {
    pub fn get(&self, driver: Driver) -> DriverStats {
        match driver {
            Driver::Revenue => self.revenue,
            Driver::EbitdaMargin => self.ebitda_margin,
            Driver::EvEbitda => self.ev_ebitda,
        }
    }
}

impl Default for ForecastStats {
    fn default() -> Self {
        Self {
            revenue: DriverStats {
                median: 1800.0,
                p10: 1600.0,
                p90: 2000.0,
            },
            ebitda_margin: DriverStats {
                median: 0.24,
                p10: 0.20,
                p90: 0.28,
            },
            ev_ebitda: DriverStats {
                median: 15.0,
                p10: 12.0,
                p90: 18.0,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_anchors_are_valid() {
        assert_eq!(BaseAnchors::default().validate(), Ok(()));
    }

    #[test]
    fn anchors_reject_non_positive_shares() {
        let anchors = BaseAnchors {
            terminal_shares: 0.0,
            ..BaseAnchors::default()
        };
        assert_eq!(
            anchors.validate(),
            Err(ConfigError::NonPositiveAnchor {
                field: "terminal_shares",
                value: 0.0
            })
        );
    }

    #[test]
    fn anchors_reject_nan_net_debt() {
        let anchors = BaseAnchors {
            net_debt: f64::NAN,
            ..BaseAnchors::default()
        };
        assert!(matches!(
            anchors.validate(),
            Err(ConfigError::NonFiniteAnchor {
                field: "net_debt",
                ..
            })
        ));
    }

    #[test]
    fn anchors_reject_debt_above_enterprise_value() {
        let anchors = BaseAnchors {
            net_debt: 7000.0,
            ..BaseAnchors::default()
        };
        assert!(matches!(
            anchors.validate(),
            Err(ConfigError::NonPositiveBaseMarketCap(_))
        ));
    }

    #[test]
    fn horizon_rejects_zero_negative_and_nan() {
        assert!(Horizon::new(0.0).is_err());
        assert!(Horizon::new(-1.0).is_err());
        assert!(Horizon::new(f64::NAN).is_err());
        assert!(Horizon::new(f64::INFINITY).is_err());
        assert_eq!(Horizon::new(2.0).map(Horizon::years), Ok(2.0));
    }

    #[test]
    fn results_are_indexable_by_requested_probability() {
        let results = [
            GoalSeekResult::unsolved(0.8, 0.1, SolveStatus::NoBracket),
            GoalSeekResult::unsolved(0.2, 0.3, SolveStatus::Degenerate),
        ];
        let found = result_for(&results, 0.2).expect("present");
        assert_eq!(found.status, SolveStatus::Degenerate);
        assert!(result_for(&results, 0.5).is_none());
    }

    #[test]
    fn table_columns_follow_row_order() {
        let table: SimulatedTable = [
            SimulatedRow {
                revenue: 1.0,
                ebitda_margin: 0.1,
                ev_ebitda: 10.0,
            },
            SimulatedRow {
                revenue: 2.0,
                ebitda_margin: 0.2,
                ev_ebitda: 20.0,
            },
        ]
        .into_iter()
        .collect();
        assert_eq!(table.column(Driver::Revenue), vec![1.0, 2.0]);
        assert_eq!(table.column(Driver::EbitdaMargin), vec![0.1, 0.2]);
        assert_eq!(table.column(Driver::EvEbitda), vec![10.0, 20.0]);
    }
}
