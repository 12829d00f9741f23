use rayon::prelude::*;
use tracing::{debug, info, warn};

use super::error::ConfigError;
use super::quantile::{SortedColumn, clamp_probability};
use super::tsr::{compute_tsr, enrich_row};
use super::types::{
    BaseAnchors, Driver, GoalSeekResult, Horizon, SimulatedRow, SimulatedTable, Solution,
    SolveStatus,
};

const RELATIVE_TOLERANCE: f64 = 4.0 * f64::EPSILON;
const FLAT_RANGE: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GoalSeekConfig {
    /// Boundary clamp for probabilities and absolute tolerance of the root finder.
    pub tolerance: f64,
    pub max_iterations: u32,
}

impl Default for GoalSeekConfig {
    fn default() -> Self {
        Self {
            tolerance: 1e-6,
            max_iterations: 100,
        }
    }
}

impl GoalSeekConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.tolerance.is_finite() || self.tolerance <= 0.0 || self.tolerance >= 0.5 {
            return Err(ConfigError::InvalidTolerance(self.tolerance));
        }
        if self.max_iterations == 0 {
            return Err(ConfigError::InvalidMaxIterations);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RootOutcome {
    Converged { root: f64, iterations: u32 },
    /// Both endpoints evaluate to the same sign.
    NoBracket { fa: f64, fb: f64 },
    NonFinite { at: f64 },
    /// `f(a) == f(b)`: the function is flat across the bracket.
    Flat,
    MaxIterations { best: f64 },
}

/// Brent's method on `[a, b]`: bisection with secant and inverse quadratic
/// interpolation steps, taken only when they land well inside the bracket.
pub fn find_root<F>(mut f: F, a: f64, b: f64, tol: f64, max_iterations: u32) -> RootOutcome
where
    F: FnMut(f64) -> f64,
{
    let mut xpre = a;
    let mut xcur = b;
    let mut fpre = f(xpre);
    if !fpre.is_finite() {
        return RootOutcome::NonFinite { at: xpre };
    }
    let mut fcur = f(xcur);
    if !fcur.is_finite() {
        return RootOutcome::NonFinite { at: xcur };
    }

    if fpre == fcur {
        return RootOutcome::Flat;
    }
    if fpre == 0.0 {
        return RootOutcome::Converged {
            root: xpre,
            iterations: 0,
        };
    }
    if fcur == 0.0 {
        return RootOutcome::Converged {
            root: xcur,
            iterations: 0,
        };
    }
    if fpre.signum() == fcur.signum() {
        return RootOutcome::NoBracket { fa: fpre, fb: fcur };
    }

    // xblk is the contrapoint: f(xblk) and f(xcur) always straddle zero.
    let mut xblk = 0.0;
    let mut fblk = 0.0;
    let mut spre = 0.0;
    let mut scur = 0.0;

    for iteration in 1..=max_iterations {
        if fpre != 0.0 && fcur != 0.0 && fpre.signum() != fcur.signum() {
            xblk = xpre;
            fblk = fpre;
            spre = xcur - xpre;
            scur = spre;
        }
        if fblk.abs() < fcur.abs() {
            xpre = xcur;
            xcur = xblk;
            xblk = xpre;

            fpre = fcur;
            fcur = fblk;
            fblk = fpre;
        }

        let delta = (tol + RELATIVE_TOLERANCE * xcur.abs()) / 2.0;
        let sbis = (xblk - xcur) / 2.0;
        if fcur == 0.0 || sbis.abs() < delta {
            return RootOutcome::Converged {
                root: xcur,
                iterations: iteration,
            };
        }

        if spre.abs() > delta && fcur.abs() < fpre.abs() {
            let stry = if xpre == xblk {
                -fcur * (xcur - xpre) / (fcur - fpre)
            } else {
                let dpre = (fpre - fcur) / (xpre - xcur);
                let dblk = (fblk - fcur) / (xblk - xcur);
                -fcur * (fblk * dblk - fpre * dpre) / (dblk * dpre * (fblk - fpre))
            };

            if 2.0 * stry.abs() < spre.abs().min(3.0 * sbis.abs() - delta) {
                spre = scur;
                scur = stry;
            } else {
                spre = sbis;
                scur = sbis;
            }
        } else {
            spre = sbis;
            scur = sbis;
        }

        xpre = xcur;
        fpre = fcur;
        if scur.abs() > delta {
            xcur += scur;
        } else if sbis > 0.0 {
            xcur += delta;
        } else {
            xcur -= delta;
        }

        fcur = f(xcur);
        if !fcur.is_finite() {
            return RootOutcome::NonFinite { at: xcur };
        }
    }

    RootOutcome::MaxIterations { best: xcur }
}

/// Read-only snapshot of a simulated population, enriched once and then
/// queried by every goal-seek. Safe to share across threads.
#[derive(Debug, Clone)]
pub struct GoalSeekEngine {
    anchors: BaseAnchors,
    horizon: Horizon,
    config: GoalSeekConfig,
    revenue: SortedColumn,
    ebitda_margin: SortedColumn,
    ev_ebitda: SortedColumn,
    tsr: Option<SortedColumn>,
    rejected_rows: usize,
}

impl GoalSeekEngine {
    pub fn new(
        table: &SimulatedTable,
        anchors: BaseAnchors,
        horizon: Horizon,
        config: GoalSeekConfig,
    ) -> Result<Self, ConfigError> {
        anchors.validate()?;
        config.validate()?;
        if table.is_empty() {
            return Err(ConfigError::EmptyTable);
        }

        let column = |driver: Driver| {
            SortedColumn::new(table.column(driver))
                .ok_or(ConfigError::NonNumericColumn(driver.label()))
        };
        let revenue = column(Driver::Revenue)?;
        let ebitda_margin = column(Driver::EbitdaMargin)?;
        let ev_ebitda = column(Driver::EvEbitda)?;

        let enriched = compute_tsr(table, &anchors, horizon);
        let rejected_rows = enriched.rejected.len();
        let tsr = SortedColumn::new(enriched.tsr_column());
        if tsr.is_none() {
            warn!(rows = table.len(), "no simulated row produced a finite TSR");
        }

        Ok(Self {
            anchors,
            horizon,
            config,
            revenue,
            ebitda_margin,
            ev_ebitda,
            tsr,
            rejected_rows,
        })
    }

    pub fn config(&self) -> GoalSeekConfig {
        self.config
    }

    /// Simulated rows the TSR transform refused while building the snapshot.
    pub fn rejected_rows(&self) -> usize {
        self.rejected_rows
    }

    /// Driver values at the `1 - p_in` quantile of each marginal.
    pub fn thresholds_at(&self, p_in: f64) -> SimulatedRow {
        let q = 1.0 - clamp_probability(p_in, self.config.tolerance);
        SimulatedRow {
            revenue: self.revenue.quantile(q),
            ebitda_margin: self.ebitda_margin.quantile(q),
            ev_ebitda: self.ev_ebitda.quantile(q),
        }
    }

    /// TSR of the synthetic row built at probability level `p_in`. NaN on a domain error.
    pub fn tsr_at(&self, p_in: f64) -> f64 {
        if p_in.is_nan() {
            return f64::NAN;
        }
        let row = self.thresholds_at(p_in);
        enrich_row(&row, &self.anchors, self.horizon)
            .map(|enriched| enriched.tsr)
            .unwrap_or(f64::NAN)
    }

    /// The `1 - p` quantile of the simulated TSR distribution.
    pub fn target_tsr(&self, p: f64) -> Option<f64> {
        self.tsr.as_ref().map(|column| column.quantile(1.0 - p))
    }

    pub fn solve(&self, probabilities: &[f64]) -> Result<Vec<GoalSeekResult>, ConfigError> {
        for &p in probabilities {
            if !(p > 0.0 && p < 1.0) {
                return Err(ConfigError::InvalidProbability(p));
            }
        }

        let results: Vec<GoalSeekResult> = probabilities
            .par_iter()
            .map(|&p| self.solve_one(p))
            .collect();

        let solved = results.iter().filter(|r| r.status.is_solved()).count();
        info!(
            requested = results.len(),
            solved,
            rejected_rows = self.rejected_rows,
            "goal-seek batch complete"
        );
        Ok(results)
    }

    /// Solves a single target probability. Numerical failures come back as a
    /// non-`Solved` status, never as an error.
    pub fn solve_one(&self, p: f64) -> GoalSeekResult {
        let Some(target) = self.target_tsr(p) else {
            return GoalSeekResult::unsolved(p, f64::NAN, SolveStatus::EmptyDistribution);
        };

        let tol = self.config.tolerance;
        let (a, b) = (tol, 1.0 - tol);
        let fa = self.tsr_at(a) - target;
        let fb = self.tsr_at(b) - target;
        if !fa.is_finite() || !fb.is_finite() {
            warn!(p, target, fa, fb, "TSR is non-finite at the bracket edge");
            return GoalSeekResult::unsolved(p, target, SolveStatus::NonFinite);
        }
        if (fa - fb).abs() <= FLAT_RANGE * (1.0 + target.abs()) {
            warn!(p, target, "driver quantiles span a zero-width TSR range");
            return GoalSeekResult::unsolved(p, target, SolveStatus::Degenerate);
        }

        let outcome = find_root(
            |x| self.tsr_at(x) - target,
            a,
            b,
            tol,
            self.config.max_iterations,
        );
        debug!(p, target, ?outcome, "root finder finished");

        let (p_in, iterations) = match outcome {
            RootOutcome::Converged { root, iterations } => (root, iterations),
            RootOutcome::NoBracket { fa, fb } => {
                warn!(p, target, fa, fb, "target TSR is not bracketed");
                return GoalSeekResult::unsolved(p, target, SolveStatus::NoBracket);
            }
            RootOutcome::NonFinite { at } => {
                warn!(p, target, at, "TSR went non-finite inside the bracket");
                return GoalSeekResult::unsolved(p, target, SolveStatus::NonFinite);
            }
            RootOutcome::Flat => {
                return GoalSeekResult::unsolved(p, target, SolveStatus::Degenerate);
            }
            RootOutcome::MaxIterations { best } => {
                warn!(p, target, best, "root finder ran out of iterations");
                return GoalSeekResult::unsolved(p, target, SolveStatus::MaxIterations);
            }
        };

        let thresholds = self.thresholds_at(p_in);
        let market_cap = thresholds.implied_enterprise_value() - self.anchors.terminal_net_debt;
        let share_price = market_cap / self.anchors.terminal_shares;

        GoalSeekResult {
            probability: p,
            target_tsr: target,
            status: SolveStatus::Solved,
            solution: Some(Solution {
                probability: p_in,
                revenue: thresholds.revenue,
                ebitda_margin: thresholds.ebitda_margin,
                ev_ebitda: thresholds.ev_ebitda,
                market_cap,
                share_price,
                iterations,
            }),
        }
    }
}

/// Goal-seeks every requested probability against the simulated population
/// with the default tolerance. Results come back in request order.
pub fn solve(
    table: &SimulatedTable,
    anchors: BaseAnchors,
    years: f64,
    target_probabilities: &[f64],
) -> Result<Vec<GoalSeekResult>, ConfigError> {
    let horizon = Horizon::new(years)?;
    let engine = GoalSeekEngine::new(table, anchors, horizon, GoalSeekConfig::default())?;
    engine.solve(target_probabilities)
}
