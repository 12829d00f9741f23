use tracing::{debug, warn};

use super::error::TsrError;
use super::types::{BaseAnchors, EnrichedRow, Horizon, SimulatedRow, SimulatedTable};

/// A row the transform refused, with its position in the simulated table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RejectedRow {
    pub index: usize,
    pub error: TsrError,
}

#[derive(Debug, Clone, Default)]
pub struct TsrTable {
    pub rows: Vec<EnrichedRow>,
    pub rejected: Vec<RejectedRow>,
}

impl TsrTable {
    pub fn tsr_column(&self) -> Vec<f64> {
        self.rows.iter().map(|row| row.tsr).collect()
    }
}

/// Runs every simulated row through [`enrich_row`]. Rows that hit a domain
/// error are set aside in `rejected` and the rest of the batch carries on.
pub fn compute_tsr(table: &SimulatedTable, anchors: &BaseAnchors, horizon: Horizon) -> TsrTable {
    let mut out = TsrTable {
        rows: Vec::with_capacity(table.len()),
        rejected: Vec::new(),
    };

    for (index, row) in table.rows().iter().enumerate() {
        match enrich_row(row, anchors, horizon) {
            Ok(enriched) => out.rows.push(enriched),
            Err(error) => out.rejected.push(RejectedRow { index, error }),
        }
    }

    if let Some(first) = out.rejected.first() {
        warn!(
            rejected = out.rejected.len(),
            total = table.len(),
            first_index = first.index,
            first_error = %first.error,
            "TSR transform rejected simulated rows"
        );
    }
    debug!(rows = out.rows.len(), "TSR transform complete");
    out
}

pub fn enrich_row(
    row: &SimulatedRow,
    anchors: &BaseAnchors,
    horizon: Horizon,
) -> Result<EnrichedRow, TsrError> {
    let cagr_revenue = compound_rate(row.revenue, anchors.revenue, horizon, "revenue")?;
    let cagr_ebitda_margin = compound_rate(
        row.ebitda_margin,
        anchors.ebitda_margin,
        horizon,
        "EBITDA margin",
    )?;
    let cagr_ev_ebitda = compound_rate(row.ev_ebitda, anchors.ev_ebitda, horizon, "EV/EBITDA")?;

    let ev1 = row.implied_enterprise_value();
    let cap0 = anchors.base_market_cap();
    let cap1 = ev1 - anchors.terminal_net_debt;
    let cagr_mktcap_ev = compound_rate(
        cap1 / ev1,
        cap0 / anchors.enterprise_value,
        horizon,
        "market cap / EV",
    )?;

    let cagr_shares = compound_rate(anchors.terminal_shares, anchors.shares, horizon, "shares")?;
    let dividend_return = (anchors.terminal_dividend_yield * (cap1 / anchors.terminal_shares))
        / (cap0 / anchors.shares);

    let tsr = (1.0 + cagr_revenue)
        * (1.0 + cagr_ebitda_margin)
        * (1.0 + cagr_ev_ebitda)
        * (1.0 + cagr_mktcap_ev)
        * (1.0 + cagr_shares)
        - 1.0
        + dividend_return;
    if !tsr.is_finite() {
        return Err(TsrError::NonFinite(tsr));
    }

    Ok(EnrichedRow {
        driver: *row,
        cagr_revenue,
        cagr_ebitda_margin,
        cagr_ev_ebitda,
        cagr_mktcap_ev,
        cagr_shares,
        dividend_return,
        tsr,
    })
}

/// `(end / start)^(1 / years) - 1`, refusing ratios a real fractional power cannot take.
fn compound_rate(
    end: f64,
    start: f64,
    horizon: Horizon,
    factor: &'static str,
) -> Result<f64, TsrError> {
    let ratio = end / start;
    if !(ratio > 0.0) || !ratio.is_finite() {
        return Err(TsrError::NonPositiveRatio { factor, ratio });
    }
    Ok(ratio.powf(1.0 / horizon.years()) - 1.0)
}
