//! Tabular renderings of goal-seek results: a CSV export and a console table.

use std::fmt::Write as _;

use crate::core::GoalSeekResult;

const COLUMNS: [&str; 11] = [
    "p_tsr",
    "Revenue",
    "p_revenue",
    "EBITDA Margin",
    "p_margin",
    "EV/EBITDA",
    "p_multiple",
    "Market Cap",
    "Share price",
    "TSR",
    "Probability",
];

/// One cell per column; `None` marks a value the solve could not produce.
fn cells(result: &GoalSeekResult) -> [Option<f64>; 11] {
    let s = result.solution;
    let p_in = s.map(|s| s.probability);
    [
        Some(result.probability),
        s.map(|s| s.revenue),
        p_in,
        s.map(|s| s.ebitda_margin),
        p_in,
        s.map(|s| s.ev_ebitda),
        p_in,
        s.map(|s| s.market_cap),
        s.map(|s| s.share_price),
        Some(result.target_tsr).filter(|v| v.is_finite()),
        p_in,
    ]
}

/// CSV with one row per requested probability. Missing values are empty cells.
pub fn results_csv(results: &[GoalSeekResult]) -> Result<String, csv::Error> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(COLUMNS)?;
    for result in results {
        let record: Vec<String> = cells(result)
            .iter()
            .map(|cell| cell.map(|v| v.to_string()).unwrap_or_default())
            .collect();
        wtr.write_record(&record)?;
    }
    let bytes = wtr
        .into_inner()
        .map_err(|e| csv::Error::from(e.into_error()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Fixed-width table rounded to 6 decimals, `NaN` for missing values.
pub fn render_table(results: &[GoalSeekResult]) -> String {
    let rows: Vec<Vec<String>> = results
        .iter()
        .map(|result| {
            cells(result)
                .iter()
                .map(|cell| match cell {
                    Some(v) => format!("{v:.6}"),
                    None => "NaN".to_string(),
                })
                .collect()
        })
        .collect();

    let widths: Vec<usize> = COLUMNS
        .iter()
        .enumerate()
        .map(|(i, name)| {
            rows.iter()
                .map(|row| row[i].len())
                .max()
                .unwrap_or(0)
                .max(name.len())
        })
        .collect();

    let mut out = String::new();
    let header: Vec<String> = COLUMNS
        .iter()
        .zip(&widths)
        .map(|(name, w)| format!("{name:>w$}"))
        .collect();
    let _ = writeln!(out, "{}", header.join("  "));
    for row in &rows {
        let line: Vec<String> = row
            .iter()
            .zip(&widths)
            .map(|(cell, w)| format!("{cell:>w$}"))
            .collect();
        let _ = writeln!(out, "{}", line.join("  "));
    }
    out
}
