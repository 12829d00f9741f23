use std::io::Read;

use tracing::{debug, warn};

use super::error::StatsError;
use super::types::{Driver, DriverStats, ForecastStats};

/// How far below the title row to look for the header and the statistic rows.
const SEARCH_WINDOW: usize = 10;

/// Supplies `{median, p10, p90}` for each driver at a forecast tag such as `CY2026`.
pub trait StatsProvider {
    fn forecast_stats(&self, tag: &str) -> Result<ForecastStats, StatsError>;
}

/// Statistics supplied directly, independent of the tag.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedStats(pub ForecastStats);

impl StatsProvider for FixedStats {
    fn forecast_stats(&self, _tag: &str) -> Result<ForecastStats, StatsError> {
        Ok(self.0)
    }
}

/// A CSV export of the forecast summary workbook. Several tickers may share one
/// sheet; each block starts with a `Summary Statistics - {ticker}` title row.
#[derive(Debug, Clone)]
pub struct SummaryTable {
    ticker: String,
    rows: Vec<Vec<String>>,
}

impl SummaryTable {
    pub fn from_reader<R: Read>(ticker: &str, reader: R) -> Result<Self, StatsError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(reader);

        let mut rows = Vec::new();
        for record in csv_reader.records() {
            let record = record?;
            rows.push(record.iter().map(|cell| cell.trim().to_string()).collect());
        }
        Ok(Self {
            ticker: ticker.to_string(),
            rows,
        })
    }

    fn title(&self) -> String {
        format!("Summary Statistics - {}", self.ticker)
    }

    fn first_cell(&self, index: usize) -> &str {
        self.rows
            .get(index)
            .and_then(|row| row.first())
            .map(String::as_str)
            .unwrap_or("")
    }
}

impl StatsProvider for SummaryTable {
    fn forecast_stats(&self, tag: &str) -> Result<ForecastStats, StatsError> {
        let title = self.title();
        let start = (0..self.rows.len())
            .find(|&i| self.first_cell(i) == title)
            .ok_or_else(|| StatsError::TitleNotFound(title.clone()))?;

        let window_end = (start + 1 + SEARCH_WINDOW).min(self.rows.len());
        let header_row = (start + 1..window_end)
            .find(|&i| self.first_cell(i).contains("Statistic"))
            .unwrap_or(start + 1);
        let headers: &[String] = self.rows.get(header_row).map(Vec::as_slice).unwrap_or(&[]);

        let data_start = header_row + 1;
        let data_end = (data_start + SEARCH_WINDOW).min(self.rows.len());
        let mut summary_rows: Vec<&[String]> = Vec::new();
        for i in data_start..data_end {
            let label = self.first_cell(i);
            if ["Median", "10th Percentile", "90th Percentile"]
                .iter()
                .any(|stat| label.contains(stat))
            {
                summary_rows.push(&self.rows[i]);
            } else if !summary_rows.is_empty() && label.is_empty() {
                break;
            }
        }
        if summary_rows.is_empty() {
            return Err(StatsError::NoSummaryRows(title));
        }

        let column_for = |driver: Driver| -> Option<usize> {
            let wanted = format!("{} {tag}", driver.label());
            if let Some(idx) = headers.iter().position(|h| *h == wanted) {
                return Some(idx);
            }
            let keywords: Vec<&str> = wanted.split_whitespace().take(2).collect();
            let fallback = headers
                .iter()
                .position(|h| h.contains(tag) && keywords.iter().any(|k| h.contains(k)));
            match fallback {
                Some(idx) => {
                    warn!(wanted = %wanted, using = %headers[idx], "using similar column")
                }
                None => warn!(wanted = %wanted, "column not found in summary table"),
            }
            fallback
        };

        let value = |stat: &str, column: Option<usize>| -> f64 {
            let Some(column) = column else {
                return f64::NAN;
            };
            let row = summary_rows
                .iter()
                .find(|row| row.first().is_some_and(|label| label == stat))
                .or_else(|| {
                    let needle = stat.to_lowercase();
                    summary_rows.iter().find(|row| {
                        row.first()
                            .is_some_and(|label| label.to_lowercase().contains(&needle))
                    })
                });
            row.and_then(|row| row.get(column))
                .and_then(|cell| cell.parse::<f64>().ok())
                .unwrap_or(f64::NAN)
        };

        let driver_stats = |driver: Driver| {
            let column = column_for(driver);
            DriverStats {
                median: value("Median", column),
                p10: value("10th Percentile", column),
                p90: value("90th Percentile", column),
            }
        };

        let stats = ForecastStats {
            revenue: driver_stats(Driver::Revenue),
            ebitda_margin: driver_stats(Driver::EbitdaMargin),
            ev_ebitda: driver_stats(Driver::EvEbitda),
        };
        debug!(ticker = %self.ticker, tag, ?stats, "extracted forecast statistics");
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHEET: &str = "\
Forecast workbook,,,
,,,
Summary Statistics - OTHER.L,,,
Statistic,Revenue CY2026,EBITDA Margin CY2026,EV/EBITDA CY2026
Median,1,2,3
,,,
Summary Statistics - CRDA.L,,,
Statistic,Revenue CY2026,EBITDA Margin CY2026,EV/EBITDA CY2026
Mean,1810,0.241,15.2
Median,1800,0.24,15
10th Percentile,1600,0.20,12
90th Percentile,2000,0.28,18
,,,
Trailing notes,,,
";

    fn assert_stats(actual: DriverStats, median: f64, p10: f64, p90: f64) {
        assert_eq!(actual, DriverStats { median, p10, p90 });
    }

    #[test]
    fn extracts_stats_for_the_requested_ticker() {
        let table = SummaryTable::from_reader("CRDA.L", SHEET.as_bytes()).expect("valid csv");
        let stats = table.forecast_stats("CY2026").expect("stats");
        assert_stats(stats.revenue, 1800.0, 1600.0, 2000.0);
        assert_stats(stats.ebitda_margin, 0.24, 0.20, 0.28);
        assert_stats(stats.ev_ebitda, 15.0, 12.0, 18.0);
    }

    #[test]
    fn unknown_ticker_is_reported() {
        let table = SummaryTable::from_reader("NOPE", SHEET.as_bytes()).expect("valid csv");
        let err = table.forecast_stats("CY2026").expect_err("missing title");
        assert!(matches!(err, StatsError::TitleNotFound(title) if title.ends_with("NOPE")));
    }

    #[test]
    fn falls_back_to_similar_column_names() {
        let sheet = "\
Summary Statistics - CRDA.L
Statistic,Revenue (GBPm) CY2026,EBITDA Margin CY2026,EV/EBITDA CY2026
Median,1800,0.24,15
10th Percentile,1600,0.20,12
90th Percentile,2000,0.28,18
";
        let table = SummaryTable::from_reader("CRDA.L", sheet.as_bytes()).expect("valid csv");
        let stats = table.forecast_stats("CY2026").expect("stats");
        assert_stats(stats.revenue, 1800.0, 1600.0, 2000.0);
    }

    #[test]
    fn missing_tag_yields_nan_statistics() {
        let table = SummaryTable::from_reader("CRDA.L", SHEET.as_bytes()).expect("valid csv");
        let stats = table.forecast_stats("CY2030").expect("stats");
        assert!(stats.revenue.median.is_nan());
        assert!(stats.ev_ebitda.p90.is_nan());
    }

    #[test]
    fn non_numeric_cells_yield_nan() {
        let sheet = "\
Summary Statistics - CRDA.L
Statistic,Revenue CY2026,EBITDA Margin CY2026,EV/EBITDA CY2026
Median,n/a,0.24,15
10th Percentile,1600,0.20,12
90th Percentile,2000,0.28,18
";
        let table = SummaryTable::from_reader("CRDA.L", sheet.as_bytes()).expect("valid csv");
        let stats = table.forecast_stats("CY2026").expect("stats");
        assert!(stats.revenue.median.is_nan());
        assert_eq!(stats.revenue.p10, 1600.0);
    }

    #[test]
    fn title_without_statistic_rows_is_an_error() {
        let sheet = "Summary Statistics - CRDA.L\nStatistic,Revenue CY2026\nMean,1\n";
        let table = SummaryTable::from_reader("CRDA.L", sheet.as_bytes()).expect("valid csv");
        assert!(matches!(
            table.forecast_stats("CY2026"),
            Err(StatsError::NoSummaryRows(_))
        ));
    }

    #[test]
    fn fixed_stats_ignore_the_tag() {
        let provider = FixedStats(ForecastStats::default());
        assert_eq!(
            provider.forecast_stats("anything").expect("stats"),
            ForecastStats::default()
        );
    }
}
