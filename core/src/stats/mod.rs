//! Service response time statistics.
//!
//! Accumulates per-category response times from result records into histograms (microsecond
//! resolution), and counts duplicates and unmatched messages.

use crate::srt::{SrtCategory, SrtResult};

use std::path::Path;

use anyhow::Result;
use csv::Writer;
use hdrhistogram::Histogram;
use indexmap::IndexMap;
use prettytable::{format, Cell, Row, Table};
use strum::IntoEnumIterator;

lazy_static::lazy_static! {
    static ref COLUMNS: Vec<&'static str> = vec!["category", "cnt", "dup", "unmatched", "avg", "min", "p50", "p90", "p99", "max"];
}

#[derive(Debug)]
struct CategoryStats {
    /// Response times, in microseconds.
    hist: Histogram<u64>,
    duplicates: u64,
    unmatched: u64,
}

impl CategoryStats {
    fn new() -> Result<Self> {
        Ok(CategoryStats {
            hist: Histogram::new(3)?,
            duplicates: 0,
            unmatched: 0,
        })
    }

    /// Returns cnt, dup, unmatched, avg, min, and percentiles in a Vec<String>
    fn stats(&self) -> Vec<String> {
        let h = &self.hist;
        if h.is_empty() {
            let mut stats = vec![
                "0".to_string(),
                format!("{}", self.duplicates),
                format!("{}", self.unmatched),
            ];
            stats.resize(COLUMNS.len() - 1, String::new());
            return stats;
        }
        vec![
            format!("{}", h.len()),
            format!("{}", self.duplicates),
            format!("{}", self.unmatched),
            format!("{:.3}", h.mean()),
            format!("{}", h.min()),
            format!("{}", h.value_at_quantile(0.5)),
            format!("{}", h.value_at_quantile(0.9)),
            format!("{}", h.value_at_quantile(0.99)),
            format!("{}", h.max()),
        ]
    }
}

/// Per-category response time statistics.
#[derive(Debug)]
pub struct SrtStats(IndexMap<SrtCategory, CategoryStats>);

impl SrtStats {
    pub fn new() -> Result<Self> {
        let mut categories = IndexMap::new();
        for category in SrtCategory::iter() {
            categories.insert(category, CategoryStats::new()?);
        }
        Ok(SrtStats(categories))
    }

    /// Adds `result` to the statistics of its category.
    ///
    /// Results without a response time count only if they are duplicates or unmatched.
    pub fn record(&mut self, result: &SrtResult) -> Result<()> {
        let stats = match self.0.get_mut(&result.category) {
            Some(stats) => stats,
            None => {
                log::error!("No statistics for category: {}", result.category);
                return Ok(());
            }
        };
        if result.is_unmatched() {
            stats.unmatched += 1;
        } else if result.is_duplicate {
            stats.duplicates += 1;
        } else if let Some(delta) = result.delta_time {
            // clamp: a capture with a clock step can yield negative deltas
            let micros = delta.num_microseconds().unwrap_or(i64::MAX).max(0);
            stats.hist.record(micros as u64)?;
        }
        Ok(())
    }

    /// Adds every result of `results`.
    pub fn record_all<'a, I>(&mut self, results: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a SrtResult>,
    {
        for result in results {
            self.record(result)?;
        }
        Ok(())
    }

    /// Number of response times recorded for `category`.
    pub fn count(&self, category: SrtCategory) -> u64 {
        self.0.get(&category).map_or(0, |s| s.hist.len())
    }

    /// Number of duplicates seen for `category`.
    pub fn duplicates(&self, category: SrtCategory) -> u64 {
        self.0.get(&category).map_or(0, |s| s.duplicates)
    }

    /// Number of unmatched messages seen for `category`.
    pub fn unmatched(&self, category: SrtCategory) -> u64 {
        self.0.get(&category).map_or(0, |s| s.unmatched)
    }

    /// Mean response time of `category` in microseconds.
    pub fn mean_micros(&self, category: SrtCategory) -> Option<f64> {
        self.0
            .get(&category)
            .filter(|s| !s.hist.is_empty())
            .map(|s| s.hist.mean())
    }

    /// Largest response time of `category` in microseconds.
    pub fn max_micros(&self, category: SrtCategory) -> Option<u64> {
        self.0
            .get(&category)
            .filter(|s| !s.hist.is_empty())
            .map(|s| s.hist.max())
    }

    fn rows(&self) -> impl Iterator<Item = Vec<String>> + '_ {
        self.0.iter().map(|(category, stats)| {
            let mut row = vec![category.to_string()];
            row.extend(stats.stats());
            row
        })
    }

    /// Prints a table of all categories to stdout. Times are in microseconds.
    pub fn display(&self) {
        let mut table = Table::new();
        table.set_format(*format::consts::FORMAT_NO_LINESEP_WITH_TITLE);
        let title = COLUMNS.iter().map(|n| Cell::new(n)).collect::<Vec<_>>();
        table.set_titles(Row::new(title));

        for row in self.rows() {
            let cells = row.iter().map(|s| Cell::new(s)).collect();
            table.add_row(Row::new(cells));
        }
        table.printstd();
    }

    /// Writes the table of all categories to `path` as CSV.
    pub fn dump_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut wtr = Writer::from_path(path.as_ref())?;
        wtr.write_record(COLUMNS.iter())?;
        for row in self.rows() {
            wtr.write_record(&row)?;
        }
        wtr.flush()?;
        Ok(())
    }
}
