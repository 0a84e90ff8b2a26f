//! Copy of raw points from master to slave over a time window.

use super::influx::{quote_ident, InfluxApi};
use super::line_protocol::points_from_series;
use super::schema;
use crate::config::GeneralConfig;
use crate::dispatch::DbSelector;
use crate::window::TimeWindow;
use anyhow::{Context, Result};
use std::thread;
use std::time::Duration;

/// Tuning taken from `[general]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopySettings {
    pub chunk: Duration,
    pub max_points: usize,
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl CopySettings {
    pub fn from_general(general: &GeneralConfig) -> Self {
        Self {
            chunk: general.data_chunk_duration,
            max_points: general.max_points_on_single_write.max(1),
            max_retries: general.rw_max_retries,
            retry_delay: general.rw_retry_delay,
        }
    }
}

/// Totals for one copy run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CopyReport {
    pub databases: usize,
    pub measurements: usize,
    pub points: usize,
    pub batches: usize,
}

/// Copy every point of the selected databases inside `window`.
pub fn copy_window(
    master: &dyn InfluxApi,
    slave: &dyn InfluxApi,
    selector: &DbSelector,
    window: &TimeWindow,
    settings: &CopySettings,
) -> Result<CopyReport> {
    let chunk = chrono::Duration::from_std(settings.chunk).context("Chunk duration out of range")?;
    let chunks = window.chunks(chunk);
    let mut report = CopyReport::default();

    for db in schema::selected_databases(master, selector)? {
        schema::ensure_database(master, slave, &db)?;
        report.databases += 1;

        let policies = master.show_retention_policies(&db)?;
        let measurements = master
            .show_measurements(&db)
            .with_context(|| format!("Failed to list measurements of {db}"))?;

        for measurement in &measurements {
            report.measurements += 1;
            let field_types = master.show_field_keys(&db, measurement)?;
            for rp in &policies {
                for part in &chunks {
                    let q = format!(
                        "SELECT * FROM {}.{} WHERE time >= {} AND time < {} GROUP BY *",
                        quote_ident(&rp.name),
                        quote_ident(measurement),
                        nanos(part.start),
                        nanos(part.end)
                    );
                    let series = master
                        .query(&db, &q)
                        .with_context(|| format!("Failed to read {db}.{}.{measurement}", rp.name))?;

                    let mut lines = Vec::new();
                    for s in &series {
                        lines.extend(
                            points_from_series(s, &field_types)?
                                .iter()
                                .map(|p| p.to_line()),
                        );
                    }
                    for batch in lines.chunks(settings.max_points) {
                        write_with_retry(slave, &db, &rp.name, batch, settings)?;
                        report.batches += 1;
                        report.points += batch.len();
                    }
                }
            }
        }
        tracing::info!("Copied database {db} over {window}");
    }

    tracing::info!(
        "Copy finished: {} database(s), {} measurement(s), {} point(s)",
        report.databases,
        report.measurements,
        report.points
    );
    Ok(report)
}

/// Nanoseconds since the epoch, saturating for dates outside the i64 range.
fn nanos(ts: chrono::DateTime<chrono::Utc>) -> i64 {
    ts.timestamp_nanos_opt().unwrap_or(if ts.timestamp() < 0 {
        i64::MIN
    } else {
        i64::MAX
    })
}

fn write_with_retry(
    slave: &dyn InfluxApi,
    db: &str,
    rp: &str,
    lines: &[String],
    settings: &CopySettings,
) -> Result<()> {
    let mut attempt = 0;
    loop {
        match slave.write(db, rp, lines) {
            Ok(()) => return Ok(()),
            Err(e) if attempt < settings.max_retries => {
                attempt += 1;
                tracing::warn!(
                    "Write of {} point(s) to {}.{} failed (attempt {attempt}/{}): {e:#}",
                    lines.len(),
                    db,
                    rp,
                    settings.max_retries
                );
                thread::sleep(settings.retry_delay);
            }
            Err(e) => {
                return Err(e).with_context(|| {
                    format!(
                        "Giving up writing to {}.{} after {} retries",
                        db, rp, settings.max_retries
                    )
                })
            }
        }
    }
}
