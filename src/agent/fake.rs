//! In-memory InfluxDB endpoint for tests.

use super::influx::{InfluxApi, RetentionPolicy, Series};
use super::line_protocol::FieldType;
use anyhow::{bail, Result};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// One stored row: tags plus `(time, fields)`.
#[derive(Debug, Clone)]
pub struct Row {
    pub tags: BTreeMap<String, String>,
    pub time: i64,
    pub fields: Vec<(String, Value)>,
}

#[derive(Default)]
pub struct FakeInflux {
    pub name: String,
    pub up: AtomicBool,
    pub databases: Mutex<Vec<String>>,
    pub policies: Mutex<HashMap<String, Vec<RetentionPolicy>>>,
    /// `db -> measurement -> rows`
    pub data: Mutex<HashMap<String, BTreeMap<String, Vec<Row>>>>,
    pub field_types: Mutex<HashMap<String, FieldType>>,
    pub queries: Mutex<Vec<String>>,
    /// `(db, rp, lines)` for every accepted write.
    pub writes: Mutex<Vec<(String, String, Vec<String>)>>,
    /// Number of upcoming writes to reject.
    pub failing_writes: AtomicUsize,
}

pub fn autogen() -> RetentionPolicy {
    RetentionPolicy {
        name: "autogen".to_string(),
        duration: "0s".to_string(),
        shard_group_duration: "168h0m0s".to_string(),
        replication: 1,
        default: true,
    }
}

impl FakeInflux {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            up: AtomicBool::new(true),
            ..Self::default()
        }
    }

    pub fn with_database(self, db: &str) -> Self {
        self.databases.lock().unwrap().push(db.to_string());
        self.policies
            .lock()
            .unwrap()
            .insert(db.to_string(), vec![autogen()]);
        self
    }

    pub fn insert(&self, db: &str, measurement: &str, host: &str, time: i64, value: f64) {
        self.data
            .lock()
            .unwrap()
            .entry(db.to_string())
            .or_default()
            .entry(measurement.to_string())
            .or_default()
            .push(Row {
                tags: BTreeMap::from([("host".to_string(), host.to_string())]),
                time,
                fields: vec![("value".to_string(), Value::from(value))],
            });
        self.field_types
            .lock()
            .unwrap()
            .insert("value".to_string(), FieldType::Float);
    }

    pub fn set_up(&self, up: bool) {
        self.up.store(up, Ordering::SeqCst);
    }

    pub fn written_lines(&self) -> Vec<String> {
        self.writes
            .lock()
            .unwrap()
            .iter()
            .flat_map(|(_, _, lines)| lines.clone())
            .collect()
    }
}

/// Pull `time >= a AND time < b` bounds out of a generated SELECT.
fn bounds(q: &str) -> (i64, i64) {
    let grab = |marker: &str| {
        q.split(marker)
            .nth(1)
            .and_then(|rest| rest.split_whitespace().next())
            .and_then(|n| n.parse::<i64>().ok())
    };
    (
        grab("time >= ").unwrap_or(i64::MIN),
        grab("time < ").unwrap_or(i64::MAX),
    )
}

fn measurement_of(q: &str) -> Option<String> {
    let from = q.split(" FROM ").nth(1)?;
    let target = from.split_whitespace().next()?;
    let last = target.rsplit('.').next()?;
    Some(last.trim_matches('"').to_string())
}

impl InfluxApi for FakeInflux {
    fn name(&self) -> &str {
        &self.name
    }

    fn ping(&self) -> Result<Duration> {
        if self.up.load(Ordering::SeqCst) {
            Ok(Duration::from_millis(1))
        } else {
            bail!("connection refused")
        }
    }

    fn show_databases(&self) -> Result<Vec<String>> {
        Ok(self.databases.lock().unwrap().clone())
    }

    fn show_retention_policies(&self, db: &str) -> Result<Vec<RetentionPolicy>> {
        Ok(self
            .policies
            .lock()
            .unwrap()
            .get(db)
            .cloned()
            .unwrap_or_default())
    }

    fn show_measurements(&self, db: &str) -> Result<Vec<String>> {
        Ok(self
            .data
            .lock()
            .unwrap()
            .get(db)
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default())
    }

    fn show_field_keys(&self, _db: &str, _measurement: &str) -> Result<HashMap<String, FieldType>> {
        Ok(self.field_types.lock().unwrap().clone())
    }

    fn create_database(&self, db: &str) -> Result<()> {
        let mut dbs = self.databases.lock().unwrap();
        if !dbs.iter().any(|d| d == db) {
            dbs.push(db.to_string());
        }
        Ok(())
    }

    fn create_retention_policy(&self, db: &str, rp: &RetentionPolicy) -> Result<()> {
        self.policies
            .lock()
            .unwrap()
            .entry(db.to_string())
            .or_default()
            .push(rp.clone());
        Ok(())
    }

    fn query(&self, db: &str, q: &str) -> Result<Vec<Series>> {
        self.queries.lock().unwrap().push(q.to_string());
        let (from, to) = bounds(q);
        let Some(measurement) = measurement_of(q) else {
            bail!("unsupported query: {q}");
        };
        let data = self.data.lock().unwrap();
        let Some(rows) = data.get(db).and_then(|m| m.get(&measurement)) else {
            return Ok(Vec::new());
        };

        let mut by_tags: BTreeMap<BTreeMap<String, String>, Series> = BTreeMap::new();
        for row in rows.iter().filter(|r| r.time >= from && r.time < to) {
            let series = by_tags.entry(row.tags.clone()).or_insert_with(|| Series {
                name: measurement.clone(),
                tags: row.tags.clone(),
                columns: std::iter::once("time".to_string())
                    .chain(row.fields.iter().map(|(k, _)| k.clone()))
                    .collect(),
                values: Vec::new(),
            });
            series.values.push(
                std::iter::once(Value::from(row.time))
                    .chain(row.fields.iter().map(|(_, v)| v.clone()))
                    .collect(),
            );
        }
        Ok(by_tags.into_values().collect())
    }

    fn write(&self, db: &str, rp: &str, lines: &[String]) -> Result<()> {
        if self.failing_writes.load(Ordering::SeqCst) > 0 {
            self.failing_writes.fetch_sub(1, Ordering::SeqCst);
            bail!("timeout writing to {}", self.name);
        }
        self.writes
            .lock()
            .unwrap()
            .push((db.to_string(), rp.to_string(), lines.to_vec()));
        Ok(())
    }
}
