//! Conversion of query results into InfluxDB line protocol.

use super::influx::Series;
use anyhow::{bail, Result};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;

/// Declared type of a field, as reported by `SHOW FIELD KEYS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Float,
    Integer,
    Unsigned,
    String,
    Boolean,
}

impl FieldType {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "float" => Some(FieldType::Float),
            "integer" => Some(FieldType::Integer),
            "unsigned" => Some(FieldType::Unsigned),
            "string" => Some(FieldType::String),
            "boolean" => Some(FieldType::Boolean),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Float(f64),
    Integer(i64),
    Unsigned(u64),
    String(String),
    Boolean(bool),
}

impl FieldValue {
    /// Convert a JSON cell, honouring the declared type when known.
    fn from_json(value: &Value, declared: Option<FieldType>) -> Option<Self> {
        match declared {
            Some(FieldType::Float) => value.as_f64().map(FieldValue::Float),
            Some(FieldType::Integer) => value
                .as_i64()
                .or_else(|| value.as_f64().map(|f| f as i64))
                .map(FieldValue::Integer),
            Some(FieldType::Unsigned) => value.as_u64().map(FieldValue::Unsigned),
            Some(FieldType::String) => match value {
                Value::String(s) => Some(FieldValue::String(s.clone())),
                Value::Null => None,
                other => Some(FieldValue::String(other.to_string())),
            },
            Some(FieldType::Boolean) => value.as_bool().map(FieldValue::Boolean),
            None => match value {
                Value::Bool(b) => Some(FieldValue::Boolean(*b)),
                Value::Number(n) if n.is_i64() => n.as_i64().map(FieldValue::Integer),
                Value::Number(n) => n.as_f64().map(FieldValue::Float),
                Value::String(s) => Some(FieldValue::String(s.clone())),
                _ => None,
            },
        }
    }

    fn write_to(&self, out: &mut String) {
        match self {
            FieldValue::Float(f) => {
                let _ = write!(out, "{f}");
            }
            FieldValue::Integer(i) => {
                let _ = write!(out, "{i}i");
            }
            FieldValue::Unsigned(u) => {
                let _ = write!(out, "{u}u");
            }
            FieldValue::String(s) => {
                out.push('"');
                for c in s.chars() {
                    if c == '"' || c == '\\' {
                        out.push('\\');
                    }
                    out.push(c);
                }
                out.push('"');
            }
            FieldValue::Boolean(b) => {
                let _ = write!(out, "{b}");
            }
        }
    }
}

/// One point ready to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    pub measurement: String,
    pub tags: BTreeMap<String, String>,
    pub fields: Vec<(String, FieldValue)>,
    /// Nanoseconds since the epoch.
    pub timestamp: i64,
}

impl Point {
    pub fn to_line(&self) -> String {
        let mut line = String::new();
        escape_into(&mut line, &self.measurement, &[',', ' ']);
        for (key, value) in &self.tags {
            line.push(',');
            escape_into(&mut line, key, &[',', '=', ' ']);
            line.push('=');
            escape_into(&mut line, value, &[',', '=', ' ']);
        }
        line.push(' ');
        for (i, (key, value)) in self.fields.iter().enumerate() {
            if i > 0 {
                line.push(',');
            }
            escape_into(&mut line, key, &[',', '=', ' ']);
            line.push('=');
            value.write_to(&mut line);
        }
        let _ = write!(line, " {}", self.timestamp);
        line
    }
}

fn escape_into(out: &mut String, raw: &str, special: &[char]) {
    for c in raw.chars() {
        if special.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
}

/// Turn a `SELECT * ... GROUP BY *` series into points.
///
/// Null cells are dropped; rows left with no field are skipped. Queries must
/// use `epoch=ns` so the time column is an integer.
pub fn points_from_series(
    series: &Series,
    field_types: &HashMap<String, FieldType>,
) -> Result<Vec<Point>> {
    let Some(time_idx) = series.columns.iter().position(|c| c == "time") else {
        bail!("series {} has no time column", series.name);
    };
    let tags: BTreeMap<String, String> = series
        .tags
        .iter()
        .filter(|(_, v)| !v.is_empty())
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    let mut points = Vec::with_capacity(series.values.len());
    for row in &series.values {
        let Some(timestamp) = row.get(time_idx).and_then(Value::as_i64) else {
            bail!("series {} has a non-integer timestamp", series.name);
        };
        let fields: Vec<(String, FieldValue)> = series
            .columns
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != time_idx)
            .filter_map(|(i, column)| {
                let declared = field_types.get(column).copied();
                row.get(i)
                    .and_then(|cell| FieldValue::from_json(cell, declared))
                    .map(|value| (column.clone(), value))
            })
            .collect();
        if fields.is_empty() {
            continue;
        }
        points.push(Point {
            measurement: series.name.clone(),
            tags: tags.clone(),
            fields,
            timestamp,
        });
    }
    Ok(points)
}
