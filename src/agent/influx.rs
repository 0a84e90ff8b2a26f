//! Minimal InfluxDB 1.x HTTP API client.

use super::line_protocol::FieldType;
use crate::config::InfluxDbConfig;
use anyhow::{bail, Context, Result};
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::Url;
use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

const USER_AGENT: &str = concat!("syncflux/", env!("CARGO_PKG_VERSION"));

/// One series of a query result.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Series {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub values: Vec<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
struct StatementResult {
    #[serde(default)]
    series: Vec<Series>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    results: Vec<StatementResult>,
    #[serde(default)]
    error: Option<String>,
}

/// A retention policy as listed by `SHOW RETENTION POLICIES`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub name: String,
    pub duration: String,
    pub shard_group_duration: String,
    pub replication: u64,
    pub default: bool,
}

/// Operations the agent needs from an InfluxDB endpoint.
pub trait InfluxApi: Send + Sync {
    /// Endpoint name from the configuration.
    fn name(&self) -> &str;
    /// Round-trip time of a `/ping`.
    fn ping(&self) -> Result<Duration>;
    fn show_databases(&self) -> Result<Vec<String>>;
    fn show_retention_policies(&self, db: &str) -> Result<Vec<RetentionPolicy>>;
    fn show_measurements(&self, db: &str) -> Result<Vec<String>>;
    fn show_field_keys(&self, db: &str, measurement: &str) -> Result<HashMap<String, FieldType>>;
    fn create_database(&self, db: &str) -> Result<()>;
    fn create_retention_policy(&self, db: &str, rp: &RetentionPolicy) -> Result<()>;
    /// Run `q` against `db`, timestamps in nanoseconds.
    fn query(&self, db: &str, q: &str) -> Result<Vec<Series>>;
    /// Write line-protocol `lines` into `db`/`rp`.
    fn write(&self, db: &str, rp: &str, lines: &[String]) -> Result<()>;
}

/// Blocking HTTP client for one configured endpoint.
pub struct InfluxClient {
    name: String,
    base: Url,
    user: String,
    password: String,
    http: Client,
}

impl InfluxClient {
    pub fn new(config: &InfluxDbConfig) -> Result<Self> {
        let mut location = config.location.clone();
        if !location.ends_with('/') {
            location.push('/');
        }
        let base = Url::parse(&location)
            .with_context(|| format!("Invalid location for {}: {}", config.name, config.location))?;
        let http = Client::builder()
            .connect_timeout(config.timeout)
            .timeout(config.timeout)
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            name: config.name.clone(),
            base,
            user: config.admin_user.clone(),
            password: config.admin_passwd.clone(),
            http,
        })
    }

    fn endpoint(&self, path: &str, params: &[(&str, &str)]) -> Result<Url> {
        let mut url = self
            .base
            .join(path)
            .with_context(|| format!("Invalid endpoint path {path}"))?;
        if !params.is_empty() {
            url.query_pairs_mut().extend_pairs(params);
        }
        Ok(url)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        if self.user.is_empty() {
            request
        } else {
            request.basic_auth(&self.user, Some(&self.password))
        }
    }

    fn send(&self, request: RequestBuilder, what: &str) -> Result<Response> {
        let response = self
            .authorized(request)
            .send()
            .with_context(|| format!("{}: {what} request failed", self.name))?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            bail!(
                "{}: {what}: HTTP {} - {}",
                self.name,
                status.as_u16(),
                body.trim()
            );
        }
        Ok(response)
    }

    fn execute(&self, db: Option<&str>, q: &str) -> Result<Vec<Series>> {
        let mut params = vec![("q", q), ("epoch", "ns")];
        if let Some(db) = db {
            params.push(("db", db));
        }
        let url = self.endpoint("query", &params)?;
        let body = self.send(self.http.post(url), "query")?.text()?;
        parse_query_response(&body).with_context(|| format!("{}: {q}", self.name))
    }
}

/// Decode a `/query` body into its series, surfacing statement errors.
pub fn parse_query_response(body: &str) -> Result<Vec<Series>> {
    let response: QueryResponse =
        serde_json::from_str(body).context("Malformed query response")?;
    if let Some(error) = response.error {
        bail!("{error}");
    }
    let mut series = Vec::new();
    for result in response.results {
        if let Some(error) = result.error {
            bail!("{error}");
        }
        series.extend(result.series);
    }
    Ok(series)
}

/// Values of column `name` across every row of every series.
pub fn column_values<'a>(series: &'a [Series], name: &str) -> Vec<&'a Value> {
    series
        .iter()
        .filter_map(|s| {
            s.columns
                .iter()
                .position(|c| c == name)
                .map(|idx| (s, idx))
        })
        .flat_map(|(s, idx)| s.values.iter().filter_map(move |row| row.get(idx)))
        .collect()
}

fn column_strings(series: &[Series], name: &str) -> Vec<String> {
    column_values(series, name)
        .into_iter()
        .filter_map(|v| v.as_str().map(str::to_string))
        .collect()
}

/// Parse the rows of `SHOW RETENTION POLICIES`.
pub fn retention_policies(series: &[Series]) -> Vec<RetentionPolicy> {
    let mut out = Vec::new();
    for s in series {
        let col = |name: &str| s.columns.iter().position(|c| c == name);
        let (Some(name), Some(duration)) = (col("name"), col("duration")) else {
            continue;
        };
        let shard = col("shardGroupDuration");
        let replica = col("replicaN");
        let default = col("default");
        for row in &s.values {
            let text = |idx: Option<usize>| {
                idx.and_then(|i| row.get(i))
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string()
            };
            out.push(RetentionPolicy {
                name: text(Some(name)),
                duration: text(Some(duration)),
                shard_group_duration: text(shard),
                replication: replica
                    .and_then(|i| row.get(i))
                    .and_then(Value::as_u64)
                    .unwrap_or(1),
                default: default
                    .and_then(|i| row.get(i))
                    .and_then(Value::as_bool)
                    .unwrap_or(false),
            });
        }
    }
    out
}

/// Quote an identifier for InfluxQL.
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('\\', "\\\\").replace('"', "\\\""))
}

impl InfluxApi for InfluxClient {
    fn name(&self) -> &str {
        &self.name
    }

    fn ping(&self) -> Result<Duration> {
        let started = Instant::now();
        let url = self.endpoint("ping", &[])?;
        self.send(self.http.get(url), "ping")?;
        Ok(started.elapsed())
    }

    fn show_databases(&self) -> Result<Vec<String>> {
        Ok(column_strings(&self.execute(None, "SHOW DATABASES")?, "name"))
    }

    fn show_retention_policies(&self, db: &str) -> Result<Vec<RetentionPolicy>> {
        let q = format!("SHOW RETENTION POLICIES ON {}", quote_ident(db));
        Ok(retention_policies(&self.execute(Some(db), &q)?))
    }

    fn show_measurements(&self, db: &str) -> Result<Vec<String>> {
        Ok(column_strings(
            &self.execute(Some(db), "SHOW MEASUREMENTS")?,
            "name",
        ))
    }

    fn show_field_keys(&self, db: &str, measurement: &str) -> Result<HashMap<String, FieldType>> {
        let q = format!("SHOW FIELD KEYS FROM {}", quote_ident(measurement));
        let series = self.execute(Some(db), &q)?;
        let keys = column_strings(&series, "fieldKey");
        let types = column_strings(&series, "fieldType");
        Ok(keys
            .into_iter()
            .zip(types)
            .filter_map(|(key, ty)| FieldType::parse(&ty).map(|ty| (key, ty)))
            .collect())
    }

    fn create_database(&self, db: &str) -> Result<()> {
        self.execute(None, &format!("CREATE DATABASE {}", quote_ident(db)))?;
        Ok(())
    }

    fn create_retention_policy(&self, db: &str, rp: &RetentionPolicy) -> Result<()> {
        let mut q = format!(
            "CREATE RETENTION POLICY {} ON {} DURATION {} REPLICATION {}",
            quote_ident(&rp.name),
            quote_ident(db),
            rp.duration,
            rp.replication.max(1)
        );
        if !rp.shard_group_duration.is_empty() {
            q.push_str(&format!(" SHARD DURATION {}", rp.shard_group_duration));
        }
        if rp.default {
            q.push_str(" DEFAULT");
        }
        self.execute(Some(db), &q)?;
        Ok(())
    }

    fn query(&self, db: &str, q: &str) -> Result<Vec<Series>> {
        self.execute(Some(db), q)
    }

    fn write(&self, db: &str, rp: &str, lines: &[String]) -> Result<()> {
        if lines.is_empty() {
            return Ok(());
        }
        let mut params = vec![("db", db), ("precision", "ns")];
        if !rp.is_empty() {
            params.push(("rp", rp));
        }
        let url = self.endpoint("write", &params)?;
        self.send(self.http.post(url).body(lines.join("\n")), "write")?;
        Ok(())
    }
}
