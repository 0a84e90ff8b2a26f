//! Replication of databases and retention policies from master to slave.

use super::influx::InfluxApi;
use crate::dispatch::DbSelector;
use anyhow::{bail, Context, Result};

/// Databases that are never replicated.
pub const SYSTEM_DATABASES: [&str; 1] = ["_internal"];

/// Master databases matching `selector`, system databases excluded.
pub fn selected_databases(master: &dyn InfluxApi, selector: &DbSelector) -> Result<Vec<String>> {
    let dbs: Vec<String> = master
        .show_databases()
        .with_context(|| format!("Failed to list databases on {}", master.name()))?
        .into_iter()
        .filter(|db| !SYSTEM_DATABASES.contains(&db.as_str()))
        .filter(|db| selector.matches(db))
        .collect();

    if let DbSelector::Named(name) = selector {
        if dbs.is_empty() {
            bail!("database {name} does not exist on {}", master.name());
        }
    }
    Ok(dbs)
}

/// Make sure `db` and all of its retention policies exist on the slave.
/// Returns whether the database had to be created.
pub fn ensure_database(master: &dyn InfluxApi, slave: &dyn InfluxApi, db: &str) -> Result<bool> {
    let existing = slave
        .show_databases()
        .with_context(|| format!("Failed to list databases on {}", slave.name()))?;
    let created = if existing.iter().any(|d| d == db) {
        false
    } else {
        tracing::info!("Creating database {db} on {}", slave.name());
        slave.create_database(db)?;
        true
    };

    let have: Vec<String> = slave
        .show_retention_policies(db)?
        .into_iter()
        .map(|rp| rp.name)
        .collect();
    for rp in master.show_retention_policies(db)? {
        if have.contains(&rp.name) {
            continue;
        }
        tracing::info!("Creating retention policy {}.{} on {}", db, rp.name, slave.name());
        slave
            .create_retention_policy(db, &rp)
            .with_context(|| format!("Failed to create retention policy {}.{}", db, rp.name))?;
    }
    Ok(created)
}

/// Replicate the schema of every selected database. Returns the databases
/// processed.
pub fn replicate(
    master: &dyn InfluxApi,
    slave: &dyn InfluxApi,
    selector: &DbSelector,
) -> Result<Vec<String>> {
    let dbs = selected_databases(master, selector)?;
    for db in &dbs {
        ensure_database(master, slave, db)?;
    }
    tracing::info!(
        "Replicated schema of {} database(s) from {} to {}",
        dbs.len(),
        master.name(),
        slave.name()
    );
    Ok(dbs)
}
