//! Schema manager — ordered, versioned migrations applied directly against
//! the store's SQLite connection.

use chrono::Utc;
use rusqlite::params;
use tracing::{info, instrument};

use crate::store::Store;
use crate::{Error, Result};

pub type MigrationFn = fn(&rusqlite::Connection) -> rusqlite::Result<()>;

/// A single schema migration.
pub struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub up: MigrationFn,
    pub down: Option<MigrationFn>,
}

#[derive(Debug, Clone)]
pub struct AppliedMigration {
    pub version: u32,
    pub description: String,
    pub applied_at: String,
}

/// Applies and rolls back `Migration`s against a `Store`, enforcing strictly
/// sequential version numbers starting at 1.
pub struct SchemaManager {
    store: Store,
    migrations: Vec<Migration>,
}

impl SchemaManager {
    pub fn new(store: Store, migrations: Vec<Migration>) -> Result<Self> {
        let mut expected = 1u32;
        for m in &migrations {
            if m.version != expected {
                return Err(Error::SemanticError(format!(
                    "migrations must be strictly sequential starting at 1: expected version {expected}, got {}",
                    m.version
                )));
            }
            expected += 1;
        }
        Ok(Self { store, migrations })
    }

    /// The default single migration: `nodes` / `relationships` tables plus
    /// the four required indexes.
    pub fn default_migrations() -> Vec<Migration> {
        vec![Migration {
            version: 1,
            description: "create nodes and relationships tables",
            up: |conn| {
                conn.execute_batch(
                    "CREATE TABLE IF NOT EXISTS nodes (
                        id INTEGER PRIMARY KEY,
                        labels TEXT NOT NULL DEFAULT '[]',
                        properties TEXT NOT NULL DEFAULT '{}',
                        created_at TEXT NOT NULL,
                        updated_at TEXT NOT NULL
                    );
                    CREATE TABLE IF NOT EXISTS relationships (
                        id INTEGER PRIMARY KEY,
                        type TEXT NOT NULL,
                        start_node_id INTEGER NOT NULL REFERENCES nodes(id) ON DELETE CASCADE,
                        end_node_id INTEGER NOT NULL REFERENCES nodes(id) ON DELETE CASCADE,
                        properties TEXT NOT NULL DEFAULT '{}',
                        created_at TEXT NOT NULL
                    );
                    CREATE INDEX IF NOT EXISTS idx_nodes_labels ON nodes(labels);
                    CREATE INDEX IF NOT EXISTS idx_relationships_start ON relationships(start_node_id);
                    CREATE INDEX IF NOT EXISTS idx_relationships_end ON relationships(end_node_id);
                    CREATE INDEX IF NOT EXISTS idx_relationships_type ON relationships(type);",
                )
            },
            down: Some(|conn| {
                conn.execute_batch(
                    "DROP INDEX IF EXISTS idx_relationships_type;
                    DROP INDEX IF EXISTS idx_relationships_end;
                    DROP INDEX IF EXISTS idx_relationships_start;
                    DROP INDEX IF EXISTS idx_nodes_labels;
                    DROP TABLE IF EXISTS relationships;
                    DROP TABLE IF EXISTS nodes;",
                )
            }),
        }]
    }

    #[instrument(skip(self))]
    pub fn run_migrations(&self) -> Result<()> {
        let current = self.get_current_version()?;
        for m in self.migrations.iter().filter(|m| m.version > current) {
            self.run_migration(m)?;
        }
        Ok(())
    }

    fn run_migration(&self, m: &Migration) -> Result<()> {
        info!(version = m.version, description = m.description, "applying migration");
        self.store.with_connection(|conn| {
            (m.up)(conn)?;
            conn.execute(
                "INSERT INTO schema_version (version, description, applied_at) VALUES (?1, ?2, ?3)",
                params![m.version, m.description, Utc::now().to_rfc3339()],
            )?;
            Ok(())
        })
    }

    /// Roll back every migration with version strictly greater than
    /// `target`, in descending version order.
    #[instrument(skip(self))]
    pub fn rollback(&self, target: u32) -> Result<()> {
        let current = self.get_current_version()?;
        if target >= current {
            return Ok(());
        }
        for m in self.migrations.iter().rev().filter(|m| m.version > target && m.version <= current) {
            let down = m.down.ok_or_else(|| {
                Error::SemanticError(format!("migration {} has no down step", m.version))
            })?;
            info!(version = m.version, "rolling back migration");
            self.store.with_connection(|conn| {
                down(conn)?;
                conn.execute("DELETE FROM schema_version WHERE version = ?1", params![m.version])?;
                Ok(())
            })?;
        }
        Ok(())
    }

    pub fn needs_migration(&self) -> Result<bool> {
        Ok(self.get_current_version()? < self.get_latest_version())
    }

    pub fn get_latest_version(&self) -> u32 {
        self.migrations.iter().map(|m| m.version).max().unwrap_or(0)
    }

    pub fn get_current_version(&self) -> Result<u32> {
        self.store.with_connection(|conn| {
            conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get::<_, i64>(0))
        })
        .map(|v| v as u32)
    }

    pub fn get_migration_history(&self) -> Result<Vec<AppliedMigration>> {
        self.store.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT version, description, applied_at FROM schema_version ORDER BY version",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok(AppliedMigration {
                    version: row.get::<_, i64>(0)? as u32,
                    description: row.get(1)?,
                    applied_at: row.get(2)?,
                })
            })?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
        })
    }

    /// Checks that every table/index this manager's migrations assume to
    /// exist by the latest version is actually present.
    pub fn validate_schema(&self) -> Result<bool> {
        let current = self.get_current_version()?;
        if current < self.get_latest_version() {
            return Ok(false);
        }
        self.store.with_connection(|conn| {
            for table in crate::store::REQUIRED_TABLES {
                let exists: bool = conn.query_row(
                    "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name=?1)",
                    params![table],
                    |r| r.get(0),
                )?;
                if !exists {
                    return Ok(false);
                }
            }
            for index in crate::store::REQUIRED_INDEXES {
                let exists: bool = conn.query_row(
                    "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='index' AND name=?1)",
                    params![index],
                    |r| r.get(0),
                )?;
                if !exists {
                    return Ok(false);
                }
            }
            Ok(true)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequential_versions_required() {
        let store = Store::open_memory().unwrap();
        let migrations = vec![
            Migration { version: 1, description: "a", up: |_| Ok(()), down: None },
            Migration { version: 3, description: "b", up: |_| Ok(()), down: None },
        ];
        assert!(SchemaManager::new(store, migrations).is_err());
    }

    #[test]
    fn run_then_rollback_default_migration() {
        let store = Store::open_memory().unwrap();
        let mgr = SchemaManager::new(store, SchemaManager::default_migrations()).unwrap();
        assert_eq!(mgr.get_current_version().unwrap(), 0);
        mgr.run_migrations().unwrap();
        assert_eq!(mgr.get_current_version().unwrap(), 1);
        assert!(mgr.validate_schema().unwrap());
        mgr.rollback(0).unwrap();
        assert_eq!(mgr.get_current_version().unwrap(), 0);
    }
}
