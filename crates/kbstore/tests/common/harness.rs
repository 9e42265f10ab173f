//! Test harness for isolated construction passes.
//!
//! Each `TestHarness` owns a temporary directory with one SQLite file.
//! `pass()` starts a new construction pass against that file, so tests can
//! declare a tree, reconcile, and then redeclare it in a later pass.

#![allow(dead_code)]

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use rusqlite::types::Value as SqlValue;
use tempfile::TempDir;

use kbstore::{Database, FieldKind, HierarchyBuilder, StoreConfig, TableNames};

pub const SCHEMA: &str = "plant";

pub struct TestHarness {
    temp_dir: TempDir,
    pub db_path: PathBuf,
    db: Database,
    config: StoreConfig,
}

impl TestHarness {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let db_path = temp_dir.path().join("data").join("kbstore.db");
        let db = Database::open(&db_path).expect("Failed to open test database");
        let mut config = StoreConfig::with_schema(SCHEMA);
        config.database_path = Some(db_path.clone());

        Self {
            temp_dir,
            db_path,
            db,
            config,
        }
    }

    pub fn temp_path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn tables(&self) -> TableNames {
        TableNames::new(SCHEMA)
    }

    /// Starts a new construction pass with one knowledge base `kb1`.
    pub fn pass(&self) -> HierarchyBuilder {
        let mut builder = self.empty_pass();
        builder.add_kb("kb1", "test kb").expect("Failed to add kb1");
        builder
    }

    /// Starts a new construction pass with no knowledge bases.
    pub fn empty_pass(&self) -> HierarchyBuilder {
        HierarchyBuilder::new(self.db.clone(), &self.config).expect("Failed to start pass")
    }

    /// Writes a file into the temp directory.
    pub fn write_file(&self, name: &str, content: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        std::fs::write(&path, content).expect("Failed to write file");
        path
    }

    /// Distinct paths present in a field table.
    pub fn live_paths(&self, kind: FieldKind) -> BTreeSet<String> {
        let tables = self.tables();
        let sql = format!(
            "SELECT DISTINCT {} FROM {}",
            kind.path_column(),
            kind.table(&tables)
        );
        self.db
            .with_conn(|conn| {
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map([], |r| r.get::<_, String>(0))?
                    .collect::<Result<BTreeSet<_>, _>>()?;
                Ok(rows)
            })
            .expect("Failed to read live paths")
    }

    /// Row ids of a field table at `path`, oldest id first.
    pub fn row_ids(&self, kind: FieldKind, path: &str) -> Vec<i64> {
        let tables = self.tables();
        let sql = format!(
            "SELECT id FROM {} WHERE {} = ?1 ORDER BY id",
            kind.table(&tables),
            kind.path_column()
        );
        self.db
            .with_conn(|conn| {
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map([path], |r| r.get::<_, i64>(0))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .expect("Failed to read row ids")
    }

    /// Every row of a field table rendered as text, ordered by id.
    pub fn snapshot(&self, kind: FieldKind) -> Vec<String> {
        let tables = self.tables();
        let sql = format!("SELECT * FROM {} ORDER BY id", kind.table(&tables));
        self.db
            .with_conn(|conn| {
                let mut stmt = conn.prepare(&sql)?;
                let columns = stmt.column_count();
                let rows = stmt
                    .query_map([], |r| {
                        let values = (0..columns)
                            .map(|i| r.get::<_, SqlValue>(i).map(|v| format!("{:?}", v)))
                            .collect::<Result<Vec<_>, _>>()?;
                        Ok(values.join("|"))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .expect("Failed to snapshot table")
    }

    /// Runs raw SQL against the store.
    pub fn execute(&self, sql: &str) {
        self.db
            .with_conn(|conn| Ok(conn.execute_batch(sql)?))
            .expect("Failed to execute SQL");
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
