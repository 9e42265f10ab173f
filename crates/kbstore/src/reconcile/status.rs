//! Status fields: exactly one row per declared path.

use rusqlite::{params, Transaction};

use super::{declared_paths, delete_paths, live_paths, Reconcile, ReconcileReport};
use crate::db::TableNames;
use crate::error::Result;
use crate::fields::{FieldDeclaration, FieldKind};

pub struct StatusReconciler {
    batch_size: usize,
}

impl StatusReconciler {
    pub fn new(batch_size: usize) -> Self {
        Self { batch_size }
    }
}

impl Reconcile for StatusReconciler {
    fn kind(&self) -> FieldKind {
        FieldKind::Status
    }

    fn reconcile(
        &self,
        tx: &Transaction<'_>,
        tables: &TableNames,
        declared: &[FieldDeclaration],
    ) -> Result<ReconcileReport> {
        let mut report = ReconcileReport::new(FieldKind::Status);
        let table = &tables.status;

        let live = live_paths(tx, table, "path")?;
        let wanted = declared_paths(declared);

        let extra: Vec<&String> = live.difference(&wanted).collect();
        if !extra.is_empty() {
            report.deleted = delete_paths(tx, table, "path", extra, self.batch_size)?;
        }

        // Existing rows keep their payload; only missing paths are seeded.
        for decl in declared.iter().filter(|d| !live.contains(&d.path)) {
            let seed = if decl.initial_data.is_object() {
                decl.initial_data.to_string()
            } else {
                "{}".to_string()
            };
            tx.execute(
                &format!("INSERT INTO {table} (path, data) VALUES (?1, ?2)"),
                params![decl.path, seed],
            )?;
            report.inserted += 1;
        }

        Ok(report)
    }
}
