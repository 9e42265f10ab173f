//! Close of construction: stack closure check, then every reconciler.

use crate::db::{Database, TableNames};
use crate::error::{KbError, Result};
use crate::hierarchy::PathStack;
use crate::reconcile::{self, ReconcileReport, ReconcilerSet};

pub struct InstallationValidator<'a> {
    db: &'a Database,
    tables: &'a TableNames,
    reconcilers: &'a ReconcilerSet,
}

impl<'a> InstallationValidator<'a> {
    pub fn new(db: &'a Database, tables: &'a TableNames, reconcilers: &'a ReconcilerSet) -> Self {
        Self {
            db,
            tables,
            reconcilers,
        }
    }

    /// Fails on the first stack that is not back at its root.
    pub fn check_stacks<'s>(&self, stacks: impl IntoIterator<Item = &'s PathStack>) -> Result<()> {
        for stack in stacks {
            if !stack.is_closed() {
                return Err(KbError::Runtime {
                    context: format!(
                        "Installation check failed: knowledge base '{}' has open stack {}",
                        stack.root(),
                        stack
                    ),
                    source: None,
                });
            }
        }
        Ok(())
    }

    /// Checks every stack, then runs the reconcilers in the fixed order.
    /// The first reconciler failure aborts the run.
    pub fn run<'s>(
        &self,
        stacks: impl IntoIterator<Item = &'s PathStack>,
    ) -> Result<Vec<ReconcileReport>> {
        let _span =
            tracing::info_span!("check_installation", schema = %self.tables.nodes).entered();

        self.check_stacks(stacks)?;

        let mut reports = Vec::with_capacity(5);
        for reconciler in self.reconcilers.in_order() {
            reports.push(reconcile::run(self.db, self.tables, reconciler)?);
        }

        let changed = reports.iter().filter(|r| !r.is_noop()).count();
        log::info!(
            "Installation check passed; {} of {} field kinds changed",
            changed,
            reports.len()
        );
        Ok(reports)
    }
}
