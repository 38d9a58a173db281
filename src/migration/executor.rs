//! Migration executor for running migrations.

use super::registry::StepRegistry;
use super::types::{
    MigrationError, MigrationStep, RunOutcome, RunReport, RunState, StepFailure, StepStatus,
};
use crate::ledger::{AppliedStep, Ledger};
use crate::store::Store;
use std::collections::HashMap;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Options controlling how pending steps are selected.
#[derive(Debug, Clone, Copy, Default)]
pub struct MigratorOptions {
    /// Refuse to apply a pending step registered before an applied one.
    pub strict_order: bool,
}

/// Executor for running migrations.
///
/// The executor holds no state between runs: the registry, the store
/// handle and the ledger are all passed in by the caller.
#[derive(Debug, Clone, Default)]
pub struct Migrator {
    options: MigratorOptions,
}

impl Migrator {
    pub fn new(options: MigratorOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> MigratorOptions {
        self.options
    }

    /// Apply every pending step of `registry`.
    ///
    /// Step failures are reported in the returned `RunReport`. Errors are
    /// returned only when the run could not be planned (ledger unreadable,
    /// ledger inconsistent with the registry).
    pub async fn run(
        &self,
        registry: &StepRegistry,
        store: &mut dyn Store,
        ledger: &dyn Ledger,
    ) -> Result<RunReport, MigrationError> {
        MigrationRun::new(registry, self.options)
            .execute(store, ledger)
            .await
    }

    /// Report every registered step and whether it has been applied.
    pub async fn status(
        &self,
        registry: &StepRegistry,
        store: &mut dyn Store,
        ledger: &dyn Ledger,
    ) -> Result<Vec<StepStatus>, MigrationError> {
        let applied: HashMap<String, AppliedStep> = ledger
            .applied(store)
            .await?
            .into_iter()
            .map(|entry| (entry.name.clone(), entry))
            .collect();

        Ok(registry
            .iter()
            .map(|step| {
                let entry = applied.get(step.name());
                StepStatus {
                    name: step.name().to_string(),
                    applied_at: entry.map(|e| e.applied_at.clone()),
                    checksum_mismatch: entry.is_some_and(|e| checksum_differs(step, e)),
                }
            })
            .collect())
    }

    /// Undo the most recently applied step and remove it from the ledger.
    ///
    /// Returns the name of the reverted step, or `None` if nothing is applied.
    /// If the step's `down` fails the ledger is left unchanged.
    pub async fn revert_latest(
        &self,
        registry: &StepRegistry,
        store: &mut dyn Store,
        ledger: &dyn Ledger,
    ) -> Result<Option<String>, MigrationError> {
        let applied = ledger.applied(store).await?;
        let Some(latest) = applied.last() else {
            info!("Nothing to revert");
            return Ok(None);
        };

        let step = registry
            .get(&latest.name)
            .ok_or_else(|| MigrationError::UnknownAppliedStep(latest.name.clone()))?;

        info!(step = %step.name(), "Reverting step");

        if let Err(e) = step.down(store).await {
            error!(step = %step.name(), error = %e, "Revert failed");
            reset_transaction(store, step.name()).await;
            return Err(MigrationError::StepRevertFailed {
                step: step.name().to_string(),
                reason: e.to_string(),
            });
        }

        ledger.remove(store, step.name()).await?;

        info!(step = %step.name(), "Step reverted");
        Ok(Some(step.name().to_string()))
    }
}

/// One execution of the pending steps of a registry.
///
/// A run moves `Idle -> Running -> {Completed, Failed}` and cannot be
/// executed twice; a fresh run re-reads the ledger.
pub struct MigrationRun<'r> {
    registry: &'r StepRegistry,
    options: MigratorOptions,
    run_id: Uuid,
    state: RunState,
}

impl<'r> MigrationRun<'r> {
    pub fn new(registry: &'r StepRegistry, options: MigratorOptions) -> Self {
        Self {
            registry,
            options,
            run_id: Uuid::new_v4(),
            state: RunState::Idle,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Execute the run against a store handle and its ledger.
    pub async fn execute(
        &mut self,
        store: &mut dyn Store,
        ledger: &dyn Ledger,
    ) -> Result<RunReport, MigrationError> {
        if self.state != RunState::Idle {
            return Err(MigrationError::RunAlreadyStarted);
        }
        self.state = RunState::Running;

        let result = self.apply_pending(store, ledger).await;

        self.state = match &result {
            Ok(report) if report.is_success() => RunState::Completed,
            _ => RunState::Failed,
        };
        result
    }

    async fn apply_pending(
        &self,
        store: &mut dyn Store,
        ledger: &dyn Ledger,
    ) -> Result<RunReport, MigrationError> {
        let run_id = self.run_id.to_string();

        ledger.prepare(store).await?;
        let applied = ledger.applied(store).await?;
        let pending = plan_pending(self.registry, &applied, self.options)?;

        if pending.is_empty() {
            info!(run_id = %run_id, "No pending migration steps");
            return Ok(RunReport {
                run_id,
                outcome: RunOutcome::NoOp,
                applied: vec![],
                failure: None,
            });
        }

        info!(run_id = %run_id, pending = pending.len(), "Starting migration run");

        let mut newly_applied = Vec::with_capacity(pending.len());

        for step in pending {
            info!(run_id = %run_id, step = %step.name(), "Applying step");

            let outcome = match step.up(store).await {
                Ok(()) => {
                    let record = AppliedStep::now(step.name(), step.checksum().map(str::to_string));
                    ledger
                        .record(store, &record)
                        .await
                        .map_err(|e| format!("failed to record step in ledger: {}", e))
                }
                Err(e) => Err(e.to_string()),
            };

            if let Err(apply_error) = outcome {
                error!(run_id = %run_id, step = %step.name(), error = %apply_error, "Step failed");

                reset_transaction(store, step.name()).await;

                // Best-effort compensation of this step only; earlier steps stay committed.
                let revert_error = match step.down(store).await {
                    Ok(()) => {
                        info!(run_id = %run_id, step = %step.name(), "Failed step reverted");
                        None
                    }
                    Err(e) => {
                        error!(
                            run_id = %run_id,
                            step = %step.name(),
                            error = %e,
                            "Revert of failed step failed, store may be inconsistent"
                        );
                        reset_transaction(store, step.name()).await;
                        Some(e.to_string())
                    }
                };

                return Ok(RunReport {
                    run_id,
                    outcome: RunOutcome::Failed,
                    applied: newly_applied,
                    failure: Some(StepFailure {
                        step: step.name().to_string(),
                        apply_error,
                        revert_error,
                    }),
                });
            }

            newly_applied.push(step.name().to_string());
        }

        info!(
            run_id = %run_id,
            count = newly_applied.len(),
            "Migration run completed successfully"
        );

        Ok(RunReport {
            run_id,
            outcome: RunOutcome::Completed,
            applied: newly_applied,
            failure: None,
        })
    }
}

/// Drop a transaction a failed step left open, so the handle stays usable.
async fn reset_transaction(store: &mut dyn Store, step: &str) {
    if let Err(e) = store.reset_transaction().await {
        warn!(step = %step, error = %e, "Could not reset open transaction");
    }
}

/// Select the steps a run should apply, in registration order.
fn plan_pending<'r>(
    registry: &'r StepRegistry,
    applied: &[AppliedStep],
    options: MigratorOptions,
) -> Result<Vec<&'r MigrationStep>, MigrationError> {
    let mut latest_applied: Option<(usize, &str)> = None;

    for entry in applied {
        let step = registry
            .get(&entry.name)
            .ok_or_else(|| MigrationError::UnknownAppliedStep(entry.name.clone()))?;

        if checksum_differs(step, entry) {
            warn!(
                step = %entry.name,
                "Applied step has changed since it was applied; it will not be re-run"
            );
        }

        let position = registry.position(&entry.name).unwrap_or_default();
        if latest_applied.map_or(true, |(latest, _)| position > latest) {
            latest_applied = Some((position, entry.name.as_str()));
        }
    }

    let pending: Vec<&MigrationStep> = registry
        .iter()
        .filter(|step| !applied.iter().any(|entry| entry.name == step.name()))
        .collect();

    if options.strict_order {
        if let Some((latest, latest_name)) = latest_applied {
            if let Some(step) = pending
                .iter()
                .find(|step| registry.position(step.name()).unwrap_or_default() < latest)
            {
                return Err(MigrationError::OutOfOrderStep {
                    step: step.name().to_string(),
                    applied: latest_name.to_string(),
                });
            }
        }
    }

    Ok(pending)
}

fn checksum_differs(step: &MigrationStep, entry: &AppliedStep) -> bool {
    match (step.checksum(), entry.checksum.as_deref()) {
        (Some(current), Some(recorded)) => current != recorded,
        _ => false,
    }
}
