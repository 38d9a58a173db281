//! Types for the migration system.

use crate::ledger::LedgerError;
use crate::store::{Store, StoreError};
use crate::utils::{compute_step_checksum, is_valid_name};
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Error types for migration operations.
#[derive(Error, Debug)]
pub enum MigrationError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Ledger error: {0}")]
    LedgerError(#[from] LedgerError),

    #[error("Duplicate step name: {0}")]
    DuplicateStepName(String),

    #[error("Invalid step '{0}': {1}")]
    InvalidStep(String, String),

    #[error("Step {step} failed: {reason}{}", revert_suffix(.revert))]
    StepApplyFailed {
        step: String,
        reason: String,
        /// Set when compensating the failed step also failed.
        revert: Option<String>,
    },

    #[error("Revert of step {step} failed: {reason}")]
    StepRevertFailed { step: String, reason: String },

    #[error("Ledger records step '{0}' which is not registered")]
    UnknownAppliedStep(String),

    #[error("Pending step '{step}' is ordered before already applied step '{applied}'")]
    OutOfOrderStep { step: String, applied: String },

    #[error("Migration run has already been executed")]
    RunAlreadyStarted,

    #[error("Step '{0}' has no down script")]
    MissingDownScript(String),
}

fn revert_suffix(revert: &Option<String>) -> String {
    match revert {
        Some(reason) => format!(" (revert also failed: {})", reason),
        None => String::new(),
    }
}

/// Trait for a step whose forward and backward operations are written in code.
///
/// `down` must be safe to call when `up` only partially completed, and safe
/// to call twice: check that objects exist before dropping them.
#[async_trait]
pub trait StepOperations: Send + Sync {
    /// Apply the step.
    async fn up(&self, store: &mut dyn Store) -> Result<(), StoreError>;

    /// Undo the step.
    async fn down(&self, store: &mut dyn Store) -> Result<(), StoreError>;
}

/// What a step runs.
#[derive(Clone)]
pub enum StepBody {
    /// Plain SQL scripts, executed as batches.
    Sql { up: String, down: String },
    /// Operations implemented in code.
    Custom(Arc<dyn StepOperations>),
}

impl fmt::Debug for StepBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepBody::Sql { up, down } => f
                .debug_struct("Sql")
                .field("up", up)
                .field("down", down)
                .finish(),
            StepBody::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// A single named migration step.
#[derive(Debug, Clone)]
pub struct MigrationStep {
    name: String,
    body: StepBody,
    checksum: Option<String>,
}

impl MigrationStep {
    /// Create a step from SQL scripts.
    pub fn sql(name: impl Into<String>, up: impl Into<String>, down: impl Into<String>) -> Self {
        let up = up.into();
        let down = down.into();
        let checksum = Some(compute_step_checksum(&up, &down));
        Self {
            name: name.into(),
            body: StepBody::Sql { up, down },
            checksum,
        }
    }

    /// Create a step from code. Custom steps carry no checksum.
    pub fn custom(name: impl Into<String>, operations: impl StepOperations + 'static) -> Self {
        Self {
            name: name.into(),
            body: StepBody::Custom(Arc::new(operations)),
            checksum: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn body(&self) -> &StepBody {
        &self.body
    }

    pub fn checksum(&self) -> Option<&str> {
        self.checksum.as_deref()
    }

    /// Check the descriptor is well formed.
    pub fn validate(&self) -> Result<(), MigrationError> {
        if !is_valid_name(&self.name) {
            return Err(MigrationError::InvalidStep(
                self.name.clone(),
                "name must start with a letter or digit and contain only letters, digits, '_', '.' or '-'"
                    .to_string(),
            ));
        }

        if let StepBody::Sql { up, down } = &self.body {
            if up.trim().is_empty() {
                return Err(MigrationError::InvalidStep(
                    self.name.clone(),
                    "up script is empty".to_string(),
                ));
            }
            if down.trim().is_empty() {
                return Err(MigrationError::InvalidStep(
                    self.name.clone(),
                    "down script is empty".to_string(),
                ));
            }
        }

        Ok(())
    }

    /// Run the forward operation.
    pub async fn up(&self, store: &mut dyn Store) -> Result<(), StoreError> {
        match &self.body {
            StepBody::Sql { up, .. } => store.execute_batch(up).await.map(|_| ()),
            StepBody::Custom(operations) => operations.up(store).await,
        }
    }

    /// Run the backward operation.
    pub async fn down(&self, store: &mut dyn Store) -> Result<(), StoreError> {
        match &self.body {
            StepBody::Sql { down, .. } => store.execute_batch(down).await.map(|_| ()),
            StepBody::Custom(operations) => operations.down(store).await,
        }
    }
}

/// Lifecycle of a single run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RunState {
    Idle,
    Running,
    Completed,
    Failed,
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RunOutcome {
    /// Nothing was pending.
    NoOp,
    /// Every pending step was applied.
    Completed,
    /// A step failed; it was compensated and the run halted.
    Failed,
}

/// The step that halted a failed run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepFailure {
    pub step: String,
    pub apply_error: String,
    /// Set when the compensating `down` also failed. The store may then be
    /// left inconsistent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revert_error: Option<String>,
}

/// Result of a migration run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub run_id: String,
    pub outcome: RunOutcome,
    /// Steps applied and recorded by this run, in order.
    pub applied: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<StepFailure>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.outcome != RunOutcome::Failed
    }

    /// Turn a failed report into an error, for callers that must fail loudly.
    pub fn into_result(self) -> Result<RunReport, MigrationError> {
        match (self.outcome, self.failure) {
            (RunOutcome::Failed, Some(failure)) => Err(MigrationError::StepApplyFailed {
                step: failure.step,
                reason: failure.apply_error,
                revert: failure.revert_error,
            }),
            (outcome, failure) => Ok(RunReport {
                run_id: self.run_id,
                outcome,
                applied: self.applied,
                failure,
            }),
        }
    }
}

/// Status of one registered step.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepStatus {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub applied_at: Option<String>,
    /// The step changed after it was applied.
    pub checksum_mismatch: bool,
}
