//! Convergence of remote structured data toward the desired set.
//!
//! The reconciler fetches the entity's current state once, diffs it
//! against the desired set, and issues only the mutations needed to close
//! the gap. Values already on the remote are never modified, so whoever
//! wrote first wins and a second run over converged data is a no-op.
//!
//! Failures are contained per command: a failed statement does not stop
//! the remaining statements, and a failed qualifier only halts the other
//! qualifiers of its own statement. The report records the outcome of
//! every command so the caller can tell partial from complete.

pub mod desired;

pub use desired::{desired_for, DesiredLabel, DesiredStatement, DesiredStatementSet};

use crate::error::Result;
use crate::remote::{EntityId, RemoteStore};
use tracing::{debug, info, warn};

/// Outcome of a single statement command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    /// The statement (and all its qualifiers) was written.
    Applied,
    /// The property already had a statement; nothing was sent.
    AlreadyPresent,
    /// The statement or one of its qualifiers failed.
    Failed(String),
}

/// Outcome of the label command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LabelOutcome {
    /// The label was written.
    Applied,
    /// The remote label already equals the desired text.
    AlreadyMatches,
    /// The remote has a different label; it was deliberately not changed.
    LeftUntouched,
    /// The record has no desired label.
    NoDesired,
    /// The write failed.
    Failed(String),
}

/// Per-statement result, in application order.
#[derive(Debug, Clone)]
pub struct StatementReport {
    pub property: &'static str,
    pub outcome: CommandOutcome,
}

/// Full result of one reconcile pass over an entity.
#[derive(Debug, Clone)]
pub struct ReconcileReport {
    pub label: LabelOutcome,
    pub statements: Vec<StatementReport>,
}

impl ReconcileReport {
    /// Whether every command ended in a satisfied state.
    ///
    /// A label left untouched counts as satisfied: the remote value stands.
    pub fn metadata_complete(&self) -> bool {
        let label_ok = !matches!(self.label, LabelOutcome::Failed(_));
        let statements_ok = self
            .statements
            .iter()
            .all(|s| !matches!(s.outcome, CommandOutcome::Failed(_)));
        label_ok && statements_ok
    }

    /// Number of mutations actually sent.
    pub fn applied_count(&self) -> usize {
        let label = matches!(self.label, LabelOutcome::Applied) as usize;
        label
            + self
                .statements
                .iter()
                .filter(|s| s.outcome == CommandOutcome::Applied)
                .count()
    }

    /// Failure reasons, in command order.
    pub fn failures(&self) -> Vec<String> {
        let mut reasons = Vec::new();
        if let LabelOutcome::Failed(reason) = &self.label {
            reasons.push(format!("label: {}", reason));
        }
        for statement in &self.statements {
            if let CommandOutcome::Failed(reason) = &statement.outcome {
                reasons.push(format!("{}: {}", statement.property, reason));
            }
        }
        reasons
    }
}

/// Bring an entity's structured data toward the desired set.
///
/// Returns an error only when the current state cannot be fetched; command
/// failures are captured in the report instead.
pub async fn reconcile_entity(
    remote: &dyn RemoteStore,
    entity: &EntityId,
    desired: &DesiredStatementSet,
) -> Result<ReconcileReport> {
    let state = remote.entity_state(entity).await?;

    let label = match &desired.label {
        None => LabelOutcome::NoDesired,
        Some(want) => match state.label(&want.language) {
            Some(current) if current == want.text => {
                debug!("Label ({}) already matches, skipping", want.language);
                LabelOutcome::AlreadyMatches
            }
            Some(current) => {
                debug!(
                    "Label ({}) already set to '{}', leaving as is",
                    want.language, current
                );
                LabelOutcome::LeftUntouched
            }
            None => {
                info!("Setting label ({}) on {}", want.language, entity);
                match remote.set_label(entity, &want.language, &want.text).await {
                    Ok(()) => LabelOutcome::Applied,
                    Err(e) => {
                        warn!("Label write failed on {}: {}", entity, e);
                        LabelOutcome::Failed(e.to_string())
                    }
                }
            }
        },
    };

    let mut statements = Vec::with_capacity(desired.statements.len());
    for want in &desired.statements {
        let outcome = if state.has_statement(want.property) {
            debug!("{} already present on {}, skipping", want.property, entity);
            CommandOutcome::AlreadyPresent
        } else {
            info!("Adding {} to {}", want.property, entity);
            apply_statement(remote, entity, want).await
        };
        statements.push(StatementReport {
            property: want.property,
            outcome,
        });
    }

    Ok(ReconcileReport { label, statements })
}

/// Write one statement and its qualifiers.
///
/// A base-claim failure skips the qualifiers entirely. A qualifier failure
/// halts the remaining qualifiers of this statement; the claim itself
/// stays on the remote and a later pass finds the property present.
async fn apply_statement(
    remote: &dyn RemoteStore,
    entity: &EntityId,
    want: &DesiredStatement,
) -> CommandOutcome {
    let claim = match remote.add_statement(entity, want.property, &want.value).await {
        Ok(claim) => claim,
        Err(e) => {
            warn!("{} failed on {}: {}", want.property, entity, e);
            return CommandOutcome::Failed(e.to_string());
        }
    };

    for (property, value) in &want.qualifiers {
        if let Err(e) = remote.add_qualifier(&claim, property, value).await {
            warn!(
                "Qualifier {} on {} failed for {}: {}",
                property, want.property, entity, e
            );
            return CommandOutcome::Failed(format!("qualifier {}: {}", property, e));
        }
    }

    CommandOutcome::Applied
}
