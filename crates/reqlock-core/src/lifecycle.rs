use crate::entry::ReconcileError;
use std::fmt;

/// Reconciliation progress of a single entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    Raw,
    MarkersExtracted,
    ConstraintsValidated,
    Canonicalized,
}

impl fmt::Display for EntryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Raw => "raw",
            Self::MarkersExtracted => "markers-extracted",
            Self::ConstraintsValidated => "constraints-validated",
            Self::Canonicalized => "canonicalized",
        })
    }
}

pub fn validate_transition(from: EntryState, to: EntryState) -> Result<(), ReconcileError> {
    let valid = matches!(
        (from, to),
        (EntryState::Raw, EntryState::MarkersExtracted)
            | (
                EntryState::MarkersExtracted
                    | EntryState::ConstraintsValidated
                    | EntryState::Canonicalized,
                EntryState::ConstraintsValidated
            )
            | (EntryState::ConstraintsValidated, EntryState::Canonicalized)
    );

    if valid {
        Ok(())
    } else {
        Err(ReconcileError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}
