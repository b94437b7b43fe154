//! The learning session state machine as a pure transition function.

use crate::extract::{self, ExtractError};
use crate::model::{ExtractionResult, FieldMapping, FieldSource, MappingError, SystemField};
use serde::{Deserialize, Serialize};
use std::error::Error as StdError;
use std::fmt::{Display, Formatter};

/// The message stored when an in-flight extraction is aborted.
pub const CANCELLED_MESSAGE: &str = "Extraction cancelled";

/// Where a session is in its workflow.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Extracting,
    Mapping,
    Confirmed,
    Failed,
}

serde_plain::derive_display_from_serialize!(Status);

/// The state of a session together with the data that state carries.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    Extracting,
    /// Waiting for a human to review the working mapping.
    Mapping {
        extraction: Box<ExtractionResult>,
        mapping: FieldMapping,
    },
    /// The mapping was accepted. Only template creation remains.
    Confirmed {
        extraction: Box<ExtractionResult>,
        mapping: FieldMapping,
    },
    Failed {
        error: String,
    },
}

/// Something that happens to a session.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Extracted(ExtractionResult),
    ExtractionFailed(String),
    Cancelled,
    Assign {
        field: SystemField,
        column: usize,
    },
    Unassign(SystemField),
    /// Accept `Some(mapping)` in place of the working mapping, or the working mapping itself.
    Confirm(Option<FieldMapping>),
}

impl Event {
    fn name(&self) -> &'static str {
        match self {
            Event::Extracted(_) => "complete extraction",
            Event::ExtractionFailed(_) => "fail extraction",
            Event::Cancelled => "cancel",
            Event::Assign { .. } => "assign a field",
            Event::Unassign(_) => "unassign a field",
            Event::Confirm(_) => "confirm the mapping",
        }
    }
}

/// Why an event was refused. The state it was applied to remains current.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum TransitionError {
    InvalidState {
        status: Status,
        operation: &'static str,
    },
    Mapping(MappingError),
}

impl Display for TransitionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            TransitionError::InvalidState { status, operation } => {
                write!(f, "Cannot {operation} while the session is {status}")
            }
            TransitionError::Mapping(e) => Display::fmt(e, f),
        }
    }
}

impl StdError for TransitionError {}

impl SessionState {
    pub fn status(&self) -> Status {
        match self {
            SessionState::Extracting => Status::Extracting,
            SessionState::Mapping { .. } => Status::Mapping,
            SessionState::Confirmed { .. } => Status::Confirmed,
            SessionState::Failed { .. } => Status::Failed,
        }
    }

    pub fn extraction(&self) -> Option<&ExtractionResult> {
        match self {
            SessionState::Mapping { extraction, .. } | SessionState::Confirmed { extraction, .. } => {
                Some(extraction.as_ref())
            }
            _ => None,
        }
    }

    pub fn mapping(&self) -> Option<&FieldMapping> {
        match self {
            SessionState::Mapping { mapping, .. } | SessionState::Confirmed { mapping, .. } => {
                Some(mapping)
            }
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            SessionState::Failed { error } => Some(error.as_str()),
            _ => None,
        }
    }

    /// Applies `event` and returns the next state.
    ///
    /// Cancelling a session that is no longer extracting leaves it unchanged. A refused
    /// confirmation is a [`TransitionError::Mapping`] and the session stays in `Mapping`.
    pub fn transition(&self, event: Event) -> Result<SessionState, TransitionError> {
        let refuse = |event: &Event| TransitionError::InvalidState {
            status: self.status(),
            operation: event.name(),
        };
        match (self, event) {
            (SessionState::Extracting, Event::Extracted(extraction)) => {
                if extraction.row_count == 0 {
                    return Ok(SessionState::Failed {
                        error: ExtractError::NoDataRows.to_string(),
                    });
                }
                let mapping = extraction.suggested_mappings.clone();
                Ok(SessionState::Mapping {
                    extraction: Box::new(extraction),
                    mapping,
                })
            }
            (SessionState::Extracting, Event::ExtractionFailed(error)) => {
                Ok(SessionState::Failed { error })
            }
            (SessionState::Extracting, Event::Cancelled) => Ok(SessionState::Failed {
                error: CANCELLED_MESSAGE.to_string(),
            }),
            (_, Event::Cancelled) => Ok(self.clone()),
            (SessionState::Mapping { extraction, mapping }, Event::Assign { field, column }) => {
                let mut mapping = mapping.clone();
                mapping.assign(field, source_for(extraction, field, column));
                Ok(SessionState::Mapping {
                    extraction: extraction.clone(),
                    mapping,
                })
            }
            (SessionState::Mapping { extraction, mapping }, Event::Unassign(field)) => {
                let mut mapping = mapping.clone();
                mapping.remove(field);
                Ok(SessionState::Mapping {
                    extraction: extraction.clone(),
                    mapping,
                })
            }
            (SessionState::Mapping { extraction, mapping }, Event::Confirm(edited)) => {
                let mapping = edited.unwrap_or_else(|| mapping.clone());
                let columns = Some(extraction.columns.len()).filter(|n| *n > 0);
                mapping.validate(columns).map_err(TransitionError::Mapping)?;
                Ok(SessionState::Confirmed {
                    extraction: extraction.clone(),
                    mapping,
                })
            }
            (_, event) => Err(refuse(&event)),
        }
    }
}

/// Date fields assigned by hand get a format detected from the column's samples.
fn source_for(extraction: &ExtractionResult, field: SystemField, column: usize) -> FieldSource {
    match extraction.columns.iter().find(|c| c.index == column) {
        Some(extracted) => extract::source_for(field, extracted),
        None => FieldSource::column(column),
    }
}
