use std::fmt;

use thiserror::Error;

/// Which editable quantity of a batch an error points at.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BatchField {
    TotalWeight,
    SamplingWeight,
    SamplingRatio,
}

impl fmt::Display for BatchField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BatchField::TotalWeight => "total weight",
            BatchField::SamplingWeight => "sampling weight",
            BatchField::SamplingRatio => "sampling ratio",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// A sampling weight cannot exceed the total weight it samples from.
    #[error("sampling weight exceeds the total weight (max {max})")]
    SampleExceedsTotal { max: f64 },

    #[error("{field} is required")]
    Required { field: BatchField },
}

impl ValidationError {
    /// The field a caller should attach this error to.
    pub fn field(&self) -> BatchField {
        match self {
            ValidationError::SampleExceedsTotal { .. } => BatchField::SamplingWeight,
            ValidationError::Required { field } => *field,
        }
    }
}

/// A batch with children must be persisted (and hold an id) before its
/// children can reference it by parent id.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("batch '{label}' has children but no id to link them with")]
pub struct MissingIdError {
    pub label: String,
}
