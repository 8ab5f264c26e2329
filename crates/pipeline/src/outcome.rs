//! Typed result of one conversion unit, as reported to the fan-in barrier.

/// Coarse failure category carried in a [`UnitOutcome::Failure`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// The original upload could not be found.
    MissingInput,
    /// The converter could not be started, exited non-zero, or wrote nothing.
    Converter,
    /// The converter exceeded its time budget.
    Timeout,
    /// Local I/O around the conversion failed.
    Io,
    /// The job store or blob store failed while handling the unit.
    Storage,
    /// The unit could not be handed to the work queue.
    Dispatch,
}

impl FailureKind {
    /// Stable label persisted by the database barrier.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MissingInput => "missing_input",
            Self::Converter => "converter",
            Self::Timeout => "timeout",
            Self::Io => "io",
            Self::Storage => "storage",
            Self::Dispatch => "dispatch",
        }
    }

    /// Inverse of [`FailureKind::as_str`].
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "missing_input" => Some(Self::MissingInput),
            "converter" => Some(Self::Converter),
            "timeout" => Some(Self::Timeout),
            "io" => Some(Self::Io),
            "storage" => Some(Self::Storage),
            "dispatch" => Some(Self::Dispatch),
            _ => None,
        }
    }
}

/// What a unit reports to the barrier. The filename is the unit key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitOutcome {
    Success {
        filename: String,
    },
    Failure {
        filename: String,
        kind: FailureKind,
        detail: String,
    },
}

impl UnitOutcome {
    pub fn success(filename: impl Into<String>) -> Self {
        Self::Success {
            filename: filename.into(),
        }
    }

    pub fn failure(filename: impl Into<String>, kind: FailureKind, detail: impl Into<String>) -> Self {
        Self::Failure {
            filename: filename.into(),
            kind,
            detail: detail.into(),
        }
    }

    pub fn filename(&self) -> &str {
        match self {
            Self::Success { filename } | Self::Failure { filename, .. } => filename,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}
