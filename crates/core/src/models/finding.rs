//! Pre-flight validation findings.

/// What the validation gate found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FindingKind {
    DuplicateUser,
    InvalidEmail,
    MassDeletion,
    UnchangedInput,
}

impl std::fmt::Display for FindingKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FindingKind::DuplicateUser => "duplicate-user",
            FindingKind::InvalidEmail => "invalid-email",
            FindingKind::MassDeletion => "mass-deletion",
            FindingKind::UnchangedInput => "unchanged-input",
        };
        f.write_str(s)
    }
}

/// Whether a finding halts Normal-mode execution or is log-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Blocking,
    Advisory,
}

/// A single validation result. Blocking findings halt Normal mode before any
/// mutation; Simulate and Force demote them to log lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    pub kind: FindingKind,
    pub severity: Severity,
    pub detail: String,
}

impl Finding {
    pub fn blocking(kind: FindingKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            severity: Severity::Blocking,
            detail: detail.into(),
        }
    }

    pub fn advisory(kind: FindingKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            severity: Severity::Advisory,
            detail: detail.into(),
        }
    }

    pub fn is_blocking(&self) -> bool {
        self.severity == Severity::Blocking
    }
}

impl std::fmt::Display for Finding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.kind, self.detail)
    }
}
