use std::fmt;

use serde::{Deserialize, Serialize};

/// One validation finding.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    /// Element path from the validated node, e.g. `Patient/field[age]`.
    pub path: String,
    pub message: String,
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Accumulated validation findings.
///
/// Validators report every problem they find instead of stopping at the
/// first one; a non-empty log means the document is rejected.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorLog {
    issues: Vec<Issue>,
}

impl ErrorLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.issues.push(Issue {
            path: path.into(),
            message: message.into(),
        });
    }

    /// Append every issue of `other`.
    pub fn merge(&mut self, other: ErrorLog) {
        self.issues.extend(other.issues);
    }

    pub fn issues(&self) -> &[Issue] {
        &self.issues
    }

    pub fn len(&self) -> usize {
        self.issues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    /// `Ok(())` when nothing was reported.
    pub fn into_result(self) -> Result<(), ErrorLog> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ErrorLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} validation issue(s)", self.issues.len())?;
        for issue in &self.issues {
            write!(f, "\n  {issue}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ErrorLog {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_log_is_ok() {
        assert_eq!(ErrorLog::new().into_result(), Ok(()));
    }

    #[test]
    fn issues_accumulate_and_display() {
        let mut log = ErrorLog::new();
        log.push("Patient", "missing field name");
        let mut other = ErrorLog::new();
        other.push("Patient/field[age]", "expected int");
        log.merge(other);

        assert_eq!(log.len(), 2);
        let text = log.to_string();
        assert!(text.starts_with("2 validation issue(s)"));
        assert!(text.contains("Patient/field[age]: expected int"));
        assert!(log.into_result().is_err());
    }
}
