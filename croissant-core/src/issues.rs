//! Issue ledger shared by every node of a dataset
//!
//! Validation never stops at the first problem. Every node appends its errors and
//! warnings to the same [`Issues`] ledger, tagged with the chain of ancestor node
//! names, and the builder only decides at the very end whether the manifest is usable.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::{Mutex, MutexGuard};

use crate::error::{Error, Result};

/// Kind of node appearing in an issue context chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ContextKind {
    /// The dataset itself
    Dataset,
    /// A FileObject
    FileObject,
    /// A FileSet
    FileSet,
    /// A RecordSet
    RecordSet,
    /// A Field
    Field,
    /// A sub-field nested inside a Field
    SubField,
}

impl fmt::Display for ContextKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextKind::Dataset => write!(f, "dataset"),
            ContextKind::FileObject => write!(f, "file_object"),
            ContextKind::FileSet => write!(f, "file_set"),
            ContextKind::RecordSet => write!(f, "record_set"),
            ContextKind::Field => write!(f, "field"),
            ContextKind::SubField => write!(f, "sub_field"),
        }
    }
}

/// Chain of ancestor node names, e.g. `dataset(mnist) > record_set(default) > field(image)`
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IssueContext {
    entries: Vec<(ContextKind, String)>,
}

impl IssueContext {
    /// Create an empty context (issues not attached to any node)
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new context one level deeper
    #[must_use]
    pub fn child(&self, kind: ContextKind, name: impl Into<String>) -> Self {
        let mut entries = self.entries.clone();
        entries.push((kind, name.into()));
        Self { entries }
    }

    /// Whether the context has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Name of the innermost node
    pub fn leaf(&self) -> Option<&str> {
        self.entries.last().map(|(_, name)| name.as_str())
    }
}

impl fmt::Display for IssueContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (kind, name)) in self.entries.iter().enumerate() {
            if i > 0 {
                write!(f, " > ")?;
            }
            write!(f, "{kind}({name})")?;
        }
        Ok(())
    }
}

/// A single error or warning
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Issue {
    /// Where the issue was raised
    pub context: IssueContext,
    /// Human-readable message
    pub message: String,
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.context.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "[{}] {}", self.context, self.message)
        }
    }
}

#[derive(Debug, Default)]
struct Ledger {
    errors: BTreeSet<Issue>,
    warnings: BTreeSet<Issue>,
}

/// Append-only collector of errors and warnings
///
/// The ledger is behind a mutex so that parallel downloads can record warnings
/// while the rest of the dataset is read-only.
#[derive(Debug, Default)]
pub struct Issues {
    ledger: Mutex<Ledger>,
}

impl Issues {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Ledger> {
        // A poisoned ledger still holds valid issues.
        self.ledger
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Record an error
    pub fn add_error(&self, context: &IssueContext, message: impl Into<String>) {
        self.lock().errors.insert(Issue {
            context: context.clone(),
            message: message.into(),
        });
    }

    /// Record a warning
    pub fn add_warning(&self, context: &IssueContext, message: impl Into<String>) {
        self.lock().warnings.insert(Issue {
            context: context.clone(),
            message: message.into(),
        });
    }

    /// Whether at least one error was recorded
    pub fn has_errors(&self) -> bool {
        !self.lock().errors.is_empty()
    }

    /// Snapshot of the recorded errors, sorted
    pub fn errors(&self) -> Vec<Issue> {
        self.lock().errors.iter().cloned().collect()
    }

    /// Snapshot of the recorded warnings, sorted
    pub fn warnings(&self) -> Vec<Issue> {
        self.lock().warnings.iter().cloned().collect()
    }

    /// Snapshot of the ledger as a report
    pub fn report(&self) -> ValidationReport {
        let ledger = self.lock();
        ValidationReport {
            errors: ledger.errors.iter().cloned().collect(),
            warnings: ledger.warnings.iter().cloned().collect(),
        }
    }

    /// Fail with [`Error::Validation`] if any error was recorded
    pub fn check(&self) -> Result<()> {
        if self.has_errors() {
            Err(Error::Validation(self.report()))
        } else {
            Ok(())
        }
    }
}

/// All issues collected while validating a manifest
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    /// Fatal problems
    pub errors: Vec<Issue>,
    /// Non-fatal problems
    pub warnings: Vec<Issue>,
}

fn write_section(f: &mut fmt::Formatter<'_>, label: &str, issues: &[Issue]) -> fmt::Result {
    write!(
        f,
        "Found the following {} {label}(s) during the validation:",
        issues.len()
    )?;
    for issue in issues {
        write!(f, "\n  -  {issue}")?;
    }
    Ok(())
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.errors.is_empty() {
            write_section(f, "error", &self.errors)?;
        }
        if !self.warnings.is_empty() {
            if !self.errors.is_empty() {
                writeln!(f)?;
            }
            write_section(f, "warning", &self.warnings)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_display() {
        let ctx = IssueContext::new()
            .child(ContextKind::Dataset, "mnist")
            .child(ContextKind::RecordSet, "default")
            .child(ContextKind::Field, "image");
        assert_eq!(
            ctx.to_string(),
            "dataset(mnist) > record_set(default) > field(image)"
        );
        assert_eq!(ctx.leaf(), Some("image"));
    }

    #[test]
    fn test_report_is_sorted_and_deduplicated() {
        let issues = Issues::new();
        let ctx = IssueContext::new().child(ContextKind::Dataset, "d");
        issues.add_error(&ctx, "b");
        issues.add_error(&ctx, "a");
        issues.add_error(&ctx, "a");
        issues.add_warning(&ctx, "w");

        let report = issues.report();
        assert_eq!(report.errors.len(), 2);
        assert_eq!(
            report.to_string(),
            "Found the following 2 error(s) during the validation:\n  -  [dataset(d)] a\n  -  [dataset(d)] b\nFound the following 1 warning(s) during the validation:\n  -  [dataset(d)] w"
        );
    }

    #[test]
    fn test_check_fails_only_on_errors() {
        let issues = Issues::new();
        issues.add_warning(&IssueContext::new(), "only a warning");
        assert!(issues.check().is_ok());

        issues.add_error(&IssueContext::new(), "now an error");
        let err = issues.check().unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(err.to_string().contains("now an error"));
    }
}
