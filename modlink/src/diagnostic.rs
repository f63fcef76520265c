//!
//! Diagnostic Module - Link Error Reporting
//!
//! Renders link failures with miette, pointing at the descriptor row that
//! caused them when one can be identified. Table-level failures (length,
//! guards, version) have no row and are reported without a snippet.
//!
//! Usage:
//!   let reporter = DiagnosticReporter::new(&source);
//!   reporter.report("math", &err);
//!

use std::ops::Range;

use miette::{Diagnostic, LabeledSpan, NamedSource, Report, SourceSpan};
use thiserror::Error;

use crate::descriptor::DescriptorSource;
use crate::error::LinkError;

#[derive(Debug, Error)]
#[error("{message}")]
pub struct LinkDiagnostic {
    message: String,
    src: NamedSource<String>,
    span: Option<SourceSpan>,
    label: String,
    help_text: Option<String>,
}

impl Diagnostic for LinkDiagnostic {
    fn code<'a>(&'a self) -> Option<Box<dyn std::fmt::Display + 'a>> {
        Some(Box::new("modlink::link"))
    }

    fn source_code(&self) -> Option<&dyn miette::SourceCode> {
        self.span.map(|_| &self.src as &dyn miette::SourceCode)
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = LabeledSpan> + '_>> {
        let span = self.span?;
        Some(Box::new(std::iter::once(LabeledSpan::new_primary_with_span(
            Some(self.label.clone()),
            span,
        ))))
    }

    fn help<'a>(&'a self) -> Option<Box<dyn std::fmt::Display + 'a>> {
        self.help_text
            .as_ref()
            .map(|h| Box::new(h.clone()) as Box<dyn std::fmt::Display>)
    }
}

impl LinkDiagnostic {
    pub fn from_link_error(module: &str, err: &LinkError, source: &DescriptorSource) -> Self {
        let (message, label, help) = link_error_details(err);

        Self {
            message: format!("module '{}': {}", module, message),
            src: NamedSource::new(&source.name, source.text.clone()),
            span: error_span(err, source).map(|r| SourceSpan::from(r.start..r.end)),
            label,
            help_text: help,
        }
    }

    pub fn span(&self) -> Option<SourceSpan> {
        self.span
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

/// Byte range of the row an error refers to.
fn error_span(err: &LinkError, source: &DescriptorSource) -> Option<Range<usize>> {
    let row = match err {
        LinkError::MalformedEntry { row, .. } => Some(*row),
        LinkError::MissingSentinel => source.rows().len().checked_sub(1),
        LinkError::DuplicateSymbol { name } => source.row_of_symbol(name, true),
        LinkError::MissingConstant { name } | LinkError::ConstantTypeMismatch { name, .. } => {
            source.row_of_symbol(name, false)
        }
        _ => None,
    };
    row.and_then(|r| source.row_span(r))
}

pub fn link_error_details(err: &LinkError) -> (String, String, Option<String>) {
    match err {
        LinkError::MalformedEntry { row, reason } => (
            format!("malformed descriptor row {}", row),
            reason.clone(),
            Some("rows are `F\\0name\\0(Args): Ret`, `O\\0name\\0Type` or `Z`".to_string()),
        ),
        LinkError::MissingSentinel => (
            "descriptor is not terminated".to_string(),
            "expected a `Z` row after this".to_string(),
            Some("end the table with a single `Z` row".to_string()),
        ),
        LinkError::ArityMismatch { expected, found } => (
            format!("expected {} native callables, found {}", expected, found),
            format!("{} function entries", expected),
            Some("supply one callable per function entry, in declaration order".to_string()),
        ),
        LinkError::LinkageLengthMismatch { expected, found } => (
            format!("linkage table has {} slots, expected {}", found, expected),
            format!("expected {} slots", expected),
            Some("regenerate the linkage table from this descriptor".to_string()),
        ),
        LinkError::MisplacedGuard { slot } => (
            format!("linkage slot {} holds the wrong kind of entry", slot),
            format!("slot {}", slot),
            Some("slot 0 must be the reserved guard and the last slot the version guard".to_string()),
        ),
        LinkError::IncompatibleModuleVersion { required, running } => (
            format!("module requires runtime {} or newer, running {}", required, running),
            format!("built for v{}", required),
            Some("rebuild the module against this runtime or upgrade the host".to_string()),
        ),
        LinkError::DuplicateSymbol { name } => (
            format!("duplicate symbol '{}'", name),
            "already declared above".to_string(),
            Some("rename or remove one of the entries".to_string()),
        ),
        LinkError::MissingConstant { name } => (
            format!("constant '{}' is not provided by the runtime", name),
            "no such constant".to_string(),
            Some(format!("add '{}' to the [constants] section of the host config", name)),
        ),
        LinkError::ConstantTypeMismatch { name, expected, found } => (
            format!("constant '{}' has the wrong type", name),
            format!("declared {}, runtime provides {}", expected, found),
            None,
        ),
        LinkError::InvalidInvocation { slot, kind } => (
            format!("linkage slot {} cannot be invoked", slot),
            format!("{} slot", kind),
            None,
        ),
        LinkError::ModuleAlreadyRegistered { module } => (
            format!("module '{}' is already registered", module),
            "registered twice".to_string(),
            None,
        ),
        LinkError::Call(err) => (err.to_string(), "call failed".to_string(), None),
    }
}

pub struct DiagnosticReporter<'a> {
    source: &'a DescriptorSource,
}

impl<'a> DiagnosticReporter<'a> {
    pub fn new(source: &'a DescriptorSource) -> Self {
        Self { source }
    }

    pub fn diagnostic(&self, module: &str, err: &LinkError) -> LinkDiagnostic {
        LinkDiagnostic::from_link_error(module, err, self.source)
    }

    pub fn report(&self, module: &str, err: &LinkError) {
        let report = Report::new(self.diagnostic(module, err));
        eprintln!("{:?}", report);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(text: &str) -> DescriptorSource {
        DescriptorSource::from_bytes("math.desc", text.as_bytes()).unwrap()
    }

    #[test]
    fn test_malformed_row_is_labeled() {
        let source = source("O\\0pi\\0Double\nF\\0sqrt\\0Double\nZ\n");
        let err = source.decode().unwrap_err();
        let diag = DiagnosticReporter::new(&source).diagnostic("math", &err);

        let span = diag.span().unwrap();
        assert_eq!(&source.text[span.offset()..span.offset() + span.len()], "F\\0sqrt\\0Double");
        assert!(diag.to_string().contains("module 'math'"));
        assert!(diag.to_string().contains("row 1"));
        assert!(diag.help().is_some());
        assert_eq!(diag.labels().map(|l| l.count()), Some(1));
    }

    #[test]
    fn test_missing_sentinel_points_at_last_row() {
        let source = source("O\\0pi\\0Double\nO\\0e\\0Double\n");
        let diag = LinkDiagnostic::from_link_error("math", &LinkError::MissingSentinel, &source);
        let span = diag.span().unwrap();
        assert_eq!(&source.text[span.offset()..span.offset() + span.len()], "O\\0e\\0Double");
        assert!(diag.label().contains("`Z`"));
    }

    #[test]
    fn test_duplicate_points_at_second_declaration() {
        let source = source("F\\0pi\\0(): Double\nO\\0pi\\0Double\nZ\n");
        let err = LinkError::DuplicateSymbol { name: "pi".to_string() };
        let diag = LinkDiagnostic::from_link_error("math", &err, &source);
        assert_eq!(diag.span().map(|s| s.offset()), source.row_span(1).map(|r| r.start));
    }

    #[test]
    fn test_table_errors_have_no_snippet() {
        let source = source("Z\n");
        let err = LinkError::IncompatibleModuleVersion { required: 22, running: 21 };
        let diag = LinkDiagnostic::from_link_error("math", &err, &source);
        assert!(diag.span().is_none());
        assert!(diag.labels().is_none());
        assert!(diag.source_code().is_none());
        assert!(diag.to_string().contains("requires runtime 22"));
    }

    #[test]
    fn test_every_error_has_details() {
        let errors = [
            LinkError::malformed(0, "bad"),
            LinkError::MissingSentinel,
            LinkError::ArityMismatch { expected: 1, found: 0 },
            LinkError::LinkageLengthMismatch { expected: 3, found: 2 },
            LinkError::MisplacedGuard { slot: 0 },
            LinkError::IncompatibleModuleVersion { required: 22, running: 21 },
            LinkError::DuplicateSymbol { name: "pi".to_string() },
            LinkError::MissingConstant { name: "tau".to_string() },
            LinkError::InvalidInvocation { slot: 2, kind: "version guard" },
            LinkError::ModuleAlreadyRegistered { module: "math".to_string() },
        ];
        for err in &errors {
            let (message, label, _) = link_error_details(err);
            assert!(!message.is_empty(), "{:?}", err);
            assert!(!label.is_empty(), "{:?}", err);
        }
    }
}
