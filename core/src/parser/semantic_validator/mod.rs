//! Semantic Validation for ARO programs
//!
//! This module provides an extensible rule-based validation system that runs
//! after parsing and linking to catch problems the grammar can't express:
//! undefined names, unreachable statements, lifecycle conflicts and
//! suspicious data flow.
//!
//! # Usage
//!
//! ```ignore
//! use aro_core::actions::RoleCatalog;
//! use aro_core::parser::{parse, semantic_validator::check_program};
//!
//! let program = parse(source)?;
//! let (analysis, diagnostics) = check_program(&program, &RoleCatalog::fallback());
//! ```
//!
//! # Architecture
//!
//! 1. **analyzer** - builds symbol tables and per-statement data flow
//! 2. **ValidationRule trait** - each rule inspects the program plus analysis
//! 3. **Validator** - collects and runs all rules
//!
//! # Adding a New Rule
//!
//! 1. Create a new file in `semantic_validator/rules/`
//! 2. Implement `ValidationRule` for your struct
//! 3. Add it to the `Validator::new()` constructor

pub mod analyzer;
pub mod rules;
pub mod symbols;

use crate::actions::RoleCatalog;
use crate::executor::types::ast::{Program, Span, Stmt};

pub use analyzer::{analyze, Analysis, DependencyEdge, FeatureSetAnalysis, StatementFlow};
pub use symbols::{PublishedAliases, Symbol, SymbolOrigin, SymbolTable, Visibility};

// ============================================================================
// Validation Error Types
// ============================================================================

/// A diagnostic produced by semantic analysis.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    /// The source location of the issue
    pub span: Span,
    /// Source file of the feature set, when known
    pub origin: Option<String>,
    /// Human-readable message
    pub message: String,
    /// Severity level
    pub severity: Severity,
    /// Which rule produced this error
    pub rule_id: &'static str,
}

/// Severity levels for validation errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Must be fixed - code is incorrect
    Error,
    /// Should probably be fixed - potential bug
    Warning,
    /// Suggestion for improvement
    Hint,
}

impl ValidationError {
    fn with_severity(
        span: Span,
        message: impl Into<String>,
        severity: Severity,
        rule_id: &'static str,
    ) -> Self {
        Self {
            span,
            origin: None,
            message: message.into(),
            severity,
            rule_id,
        }
    }

    pub fn error(span: Span, message: impl Into<String>, rule_id: &'static str) -> Self {
        Self::with_severity(span, message, Severity::Error, rule_id)
    }

    pub fn warning(span: Span, message: impl Into<String>, rule_id: &'static str) -> Self {
        Self::with_severity(span, message, Severity::Warning, rule_id)
    }

    pub fn hint(span: Span, message: impl Into<String>, rule_id: &'static str) -> Self {
        Self::with_severity(span, message, Severity::Hint, rule_id)
    }

    pub fn in_file(mut self, origin: Option<&String>) -> Self {
        self.origin = origin.cloned();
        self
    }

    /// Check if this is an error (not a warning or hint)
    pub fn is_error(&self) -> bool {
        matches!(self.severity, Severity::Error)
    }

    pub fn is_warning(&self) -> bool {
        matches!(self.severity, Severity::Warning)
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let severity = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Hint => "hint",
        };
        if let Some(origin) = &self.origin {
            write!(f, "{}: ", origin)?;
        }
        write!(
            f,
            "{} at line {}, col {}: {} [{}]",
            severity,
            self.span.start_line + 1,
            self.span.start_col + 1,
            self.message,
            self.rule_id
        )
    }
}

impl std::error::Error for ValidationError {}

// ============================================================================
// ValidationRule Trait
// ============================================================================

/// Trait that all validation rules must implement.
pub trait ValidationRule: Send + Sync {
    /// Unique identifier for this rule (e.g., "undefined-variable")
    fn id(&self) -> &'static str;

    /// Human-readable description of what this rule checks
    fn description(&self) -> &'static str;

    /// Run the rule against the linked program and its analysis.
    fn validate(&self, program: &Program, analysis: &Analysis) -> Vec<ValidationError>;
}

// ============================================================================
// Validator - Runs All Rules
// ============================================================================

/// The main validator that orchestrates all validation rules.
pub struct Validator {
    rules: Vec<Box<dyn ValidationRule>>,
}

impl Validator {
    /// Create a new validator with all built-in rules.
    pub fn new() -> Self {
        Self {
            rules: vec![
                Box::new(rules::UndefinedVariableRule),
                Box::new(rules::UnreachableCodeRule),
                Box::new(rules::DuplicateLifecycleRule),
                Box::new(rules::DuplicatePublishRule),
                Box::new(rules::QuestionableFlowRule),
                Box::new(rules::UnknownVerbRule),
            ],
        }
    }

    /// Run all validation rules and collect diagnostics, ordered by position.
    pub fn validate(&self, program: &Program, analysis: &Analysis) -> Vec<ValidationError> {
        let mut diagnostics: Vec<ValidationError> = self
            .rules
            .iter()
            .flat_map(|rule| rule.validate(program, analysis))
            .collect();
        diagnostics.sort_by(|a, b| {
            a.origin
                .cmp(&b.origin)
                .then(a.span.start.cmp(&b.span.start))
        });
        diagnostics
    }

    /// Get a list of all registered rules (useful for documentation)
    pub fn rules(&self) -> impl Iterator<Item = (&'static str, &'static str)> + '_ {
        self.rules.iter().map(|r| (r.id(), r.description()))
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Public API
// ============================================================================

/// Analyze a program and run every rule over it.
pub fn check_program(program: &Program, catalog: &RoleCatalog) -> (Analysis, Vec<ValidationError>) {
    let analysis = analyze(program, catalog);
    let diagnostics = Validator::new().validate(program, &analysis);
    (analysis, diagnostics)
}

/// Check if a program has any validation errors (not just warnings).
pub fn has_errors(program: &Program, catalog: &RoleCatalog) -> bool {
    check_program(program, catalog)
        .1
        .iter()
        .any(|e| e.is_error())
}

/// Visit every statement, depth first, in source order
pub(crate) fn visit_stmts<'a>(stmts: &'a [Stmt], f: &mut dyn FnMut(&'a Stmt)) {
    for stmt in stmts {
        f(stmt);
        for body in analyzer::nested_bodies(stmt) {
            visit_stmts(body, f);
        }
    }
}
