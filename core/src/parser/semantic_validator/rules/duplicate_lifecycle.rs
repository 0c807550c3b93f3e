//! Rule: Duplicate Lifecycle Handler
//!
//! An application has at most one `Application-Start`, one
//! `Application-End: Success` and one `Application-End: Error`. Within a
//! single file this is a warning; linking several files turns it into a
//! hard error.

use std::collections::HashMap;

use crate::events::TriggerPattern;
use crate::executor::types::ast::Program;

use super::super::{Analysis, ValidationError, ValidationRule};

pub struct DuplicateLifecycleRule;

impl ValidationRule for DuplicateLifecycleRule {
    fn id(&self) -> &'static str {
        "duplicate-lifecycle"
    }

    fn description(&self) -> &'static str {
        "Lifecycle feature sets must be unique"
    }

    fn validate(&self, program: &Program, analysis: &Analysis) -> Vec<ValidationError> {
        let mut seen = HashMap::new();
        let mut errors = Vec::new();
        for (fs, info) in program.feature_sets.iter().zip(&analysis.feature_sets) {
            let TriggerPattern::Lifecycle(phase) = info.trigger else {
                continue;
            };
            if let Some(first) = seen.insert(phase, fs.span) {
                errors.push(
                    ValidationError::warning(
                        fs.span,
                        format!(
                            "'{}' is already defined at line {}",
                            phase.event_name(),
                            first.start_line + 1
                        ),
                        self.id(),
                    )
                    .in_file(fs.origin.as_ref()),
                );
            }
        }
        errors
    }
}
