//! Rule: Duplicate Publish
//!
//! Publishing the same alias from two different feature sets means readers
//! see whichever ran last.

use std::collections::HashSet;

use crate::executor::types::ast::Program;

use super::super::{Analysis, ValidationError, ValidationRule};

pub struct DuplicatePublishRule;

impl ValidationRule for DuplicatePublishRule {
    fn id(&self) -> &'static str {
        "duplicate-publish"
    }

    fn description(&self) -> &'static str {
        "An alias should be published by a single feature set"
    }

    fn validate(&self, _program: &Program, analysis: &Analysis) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        for (alias, sites) in analysis.published.aliases() {
            let mut owners = HashSet::new();
            let Some(first) = sites.first() else {
                continue;
            };
            for site in sites {
                if owners.insert(site.feature_set.as_str()) && owners.len() > 1 {
                    let origin = analysis
                        .feature_set(&site.feature_set)
                        .and_then(|fs| fs.origin.as_ref());
                    errors.push(
                        ValidationError::warning(
                            site.span,
                            format!(
                                "Alias '{}' is also published by feature set '{}'",
                                alias, first.feature_set
                            ),
                            self.id(),
                        )
                        .in_file(origin),
                    );
                }
            }
        }
        errors
    }
}
