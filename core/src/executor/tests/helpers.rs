//! Test helpers for executor tests
//!
//! Common utilities for parsing feature sets and running them

use std::sync::Arc;

use crate::actions::ActionRegistry;
use crate::executor::types::FeatureSet;
use crate::executor::{ExecutionContext, ExecutionOutcome, FeatureSetExecutor};
use crate::parser::parse;
use crate::parser::semantic_validator::check_program;
use crate::services::Services;

pub fn services() -> Arc<Services> {
    Arc::new(Services::new(ActionRegistry::with_builtins().unwrap()))
}

/// Parse a single feature set and assert analysis reports no errors
pub fn parse_feature_set(source: &str) -> Arc<FeatureSet> {
    let program = parse(source).expect("Parse failed");
    let (_, diagnostics) = check_program(&program, &ActionRegistry::with_builtins().unwrap().catalog());
    let errors: Vec<_> = diagnostics.iter().filter(|d| d.is_error()).collect();
    assert!(errors.is_empty(), "Analysis failed: {:?}", errors);
    Arc::new(program.feature_sets[0].clone())
}

/// Run the first feature set of `source` against shared services
pub async fn run_with(services: Arc<Services>, source: &str) -> ExecutionOutcome {
    let feature_set = parse_feature_set(source);
    let context = ExecutionContext::new(services, &feature_set.name, &feature_set.activity);
    FeatureSetExecutor::new(feature_set).execute(context).await
}

pub async fn run(source: &str) -> ExecutionOutcome {
    run_with(services(), source).await
}
