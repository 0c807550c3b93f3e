//! Rule: Undefined Variable
//!
//! Reports a warning when a feature set reads a name that is neither bound
//! earlier in its scope chain, an implicit parameter, nor published anywhere
//! in the program.
//!
//! ```aro
//! (Greet: Demo) {
//!     (* Warning: 'name' is never defined *)
//!     <Log> the <greeting> to the <console> with <name>.
//! }
//! ```

use crate::executor::types::ast::Program;

use super::super::{Analysis, ValidationError, ValidationRule};

pub struct UndefinedVariableRule;

impl ValidationRule for UndefinedVariableRule {
    fn id(&self) -> &'static str {
        "undefined-variable"
    }

    fn description(&self) -> &'static str {
        "Variables must be bound or published before they are read"
    }

    fn validate(&self, _program: &Program, analysis: &Analysis) -> Vec<ValidationError> {
        analysis
            .feature_sets
            .iter()
            .flat_map(|fs| {
                fs.unresolved.iter().map(move |read| {
                    ValidationError::warning(
                        read.span,
                        format!(
                            "'{}' is not defined in feature set '{}'",
                            read.name, fs.name
                        ),
                        self.id(),
                    )
                    .in_file(fs.origin.as_ref())
                })
            })
            .collect()
    }
}
