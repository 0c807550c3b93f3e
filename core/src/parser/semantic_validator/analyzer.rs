//! Data-flow analysis over a linked program
//!
//! Walks every feature set once, building its symbol tables and recording
//! what each statement reads and writes. Published aliases are collected
//! up front so a read anywhere in the program can resolve to them.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use crate::actions::{ActionRole, RoleCatalog};
use crate::events::TriggerPattern;
use crate::executor::types::ast::{
    ActionStmt, Expr, FeatureSet, Pattern, Program, SourceKind, Span, Stmt,
};

use super::symbols::{PublishedAliases, PublishedSymbol, Symbol, SymbolOrigin, SymbolTable};

/// Names bound in every feature set before the first statement runs
pub const IMPLICIT_PARAMETERS: &[&str] = &["event", "request", "context"];

/// Export verbs whose result descriptor names the variable being exported
const RESULT_READ_VERBS: &[&str] = &["store", "save", "persist"];

/// What one statement consumes and produces
#[derive(Debug, Clone, PartialEq)]
pub struct StatementFlow {
    pub span: Span,
    pub kind: &'static str,
    pub verb: Option<String>,
    pub role: Option<ActionRole>,
    pub inputs: BTreeSet<String>,
    pub outputs: BTreeSet<String>,
}

/// A read that resolves to nothing
#[derive(Debug, Clone, PartialEq)]
pub struct UnresolvedRead {
    pub name: String,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct FeatureSetAnalysis {
    pub name: String,
    pub activity: String,
    pub origin: Option<String>,
    pub trigger: TriggerPattern,
    /// Root scope of the feature set
    pub symbols: Arc<SymbolTable>,
    pub flows: Vec<StatementFlow>,
    pub unresolved: Vec<UnresolvedRead>,
}

/// Publisher feature set -> consumer feature set, through an alias
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct DependencyEdge {
    pub alias: String,
    pub publisher: String,
    pub consumer: String,
}

#[derive(Debug, Clone)]
pub struct Analysis {
    pub feature_sets: Vec<FeatureSetAnalysis>,
    pub published: PublishedAliases,
    pub dependencies: Vec<DependencyEdge>,
    pub catalog: RoleCatalog,
}

impl Analysis {
    pub fn feature_set(&self, name: &str) -> Option<&FeatureSetAnalysis> {
        self.feature_sets.iter().find(|fs| fs.name == name)
    }

    /// Feature sets that read something `publisher` publishes
    pub fn consumers_of(&self, publisher: &str) -> Vec<&str> {
        self.dependencies
            .iter()
            .filter(|e| e.publisher == publisher)
            .map(|e| e.consumer.as_str())
            .collect()
    }
}

/// Analyze a linked program
pub fn analyze(program: &Program, catalog: &RoleCatalog) -> Analysis {
    let mut published = PublishedAliases::default();
    for fs in &program.feature_sets {
        collect_publishes(&fs.body, &fs.name, &mut published);
    }

    let mut dependencies = BTreeSet::new();
    let feature_sets = program
        .feature_sets
        .iter()
        .map(|fs| {
            let walker = Walker {
                catalog,
                published: &published,
                feature_set: &fs.name,
                flows: Vec::new(),
                unresolved: Vec::new(),
                dependencies: &mut dependencies,
            };
            walker.feature_set(fs)
        })
        .collect();

    Analysis {
        feature_sets,
        published,
        dependencies: dependencies.into_iter().collect(),
        catalog: catalog.clone(),
    }
}

fn collect_publishes(stmts: &[Stmt], feature_set: &str, out: &mut PublishedAliases) {
    for stmt in stmts {
        match stmt {
            Stmt::Publish {
                alias,
                variable,
                span,
            } => out.record(PublishedSymbol {
                alias: alias.clone(),
                variable: variable.clone(),
                feature_set: feature_set.to_string(),
                span: *span,
            }),
            other => {
                for body in nested_bodies(other) {
                    collect_publishes(body, feature_set, out);
                }
            }
        }
    }
}

/// Statement lists nested inside a compound statement
pub fn nested_bodies(stmt: &Stmt) -> Vec<&[Stmt]> {
    match stmt {
        Stmt::If { then_s, else_s, .. } => {
            let mut bodies = vec![then_s.as_slice()];
            if let Some(else_s) = else_s {
                bodies.push(else_s.as_slice());
            }
            bodies
        }
        Stmt::When { body, .. } | Stmt::ForEach { body, .. } | Stmt::ForRange { body, .. } => {
            vec![body.as_slice()]
        }
        Stmt::Match {
            cases, otherwise, ..
        } => {
            let mut bodies: Vec<&[Stmt]> = cases.iter().map(|c| c.body.as_slice()).collect();
            if let Some(otherwise) = otherwise {
                bodies.push(otherwise.as_slice());
            }
            bodies
        }
        Stmt::Action(_) | Stmt::Publish { .. } | Stmt::Transition { .. } => Vec::new(),
    }
}

struct Walker<'a> {
    catalog: &'a RoleCatalog,
    published: &'a PublishedAliases,
    feature_set: &'a str,
    flows: Vec<StatementFlow>,
    unresolved: Vec<UnresolvedRead>,
    dependencies: &'a mut BTreeSet<DependencyEdge>,
}

impl<'a> Walker<'a> {
    fn feature_set(mut self, fs: &FeatureSet) -> FeatureSetAnalysis {
        let trigger = TriggerPattern::derive(&fs.name, &fs.activity);
        let mut root = SymbolTable::new();
        for name in IMPLICIT_PARAMETERS {
            root.define(Symbol::new(*name, fs.span, SymbolOrigin::Parameter));
        }
        if matches!(trigger, TriggerPattern::StateObserver { .. }) {
            root.define(Symbol::new("transition", fs.span, SymbolOrigin::Parameter));
        }

        self.block(&fs.body, &mut root);

        FeatureSetAnalysis {
            name: fs.name.clone(),
            activity: fs.activity.clone(),
            origin: fs.origin.clone(),
            trigger,
            symbols: Arc::new(root),
            flows: self.flows,
            unresolved: self.unresolved,
        }
    }

    fn block(&mut self, stmts: &[Stmt], scope: &mut SymbolTable) {
        for stmt in stmts {
            self.stmt(stmt, scope);
        }
    }

    /// Run `f` in a child scope of the current one
    fn nested(&mut self, scope: &SymbolTable, f: impl FnOnce(&mut Self, &mut SymbolTable)) {
        let mut child = SymbolTable::child_of(Arc::new(scope.clone()));
        f(self, &mut child);
    }

    fn resolve(&mut self, name: &str, span: Span, scope: &SymbolTable) {
        if scope.lookup(name).is_some() {
            return;
        }
        if self.published.contains(name) {
            for publisher in self.published.publishers(name) {
                if publisher.feature_set != self.feature_set {
                    self.dependencies.insert(DependencyEdge {
                        alias: name.to_string(),
                        publisher: publisher.feature_set.clone(),
                        consumer: self.feature_set.to_string(),
                    });
                }
            }
            return;
        }
        self.unresolved.push(UnresolvedRead {
            name: name.to_string(),
            span,
        });
    }

    fn read_expr(&mut self, expr: &Expr, scope: &SymbolTable, inputs: &mut BTreeSet<String>) {
        let mut vars = Vec::new();
        expr.variables(&mut vars);
        for (name, span) in vars {
            self.resolve(&name, span, scope);
            inputs.insert(name);
        }
    }

    fn flow(&mut self, stmt: &Stmt, inputs: BTreeSet<String>, outputs: BTreeSet<String>) {
        let (verb, role) = match stmt {
            Stmt::Action(action) => (
                Some(action.verb.clone()),
                self.catalog.role_of(&action.verb),
            ),
            Stmt::Publish { .. } => (Some("Publish".to_string()), Some(ActionRole::Export)),
            Stmt::Transition { .. } => (Some("Accept".to_string()), Some(ActionRole::Own)),
            _ => (None, None),
        };
        self.flows.push(StatementFlow {
            span: stmt.span(),
            kind: stmt.kind_name(),
            verb,
            role,
            inputs,
            outputs,
        });
    }

    fn stmt(&mut self, stmt: &Stmt, scope: &mut SymbolTable) {
        let mut inputs = BTreeSet::new();
        let mut outputs = BTreeSet::new();
        match stmt {
            Stmt::Action(action) => {
                self.action(action, scope, &mut inputs, &mut outputs);
                self.flow(stmt, inputs, outputs);
            }
            Stmt::Publish {
                variable, span, ..
            } => {
                self.resolve(variable, *span, scope);
                scope.publish(variable);
                inputs.insert(variable.clone());
                self.flow(stmt, inputs, outputs);
            }
            Stmt::Transition { target, span, .. } => {
                self.resolve(target, *span, scope);
                inputs.insert(target.clone());
                outputs.insert(target.clone());
                if scope.lookup(target).is_none() {
                    scope.define(Symbol::new(target.clone(), *span, SymbolOrigin::Computed));
                }
                self.flow(stmt, inputs, outputs);
            }
            Stmt::If {
                test,
                then_s,
                else_s,
                ..
            } => {
                self.read_expr(test, scope, &mut inputs);
                self.flow(stmt, inputs, outputs);
                self.nested(scope, |w, child| w.block(then_s, child));
                if let Some(else_s) = else_s {
                    self.nested(scope, |w, child| w.block(else_s, child));
                }
            }
            Stmt::When { test, body, .. } => {
                self.read_expr(test, scope, &mut inputs);
                self.flow(stmt, inputs, outputs);
                self.nested(scope, |w, child| w.block(body, child));
            }
            Stmt::Match {
                subject,
                cases,
                otherwise,
                ..
            } => {
                self.resolve(&subject.name, subject.span, scope);
                inputs.insert(subject.name.clone());
                for case in cases {
                    if let Pattern::Variable { var } = &case.pattern {
                        self.resolve(&var.name, var.span, scope);
                        inputs.insert(var.name.clone());
                    }
                    if let Some(guard) = &case.guard {
                        self.read_expr(guard, scope, &mut inputs);
                    }
                }
                self.flow(stmt, inputs, outputs);
                for case in cases {
                    self.nested(scope, |w, child| w.block(&case.body, child));
                }
                if let Some(otherwise) = otherwise {
                    self.nested(scope, |w, child| w.block(otherwise, child));
                }
            }
            Stmt::ForEach {
                binding,
                index,
                collection,
                filter,
                body,
                span,
                ..
            } => {
                self.resolve(&collection.name, collection.span, scope);
                inputs.insert(collection.name.clone());
                let mut child = SymbolTable::child_of(Arc::new(scope.clone()));
                child.define(Symbol::new(binding.clone(), *span, SymbolOrigin::Parameter));
                if let Some(index) = index {
                    child.define(Symbol::new(index.clone(), *span, SymbolOrigin::Parameter));
                }
                if let Some(filter) = filter {
                    self.read_expr(filter, &child, &mut inputs);
                }
                inputs.remove(binding);
                self.flow(stmt, inputs, outputs);
                self.block(body, &mut child);
            }
            Stmt::ForRange {
                binding,
                from,
                to,
                body,
                span,
            } => {
                self.read_expr(from, scope, &mut inputs);
                self.read_expr(to, scope, &mut inputs);
                self.flow(stmt, inputs, outputs);
                let mut child = SymbolTable::child_of(Arc::new(scope.clone()));
                child.define(Symbol::new(binding.clone(), *span, SymbolOrigin::Parameter));
                self.block(body, &mut child);
            }
        }
    }

    fn action(
        &mut self,
        action: &ActionStmt,
        scope: &mut SymbolTable,
        inputs: &mut BTreeSet<String>,
        outputs: &mut BTreeSet<String>,
    ) {
        let object = &action.object;
        if matches!(
            object.kind,
            SourceKind::Variable | SourceKind::Event | SourceKind::Request
        ) && !object.base.is_empty()
        {
            self.resolve(&object.base, object.span, scope);
            inputs.insert(object.base.clone());
        }
        for expr in [
            object.value.as_ref(),
            object.condition.as_ref(),
            object.argument.as_ref(),
            action.when.as_ref(),
        ]
        .into_iter()
        .flatten()
        {
            self.read_expr(expr, scope, inputs);
        }

        let verb = action.verb.to_ascii_lowercase();
        if RESULT_READ_VERBS.contains(&verb.as_str()) {
            self.resolve(&action.result.base, action.result.span, scope);
            inputs.insert(action.result.base.clone());
        }

        // Unknown verbs bind their result so one typo does not cascade
        let role = self.catalog.role_of(&verb);
        if role.map(ActionRole::binds_result).unwrap_or(true) {
            let origin = match role {
                Some(ActionRole::Request) => SymbolOrigin::Extracted,
                _ if object.kind == SourceKind::Literal => SymbolOrigin::Literal,
                _ => SymbolOrigin::Computed,
            };
            scope.define(Symbol::new(
                action.result.base.clone(),
                action.result.span,
                origin,
            ));
            outputs.insert(action.result.base.clone());
        }
    }
}

/// Every name read anywhere in the program (used by flow checks)
pub fn all_inputs(analysis: &Analysis) -> HashSet<&str> {
    analysis
        .feature_sets
        .iter()
        .flat_map(|fs| fs.flows.iter())
        .flat_map(|flow| flow.inputs.iter().map(String::as_str))
        .collect()
}
