//! Statement execution
//!
//! The executor walks a feature set's statements in source order. Compound
//! statements recurse through boxed futures; every action goes through the
//! registry held by the context's services.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::stream::{self, StreamExt};
use futures::FutureExt;
use serde::Serialize;
use tracing::Instrument;
use uuid::Uuid;

use super::context::{ExecutionContext, Response};
use super::errors::{describe_failure, ExecutionError, FailureKind};
use super::expressions::build_regex;
use super::types::ast::{
    ActionStmt, Expr, FeatureSet, MatchCase, Pattern, Span, Stmt, VarRef,
};
use super::types::Value;
use crate::actions::{ActionError, ActionRole, DispatchError};
use crate::events::{RuntimeEvent, TransitionRequest};

/* ===================== State ===================== */

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[repr(u8)]
pub enum ExecState {
    Ready = 0,
    Running = 1,
    SuspendedOnIo = 2,
    Returned = 3,
    Thrown = 4,
}

impl ExecState {
    fn from_u8(raw: u8) -> ExecState {
        match raw {
            0 => ExecState::Ready,
            1 => ExecState::Running,
            2 => ExecState::SuspendedOnIo,
            3 => ExecState::Returned,
            _ => ExecState::Thrown,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ExecState::Returned | ExecState::Thrown)
    }
}

/// What the enclosing block should do after a statement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Next,
    /// Leave the feature set (return, throw handled as Err, when-guard)
    Exit,
}

type StmtResult = Result<Flow, ExecutionError>;

/// Everything a finished invocation produced
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionOutcome {
    pub feature_set: String,
    pub activity: String,
    pub invocation_id: Uuid,
    pub state: ExecState,
    pub response: Option<Response>,
    pub error: Option<ExecutionError>,
    /// Root-scope bindings at the end of execution
    pub bindings: BTreeMap<String, Value>,
    /// Events raised during execution, in the order they were raised
    pub events: Vec<RuntimeEvent>,
}

impl ExecutionOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn binding(&self, name: &str) -> Option<&Value> {
        self.bindings.get(name)
    }
}

/* ===================== Executor ===================== */

/// One in-flight dispatch, counted until dropped
struct PendingIo<'a>(&'a AtomicUsize);

impl<'a> PendingIo<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        if counter.fetch_add(1, Ordering::SeqCst) == 0 {
            tracing::trace!("Executor suspended on I/O");
        }
        Self(counter)
    }
}

impl Drop for PendingIo<'_> {
    fn drop(&mut self) {
        if self.0.fetch_sub(1, Ordering::SeqCst) == 1 {
            tracing::trace!("Executor resumed");
        }
    }
}

/// Runs one feature set. Shared by reference between the iterations of a
/// parallel loop, so every method takes `&self`.
pub struct FeatureSetExecutor {
    feature_set: Arc<FeatureSet>,
    state: AtomicU8,
    /// Action dispatches awaiting completion, across all parallel iterations
    pending_io: AtomicUsize,
}

impl FeatureSetExecutor {
    pub fn new(feature_set: Arc<FeatureSet>) -> Self {
        Self {
            feature_set,
            state: AtomicU8::new(ExecState::Ready as u8),
            pending_io: AtomicUsize::new(0),
        }
    }

    /// Current state. A running executor reads as `SuspendedOnIo` while any
    /// iteration of a parallel loop is still waiting on an action.
    pub fn state(&self) -> ExecState {
        match ExecState::from_u8(self.state.load(Ordering::SeqCst)) {
            ExecState::Running if self.pending_io.load(Ordering::SeqCst) > 0 => {
                ExecState::SuspendedOnIo
            }
            state => state,
        }
    }

    fn set_state(&self, next: ExecState) {
        let previous = ExecState::from_u8(self.state.swap(next as u8, Ordering::SeqCst));
        if previous != next {
            tracing::trace!(from = ?previous, to = ?next, "Executor state changed");
        }
    }

    /// Execute the feature set to completion
    pub async fn execute(&self, mut context: ExecutionContext) -> ExecutionOutcome {
        let feature_set = self.feature_set.clone();
        let span = tracing::info_span!(
            "feature_set",
            feature_set = %feature_set.name,
            activity = %feature_set.activity,
            invocation = %context.invocation_id(),
        );

        async move {
            self.set_state(ExecState::Running);
            tracing::debug!("Feature set started");

            let error = match self.block(&feature_set.body, &mut context).await {
                Ok(_) => {
                    self.set_state(ExecState::Returned);
                    tracing::debug!("Feature set returned");
                    None
                }
                Err(err) => {
                    self.set_state(ExecState::Thrown);
                    tracing::warn!(kind = ?err.kind, error = %err, "Feature set failed");
                    Some(err)
                }
            };

            ExecutionOutcome {
                feature_set: feature_set.name.clone(),
                activity: feature_set.activity.clone(),
                invocation_id: context.invocation_id(),
                state: self.state(),
                response: context.take_response(),
                error,
                bindings: context.root_bindings(),
                events: context.take_events(),
            }
        }
        .instrument(span)
        .await
    }

    fn block<'a>(
        &'a self,
        stmts: &'a [Stmt],
        ctx: &'a mut ExecutionContext,
    ) -> BoxFuture<'a, StmtResult> {
        async move {
            for stmt in stmts {
                if self.stmt(stmt, ctx).await? == Flow::Exit {
                    return Ok(Flow::Exit);
                }
            }
            Ok(Flow::Next)
        }
        .boxed()
    }

    /// A block in its own child scope
    fn scoped<'a>(
        &'a self,
        stmts: &'a [Stmt],
        ctx: &'a mut ExecutionContext,
    ) -> BoxFuture<'a, StmtResult> {
        async move {
            ctx.push_scope();
            let flow = self.block(stmts, ctx).await;
            ctx.pop_scope();
            flow
        }
        .boxed()
    }

    async fn stmt(&self, stmt: &Stmt, ctx: &mut ExecutionContext) -> StmtResult {
        match stmt {
            Stmt::Action(action) => self.action(action, ctx).await,
            Stmt::Publish {
                alias,
                variable,
                span,
            } => {
                let value = ctx.lookup(variable).ok_or_else(|| {
                    self.failure(format!("Cannot publish the {} as {}.", variable, alias), *span)
                        .with_detail(format!("'{}' is not defined", variable))
                })?;
                ctx.services()
                    .globals
                    .publish(alias, value, &self.feature_set.name);
                Ok(Flow::Next)
            }
            Stmt::Transition {
                target,
                field,
                from,
                to,
                span,
            } => {
                let message = || {
                    format!(
                        "Cannot accept the transition {}_to_{} on the {}.",
                        from, to, target
                    )
                };
                let entity = ctx.lookup(target).ok_or_else(|| {
                    self.failure(message(), *span)
                        .with_detail(format!("'{}' is not defined", target))
                })?;
                let request = TransitionRequest {
                    field: field.clone(),
                    object_name: target.clone(),
                    entity,
                    expected_from: Some(from.clone()),
                    to: to.clone(),
                };
                let services = ctx.services().clone();
                match services.transitions.apply(request, ctx) {
                    Ok(updated) => {
                        ctx.assign(target, updated);
                        Ok(Flow::Next)
                    }
                    Err(err) => Err(ExecutionError::new(
                        FailureKind::TransitionRejected,
                        message(),
                        *span,
                        &self.feature_set.name,
                    )
                    .with_detail(err.to_string())),
                }
            }
            Stmt::If {
                test,
                then_s,
                else_s,
                span,
            } => {
                if self.condition(test, *span, ctx)? {
                    self.scoped(then_s, ctx).await
                } else if let Some(else_s) = else_s {
                    self.scoped(else_s, ctx).await
                } else {
                    Ok(Flow::Next)
                }
            }
            Stmt::When { test, body, span } => {
                if !self.condition(test, *span, ctx)? {
                    return Ok(Flow::Next);
                }
                tracing::trace!("When guard satisfied, leaving after its body");
                self.scoped(body, ctx).await?;
                Ok(Flow::Exit)
            }
            Stmt::Match {
                subject,
                cases,
                otherwise,
                ..
            } => self.match_stmt(subject, cases, otherwise.as_deref(), ctx).await,
            Stmt::ForEach {
                binding,
                index,
                collection,
                filter,
                parallel,
                body,
                span,
            } => {
                let selected =
                    self.select_elements(binding, collection, filter.as_ref(), *span, ctx)?;
                let index = index.as_deref();
                if *parallel {
                    self.parallel_iterations(binding, index, selected, body, ctx)
                        .await
                } else {
                    self.sequential_iterations(binding, index, selected, body, ctx)
                        .await
                }
            }
            Stmt::ForRange {
                binding,
                from,
                to,
                body,
                span,
            } => {
                let start = self.integer(from, *span, ctx)?;
                let end = self.integer(to, *span, ctx)?;
                for i in start..=end {
                    ctx.push_scope();
                    ctx.bind(binding.clone(), Value::from(i));
                    let flow = self.block(body, ctx).await;
                    ctx.pop_scope();
                    if flow? == Flow::Exit {
                        return Ok(Flow::Exit);
                    }
                }
                Ok(Flow::Next)
            }
        }
    }

    /* ===================== Actions ===================== */

    async fn action(&self, action: &ActionStmt, ctx: &mut ExecutionContext) -> StmtResult {
        if let Some(guard) = &action.when {
            if !self.condition(guard, action.span, ctx)? {
                tracing::trace!(verb = %action.verb, "Statement skipped by its when guard");
                return Ok(Flow::Next);
            }
        }

        let registry = ctx.services().registry.clone();
        let result = {
            let _io = PendingIo::enter(&self.pending_io);
            registry.dispatch(action, ctx).await
        };

        match result {
            Ok(value) => {
                if registry
                    .role_of(&action.verb)
                    .is_some_and(ActionRole::binds_result)
                {
                    ctx.bind(action.result.base.clone(), value);
                }
                if ctx.response().is_some() {
                    return Ok(Flow::Exit);
                }
                Ok(Flow::Next)
            }
            Err(err) => Err(self.dispatch_failure(action, err, ctx)),
        }
    }

    fn dispatch_failure(
        &self,
        action: &ActionStmt,
        err: DispatchError,
        ctx: &ExecutionContext,
    ) -> ExecutionError {
        let name = &self.feature_set.name;
        match err {
            DispatchError::Action(ActionError::Thrown { category, message }) => {
                ExecutionError::new(FailureKind::Thrown { category }, message, action.span, name)
            }
            DispatchError::Action(ActionError::Transition(err)) => ExecutionError::new(
                FailureKind::TransitionRejected,
                describe_failure(action, &|n: &str| ctx.lookup(n)),
                action.span,
                name,
            )
            .with_detail(err.to_string()),
            DispatchError::Action(err) => ExecutionError::new(
                FailureKind::Statement,
                describe_failure(action, &|n: &str| ctx.lookup(n)),
                action.span,
                name,
            )
            .with_detail(err.to_string()),
            other => ExecutionError::new(FailureKind::Dispatch, other.to_string(), action.span, name),
        }
    }

    /* ===================== Match ===================== */

    async fn match_stmt(
        &self,
        subject: &VarRef,
        cases: &[MatchCase],
        otherwise: Option<&[Stmt]>,
        ctx: &mut ExecutionContext,
    ) -> StmtResult {
        let value = resolve_ref(ctx, subject);
        for case in cases {
            if !self.pattern_matches(&case.pattern, value.as_ref(), case.span, ctx)? {
                continue;
            }
            if let Some(guard) = &case.guard {
                if !self.condition(guard, case.span, ctx)? {
                    continue;
                }
            }
            tracing::trace!(subject = %subject.name, "Match case selected");
            return self.scoped(&case.body, ctx).await;
        }
        match otherwise {
            Some(body) => self.scoped(body, ctx).await,
            None => Ok(Flow::Next),
        }
    }

    fn pattern_matches(
        &self,
        pattern: &Pattern,
        value: Option<&Value>,
        span: Span,
        ctx: &ExecutionContext,
    ) -> Result<bool, ExecutionError> {
        let Some(value) = value else {
            return Ok(matches!(pattern, Pattern::Wildcard));
        };
        Ok(match pattern {
            Pattern::Wildcard => true,
            Pattern::Literal { v: literal } => *value == Value::from(literal),
            Pattern::Variable { var } => resolve_ref(ctx, var).as_ref() == Some(value),
            Pattern::Regex { pattern, flags } => {
                let regex = build_regex(pattern, flags).map_err(|err| {
                    self.failure(format!("Cannot match the /{}/ pattern.", pattern), span)
                        .with_detail(err.to_string())
                })?;
                match value {
                    Value::Str(s) => regex.is_match(s),
                    other => regex.is_match(&other.to_string()),
                }
            }
        })
    }

    /* ===================== Loops ===================== */

    /// Elements of the collection that pass the `where` filter, with their
    /// position in the source collection
    fn select_elements(
        &self,
        binding: &str,
        collection: &VarRef,
        filter: Option<&Expr>,
        span: Span,
        ctx: &mut ExecutionContext,
    ) -> Result<Vec<(usize, Value)>, ExecutionError> {
        let items = match resolve_ref(ctx, collection) {
            Some(Value::List(items)) => items,
            Some(Value::Null) => Vec::new(),
            Some(other) => {
                return Err(self
                    .failure(format!("Cannot iterate the {}.", collection.name), span)
                    .with_detail(format!("a {} is not a collection", other.type_name())))
            }
            None => {
                return Err(self
                    .failure(format!("Cannot iterate the {}.", collection.name), span)
                    .with_detail(format!("'{}' is not defined", collection.name)))
            }
        };

        let mut selected = Vec::with_capacity(items.len());
        for (index, item) in items.into_iter().enumerate() {
            if let Some(filter) = filter {
                ctx.push_scope();
                ctx.bind(binding, item.clone());
                let keep = ctx.condition_on(filter, &item);
                ctx.pop_scope();
                let keep = keep.map_err(|err| {
                    self.failure(format!("Cannot filter the {} where {}.", collection.name, filter), span)
                        .with_detail(err.to_string())
                })?;
                if !keep {
                    continue;
                }
            }
            selected.push((index, item));
        }
        tracing::trace!(collection = %collection.name, count = selected.len(), "Loop elements selected");
        Ok(selected)
    }

    async fn sequential_iterations(
        &self,
        binding: &str,
        index: Option<&str>,
        selected: Vec<(usize, Value)>,
        body: &[Stmt],
        ctx: &mut ExecutionContext,
    ) -> StmtResult {
        for (position, item) in selected {
            ctx.push_scope();
            ctx.bind(binding, item);
            if let Some(index) = index {
                ctx.bind(index, Value::from(position as i64));
            }
            let flow = self.block(body, ctx).await;
            ctx.pop_scope();
            if flow? == Flow::Exit {
                return Ok(Flow::Exit);
            }
        }
        Ok(Flow::Next)
    }

    /// Each iteration runs on a private fork; queued events are merged back
    /// in element order once all iterations are done.
    async fn parallel_iterations(
        &self,
        binding: &str,
        index: Option<&str>,
        selected: Vec<(usize, Value)>,
        body: &[Stmt],
        ctx: &mut ExecutionContext,
    ) -> StmtResult {
        let limit = ctx.services().runtime.max_parallel_iterations.max(1);
        let forks: Vec<ExecutionContext> = selected
            .into_iter()
            .map(|(position, item)| {
                let mut fork = ctx.fork();
                fork.bind(binding, item);
                if let Some(index) = index {
                    fork.bind(index, Value::from(position as i64));
                }
                fork
            })
            .collect();

        let results: Vec<(StmtResult, ExecutionContext)> = stream::iter(forks)
            .map(move |mut fork| async move {
                let flow = self.block(body, &mut fork).await;
                (flow, fork)
            })
            .buffered(limit)
            .collect()
            .await;

        let mut exit = false;
        let mut first_error = None;
        for (flow, fork) in results {
            ctx.absorb(fork);
            match flow {
                Ok(Flow::Exit) => exit = true,
                Ok(Flow::Next) => {}
                Err(err) => {
                    first_error.get_or_insert(err);
                }
            }
        }
        match first_error {
            Some(err) => Err(err),
            None if exit => Ok(Flow::Exit),
            None => Ok(Flow::Next),
        }
    }

    /* ===================== Helpers ===================== */

    fn failure(&self, message: String, span: Span) -> ExecutionError {
        ExecutionError::new(FailureKind::Statement, message, span, &self.feature_set.name)
    }

    fn condition(
        &self,
        expr: &Expr,
        span: Span,
        ctx: &ExecutionContext,
    ) -> Result<bool, ExecutionError> {
        ctx.condition(expr).map_err(|err| {
            self.failure(format!("Cannot evaluate the condition {}.", expr), span)
                .with_detail(err.to_string())
        })
    }

    fn integer(&self, expr: &Expr, span: Span, ctx: &ExecutionContext) -> Result<i64, ExecutionError> {
        match ctx.evaluate(expr) {
            Ok(Value::Num(n)) => Ok(n.round() as i64),
            Ok(other) => Err(self
                .failure(format!("Cannot count with {}.", expr), span)
                .with_detail(format!("a {} is not a number", other.type_name()))),
            Err(err) => Err(self
                .failure(format!("Cannot count with {}.", expr), span)
                .with_detail(err.to_string())),
        }
    }
}

fn resolve_ref(ctx: &ExecutionContext, var: &VarRef) -> Option<Value> {
    ctx.lookup(&var.name)
        .and_then(|value| value.get_path(&var.path).cloned())
}
