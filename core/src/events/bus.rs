//! Event bus
//!
//! Routes each emitted event to every subscribed feature set whose trigger
//! pattern matches it. Every handler runs as its own tokio task, so one
//! slow or failing handler never holds up the others. Events raised by a
//! handler are emitted once that handler finishes, whether it succeeded or
//! not.

use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use thiserror::Error;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;

use super::{EventKind, RuntimeEvent, TriggerPattern};
use crate::executor::types::{FeatureSet, Program};
use crate::executor::{ExecutionContext, ExecutionOutcome, FeatureSetExecutor};
use crate::services::Services;

/// Payload members of a route event that are also bound on their own
const REQUEST_PARTS: &[&str] = &["pathParameters", "queryParameters", "headers", "body"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandlerFailure {
    #[error("handler timed out after {0:?}")]
    TimedOut(Duration),

    #[error("handler panicked: {0}")]
    Panicked(String),
}

/// How one handler invocation ended
#[derive(Debug)]
pub struct HandlerReport {
    pub feature_set: String,
    pub outcome: Result<ExecutionOutcome, HandlerFailure>,
}

impl HandlerReport {
    pub fn is_success(&self) -> bool {
        matches!(&self.outcome, Ok(outcome) if outcome.is_success())
    }

    pub fn outcome(&self) -> Option<&ExecutionOutcome> {
        self.outcome.as_ref().ok()
    }
}

/// Handle on the handlers started by one `emit`
pub struct Dispatch {
    handles: Vec<(String, JoinHandle<HandlerReport>)>,
}

impl Dispatch {
    pub fn handler_count(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Wait for every handler; reports come back in subscription order
    pub async fn wait(self) -> Vec<HandlerReport> {
        let mut reports = Vec::with_capacity(self.handles.len());
        for (feature_set, handle) in self.handles {
            let report = match handle.await {
                Ok(report) => report,
                Err(err) => {
                    tracing::error!(feature_set = %feature_set, error = %err, "Handler task failed");
                    HandlerReport {
                        feature_set,
                        outcome: Err(HandlerFailure::Panicked(err.to_string())),
                    }
                }
            };
            reports.push(report);
        }
        reports
    }
}

struct Subscription {
    pattern: TriggerPattern,
    feature_set: Arc<FeatureSet>,
}

struct BusInner {
    subscriptions: RwLock<Vec<Subscription>>,
    services: Arc<Services>,
    /// Number of handlers started and not yet finished
    in_flight: watch::Sender<usize>,
    handler_timeout: Option<Duration>,
}

/// Counts a handler as in flight until dropped
struct InFlightGuard(Arc<BusInner>);

impl InFlightGuard {
    fn enter(inner: Arc<BusInner>) -> Self {
        inner.in_flight.send_modify(|n| *n += 1);
        Self(inner)
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.in_flight.send_modify(|n| *n = n.saturating_sub(1));
    }
}

#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    pub fn new(services: Arc<Services>) -> Self {
        let timeout = services.runtime.handler_timeout();
        Self::with_handler_timeout(services, timeout)
    }

    /// A bus with an explicit per-handler time limit
    pub fn with_handler_timeout(services: Arc<Services>, handler_timeout: Option<Duration>) -> Self {
        let (in_flight, _) = watch::channel(0);
        Self {
            inner: Arc::new(BusInner {
                subscriptions: RwLock::new(Vec::new()),
                services,
                in_flight,
                handler_timeout,
            }),
        }
    }

    pub fn services(&self) -> &Arc<Services> {
        &self.inner.services
    }

    /// Subscribe a feature set under the pattern derived from its header
    pub async fn subscribe(&self, feature_set: Arc<FeatureSet>) -> TriggerPattern {
        let pattern = TriggerPattern::derive(&feature_set.name, &feature_set.activity);
        tracing::debug!(
            feature_set = %feature_set.name,
            pattern = ?pattern,
            "Feature set subscribed"
        );
        self.inner.subscriptions.write().await.push(Subscription {
            pattern: pattern.clone(),
            feature_set,
        });
        pattern
    }

    /// Subscribe every feature set of a program
    pub async fn subscribe_program(&self, program: &Program) -> usize {
        for feature_set in &program.feature_sets {
            self.subscribe(Arc::new(feature_set.clone())).await;
        }
        program.feature_sets.len()
    }

    pub async fn subscription_count(&self) -> usize {
        self.inner.subscriptions.read().await.len()
    }

    /// Feature sets whose trigger pattern matches the event
    pub async fn handlers_for(&self, event: &RuntimeEvent) -> Vec<Arc<FeatureSet>> {
        self.inner
            .subscriptions
            .read()
            .await
            .iter()
            .filter(|s| s.pattern.matches(event))
            .map(|s| s.feature_set.clone())
            .collect()
    }

    /// Start every matching handler. Handlers run whether or not the
    /// returned [`Dispatch`] is awaited.
    pub async fn emit(&self, event: RuntimeEvent) -> Dispatch {
        let handlers = self.handlers_for(&event).await;
        tracing::debug!(
            kind = ?event.kind,
            name = %event.name,
            handlers = handlers.len(),
            "Event emitted"
        );

        let mut handles = Vec::with_capacity(handlers.len());
        for feature_set in handlers {
            let guard = InFlightGuard::enter(self.inner.clone());
            let name = feature_set.name.clone();
            let task = run_handler(self.clone(), feature_set, event.clone());
            let handle = tokio::spawn(async move {
                let _guard = guard;
                task.await
            });
            handles.push((name, handle));
        }
        Dispatch { handles }
    }

    /// Run one named feature set with the event, bypassing pattern matching
    pub async fn invoke(&self, feature_set: &str, event: RuntimeEvent) -> Option<HandlerReport> {
        let target = self
            .inner
            .subscriptions
            .read()
            .await
            .iter()
            .find(|s| s.feature_set.name == feature_set)
            .map(|s| s.feature_set.clone())?;
        let _guard = InFlightGuard::enter(self.inner.clone());
        Some(run_handler(self.clone(), target, event).await)
    }

    pub fn in_flight(&self) -> usize {
        *self.inner.in_flight.borrow()
    }

    /// Wait until no handler is running, including handlers started by
    /// events that other handlers raised
    pub async fn wait_idle(&self) {
        let mut receiver = self.inner.in_flight.subscribe();
        if let Err(err) = receiver.wait_for(|n| *n == 0).await {
            tracing::debug!(error = %err, "In-flight counter closed while waiting for idle");
        };
    }
}

/// Execute a handler and forward the events it raised.
///
/// Returns a boxed future: handlers emit, and emitting spawns handlers.
fn run_handler(
    bus: EventBus,
    feature_set: Arc<FeatureSet>,
    event: RuntimeEvent,
) -> BoxFuture<'static, HandlerReport> {
    async move {
        let name = feature_set.name.clone();
        let mut context = ExecutionContext::new(
            bus.inner.services.clone(),
            &feature_set.name,
            &feature_set.activity,
        );
        bind_event(&mut context, &event);

        let executor = FeatureSetExecutor::new(feature_set);
        let outcome = match bus.inner.handler_timeout {
            Some(limit) => match tokio::time::timeout(limit, executor.execute(context)).await {
                Ok(outcome) => Ok(outcome),
                Err(_) => {
                    tracing::warn!(feature_set = %name, timeout = ?limit, "Handler timed out");
                    Err(HandlerFailure::TimedOut(limit))
                }
            },
            None => Ok(executor.execute(context).await),
        };

        if let Ok(outcome) = &outcome {
            for raised in outcome.events.iter().cloned() {
                bus.emit(raised).await;
            }
        }

        HandlerReport {
            feature_set: name,
            outcome,
        }
    }
    .boxed()
}

/// Bind the implicit parameters an event provides
fn bind_event(context: &mut ExecutionContext, event: &RuntimeEvent) {
    let payload = event.payload_value();
    match event.kind {
        EventKind::Route => {
            for part in REQUEST_PARTS {
                if let Some(value) = event.payload.get(*part) {
                    context.bind(*part, value.clone());
                }
            }
            context.bind("request", payload.clone());
        }
        EventKind::Transition => context.bind("transition", payload.clone()),
        _ => {}
    }
    context.bind("event", payload);
}
