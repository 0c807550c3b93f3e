//! Application runtime
//!
//! Builds an [`Application`] from source files, configuration and custom
//! actions, then drives it through its lifecycle: `Application-Start`,
//! an optional keepalive period ended by the shutdown signal, and finally
//! `Application-End: Success` or `Application-End: Error`.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tokio_util::sync::CancellationToken;

use crate::actions::{Action, ActionRegistry};
use crate::config::Config;
use crate::events::{
    EventBus, HandlerReport, LifecyclePhase, RuntimeEvent, TransitionTable,
};
use crate::executor::types::Program;
use crate::parser::semantic_validator::{check_program, Severity, ValidationError};
use crate::services::Services;
use crate::sources::{link, SourceFile};

/// The running ARO application with all shared services
pub struct Application {
    config: Config,
    program: Arc<Program>,
    services: Arc<Services>,
    bus: EventBus,
    diagnostics: Vec<ValidationError>,
}

/// How a full lifecycle run ended
#[derive(Debug)]
pub struct RunSummary {
    pub start: Vec<HandlerReport>,
    pub end: Vec<HandlerReport>,
    /// The end phase that was run
    pub phase: LifecyclePhase,
}

impl RunSummary {
    pub fn is_success(&self) -> bool {
        self.phase == LifecyclePhase::EndSuccess && self.end.iter().all(HandlerReport::is_success)
    }
}

impl Application {
    pub fn builder() -> ApplicationBuilder {
        ApplicationBuilder::default()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn services(&self) -> &Arc<Services> {
        &self.services
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Warnings and hints reported while building
    pub fn diagnostics(&self) -> &[ValidationError] {
        &self.diagnostics
    }

    /// Release every `<Keepalive>` wait
    pub fn shutdown(&self) {
        tracing::info!("Shutdown requested");
        self.services.shutdown.cancel();
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.services.shutdown.clone()
    }

    /// Emit an event and wait for its direct handlers
    pub async fn emit(&self, event: RuntimeEvent) -> Vec<HandlerReport> {
        self.bus.emit(event).await.wait().await
    }

    /// Run the lifecycle once.
    ///
    /// Returns after the start handlers finish, every cascaded handler is
    /// idle, and the end handlers have run.
    pub async fn run(&self) -> Result<RunSummary> {
        let start = self.run_phase(LifecyclePhase::Start).await;
        let phase = if start.iter().all(HandlerReport::is_success) {
            LifecyclePhase::EndSuccess
        } else {
            for report in start.iter().filter(|r| !r.is_success()) {
                match &report.outcome {
                    Ok(outcome) => tracing::error!(
                        feature_set = %report.feature_set,
                        error = ?outcome.error,
                        "Application start failed"
                    ),
                    Err(failure) => tracing::error!(
                        feature_set = %report.feature_set,
                        error = %failure,
                        "Application start failed"
                    ),
                }
            }
            LifecyclePhase::EndError
        };

        let end = self.run_phase(phase).await;
        tracing::info!(phase = phase.event_name(), "Application finished");
        Ok(RunSummary { start, end, phase })
    }

    /// Run the lifecycle, shutting down on Ctrl-C
    pub async fn run_until_ctrl_c(&self) -> Result<RunSummary> {
        let token = self.shutdown_token();
        let watcher = tokio::spawn(async move {
            tokio::select! {
                signal = tokio::signal::ctrl_c() => {
                    if let Err(err) = signal {
                        tracing::warn!(error = %err, "Unable to listen for Ctrl-C");
                    }
                    token.cancel();
                }
                _ = token.cancelled() => {}
            }
        });

        let summary = self.run().await;
        watcher.abort();
        summary
    }

    async fn run_phase(&self, phase: LifecyclePhase) -> Vec<HandlerReport> {
        tracing::info!(phase = phase.event_name(), "Lifecycle phase");
        let reports = self.emit(RuntimeEvent::lifecycle(phase)).await;
        self.bus.wait_idle().await;
        reports
    }
}

/* ===================== Builder ===================== */

#[derive(Default)]
pub struct ApplicationBuilder {
    config: Option<Config>,
    sources: Vec<SourceFile>,
    actions: Vec<Arc<dyn Action>>,
    state_machines: Vec<(String, TransitionTable)>,
}

impl ApplicationBuilder {
    pub fn config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    pub fn source(mut self, name: impl Into<String>, source: impl Into<String>) -> Self {
        self.sources.push(SourceFile::new(name, source));
        self
    }

    pub fn sources(mut self, files: impl IntoIterator<Item = SourceFile>) -> Self {
        self.sources.extend(files);
        self
    }

    /// Register a custom action alongside the builtins
    pub fn action(mut self, action: impl Action + 'static) -> Self {
        self.actions.push(Arc::new(action));
        self
    }

    /// Allowed transitions for a state field, in addition to configured ones
    pub fn state_machine(mut self, field: impl Into<String>, table: TransitionTable) -> Self {
        self.state_machines.push((field.into(), table));
        self
    }

    pub async fn build(self) -> Result<Application> {
        let config = match self.config {
            Some(config) => config,
            None => Config::load().context("Failed to load configuration")?,
        };

        let mut registry =
            ActionRegistry::with_builtins().context("Failed to register builtin actions")?;
        for action in self.actions {
            registry
                .register_arc(action)
                .context("Failed to register custom action")?;
        }

        let program = link(&self.sources).context("Failed to link source files")?;
        let (_, diagnostics) = check_program(&program, &registry.catalog());
        report(&diagnostics);

        let errors = diagnostics.iter().filter(|d| d.is_error()).count();
        let warnings = diagnostics.iter().filter(|d| d.is_warning()).count();
        if errors > 0 {
            bail!("Semantic analysis found {} error(s)", errors);
        }
        if warnings > 0 && config.analysis.warnings_as_errors {
            bail!(
                "Semantic analysis found {} warning(s) and warnings are treated as errors",
                warnings
            );
        }

        let mut transitions = config
            .transition_engine()
            .context("Invalid state machine configuration")?;
        for (field, table) in self.state_machines {
            transitions.define(field, table);
        }

        let services = Arc::new(
            Services::new(registry)
                .with_transitions(transitions)
                .with_runtime(config.runtime.clone())
                .with_shutdown(CancellationToken::new()),
        );
        let bus = EventBus::new(services.clone());
        let subscribed = bus.subscribe_program(&program).await;
        tracing::info!(
            files = self.sources.len(),
            feature_sets = subscribed,
            "Application built"
        );

        Ok(Application {
            config,
            program: Arc::new(program),
            services,
            bus,
            diagnostics,
        })
    }
}

fn report(diagnostics: &[ValidationError]) {
    for diagnostic in diagnostics {
        match diagnostic.severity {
            Severity::Error => tracing::error!(rule = diagnostic.rule_id, "{}", diagnostic),
            Severity::Warning => tracing::warn!(rule = diagnostic.rule_id, "{}", diagnostic),
            Severity::Hint => tracing::debug!(rule = diagnostic.rule_id, "{}", diagnostic),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::{ActionError, ActionMetadata, ActionRole, FnAction};
    use crate::executor::types::{Preposition, Value};

    async fn build(source: &str) -> Application {
        Application::builder()
            .config(Config::default())
            .source("main.aro", source)
            .build()
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_lifecycle_success() {
        let app = build(
            r#"
            (Application-Start: Shop) {
                <Create> the <name> with "shop".
                <Publish> as <app-name> <name>.
            }
            (Application-End: Success) {
                <Create> the <done> with true.
                <Store> the <done> into the <shutdown-repository>.
            }
            (Application-End: Error) {
                <Create> the <failed> with true.
                <Store> the <failed> into the <shutdown-repository>.
            }
        "#,
        )
        .await;

        let summary = app.run().await.unwrap();
        assert!(summary.is_success());
        assert_eq!(summary.start.len(), 1);
        assert_eq!(summary.end.len(), 1);
        assert_eq!(app.services().globals.get("app-name"), Some(Value::from("shop")));
        assert_eq!(
            app.services().repositories.retrieve("shutdown-repository"),
            Some(vec![Value::Bool(true)])
        );
    }

    #[tokio::test]
    async fn test_start_failure_runs_error_handler() {
        let app = build(
            r#"
            (Application-Start: Shop) {
                <Throw> a <Misconfigured: error> with "no database".
            }
            (Application-End: Success) {
                <Create> the <ok> with "success".
                <Store> the <ok> into the <end-repository>.
            }
            (Application-End: Error) {
                <Create> the <failed> with "error".
                <Store> the <failed> into the <end-repository>.
            }
        "#,
        )
        .await;

        let summary = app.run().await.unwrap();
        assert!(!summary.is_success());
        assert_eq!(summary.phase, LifecyclePhase::EndError);
        assert_eq!(
            app.services().repositories.retrieve("end-repository"),
            Some(vec![Value::from("error")])
        );
    }

    #[tokio::test]
    async fn test_keepalive_until_shutdown() {
        let app = Arc::new(
            build(
                r#"
                (Application-Start: Server) {
                    <Keepalive> the <application> for the <events>.
                }
                (Ping: Ping Handler) {
                    <Extract> the <count> from the <event: count>.
                    <Store> the <count> into the <ping-repository>.
                }
            "#,
            )
            .await,
        );

        let running = tokio::spawn({
            let app = app.clone();
            async move { app.run().await }
        });

        let reports = app
            .emit(RuntimeEvent::domain("Ping").with("count", Value::from(1i64)))
            .await;
        assert!(reports[0].is_success());
        assert!(!running.is_finished());

        app.shutdown();
        let summary = running.await.unwrap().unwrap();
        assert!(summary.is_success());
        assert_eq!(app.services().repositories.len("ping-repository"), 1);
    }

    #[tokio::test]
    async fn test_duplicate_lifecycle_across_files_fails_build() {
        let start = "(Application-Start: Demo) { <Create> the <x> with 1. }";
        let result = Application::builder()
            .config(Config::default())
            .source("a.aro", start)
            .source("b.aro", start)
            .build()
            .await;

        let err = result.err().unwrap();
        assert!(format!("{:#}", err).contains("'Application-Start' is handled in both a.aro and b.aro"));
    }

    #[tokio::test]
    async fn test_duplicate_lifecycle_in_one_file_warns() {
        let app = build(
            r#"
            (Application-Start: First) { <Create> the <x> with 1. }
            (Application-Start: Second) { <Create> the <y> with 2. }
        "#,
        )
        .await;

        let warning = app
            .diagnostics()
            .iter()
            .find(|d| d.rule_id == "duplicate-lifecycle")
            .unwrap();
        assert!(warning.is_warning());
        assert_eq!(warning.origin.as_deref(), Some("main.aro"));
        assert_eq!(app.program().feature_sets.len(), 2);
    }

    #[tokio::test]
    async fn test_custom_action() {
        let greet = FnAction::new(
            ActionMetadata::new("Greet", ActionRole::Own, &["greet"], &[Preposition::For]),
            |_result, object, context| {
                let name = context.resolve_object(object).map_err(ActionError::from)?;
                Ok(Value::Str(format!("Hello, {}!", name)))
            },
        );
        let app = Application::builder()
            .config(Config::default())
            .action(greet)
            .source(
                "main.aro",
                r#"
                (Application-Start: Demo) {
                    <Create> the <name> with "Ada".
                    <Greet> the <message> for the <name>.
                    <Publish> as <greeting> <message>.
                }
            "#,
            )
            .build()
            .await
            .unwrap();

        assert!(app.run().await.unwrap().is_success());
        assert_eq!(
            app.services().globals.get("greeting"),
            Some(Value::from("Hello, Ada!"))
        );
    }

    #[tokio::test]
    async fn test_warnings_as_errors() {
        let source = "(Application-Start: Demo) { <Frobnicate> the <x> from the <y>. }";

        let app = build(source).await;
        assert!(app.diagnostics().iter().any(ValidationError::is_warning));

        let mut config = Config::default();
        config.analysis.warnings_as_errors = true;
        let result = Application::builder()
            .config(config)
            .source("main.aro", source)
            .build()
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_builder_state_machine() {
        let app = Application::builder()
            .config(Config::default())
            .state_machine("status", TransitionTable::new().allow("open", "closed"))
            .source(
                "main.aro",
                r#"
                (Close Ticket: Tickets) {
                    <Create> the <ticket> with { status: "open" }.
                    <Accept> the <transition: open_to_closed> on <ticket: status>.
                    <Return> an <OK: status> with <ticket>.
                }
            "#,
            )
            .build()
            .await
            .unwrap();

        let reports = app.emit(RuntimeEvent::route("Close Ticket")).await;
        let response = reports[0].outcome().unwrap().response.clone().unwrap();
        assert_eq!(response.value.get("status"), Some(&Value::from("closed")));
    }
}
