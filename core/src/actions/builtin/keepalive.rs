use async_trait::async_trait;

use crate::actions::{Action, ActionError, ActionMetadata, ActionRole};
use crate::executor::context::ExecutionContext;
use crate::executor::types::{ObjectDescriptor, Preposition, ResultDescriptor, Value};

/// `<Keepalive> the <application> for the <events>.`
///
/// Parks the feature set until the application's shutdown signal fires.
pub struct Keepalive;

#[async_trait]
impl Action for Keepalive {
    fn metadata(&self) -> ActionMetadata {
        ActionMetadata::new(
            "Keepalive",
            ActionRole::Own,
            &["keepalive", "wait"],
            &[Preposition::For],
        )
    }

    async fn execute(
        &self,
        _result: &ResultDescriptor,
        _object: &ObjectDescriptor,
        context: &mut ExecutionContext,
    ) -> Result<Value, ActionError> {
        let shutdown = context.services().shutdown.clone();
        if !shutdown.is_cancelled() {
            tracing::info!("Waiting for shutdown");
            shutdown.cancelled().await;
        }
        tracing::debug!("Shutdown received, keepalive released");
        Ok(Value::Null)
    }
}
