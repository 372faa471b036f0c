//! Business handler contract and registry

use crate::auth::{CampaignId, Identity};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use uuid::Uuid;

/// What a handler knows about the authorized call
#[derive(Debug, Clone)]
pub struct HandlerContext {
    pub call_id: Uuid,
    pub operation: String,
    /// Caller identity; `None` for public operations
    pub identity: Option<Identity>,
    pub target: Option<CampaignId>,
}

/// Execution failure of an authorized operation
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct HandlerError {
    pub message: String,
}

impl HandlerError {
    pub fn new<S: Into<String>>(message: S) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Campaign business logic behind one operation
#[async_trait]
pub trait OperationHandler: Send + Sync {
    async fn handle(&self, context: HandlerContext, arguments: Value) -> Result<Value, HandlerError>;
}

/// Adapter turning an async closure into an [`OperationHandler`]
pub struct FnHandler<F>(F);

/// Wrap an async closure as a handler
pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(HandlerContext, Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, HandlerError>> + Send + 'static,
{
    FnHandler(f)
}

#[async_trait]
impl<F, Fut> OperationHandler for FnHandler<F>
where
    F: Fn(HandlerContext, Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, HandlerError>> + Send + 'static,
{
    async fn handle(&self, context: HandlerContext, arguments: Value) -> Result<Value, HandlerError> {
        (self.0)(context, arguments).await
    }
}

/// Operation name -> handler, fixed once built
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn OperationHandler>>,
}

impl HandlerRegistry {
    pub fn builder() -> HandlerRegistryBuilder {
        HandlerRegistryBuilder::default()
    }

    pub fn get(&self, operation: &str) -> Option<Arc<dyn OperationHandler>> {
        self.handlers.get(operation).cloned()
    }

    pub fn contains(&self, operation: &str) -> bool {
        self.handlers.contains_key(operation)
    }

    /// Registered operation names, sorted
    pub fn operations(&self) -> Vec<&str> {
        let mut operations: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        operations.sort_unstable();
        operations
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("operations", &self.operations())
            .finish()
    }
}

#[derive(Default)]
pub struct HandlerRegistryBuilder {
    handlers: HashMap<String, Arc<dyn OperationHandler>>,
}

impl HandlerRegistryBuilder {
    /// Register a handler; a later registration for the same operation replaces the earlier one
    pub fn register<H>(mut self, operation: &str, handler: H) -> Self
    where
        H: OperationHandler + 'static,
    {
        self.handlers.insert(operation.to_string(), Arc::new(handler));
        self
    }

    pub fn register_arc(mut self, operation: &str, handler: Arc<dyn OperationHandler>) -> Self {
        self.handlers.insert(operation.to_string(), handler);
        self
    }

    pub fn build(self) -> HandlerRegistry {
        HandlerRegistry {
            handlers: self.handlers,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_closure_handler() {
        let registry = HandlerRegistry::builder()
            .register(
                "version",
                handler_fn(|_, _| async { Ok(json!({"version": "1.0"})) }),
            )
            .register(
                "launch_campaign",
                handler_fn(|context: HandlerContext, _| async move {
                    Err(HandlerError::new(format!(
                        "no sender configured for {:?}",
                        context.target
                    )))
                }),
            )
            .build();

        assert_eq!(registry.operations(), vec!["launch_campaign", "version"]);

        let context = HandlerContext {
            call_id: Uuid::new_v4(),
            operation: "version".to_string(),
            identity: None,
            target: None,
        };
        let handler = registry.get("version").unwrap();
        assert_eq!(
            handler.handle(context.clone(), Value::Null).await.unwrap(),
            json!({"version": "1.0"})
        );

        let failing = registry.get("launch_campaign").unwrap();
        assert!(failing.handle(context, Value::Null).await.is_err());
        assert!(registry.get("delete_campaign").is_none());
    }
}
