pub mod builtin;
pub mod schema;

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::RwLock;

use crate::error::AppError;
use crate::services::{ResolvedDeps, ServiceContainer};
use schema::InputSchema;

pub type ActionResult = Pin<Box<dyn Future<Output = Result<Value, AppError>> + Send>>;
pub type ActionHandler = Arc<dyn Fn(Value, ResolvedDeps) -> ActionResult + Send + Sync>;

pub struct ActionDefinition {
    pub name: String,
    pub input_schema: InputSchema,
    pub dependencies: Vec<String>,
    pub handler: ActionHandler,
}

/// Name → {input schema, dependency list, handler} table, populated by
/// explicit registration at startup (no source-file scanning).
#[derive(Default)]
pub struct ActionRegistry {
    actions: RwLock<HashMap<String, Arc<ActionDefinition>>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(
        &self,
        name: impl Into<String>,
        input_schema: InputSchema,
        dependencies: Vec<String>,
        handler: ActionHandler,
    ) -> Result<(), AppError> {
        let name = name.into();
        let mut actions = self.actions.write().await;
        if actions.contains_key(&name) {
            return Err(AppError::DuplicateAction(name));
        }
        actions.insert(
            name.clone(),
            Arc::new(ActionDefinition {
                name,
                input_schema,
                dependencies,
                handler,
            }),
        );
        Ok(())
    }

    /// Extracts `action`, validates the rest of the payload, resolves
    /// declared dependencies, and invokes the handler.
    pub async fn dispatch(&self, payload: Value, container: &ServiceContainer) -> Result<Value, AppError> {
        let action_name = payload
            .get("action")
            .and_then(Value::as_str)
            .ok_or(AppError::InvalidPayload)?
            .to_string();

        let definition = {
            let actions = self.actions.read().await;
            actions
                .get(&action_name)
                .cloned()
                .ok_or_else(|| AppError::UnknownAction(action_name.clone()))?
        };

        let mut input = payload.clone();
        if let Some(obj) = input.as_object_mut() {
            obj.remove("action");
        }
        definition.input_schema.validate(&input)?;

        let mut resolved = ResolvedDeps::new();
        for dep in &definition.dependencies {
            let instance = container
                .get(dep)
                .ok_or_else(|| AppError::DependencyUnresolved(dep.clone()))?;
            resolved.insert(dep.clone(), instance);
        }

        (definition.handler)(input, resolved).await
    }
}
