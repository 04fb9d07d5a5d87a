// Jaskier Shared Pattern — builtin actions
// Explicit registration stands in for decorator-based auto-discovery: the
// engine only ever consumes a populated `ActionRegistry`.

use std::sync::Arc;

use serde_json::{json, Value};

use super::schema::InputSchema;
use super::{ActionHandler, ActionRegistry};
use crate::error::AppError;

pub async fn register_builtin_actions(registry: &ActionRegistry) -> Result<(), AppError> {
    let greet_schema = InputSchema::compile(&json!({
        "type": "object",
        "properties": { "name": { "type": "string", "minLength": 1 } },
        "required": ["name"]
    }))?;

    let greet: ActionHandler = Arc::new(|input, _deps| {
        Box::pin(async move {
            let name = input
                .get("name")
                .and_then(Value::as_str)
                .ok_or(AppError::InvalidPayload)?;
            Ok(json!({ "message": format!("Hello, {name}!") }))
        })
    });

    registry.register("greet", greet_schema, vec![], greet).await
}
