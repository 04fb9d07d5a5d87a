// Jaskier Shared Pattern — schema
// Thin wrapper over a compiled JSON Schema document. Dynamic payload
// validation is achieved with this small validator interface rather than
// code-generated or type-hint-driven parsing.

use jsonschema::JSONSchema;
use serde_json::Value;

use crate::error::AppError;

pub struct InputSchema {
    compiled: JSONSchema,
}

impl InputSchema {
    pub fn compile(schema: &Value) -> Result<Self, AppError> {
        let compiled = JSONSchema::compile(schema)
            .map_err(|e| AppError::ConfigInvalid(format!("invalid input schema: {e}")))?;
        Ok(Self { compiled })
    }

    /// Validates `value` (the job payload with the `action` key already
    /// stripped). Returns a joined, field-level message on failure.
    pub fn validate(&self, value: &Value) -> Result<(), AppError> {
        self.compiled.validate(value).map_err(|errors| {
            let detail = errors
                .map(|e| format!("{}: {}", e.instance_path, e))
                .collect::<Vec<_>>()
                .join("; ");
            AppError::ValidationError(detail)
        })
    }
}
