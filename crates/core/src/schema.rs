//! Schema layer (C4): derives JSON Schema from a handler's input/output
//! types and validates values at task arrival and after handler return.

use crate::error::{OrraError, Result, ValidationIssue};
use jsonschema::Validator;
use schemars::JsonSchema;
use serde_json::Value;

/// Compiled input/output schema pair for one handler. Built once at
/// registration time; validation at task time reuses the compiled
/// [`jsonschema::Validator`]s rather than recompiling per call.
pub struct HandlerSchema {
    input_schema: Value,
    output_schema: Value,
    input_validator: Validator,
    output_validator: Validator,
}

impl HandlerSchema {
    /// Derives and compiles schemas for `I` (handler input) and `O`
    /// (handler output). Fails with `InvalidArgument` if either type's
    /// schema is not a structured (object) type; primitives alone are
    /// disallowed per the schema contract.
    pub fn for_types<I, O>() -> Result<Self>
    where
        I: JsonSchema,
        O: JsonSchema,
    {
        let input_schema = schema_value::<I>()?;
        let output_schema = schema_value::<O>()?;
        require_record_type(&input_schema, "input")?;
        require_record_type(&output_schema, "output")?;

        let input_validator = jsonschema::validator_for(&input_schema)
            .map_err(|e| OrraError::InvalidArgument(format!("invalid input schema: {e}")))?;
        let output_validator = jsonschema::validator_for(&output_schema)
            .map_err(|e| OrraError::InvalidArgument(format!("invalid output schema: {e}")))?;

        Ok(Self {
            input_schema,
            output_schema,
            input_validator,
            output_validator,
        })
    }

    /// The `{input, output}` schema pair sent to the control plane at
    /// registration time.
    pub fn registration_schema(&self) -> Value {
        serde_json::json!({
            "input": self.input_schema,
            "output": self.output_schema,
        })
    }

    /// Validates a raw task input payload. On failure, returns
    /// `InputValidationError` with one [`ValidationIssue`] per violation.
    pub fn validate_input(&self, value: &Value) -> Result<()> {
        validate(&self.input_validator, value, OrraError::InputValidationError)
    }

    /// Validates a handler's return value. On failure, returns
    /// `OutputValidationError` with one [`ValidationIssue`] per violation.
    pub fn validate_output(&self, value: &Value) -> Result<()> {
        validate(&self.output_validator, value, OrraError::OutputValidationError)
    }
}

fn schema_value<T: JsonSchema>() -> Result<Value> {
    let schema = schemars::schema_for!(T);
    serde_json::to_value(schema).map_err(OrraError::Json)
}

fn require_record_type(schema: &Value, label: &str) -> Result<()> {
    let is_object = schema
        .get("type")
        .and_then(Value::as_str)
        .map(|t| t == "object")
        .unwrap_or(false)
        || schema.get("properties").is_some();

    if is_object {
        Ok(())
    } else {
        Err(OrraError::InvalidArgument(format!(
            "handler {label} type must be a structured (record) type, not a bare primitive"
        )))
    }
}

fn validate(
    validator: &Validator,
    value: &Value,
    wrap: impl Fn(Vec<ValidationIssue>) -> OrraError,
) -> Result<()> {
    let issues: Vec<ValidationIssue> = validator
        .iter_errors(value)
        .map(|e| ValidationIssue {
            field: e.instance_path.to_string(),
            error: e.to_string(),
            kind: "schema_violation".to_string(),
        })
        .collect();

    if issues.is_empty() {
        Ok(())
    } else {
        Err(wrap(issues))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Serialize, Deserialize, JsonSchema)]
    struct EchoInput {
        message: String,
    }

    #[derive(Debug, Serialize, Deserialize, JsonSchema)]
    struct EchoOutput {
        message: String,
    }

    #[derive(Debug, Serialize, Deserialize, JsonSchema)]
    #[serde(transparent)]
    struct BarePrimitive(String);

    #[test]
    fn accepts_record_types() {
        assert!(HandlerSchema::for_types::<EchoInput, EchoOutput>().is_ok());
    }

    #[test]
    fn rejects_bare_primitive_types() {
        let result = HandlerSchema::for_types::<BarePrimitive, EchoOutput>();
        assert!(matches!(result, Err(OrraError::InvalidArgument(_))));
    }

    #[test]
    fn validates_input_payload() {
        let schema = HandlerSchema::for_types::<EchoInput, EchoOutput>().unwrap();
        assert!(schema
            .validate_input(&serde_json::json!({ "message": "hi" }))
            .is_ok());

        let err = schema
            .validate_input(&serde_json::json!({ "message": 42 }))
            .unwrap_err();
        assert!(matches!(err, OrraError::InputValidationError(_)));
    }

    #[test]
    fn validates_output_payload() {
        let schema = HandlerSchema::for_types::<EchoInput, EchoOutput>().unwrap();
        let err = schema.validate_output(&serde_json::json!({})).unwrap_err();
        assert!(matches!(err, OrraError::OutputValidationError(_)));
    }
}
