//! Arithmetic tool.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use super::{Tool, ToolDeclaration};
use crate::domain::ToolError;

pub const TOOL_TYPE: &str = "calculator";

#[derive(Debug, Deserialize)]
struct CalculatorArgs {
    operation: String,
    a: f64,
    b: f64,
}

/// Adds or multiplies two numbers.
#[derive(Debug, Clone)]
pub struct Calculator {
    name: String,
}

impl Calculator {
    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Default for Calculator {
    fn default() -> Self {
        Self::named(TOOL_TYPE)
    }
}

#[async_trait]
impl Tool for Calculator {
    fn declaration(&self) -> ToolDeclaration {
        ToolDeclaration {
            name: self.name.clone(),
            description: "Perform basic arithmetic operations. Use this tool for each step of a calculation."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "operation": {
                        "type": "string",
                        "description": "The operation to perform. Allowed values: 'add', 'multiply'."
                    },
                    "a": {"type": "number", "description": "The first number."},
                    "b": {"type": "number", "description": "The second number."}
                },
                "required": ["operation", "a", "b"]
            }),
        }
    }

    async fn call(&self, arguments: Value) -> Result<Value, ToolError> {
        let args: CalculatorArgs = serde_json::from_value(arguments)
            .map_err(|e| ToolError::InvalidArguments(e.to_string()))?;
        debug!(operation = %args.operation, a = args.a, b = args.b, "calculator call");

        let result = match args.operation.as_str() {
            "add" => args.a + args.b,
            "multiply" => args.a * args.b,
            other => {
                return Err(ToolError::Failed(format!(
                    "unsupported operation: {other}. Only 'add' and 'multiply' are supported."
                )))
            }
        };

        Ok(json!({"result": result, "status": "success"}))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_add_and_multiply() {
        let calc = Calculator::default();
        let out = calc
            .call(json!({"operation": "add", "a": 2, "b": 3}))
            .await
            .unwrap();
        assert_eq!(out["result"], 5.0);
        assert_eq!(out["status"], "success");

        let out = calc
            .call(json!({"operation": "multiply", "a": 4, "b": 2.5}))
            .await
            .unwrap();
        assert_eq!(out["result"], 10.0);
    }

    #[tokio::test]
    async fn test_unsupported_operation_message() {
        let err = Calculator::default()
            .call(json!({"operation": "divide", "a": 1, "b": 2}))
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "unsupported operation: divide. Only 'add' and 'multiply' are supported."
        );
    }

    #[tokio::test]
    async fn test_missing_arguments_rejected() {
        let err = Calculator::default()
            .call(json!({"operation": "add"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }
}
