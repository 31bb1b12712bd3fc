//! JSON Schema backed structural validation for tool inputs and outputs.

use std::fmt;
use std::sync::Arc;

use jsonschema::{Draft, Validator};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Single schema violation, located by JSON pointer into the validated document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldViolation {
    /// JSON pointer to the offending value; empty for the document root.
    pub path: String,
    /// Human-readable description of the violation.
    pub message: String,
}

impl fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{}: {}", self.path, self.message)
        }
    }
}

/// Compiled JSON schema paired with its source document.
#[derive(Clone)]
pub struct JsonSchema {
    document: Value,
    validator: Arc<Validator>,
}

impl JsonSchema {
    /// Compiles the supplied schema document (draft 2020-12).
    ///
    /// # Errors
    ///
    /// Returns the compiler diagnostic when the document is not a valid schema.
    pub fn compile(document: Value) -> Result<Self, String> {
        let validator = jsonschema::options()
            .with_draft(Draft::Draft202012)
            .build(&document)
            .map_err(|err| err.to_string())?;

        Ok(Self {
            document,
            validator: Arc::new(validator),
        })
    }

    /// Returns a schema accepting any JSON value.
    ///
    /// # Panics
    ///
    /// Never panics in practice: the empty schema always compiles.
    #[must_use]
    pub fn any() -> Self {
        let document = json!({});
        match Self::compile(document) {
            Ok(schema) => schema,
            Err(reason) => unreachable!("empty schema failed to compile: {reason}"),
        }
    }

    /// Returns the raw schema document for discovery.
    #[must_use]
    pub fn document(&self) -> &Value {
        &self.document
    }

    /// Returns `true` if the value satisfies the schema.
    #[must_use]
    pub fn is_valid(&self, value: &Value) -> bool {
        self.validator.is_valid(value)
    }

    /// Validates a value, collecting every violation.
    ///
    /// # Errors
    ///
    /// Returns the list of violations when the value does not conform.
    pub fn validate(&self, value: &Value) -> Result<(), Vec<FieldViolation>> {
        if self.validator.is_valid(value) {
            return Ok(());
        }

        let violations: Vec<FieldViolation> = self
            .validator
            .iter_errors(value)
            .map(|error| FieldViolation {
                path: error.instance_path.to_string(),
                message: error.to_string(),
            })
            .collect();

        if violations.is_empty() {
            return Err(vec![FieldViolation {
                path: String::new(),
                message: "value does not match schema".into(),
            }]);
        }

        Err(violations)
    }
}

impl fmt::Debug for JsonSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonSchema")
            .field("document", &self.document)
            .finish_non_exhaustive()
    }
}
