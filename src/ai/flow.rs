//! Flow pipeline: validate input, render prompt, invoke the model,
//! validate/coerce output, fall back to a static payload on any failure.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error};

use super::model::{GenerateRequest, ModelClient};

#[derive(Error, Debug)]
pub enum FlowError {
    #[error("Invalid input field '{field}': {message}")]
    InvalidInput { field: &'static str, message: String },

    #[error("Model invocation failed: {0}")]
    Model(#[from] anyhow::Error),

    #[error("Model output rejected: {0}")]
    InvalidOutput(String),
}

impl FlowError {
    pub fn invalid_input(field: &'static str, message: impl Into<String>) -> Self {
        FlowError::InvalidInput {
            field,
            message: message.into(),
        }
    }
}

/// Result of running a flow. The fallback is a regular payload, but callers
/// can still tell that the model was not used and why.
#[derive(Debug, Clone, PartialEq)]
pub enum FlowOutcome<T> {
    Generated(T),
    Fallback { value: T, reason: String },
}

impl<T> FlowOutcome<T> {
    pub fn into_inner(self) -> T {
        match self {
            FlowOutcome::Generated(value) => value,
            FlowOutcome::Fallback { value, .. } => value,
        }
    }

    pub fn value(&self) -> &T {
        match self {
            FlowOutcome::Generated(value) => value,
            FlowOutcome::Fallback { value, .. } => value,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, FlowOutcome::Fallback { .. })
    }

    /// Why the fallback was used, if it was
    pub fn fallback_reason(&self) -> Option<&str> {
        match self {
            FlowOutcome::Generated(_) => None,
            FlowOutcome::Fallback { reason, .. } => Some(reason),
        }
    }
}

/// Structural checks serde cannot express
pub trait Validate {
    fn validate(&self) -> Result<(), FlowError>;
}

/// A structured-output generation flow
pub trait Flow {
    const NAME: &'static str;

    type Input: Validate + Send + Sync;
    type Output: Serialize + DeserializeOwned + Validate;

    fn prompt(input: &Self::Input) -> String;

    fn output_schema() -> Value;

    fn fallback(input: &Self::Input) -> Self::Output;

    /// Normalize raw model output before deserializing it
    fn coerce(_raw: &mut Value) {}
}

/// Run a flow once. Never fails: any error yields the flow's fallback.
pub async fn run<F: Flow>(model: &dyn ModelClient, input: &F::Input) -> FlowOutcome<F::Output> {
    match generate::<F>(model, input).await {
        Ok(output) => {
            debug!(flow = F::NAME, "Flow produced model output");
            FlowOutcome::Generated(output)
        }
        Err(e) => {
            error!(flow = F::NAME, "Flow failed, using fallback: {}", e);
            FlowOutcome::Fallback {
                value: F::fallback(input),
                reason: e.to_string(),
            }
        }
    }
}

async fn generate<F: Flow>(model: &dyn ModelClient, input: &F::Input) -> Result<F::Output, FlowError> {
    input.validate()?;

    let request = GenerateRequest {
        flow: F::NAME,
        prompt: F::prompt(input),
        output_schema: F::output_schema(),
    };
    let mut raw = model.generate(&request).await?;

    F::coerce(&mut raw);
    let output: F::Output =
        serde_json::from_value(raw).map_err(|e| FlowError::InvalidOutput(e.to_string()))?;
    output.validate()?;
    Ok(output)
}

/// Reject empty or whitespace-only strings
pub(crate) fn require_text(field: &'static str, value: &str) -> Result<(), FlowError> {
    if value.trim().is_empty() {
        return Err(FlowError::invalid_input(field, "must not be empty"));
    }
    Ok(())
}

/// Reject NaN and infinities, which serialize as `null`
pub(crate) fn require_finite(field: &'static str, value: f64) -> Result<(), FlowError> {
    if !value.is_finite() {
        return Err(FlowError::invalid_input(field, "must be a finite number"));
    }
    Ok(())
}

/// Lowercase a string field in place, used for enum coercion
pub(crate) fn lowercase_field(object: &mut Value, field: &str) {
    if let Some(Value::String(s)) = object.get_mut(field) {
        *s = s.trim().to_lowercase();
    }
}
