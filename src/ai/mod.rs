//! AI flows
//!
//! Structured-output generation with a static fallback for every flow.

pub mod flow;
pub mod model;
pub mod progress_insights;
pub mod smart_notifications;
pub mod study_tips;

pub use flow::{Flow, FlowError, FlowOutcome, Validate};
pub use model::{ChatModelClient, GenerateRequest, ModelClient, ProviderConfig};
pub use progress_insights::{generate_progress_insights, ProgressInsightsInput, ProgressInsightsOutput, ProgressPoint};
pub use smart_notifications::{generate_smart_notifications, SmartNotificationsInput, SmartNotificationsOutput};
pub use study_tips::{generate_study_tips, StudyTipsInput, StudyTipsOutput};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::Value;

/// Model client used when no API key is configured; every flow falls back
pub struct UnconfiguredModel;

#[async_trait]
impl ModelClient for UnconfiguredModel {
    async fn generate(&self, _request: &GenerateRequest) -> Result<Value> {
        Err(anyhow!("No model API key configured"))
    }
}
