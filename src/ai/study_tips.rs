//! Study tips for a subject

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::flow::{self, require_text, Flow, FlowError, FlowOutcome, Validate};
use super::model::ModelClient;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StudyTipsInput {
    pub subject: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StudyTipsOutput {
    /// Markdown list of tips
    pub tips: String,
}

impl Validate for StudyTipsInput {
    fn validate(&self) -> Result<(), FlowError> {
        require_text("subject", &self.subject)
    }
}

impl Validate for StudyTipsOutput {
    fn validate(&self) -> Result<(), FlowError> {
        if self.tips.trim().is_empty() {
            return Err(FlowError::InvalidOutput("tips is empty".to_string()));
        }
        Ok(())
    }
}

pub struct StudyTipsFlow;

impl Flow for StudyTipsFlow {
    const NAME: &'static str = "study_tips";

    type Input = StudyTipsInput;
    type Output = StudyTipsOutput;

    fn prompt(input: &StudyTipsInput) -> String {
        format!(
            "You are an expert academic advisor. A student is looking for advice on how to succeed in their {} class.\n\n\
             Please provide a list of 5-7 concise, actionable study tips to help them excel in this subject. \
             The tips should be practical and easy to follow.\n\n\
             Format the output as a Markdown list.",
            input.subject.trim()
        )
    }

    fn output_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "tips": {
                    "type": "string",
                    "description": "A list of actionable study tips for the given subject, formatted as a Markdown list."
                }
            },
            "required": ["tips"]
        })
    }

    fn fallback(input: &StudyTipsInput) -> StudyTipsOutput {
        StudyTipsOutput {
            tips: format!(
                "## Study Tips for {}\n\n\
                 - Review material regularly, don't cram\n\
                 - Practice problems daily\n\
                 - Ask questions when confused\n\
                 - Form study groups\n\
                 - Use multiple learning resources\n\
                 - Take breaks to avoid burnout\n\
                 - Connect concepts to real-world examples",
                input.subject
            ),
        }
    }
}

pub async fn generate_study_tips(model: &dyn ModelClient, input: &StudyTipsInput) -> FlowOutcome<StudyTipsOutput> {
    flow::run::<StudyTipsFlow>(model, input).await
}
