//! Insights over a student's monthly progress in a subject

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::flow::{self, require_finite, require_text, Flow, FlowError, FlowOutcome, Validate};
use super::model::ModelClient;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProgressPoint {
    pub month: String,
    pub progress: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProgressInsightsInput {
    pub subject: String,
    pub progress_data: Vec<ProgressPoint>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProgressInsightsOutput {
    /// Markdown analysis
    pub insights: String,
}

impl Validate for ProgressInsightsInput {
    fn validate(&self) -> Result<(), FlowError> {
        require_text("subject", &self.subject)?;
        for point in &self.progress_data {
            require_text("progressData.month", &point.month)?;
            require_finite("progressData.progress", point.progress)?;
        }
        Ok(())
    }
}

impl Validate for ProgressInsightsOutput {
    fn validate(&self) -> Result<(), FlowError> {
        if self.insights.trim().is_empty() {
            return Err(FlowError::InvalidOutput("insights is empty".to_string()));
        }
        Ok(())
    }
}

pub struct ProgressInsightsFlow;

impl Flow for ProgressInsightsFlow {
    const NAME: &'static str = "progress_insights";

    type Input = ProgressInsightsInput;
    type Output = ProgressInsightsOutput;

    fn prompt(input: &ProgressInsightsInput) -> String {
        let data = input
            .progress_data
            .iter()
            .map(|p| format!("- **{}**: {}%", p.month, p.progress))
            .collect::<Vec<_>>()
            .join("\n");

        format!(
            "You are an encouraging and insightful academic advisor. Analyze the following progress data for the subject '{}'.\n\n\
             Your task is to provide a brief, actionable analysis of the student's performance. \
             The tone should be positive and constructive.\n\n\
             - Highlight strengths, such as significant improvements or consistent high performance. \
             For example: \"Great job on the consistent progress in May and June!\"\n\
             - Gently point out areas for focus if you see a dip in performance. \
             For example: \"It looks like there was a small dip in March; perhaps reviewing that month's topics would be helpful.\"\n\
             - Keep the overall analysis concise (2-3 sentences).\n\n\
             Here is the student's data:\n{}\n\n\
             Generate the analysis now.",
            input.subject.trim(),
            data
        )
    }

    fn output_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "insights": {
                    "type": "string",
                    "description": "AI-generated analysis of the student's progress, formatted as Markdown."
                }
            },
            "required": ["insights"]
        })
    }

    fn fallback(input: &ProgressInsightsInput) -> ProgressInsightsOutput {
        ProgressInsightsOutput {
            insights: summarize(input),
        }
    }
}

/// Deterministic two to three sentence summary of the data
fn summarize(input: &ProgressInsightsInput) -> String {
    let subject = input.subject.trim();
    let points: Vec<&ProgressPoint> = input
        .progress_data
        .iter()
        .filter(|p| p.progress.is_finite())
        .collect();

    let Some(best) = points
        .iter()
        .copied()
        .reduce(|best, p| if p.progress > best.progress { p } else { best })
    else {
        return format!(
            "There isn't enough progress data for {} yet. Keep logging your monthly progress and check back for insights.",
            subject
        );
    };

    let average = points.iter().map(|p| p.progress).sum::<f64>() / points.len() as f64;
    let latest_dip = points
        .windows(2)
        .rev()
        .find(|pair| pair[1].progress < pair[0].progress)
        .map(|pair| pair[1]);

    let mut summary = format!(
        "Great job reaching {}% in {}, your strongest month in {} so far!",
        best.progress, best.month, subject
    );
    match latest_dip {
        Some(dip) => summary.push_str(&format!(
            " It looks like there was a small dip in {}; perhaps reviewing that month's topics would be helpful.",
            dip.month
        )),
        None => summary.push_str(&format!(
            " Your progress has been steady, averaging {:.0}% across {} month{}.",
            average,
            points.len(),
            if points.len() == 1 { "" } else { "s" }
        )),
    }
    summary.push_str(" Keep up the consistent effort!");
    summary
}

pub async fn generate_progress_insights(
    model: &dyn ModelClient,
    input: &ProgressInsightsInput,
) -> FlowOutcome<ProgressInsightsOutput> {
    flow::run::<ProgressInsightsFlow>(model, input).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::model::MockModelClient;
    use anyhow::anyhow;

    fn input(data: &[(&str, f64)]) -> ProgressInsightsInput {
        ProgressInsightsInput {
            subject: "Mathematics".to_string(),
            progress_data: data
                .iter()
                .map(|(month, progress)| ProgressPoint {
                    month: month.to_string(),
                    progress: *progress,
                })
                .collect(),
        }
    }

    #[test]
    fn test_prompt_renders_each_month() {
        let prompt = ProgressInsightsFlow::prompt(&input(&[("Jan", 65.0), ("Feb", 72.5)]));
        assert!(prompt.contains("for the subject 'Mathematics'"));
        assert!(prompt.contains("- **Jan**: 65%\n- **Feb**: 72.5%"));
    }

    #[test]
    fn test_summary_mentions_best_month_and_latest_dip() {
        let summary = summarize(&input(&[("Jan", 60.0), ("Feb", 55.0), ("Mar", 80.0), ("Apr", 70.0)]));
        assert!(summary.contains("80% in Mar"));
        assert!(summary.contains("small dip in Apr"));
        assert!(!summary.contains("dip in Feb"));
    }

    #[test]
    fn test_summary_for_steady_progress() {
        let summary = summarize(&input(&[("Jan", 60.0), ("Feb", 70.0), ("Mar", 80.0)]));
        assert!(summary.contains("averaging 70% across 3 months"));
    }

    #[test]
    fn test_summary_without_data() {
        let summary = summarize(&input(&[]));
        assert!(summary.starts_with("There isn't enough progress data for Mathematics yet."));
    }

    #[tokio::test]
    async fn test_model_failure_returns_summary_fallback() {
        let mut model = MockModelClient::new();
        model.expect_generate().returning(|_| Err(anyhow!("rate limited")));

        let data = input(&[("May", 90.0), ("Jun", 92.0)]);
        let outcome = generate_progress_insights(&model, &data).await;
        assert!(outcome.is_fallback());
        assert_eq!(outcome.into_inner().insights, summarize(&data));
    }

    #[tokio::test]
    async fn test_generated_insights() {
        let mut model = MockModelClient::new();
        model
            .expect_generate()
            .returning(|_| Ok(json!({"insights": "Great job on the consistent progress in May and June!"})));

        let outcome = generate_progress_insights(&model, &input(&[("May", 90.0), ("Jun", 92.0)])).await;
        assert!(!outcome.is_fallback());
        assert!(outcome.value().insights.contains("May and June"));
    }

    #[tokio::test]
    async fn test_non_finite_progress_is_rejected_before_model() {
        let mut model = MockModelClient::new();
        model.expect_generate().times(0);

        let outcome = generate_progress_insights(&model, &input(&[("Jan", f64::NAN)])).await;
        assert!(outcome.is_fallback());
    }
}
