//! Personalized study notifications
//!
//! Turns recent activity, deadlines and performance metrics into a handful
//! of notifications plus a reminder schedule.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;

use super::flow::{self, lowercase_field, require_finite, Flow, FlowError, FlowOutcome, Validate};
use super::model::ModelClient;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NotificationType {
    Reminder,
    Encouragement,
    Warning,
    Celebration,
    Suggestion,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecentActivity {
    /// Kind of activity (study, exam, quiz, ...)
    pub action: String,
    pub subject: String,
    pub timestamp: String,
    /// Minutes
    pub duration: f64,
    /// Score 0-100
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub performance: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Deadline {
    pub title: String,
    pub subject: String,
    pub due_date: String,
    pub priority: Priority,
    pub completed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceMetrics {
    pub overall_grade: f64,
    pub subject_scores: BTreeMap<String, f64>,
    /// Days of continuous learning
    pub learning_streak: f64,
    pub struggling_subjects: Vec<String>,
    pub improving_subjects: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SmartNotificationsInput {
    pub student_activity: Vec<RecentActivity>,
    pub upcoming_deadlines: Vec<Deadline>,
    pub performance_data: PerformanceMetrics,
    /// Current time, ISO 8601
    pub time_of_day: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_streak: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub title: String,
    pub message: String,
    pub priority: Priority,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_button: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_time: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReminderSchedule {
    pub daily_reminder: bool,
    /// HH:MM
    pub reminder_time: String,
    pub weekly_goal_check: bool,
    pub exam_alerts: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SmartNotificationsOutput {
    pub notifications: Vec<Notification>,
    pub urgency_level: Priority,
    pub personalized_message: String,
    pub action_items: Vec<String>,
    pub reminder_schedule: ReminderSchedule,
}

impl Validate for SmartNotificationsInput {
    fn validate(&self) -> Result<(), FlowError> {
        for activity in &self.student_activity {
            require_finite("studentActivity.duration", activity.duration)?;
            if activity.duration < 0.0 {
                return Err(FlowError::invalid_input("studentActivity.duration", "must not be negative"));
            }
            if let Some(score) = activity.performance {
                require_percentage("studentActivity.performance", score)?;
            }
        }
        require_percentage("performanceData.overallGrade", self.performance_data.overall_grade)?;
        for score in self.performance_data.subject_scores.values() {
            require_finite("performanceData.subjectScores", *score)?;
        }
        require_finite("performanceData.learningStreak", self.performance_data.learning_streak)?;
        if let Some(streak) = self.current_streak {
            require_finite("currentStreak", streak)?;
        }
        Ok(())
    }
}

fn require_percentage(field: &'static str, value: f64) -> Result<(), FlowError> {
    require_finite(field, value)?;
    if !(0.0..=100.0).contains(&value) {
        return Err(FlowError::invalid_input(field, "must be between 0 and 100"));
    }
    Ok(())
}

impl Validate for SmartNotificationsOutput {
    fn validate(&self) -> Result<(), FlowError> {
        for notification in &self.notifications {
            if notification.title.trim().is_empty() || notification.message.trim().is_empty() {
                return Err(FlowError::InvalidOutput(format!(
                    "notification '{}' has no title or message",
                    notification.id
                )));
            }
        }
        if !is_clock_time(&self.reminder_schedule.reminder_time) {
            return Err(FlowError::InvalidOutput(format!(
                "reminderTime '{}' is not HH:MM",
                self.reminder_schedule.reminder_time
            )));
        }
        Ok(())
    }
}

fn is_clock_time(s: &str) -> bool {
    let Some((hours, minutes)) = s.split_once(':') else {
        return false;
    };
    let parse = |part: &str, max: u32| {
        part.len() == 2 && part.parse::<u32>().map(|n| n <= max).unwrap_or(false)
    };
    parse(hours, 23) && parse(minutes, 59)
}

pub struct SmartNotificationsFlow;

impl Flow for SmartNotificationsFlow {
    const NAME: &'static str = "smart_notifications";

    type Input = SmartNotificationsInput;
    type Output = SmartNotificationsOutput;

    fn prompt(input: &SmartNotificationsInput) -> String {
        let mut lines = vec!["**Student Context:**".to_string(), "- **Recent Activity:**".to_string()];
        for a in &input.student_activity {
            let mut line = format!("  - {} in {} on {} ({} min)", a.action, a.subject, a.timestamp, a.duration);
            if let Some(score) = a.performance.filter(|s| *s != 0.0) {
                line.push_str(&format!(" - Score: {}%", score));
            }
            lines.push(line);
        }

        lines.push(String::new());
        lines.push("- **Upcoming Deadlines:**".to_string());
        for d in &input.upcoming_deadlines {
            let mut line = format!(
                "  - {} ({}) - Due: {} - Priority: {}",
                d.title,
                d.subject,
                d.due_date,
                d.priority.as_str()
            );
            if d.completed {
                line.push_str(" ✓");
            }
            lines.push(line);
        }

        let perf = &input.performance_data;
        lines.push(String::new());
        lines.push("- **Performance Overview:**".to_string());
        lines.push(format!("  - Overall Grade: {}%", perf.overall_grade));
        lines.push(format!("  - Learning Streak: {} days", perf.learning_streak));
        lines.push(format!("  - Struggling Subjects: {}", perf.struggling_subjects.join(", ")));
        lines.push(format!("  - Improving Subjects: {}", perf.improving_subjects.join(", ")));

        lines.push(String::new());
        lines.push(format!("- **Current Time:** {}", input.time_of_day));
        if let Some(streak) = input.current_streak.filter(|s| *s != 0.0) {
            lines.push(format!("- **Learning Streak:** {} days", streak));
        }

        let mut context = lines.join("\n");
        context.push('\n');

        format!(
            "You are an AI learning assistant that generates personalized, timely notifications to help students \
             stay engaged and motivated in their learning journey.\n\n\
             {}\n\
             **Instructions:**\n\
             1. **Generate 3-5 personalized notifications** based on the student's context\n\
             2. **Vary notification types:** Include reminders, encouragement, warnings, celebrations, and suggestions\n\
             3. **Consider timing:** Factor in the time of day and upcoming deadlines\n\
             4. **Be motivational:** Use positive, encouraging language while being helpful\n\
             5. **Include actionable items:** Provide specific next steps the student can take\n\
             6. **Personalize messages:** Reference specific subjects, performance, and activities\n\n\
             **Notification Guidelines:**\n\
             - **Reminders:** For upcoming deadlines, missed study sessions, or routine check-ins\n\
             - **Encouragement:** For maintaining streaks, good performance, or when struggling\n\
             - **Warnings:** For at-risk performance, missed deadlines, or concerning patterns\n\
             - **Celebrations:** For achievements, improvements, or milestones\n\
             - **Suggestions:** For study strategies, resource recommendations, or new opportunities\n\n\
             **Tone:** Supportive, encouraging, and motivational while being informative and actionable.\n\n\
             Generate comprehensive notification recommendations now.",
            context
        )
    }

    fn output_schema() -> Value {
        let priority = json!({"type": "string", "enum": ["low", "medium", "high"]});
        json!({
            "type": "object",
            "properties": {
                "notifications": {
                    "type": "array",
                    "description": "Array of personalized notifications",
                    "items": {
                        "type": "object",
                        "properties": {
                            "id": {"type": "string", "description": "Unique identifier for the notification"},
                            "type": {
                                "type": "string",
                                "enum": ["reminder", "encouragement", "warning", "celebration", "suggestion"]
                            },
                            "title": {"type": "string"},
                            "message": {"type": "string"},
                            "priority": priority,
                            "actionButton": {"type": "string", "description": "Text for action button"},
                            "actionUrl": {"type": "string", "description": "URL for action button"},
                            "icon": {"type": "string", "description": "Icon name for the notification"},
                            "scheduledTime": {"type": "string", "description": "When to show the notification"}
                        },
                        "required": ["id", "type", "title", "message", "priority"]
                    }
                },
                "urgencyLevel": priority,
                "personalizedMessage": {"type": "string", "description": "Personal message for the student"},
                "actionItems": {"type": "array", "items": {"type": "string"}},
                "reminderSchedule": {
                    "type": "object",
                    "properties": {
                        "dailyReminder": {"type": "boolean"},
                        "reminderTime": {"type": "string", "description": "Preferred time for reminders (HH:MM format)"},
                        "weeklyGoalCheck": {"type": "boolean"},
                        "examAlerts": {"type": "boolean"}
                    },
                    "required": ["dailyReminder", "reminderTime", "weeklyGoalCheck", "examAlerts"]
                }
            },
            "required": ["notifications", "urgencyLevel", "personalizedMessage", "actionItems", "reminderSchedule"]
        })
    }

    fn fallback(_input: &SmartNotificationsInput) -> SmartNotificationsOutput {
        SmartNotificationsOutput {
            notifications: vec![Notification {
                id: "fallback-1".to_string(),
                kind: NotificationType::Reminder,
                title: "Study Session Reminder".to_string(),
                message: "It's time for your daily study session. Keep up the great work!".to_string(),
                priority: Priority::Medium,
                action_button: Some("Start Studying".to_string()),
                action_url: Some("/subjects/my-subjects".to_string()),
                icon: Some("BookOpen".to_string()),
                scheduled_time: None,
            }],
            urgency_level: Priority::Medium,
            personalized_message: "Keep up the excellent work! Your dedication to learning is inspiring.".to_string(),
            action_items: vec![
                "Review today's lessons".to_string(),
                "Complete pending assignments".to_string(),
                "Take a practice quiz".to_string(),
            ],
            reminder_schedule: ReminderSchedule {
                daily_reminder: true,
                reminder_time: "19:00".to_string(),
                weekly_goal_check: true,
                exam_alerts: true,
            },
        }
    }

    /// Models often capitalize enum values or omit notification ids
    fn coerce(raw: &mut Value) {
        lowercase_field(raw, "urgencyLevel");
        if let Some(Value::Array(notifications)) = raw.get_mut("notifications") {
            for (i, notification) in notifications.iter_mut().enumerate() {
                lowercase_field(notification, "type");
                lowercase_field(notification, "priority");
                if let Value::Object(map) = notification {
                    let missing_id = map
                        .get("id")
                        .and_then(|id| id.as_str())
                        .map(|id| id.trim().is_empty())
                        .unwrap_or(true);
                    if missing_id {
                        map.insert("id".to_string(), Value::String(format!("notification-{}", i + 1)));
                    }
                }
            }
        }
    }
}

pub async fn generate_smart_notifications(
    model: &dyn ModelClient,
    input: &SmartNotificationsInput,
) -> FlowOutcome<SmartNotificationsOutput> {
    flow::run::<SmartNotificationsFlow>(model, input).await
}
