//! Classifier prompt construction
//!
//! Renders conditions, recent turns, coach notes, and the recurrence signal
//! into a system + user prompt pair. Building never fails: missing inputs
//! just produce a shorter prompt.

use serde::{Deserialize, Serialize};

use crate::conditions::{ConditionSet, EscalationCondition};
use crate::escalation::RiskTier;
use crate::state::{ConversationMessage, DEFAULT_HISTORY_WINDOW_DAYS};

/// Incidents within the window at or above which the pattern alert is added.
pub const RECURRENCE_ALERT_THRESHOLD: usize = 3;

/// Prior turns rendered into the prompt.
pub const MAX_RECENT_MESSAGES: usize = 5;

/// Example phrases rendered per condition.
pub const MAX_EXAMPLE_PHRASES: usize = 3;

/// Directive appended to the user segment for recurring concerns.
pub const PATTERN_ALERT: &str = "PATTERN ALERT — consider elevating to ElevatedRisk";

/// Guidance used when no conditions are configured.
pub const FALLBACK_GUIDANCE: &str =
    "No specific escalation conditions are configured; use clinical judgment.";

/// A rendered classifier prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifierPrompt {
    pub system: String,
    pub user: String,
}

/// Builder for classifier prompts
pub struct PromptBuilder<'a> {
    message: &'a str,
    conditions: Option<&'a ConditionSet>,
    recent_messages: &'a [ConversationMessage],
    mental_notes: &'a [String],
    incident_count: usize,
    alert_threshold: usize,
    window_days: u32,
    max_message_chars: Option<usize>,
}

impl<'a> PromptBuilder<'a> {
    /// Create a builder for the message being classified
    pub fn new(message: &'a str) -> Self {
        Self {
            message,
            conditions: None,
            recent_messages: &[],
            mental_notes: &[],
            incident_count: 0,
            alert_threshold: RECURRENCE_ALERT_THRESHOLD,
            window_days: DEFAULT_HISTORY_WINDOW_DAYS,
            max_message_chars: None,
        }
    }

    pub fn with_conditions(mut self, conditions: &'a ConditionSet) -> Self {
        self.conditions = Some(conditions);
        self
    }

    /// Prior turns, oldest first. Only the last five are rendered.
    pub fn with_recent_messages(mut self, messages: &'a [ConversationMessage]) -> Self {
        self.recent_messages = messages;
        self
    }

    pub fn with_mental_notes(mut self, notes: &'a [String]) -> Self {
        self.mental_notes = notes;
        self
    }

    /// Number of incidents in the recurrence window.
    pub fn with_incident_count(mut self, count: usize) -> Self {
        self.incident_count = count;
        self
    }

    /// Incident count at which the pattern alert is added.
    pub fn alert_threshold(mut self, threshold: usize) -> Self {
        self.alert_threshold = threshold;
        self
    }

    /// Length of the recurrence window the incident count covers.
    pub fn window_days(mut self, days: u32) -> Self {
        self.window_days = days;
        self
    }

    /// Truncate each rendered message to this many characters.
    pub fn max_message_chars(mut self, limit: usize) -> Self {
        self.max_message_chars = Some(limit);
        self
    }

    /// Build the system + user prompt pair
    pub fn build(&self) -> ClassifierPrompt {
        ClassifierPrompt {
            system: self.build_system(),
            user: self.build_user(),
        }
    }

    fn build_system(&self) -> String {
        let mut prompt = String::new();

        prompt.push_str(
            "You are a safety classifier for a mental-performance coaching assistant used by athletes.\n\
             Assess the user's latest message for risk to their wellbeing and assign exactly one tier.\n\n",
        );

        prompt.push_str("## Tiers\n\n");
        for tier in [
            RiskTier::None,
            RiskTier::MonitorOnly,
            RiskTier::ElevatedRisk,
            RiskTier::CriticalRisk,
        ] {
            prompt.push_str(&format!("- {} ({}): {}\n", tier.level(), tier, tier.guidance()));
        }
        prompt.push('\n');

        prompt.push_str("## Escalation Conditions\n\n");
        match self.conditions.filter(|c| !c.is_empty()) {
            Some(conditions) => {
                for (tier, group) in conditions.groups() {
                    prompt.push_str(&format!("### {}\n\n", tier.heading()));
                    for condition in group {
                        render_condition(&mut prompt, condition);
                    }
                }
            }
            None => {
                prompt.push_str(FALLBACK_GUIDANCE);
                prompt.push_str("\n\n");
            }
        }

        prompt.push_str("## Output\n\n");
        prompt.push_str(
            "Respond with ONLY a flat JSON object, no markdown, with these keys:\n\
             - \"tier\": integer 0-3\n\
             - \"category\": short slug for the concern (use \"general\" if none)\n\
             - \"reason\": one sentence explaining the tier\n\
             - \"confidence\": number between 0.0 and 1.0\n\
             - \"shouldEscalate\": boolean, true if a human should review this conversation\n\
             - \"suggestedResponse\": optional string, ONLY for tier 3, a brief supportive message pointing to crisis resources\n",
        );

        prompt
    }

    fn build_user(&self) -> String {
        let mut prompt = String::new();

        if !self.mental_notes.is_empty() {
            prompt.push_str("## Coach Notes\n\n");
            for note in self.mental_notes {
                prompt.push_str(&format!("- {}\n", note.trim()));
            }
            prompt.push('\n');
        }

        let start = self.recent_messages.len().saturating_sub(MAX_RECENT_MESSAGES);
        let recent = &self.recent_messages[start..];
        if !recent.is_empty() {
            prompt.push_str("## Recent Conversation\n\n");
            for message in recent {
                prompt.push_str(&format!("{}: {}\n", message.role, self.clip(&message.content)));
            }
            prompt.push('\n');
        }

        if self.incident_count > 0 {
            prompt.push_str(&format!(
                "## History\n\nThis user has {} escalation incident(s) in the last {} days.\n\n",
                self.incident_count, self.window_days
            ));
        }

        prompt.push_str("## Message To Classify\n\n");
        prompt.push_str(&self.clip(self.message));
        prompt.push_str("\n\n");

        if self.incident_count >= self.alert_threshold {
            prompt.push_str(PATTERN_ALERT);
            prompt.push_str(&format!(
                ": this user has repeated concerns in the last {} days. \
                 If the message is ambiguous, prefer tier 2 over tier 1.\n\n",
                self.window_days
            ));
        }

        prompt.push_str("Classify the message above. Respond with the JSON object only.\n");
        prompt
    }

    fn clip(&self, text: &str) -> String {
        match self.max_message_chars {
            Some(limit) if text.chars().count() > limit => {
                let clipped: String = text.chars().take(limit).collect();
                format!("{clipped}…")
            }
            _ => text.to_string(),
        }
    }
}

fn render_condition(prompt: &mut String, condition: &EscalationCondition) {
    prompt.push_str(&format!(
        "**{}** [{}]\n{}\n",
        condition.title, condition.category, condition.description
    ));
    let examples: Vec<&str> = condition
        .example_phrases
        .iter()
        .take(MAX_EXAMPLE_PHRASES)
        .map(String::as_str)
        .collect();
    if !examples.is_empty() {
        prompt.push_str(&format!("Examples: \"{}\"\n", examples.join("\", \"")));
    }
    if !condition.keywords.is_empty() {
        let keywords: Vec<&str> = condition.keywords.iter().map(String::as_str).collect();
        prompt.push_str(&format!("Keywords: {}\n", keywords.join(", ")));
    }
    prompt.push('\n');
}

/// Build a prompt from all inputs in one call.
pub fn build_prompt(
    conditions: &ConditionSet,
    recent_messages: &[ConversationMessage],
    mental_notes: &[String],
    incident_count: usize,
    message: &str,
) -> ClassifierPrompt {
    PromptBuilder::new(message)
        .with_conditions(conditions)
        .with_recent_messages(recent_messages)
        .with_mental_notes(mental_notes)
        .with_incident_count(incident_count)
        .build()
}
