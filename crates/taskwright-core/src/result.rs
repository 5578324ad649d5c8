use serde::{Deserialize, Serialize};
use taskwright_model::Usage;

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentOutcome {
    /// The model ended its turn, or stopped for a reason other than tool use.
    Completed,
    /// The iteration cap was hit while the model still wanted tools.
    MaxIterationsReached,
    TimedOut,
    Cancelled,
    /// The model call itself failed.
    Failed,
}

impl AgentOutcome {
    pub fn is_success(self) -> bool {
        matches!(self, Self::Completed | Self::MaxIterationsReached)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskMetadata {
    /// Names of the tools executed, in invocation order.
    pub tools_used: Vec<String>,
    pub iterations: u32,
    pub duration_ms: u64,
    /// Summed over every model call of the run.
    pub token_usage: Usage,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentTaskResult {
    pub success: bool,
    pub outcome: AgentOutcome,
    /// Text accumulated from every assistant turn.
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub metadata: TaskMetadata,
}

impl AgentTaskResult {
    pub(crate) fn new(
        outcome: AgentOutcome,
        text: String,
        error: Option<String>,
        metadata: TaskMetadata,
    ) -> Self {
        Self { success: outcome.is_success(), outcome, text, error, metadata }
    }
}
