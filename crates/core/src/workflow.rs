//! Workflow phase and tool-set context.

use serde::{Deserialize, Serialize};

/// The phase of the analysis workflow a conversation belongs to.
///
/// Each phase exposes a different tool set, and the model regularly reaches
/// for tools of the other phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStep {
    /// Think-and-prep: explore data and plan
    #[default]
    Preparation,
    /// Analyst: build metrics and dashboards
    Execution,
}

const PREPARATION_TOOLS: &[&str] = &[
    "sequentialThinking",
    "executeSql",
    "respondWithoutAnalysis",
    "submitThoughts",
    "messageUserClarifyingQuestion",
];

const EXECUTION_TOOLS: &[&str] = &[
    "createMetrics",
    "modifyMetrics",
    "createDashboards",
    "modifyDashboards",
    "doneTool",
];

impl WorkflowStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Preparation => "preparation",
            Self::Execution => "execution",
        }
    }

    /// The tools this phase registers by default.
    pub fn default_tools(&self) -> &'static [&'static str] {
        match self {
            Self::Preparation => PREPARATION_TOOLS,
            Self::Execution => EXECUTION_TOOLS,
        }
    }

    /// The phase the workflow moves into after this one.
    pub fn next(&self) -> Option<WorkflowStep> {
        match self {
            Self::Preparation => Some(Self::Execution),
            Self::Execution => None,
        }
    }
}

impl std::fmt::Display for WorkflowStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for WorkflowStep {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "preparation" | "think-and-prep" => Ok(Self::Preparation),
            "execution" | "analyst" => Ok(Self::Execution),
            other => Err(format!("unknown workflow step: {other}")),
        }
    }
}

/// What the caller can tell the classifier about where it is.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowContext {
    pub current_step: WorkflowStep,
    /// Tools registered for the current step, in registration order, no duplicates.
    #[serde(default)]
    pub available_tools: Vec<String>,
}

impl WorkflowContext {
    pub fn new<I, S>(current_step: WorkflowStep, available_tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut tools: Vec<String> = Vec::new();
        for tool in available_tools {
            let tool = tool.into();
            if !tools.contains(&tool) {
                tools.push(tool);
            }
        }
        Self {
            current_step,
            available_tools: tools,
        }
    }

    /// Context populated with the phase's default tool set.
    pub fn for_step(current_step: WorkflowStep) -> Self {
        Self::new(current_step, current_step.default_tools().iter().copied())
    }

    /// Tools of the phase the workflow transitions into next, if any.
    pub fn next_step_tools(&self) -> Option<(WorkflowStep, &'static [&'static str])> {
        self.current_step
            .next()
            .map(|next| (next, next.default_tools()))
    }
}
