use serde::{Deserialize, Serialize};

/// What the interviewer is told about the interview, frozen into the system
/// instruction once a session starts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterviewPlan {
    /// Asked in this order
    pub questions: Vec<String>,
    pub job_description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resume_summary: Option<String>,
}

impl InterviewPlan {
    pub fn new(questions: Vec<String>, job_description: impl Into<String>) -> Self {
        Self {
            questions,
            job_description: job_description.into(),
            resume_summary: None,
        }
    }

    pub fn with_resume_summary(mut self, summary: impl Into<String>) -> Self {
        self.resume_summary = Some(summary.into());
        self
    }
}
