//! Interview question generation for the setup flow.
//!
//! The live session never calls into this module; the caller decides what to
//! do with a failure, usually by offering [`fallback_questions`].

use crate::error::RecoveryAction;
use askama::Template;
use llm::{ChatModel, ChatRequest, ProviderError};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

const FALLBACK_QUESTIONS: [&str; 10] = [
    "Can you tell me about yourself and your background?",
    "What interests you about this specific role?",
    "Tell me about a challenging technical project you've worked on recently.",
    "How do you stay updated with the latest trends in your field?",
    "Describe a situation where you had to work with a difficult team member.",
    "What are your greatest professional strengths?",
    "Where do you see yourself in five years?",
    "How do you prioritize your work when you have multiple competing deadlines?",
    "Tell me about a time you failed and what you learned from it.",
    "Do you have any questions for me?",
];

/// The static question list offered when generation fails.
pub fn fallback_questions() -> Vec<String> {
    FALLBACK_QUESTIONS.iter().map(|q| q.to_string()).collect()
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QuestionError {
    #[error("{0} is empty")]
    MissingInput(&'static str),
    #[error("the question service is rate limiting requests: {0}")]
    RateLimited(String),
    #[error("the model returned an unusable question list: {0}")]
    MalformedResponse(String),
    #[error("question request failed: {0}")]
    TransportError(String),
}

impl QuestionError {
    pub fn user_message(&self) -> &'static str {
        match self {
            QuestionError::MissingInput(_) => "Please provide both a resume and a job description.",
            QuestionError::RateLimited(_) => {
                "API rate limit reached. Try again in a minute or continue with the default questions."
            }
            QuestionError::MalformedResponse(_) => {
                "The generated questions could not be read. Try again or use the default questions."
            }
            QuestionError::TransportError(_) => {
                "Could not reach the question service. Check your connection and try again."
            }
        }
    }

    pub fn recovery(&self) -> RecoveryAction {
        match self {
            QuestionError::MissingInput(_) => RecoveryAction::Dismiss,
            QuestionError::RateLimited(_) | QuestionError::MalformedResponse(_) => {
                RecoveryAction::UseFallback
            }
            QuestionError::TransportError(_) => RecoveryAction::Retry,
        }
    }
}

impl From<anyhow::Error> for QuestionError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast_ref::<ProviderError>() {
            Some(ProviderError::RateLimited { message, .. }) => {
                QuestionError::RateLimited(message.clone())
            }
            Some(ProviderError::Decode(message)) => {
                QuestionError::MalformedResponse(message.clone())
            }
            Some(ProviderError::EmptyResponse) => {
                QuestionError::MalformedResponse("no candidates in response".to_string())
            }
            Some(other) => QuestionError::TransportError(other.to_string()),
            None => QuestionError::TransportError(err.to_string()),
        }
    }
}

#[derive(Template)]
#[template(path = "question_prompt.txt")]
struct QuestionPrompt<'a> {
    resume: &'a str,
    job_description: &'a str,
    count: usize,
}

fn render_prompt(resume: &str, job_description: &str, count: usize) -> String {
    let prompt = QuestionPrompt {
        resume,
        job_description,
        count,
    };
    prompt.render().unwrap_or_else(|e| {
        error!("Question prompt failed to render: {}", e);
        format!(
            "Prepare {count} interview questions for this resume and job description. \
             Output ONLY a JSON array of {count} strings.\n\nRESUME:\n{resume}\n\nJOB DESCRIPTION:\n{job_description}"
        )
    })
}

/// Extract exactly `count` questions from a model answer.
///
/// Anything before the first `[` and after the last `]` is ignored, so
/// answers wrapped in prose or markdown fences still parse.
pub fn parse_questions(text: &str, count: usize) -> Result<Vec<String>, QuestionError> {
    let (Some(start), Some(end)) = (text.find('['), text.rfind(']')) else {
        return Err(QuestionError::MalformedResponse(
            "no JSON array in response".to_string(),
        ));
    };
    if end < start {
        return Err(QuestionError::MalformedResponse(
            "no JSON array in response".to_string(),
        ));
    }

    let items: Vec<serde_json::Value> = serde_json::from_str(&text[start..=end])
        .map_err(|e| QuestionError::MalformedResponse(e.to_string()))?;

    let mut questions = Vec::with_capacity(items.len());
    for (i, item) in items.into_iter().enumerate() {
        let Some(question) = item.as_str().map(str::trim).filter(|q| !q.is_empty()) else {
            return Err(QuestionError::MalformedResponse(format!(
                "entry {} is not a non-empty string",
                i + 1
            )));
        };
        questions.push(question.to_string());
    }

    if questions.len() != count {
        return Err(QuestionError::MalformedResponse(format!(
            "expected {} questions, got {}",
            count,
            questions.len()
        )));
    }
    Ok(questions)
}

/// Asks a chat model for interview questions tailored to a resume and role.
pub struct QuestionGenerator {
    model: Arc<dyn ChatModel + Send + Sync>,
}

impl QuestionGenerator {
    pub fn new(model: Arc<dyn ChatModel + Send + Sync>) -> Self {
        Self { model }
    }

    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    pub async fn generate(
        &self,
        resume_text: &str,
        job_description: &str,
        count: usize,
    ) -> Result<Vec<String>, QuestionError> {
        if resume_text.trim().is_empty() {
            return Err(QuestionError::MissingInput("resume"));
        }
        if job_description.trim().is_empty() {
            return Err(QuestionError::MissingInput("job description"));
        }

        info!(
            "Generating {} questions with {}",
            count,
            self.model.name()
        );
        let request =
            ChatRequest::new(render_prompt(resume_text.trim(), job_description.trim(), count))
                .expect_json();

        let answer = self.model.chat(&request).await.map_err(|e| {
            let err = QuestionError::from(e);
            warn!("Question generation failed: {}", err);
            err
        })?;
        debug!("Raw question answer: {}", answer);

        parse_questions(&answer, count)
    }
}
