//! Turns an interview plan into the configuration a live session starts with.

use crate::plan::InterviewPlan;
use askama::Template;
use config::{InstructionStyleSetting, Settings};
use llm::{Modality, SessionConfig, ToolDeclaration};
use tracing::error;

/// The tool the agent calls to end the interview.
pub const CONCLUDE_TOOL: &str = "conclude_interview";

const CONCLUDE_DESCRIPTION: &str =
    "End the interview. Call this once, after thanking the candidate and saying goodbye.";

/// Which interviewer script seeds the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InstructionStyle {
    /// Works through the prepared questions with follow-ups
    #[default]
    Structured,
    /// Rapport first, questions as loose themes
    Conversational,
}

impl From<InstructionStyleSetting> for InstructionStyle {
    fn from(setting: InstructionStyleSetting) -> Self {
        match setting {
            InstructionStyleSetting::Structured => InstructionStyle::Structured,
            InstructionStyleSetting::Conversational => InstructionStyle::Conversational,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssemblyOptions {
    pub model: String,
    pub voice_name: String,
    pub modalities: Vec<Modality>,
    pub style: InstructionStyle,
    pub video_input: bool,
    /// Declared after `conclude_interview`, in this order
    pub extra_tools: Vec<ToolDeclaration>,
}

impl AssemblyOptions {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            voice_name: "Aoede".to_string(),
            modalities: vec![Modality::Audio],
            style: InstructionStyle::default(),
            video_input: false,
            extra_tools: Vec::new(),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            model: settings.live_model.clone(),
            voice_name: settings.voice_name.clone(),
            modalities: vec![Modality::Audio],
            style: settings.instruction_style.into(),
            video_input: settings.video_input,
            extra_tools: Vec::new(),
        }
    }
}

#[derive(Template)]
#[template(path = "structured_instruction.txt")]
struct StructuredInstruction<'a> {
    job_description: &'a str,
    resume_summary: &'a str,
    question_list: &'a str,
    conclude_tool: &'a str,
}

#[derive(Template)]
#[template(path = "conversational_instruction.txt")]
struct ConversationalInstruction<'a> {
    job_description: &'a str,
    resume_summary: &'a str,
    question_list: &'a str,
    conclude_tool: &'a str,
}

/// `1. first\n2. second`, numbering from one.
pub fn number_questions(questions: &[String]) -> String {
    questions
        .iter()
        .enumerate()
        .map(|(i, q)| format!("{}. {}", i + 1, q.trim()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// The `conclude_interview` declaration every session carries.
pub fn conclude_declaration() -> ToolDeclaration {
    ToolDeclaration::no_args(CONCLUDE_TOOL, CONCLUDE_DESCRIPTION)
}

/// Render the system instruction for `plan`.
pub fn system_instruction(
    plan: &InterviewPlan,
    resume_summary: Option<&str>,
    style: InstructionStyle,
) -> String {
    let question_list = number_questions(&plan.questions);
    let resume_summary = resume_summary
        .or(plan.resume_summary.as_deref())
        .unwrap_or("")
        .trim();
    let job_description = plan.job_description.trim();

    let rendered = match style {
        InstructionStyle::Structured => StructuredInstruction {
            job_description,
            resume_summary,
            question_list: &question_list,
            conclude_tool: CONCLUDE_TOOL,
        }
        .render(),
        InstructionStyle::Conversational => ConversationalInstruction {
            job_description,
            resume_summary,
            question_list: &question_list,
            conclude_tool: CONCLUDE_TOOL,
        }
        .render(),
    };

    match rendered {
        Ok(text) => text,
        Err(e) => {
            error!("Instruction template failed to render: {}", e);
            format!(
                "You are an HR interviewer for this role:\n{}\n\nQuestions:\n{}\n\n\
                 To end the interview, call the function `{}`.",
                job_description, question_list, CONCLUDE_TOOL
            )
        }
    }
}

/// Build the session configuration for `plan`.
///
/// The result always declares `conclude_interview` first. Extra tools that
/// reuse that name are dropped.
pub fn assemble(
    plan: &InterviewPlan,
    resume_summary: Option<&str>,
    options: &AssemblyOptions,
) -> SessionConfig {
    let mut builder = SessionConfig::builder(options.model.clone())
        .response_modalities(options.modalities.clone())
        .voice_name(options.voice_name.clone())
        .system_instruction(system_instruction(plan, resume_summary, options.style))
        .video_input(options.video_input)
        .tool(conclude_declaration());

    for tool in &options.extra_tools {
        builder = builder.tool(tool.clone());
    }

    builder.build()
}
