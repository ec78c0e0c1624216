mod logging;

use anyhow::{Context, Result, bail};
use clap::Parser;
use clap_derive::{Parser, Subcommand, ValueEnum};
use clofii_audio::{DeviceCapture, DevicePlayback};
use clofii_core::{
    AssemblyOptions, InterviewHandle, InterviewPlan, OrchestratorEvent, OrchestratorOptions,
    QuestionGenerator, SessionState, fallback_questions,
};
use config::{
    GEMINI_PROVIDER, InstructionStyleSetting, PathManager, Settings, load_env_file,
    resolve_api_key,
};
use llm::{GeminiChatModel, GeminiLiveClient, LiveClientOptions, ToolRegistry};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// First words the candidate "says", so the interviewer opens the conversation.
const GREETING: &str = "Hello, I'm ready to start the interview.";

/// Longest resume excerpt handed to the interviewer.
const RESUME_SUMMARY_CHARS: usize = 4_000;

#[derive(Copy, Clone, ValueEnum, Debug, PartialEq, Eq)]
#[clap(rename_all = "lowercase")]
enum Style {
    Structured,
    Conversational,
}

impl From<Style> for InstructionStyleSetting {
    fn from(style: Style) -> Self {
        match style {
            Style::Structured => InstructionStyleSetting::Structured,
            Style::Conversational => InstructionStyleSetting::Conversational,
        }
    }
}

#[derive(clap_derive::Args, Debug)]
struct SetupArgs {
    /// Resume (.pdf, .docx, .txt or .md)
    #[arg(long)]
    resume: PathBuf,

    /// Job description (.pdf, .docx, .txt or .md)
    #[arg(long)]
    job: PathBuf,

    /// Number of questions to generate
    #[arg(long)]
    questions: Option<usize>,

    /// Model used to generate questions
    #[arg(long, env = "CLOFII_QUESTION_MODEL")]
    question_model: Option<String>,
}

#[derive(Subcommand, Debug)]
enum CliCommand {
    /// Run a live voice interview
    Interview {
        #[command(flatten)]
        setup: SetupArgs,

        #[arg(long, value_enum)]
        style: Option<Style>,

        /// Also send camera frames to the interviewer
        #[arg(long)]
        video: bool,

        /// Skip generation and use the built-in question list
        #[arg(long)]
        default_questions: bool,

        /// Live model
        #[arg(long, env = "CLOFII_LIVE_MODEL")]
        model: Option<String>,

        /// Prebuilt voice the interviewer speaks with
        #[arg(long)]
        voice: Option<String>,
    },
    /// Generate and print interview questions
    Questions {
        #[command(flatten)]
        setup: SetupArgs,
    },
    /// Store the Gemini API key (encrypted) in the settings file
    SetApiKey { key: String },
    /// Remove the stored Gemini API key
    ClearApiKey,
}

#[derive(Parser, Debug)]
#[command(name = "clofii", author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: CliCommand,

    /// Mirror logs to stderr
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Keep settings and logs here instead of the platform directories
    #[arg(long, global = true, env = "CLOFII_DATA_DIR")]
    data_dir: Option<PathBuf>,
}

fn read_document(path: &Path) -> Result<String> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let name = path.to_string_lossy();
    clofii_ext::extract_text(&bytes, &name)
        .with_context(|| format!("Failed to extract text from {}", path.display()))
}

fn require_api_key(settings: &Settings) -> Result<String> {
    match resolve_api_key(settings) {
        Some(key) => Ok(key),
        None => bail!(
            "No Gemini API key. Set GEMINI_API_KEY or run `clofii set-api-key <key>`."
        ),
    }
}

fn summarize_resume(resume: &str) -> String {
    resume.chars().take(RESUME_SUMMARY_CHARS).collect()
}

/// Generate questions, falling back to the built-in list when the model
/// cannot provide them.
async fn prepare_questions(
    settings: &Settings,
    api_key: &str,
    resume: &str,
    job_description: &str,
) -> Result<Vec<String>> {
    let model = GeminiChatModel::new(
        settings.rest_base_url.clone(),
        settings.question_model.clone(),
        api_key,
    )?;
    let generator = QuestionGenerator::new(Arc::new(model));
    println!("Preparing questions with {}...", generator.model_name());

    match generator
        .generate(resume, job_description, settings.question_count)
        .await
    {
        Ok(questions) => Ok(questions),
        Err(e) => {
            warn!("Question generation failed: {}", e);
            println!("{}", e.user_message());
            println!("Continuing with the default questions.");
            Ok(fallback_questions())
        }
    }
}

fn print_questions(questions: &[String]) {
    for (i, question) in questions.iter().enumerate() {
        println!("{:>2}. {}", i + 1, question);
    }
}

async fn run_questions(mut settings: Settings, setup: SetupArgs) -> Result<()> {
    if let Some(count) = setup.questions {
        settings.question_count = count;
    }
    if let Some(model) = setup.question_model {
        settings.question_model = model;
    }
    let api_key = require_api_key(&settings)?;
    let resume = read_document(&setup.resume)?;
    let job_description = read_document(&setup.job)?;

    let questions = prepare_questions(&settings, &api_key, &resume, &job_description).await?;
    print_questions(&questions);
    Ok(())
}

fn set_api_key(key: &str) -> Result<()> {
    let mut settings = Settings::load();
    settings
        .set_api_key(GEMINI_PROVIDER, key.trim())
        .map_err(anyhow::Error::msg)?;
    settings.save().map_err(anyhow::Error::msg)?;
    println!("API key saved.");
    Ok(())
}

fn clear_api_key() -> Result<()> {
    let mut settings = Settings::load();
    settings.remove_api_key(GEMINI_PROVIDER);
    settings.save().map_err(anyhow::Error::msg)?;
    println!("API key removed.");
    Ok(())
}

/// Print an event. Returns false once the interview is over.
fn show_event(event: &OrchestratorEvent, started: &mut bool) -> bool {
    match event {
        OrchestratorEvent::ConnectionStateChanged(state) => {
            info!("Session {}", state);
            match state {
                SessionState::Connecting => println!("Connecting..."),
                SessionState::Active => {
                    *started = true;
                    println!("Connected. Speak when you are ready; Ctrl-C ends the interview.");
                }
                SessionState::Concluding => println!("\nThe interviewer is wrapping up."),
                SessionState::Idle if *started => {
                    println!("Interview finished.");
                    return false;
                }
                SessionState::Idle => {}
                SessionState::Error(_) => return false,
            }
        }
        OrchestratorEvent::Transcript { text } => {
            print!("{}", text);
            let _ = io::stdout().flush();
        }
        OrchestratorEvent::TurnComplete { .. } => println!(),
        OrchestratorEvent::Interrupted => println!(" [interrupted]"),
        OrchestratorEvent::ToolCalled { name } => info!("Interviewer called {}", name),
        OrchestratorEvent::ToolDispatchFailed(err) => warn!("{}", err),
        OrchestratorEvent::AgentError { message } => eprintln!("Interviewer error: {}", message),
        OrchestratorEvent::Failed(err) => {
            eprintln!("{} ({})", err.kind().user_message(), err);
        }
    }
    true
}

struct InterviewArgs {
    setup: SetupArgs,
    style: Option<Style>,
    video: bool,
    default_questions: bool,
    model: Option<String>,
    voice: Option<String>,
}

async fn run_interview(mut settings: Settings, args: InterviewArgs) -> Result<()> {
    if let Some(count) = args.setup.questions {
        settings.question_count = count;
    }
    if let Some(model) = args.setup.question_model {
        settings.question_model = model;
    }
    if let Some(style) = args.style {
        settings.instruction_style = style.into();
    }
    if let Some(model) = args.model {
        settings.live_model = model;
    }
    if let Some(voice) = args.voice {
        settings.voice_name = voice;
    }
    settings.video_input |= args.video;

    let api_key = require_api_key(&settings)?;
    let resume = read_document(&args.setup.resume)?;
    let job_description = read_document(&args.setup.job)?;

    let questions = if args.default_questions {
        fallback_questions()
    } else {
        prepare_questions(&settings, &api_key, &resume, &job_description).await?
    };
    print_questions(&questions);

    let plan = InterviewPlan::new(questions, job_description)
        .with_resume_summary(summarize_resume(&resume));

    let session = GeminiLiveClient::new(LiveClientOptions::from_settings(&settings, api_key));
    let playback = DevicePlayback::new().context("No audio output device")?;
    let mut handle = InterviewHandle::spawn(
        Box::new(session),
        Box::new(DeviceCapture::new()),
        Box::new(playback),
        ToolRegistry::new(),
        AssemblyOptions::from_settings(&settings),
        OrchestratorOptions::from_settings(&settings),
    );

    handle.start_interview(plan).await?;

    let mut started = false;
    let mut greeted = false;
    let mut failed = false;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!("\nStopping interview...");
                handle.stop_interview().await;
                break;
            }
            event = handle.next_event() => {
                let Some(event) = event else { break };
                failed |= matches!(event, OrchestratorEvent::Failed(_));
                if !show_event(&event, &mut started) {
                    break;
                }
                if started && !greeted && handle.state() == SessionState::Active {
                    greeted = true;
                    if let Err(e) = handle.send_text(GREETING).await {
                        warn!("Failed to greet the interviewer: {}", e);
                    }
                }
            }
        }
    }

    let stats = handle.stats();
    info!(
        "Session stats: {} frames sent, {} dropped, {} skipped",
        stats.frames_sent, stats.frames_dropped, stats.frames_skipped
    );
    if failed {
        bail!("The interview ended with an error");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    load_env_file();
    let args = Args::parse();
    if let Some(dir) = &args.data_dir {
        PathManager::set_data_dir(dir.clone());
    }
    let _log_guard = logging::init_logging(args.verbose);

    let settings = Settings::load();
    match args.command {
        CliCommand::Interview {
            setup,
            style,
            video,
            default_questions,
            model,
            voice,
        } => {
            run_interview(
                settings,
                InterviewArgs {
                    setup,
                    style,
                    video,
                    default_questions,
                    model,
                    voice,
                },
            )
            .await
        }
        CliCommand::Questions { setup } => run_questions(settings, setup).await,
        CliCommand::SetApiKey { key } => set_api_key(&key),
        CliCommand::ClearApiKey => clear_api_key(),
    }
}
