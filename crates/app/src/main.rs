mod console;
mod runner;

use std::fmt;

use api::{ApiConfig, HttpBackend, InMemoryBackend, QuizFixture};
use exam_core::model::{AntiCheatSettings, AttemptId, Question, QuestionId, QuestionKind, QuizId};
use services::MonitoringConfig;
use tracing_subscriber::EnvFilter;

use runner::Backends;

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    MissingFlag { flag: &'static str },
    UnknownArg(String),
    InvalidId { flag: &'static str, raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::MissingFlag { flag } => write!(f, "{flag} is required"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidId { flag, raw } => write!(f, "invalid {flag} value: {raw}"),
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  exam-runner take   --quiz-id <id>    [--base-url <url>] [--demo]");
    eprintln!("  exam-runner report --attempt-id <id> [--base-url <url>]");
    eprintln!();
    eprintln!("--demo runs against an in-process backend with a sample quiz and");
    eprintln!("prints its proctoring report after the attempt.");
    eprintln!();
    eprintln!("Environment (a .env file is read first):");
    eprintln!("  EXAM_API_BASE_URL, EXAM_API_TOKEN, EXAM_API_TIMEOUT_SECS");
    eprintln!("  EXAM_CAPTURE_PERIOD_SECS, EXAM_FULLSCREEN_RETRY_MS, EXAM_REPORT_QUEUE_CAPACITY");
    eprintln!("  RUST_LOG (default: info)");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Take,
    Report,
}

impl Command {
    fn from_arg(arg: &str) -> Option<Self> {
        match arg {
            "take" => Some(Self::Take),
            "report" => Some(Self::Report),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
struct Args {
    quiz_id: Option<QuizId>,
    attempt_id: Option<AttemptId>,
    base_url: Option<String>,
    demo: bool,
}

impl Args {
    fn parse(args: &mut impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        let mut parsed = Self::default();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--quiz-id" => {
                    let value = require_value(args, "--quiz-id")?;
                    parsed.quiz_id = Some(value.parse().map_err(|_| ArgsError::InvalidId {
                        flag: "--quiz-id",
                        raw: value.clone(),
                    })?);
                }
                "--attempt-id" => {
                    let value = require_value(args, "--attempt-id")?;
                    parsed.attempt_id = Some(value.parse().map_err(|_| ArgsError::InvalidId {
                        flag: "--attempt-id",
                        raw: value.clone(),
                    })?);
                }
                "--base-url" => parsed.base_url = Some(require_value(args, "--base-url")?),
                "--demo" => parsed.demo = true,
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }
        Ok(parsed)
    }
}

fn http_backends(base_url: Option<&str>) -> Result<Backends, Box<dyn std::error::Error>> {
    let config = ApiConfig::from_env_with_base_url(base_url)?;
    tracing::info!(base_url = %config.base_url, "using exam backend");
    Ok(Backends::shared(HttpBackend::new(config)?))
}

fn demo_backend(quiz_id: QuizId) -> Result<InMemoryBackend, Box<dyn std::error::Error>> {
    let colors = vec!["red".to_string(), "green".to_string(), "blue".to_string()];
    let questions = vec![
        Question::new(QuestionId::new(1), "Which color is a primary color of light?", QuestionKind::SingleChoice, colors.clone())?,
        Question::new(QuestionId::new(2), "Select every color in the RGB model.", QuestionKind::MultiSelect, colors)?,
        Question::new(QuestionId::new(3), "What does RGB stand for?", QuestionKind::ShortAnswer, Vec::new())?,
    ];
    let settings = AntiCheatSettings {
        enabled: true,
        block_copy_paste: true,
        block_right_click: true,
        monitor_focus_loss: true,
        lock_browser: true,
        webcam_proctoring: true,
        ..AntiCheatSettings::default()
    };

    let backend = InMemoryBackend::new();
    backend.add_quiz(
        quiz_id,
        QuizFixture::new(questions)
            .with_time_limit(300)
            .with_settings(settings),
    );
    Ok(backend)
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut argv = std::env::args().skip(1);

    let cmd = match argv.next() {
        None => {
            print_usage();
            return Ok(());
        }
        Some(first) if first == "--help" || first == "-h" => {
            print_usage();
            return Ok(());
        }
        Some(first) => Command::from_arg(&first).ok_or_else(|| {
            eprintln!("unknown subcommand: {first}");
            print_usage();
            ArgsError::UnknownArg(first.clone())
        })?,
    };

    let parsed = Args::parse(&mut argv).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    let monitoring = MonitoringConfig::from_env()?;

    match cmd {
        Command::Take => {
            let quiz_id = parsed.quiz_id.ok_or(ArgsError::MissingFlag { flag: "--quiz-id" })?;
            if parsed.demo {
                let backend = demo_backend(quiz_id)?;
                let backends = Backends::shared(backend);
                if let Some(attempt_id) = runner::take(&backends, quiz_id, monitoring).await? {
                    runner::report(&backends, attempt_id).await?;
                }
            } else {
                let backends = http_backends(parsed.base_url.as_deref())?;
                if let Some(attempt_id) = runner::take(&backends, quiz_id, monitoring).await? {
                    println!("Attempt {attempt_id} finished.");
                }
            }
            Ok(())
        }
        Command::Report => {
            let attempt_id = parsed
                .attempt_id
                .ok_or(ArgsError::MissingFlag { flag: "--attempt-id" })?;
            let backends = http_backends(parsed.base_url.as_deref())?;
            runner::report(&backends, attempt_id).await
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    init_tracing();

    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}
