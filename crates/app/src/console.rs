//! Line-based input for the terminal runner.

use std::fmt;

use async_trait::async_trait;
use exam_core::model::{AnswerValue, Question, QuestionKind};
use services::PasswordPrompter;
use services::monitoring::{KeyCombo, RawEvent};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Answer(String),
    Next,
    Prev,
    /// Zero-based question index.
    Goto(usize),
    Submit,
    Status,
    Quit,
    Help,
    /// Browser event to feed into the simulated host.
    Simulate(RawEvent),
    FullscreenExit,
    Unplug,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputError {
    Empty,
    Unknown(String),
    MissingArgument(&'static str),
    BadNumber(String),
    BadKey(String),
}

impl fmt::Display for InputError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputError::Empty => f.write_str("type a command, or `help`"),
            InputError::Unknown(cmd) => write!(f, "unknown command: {cmd}"),
            InputError::MissingArgument(cmd) => write!(f, "{cmd} needs an argument"),
            InputError::BadNumber(raw) => write!(f, "not a question or option number: {raw}"),
            InputError::BadKey(raw) => write!(f, "not a key combo: {raw}"),
        }
    }
}

impl std::error::Error for InputError {}

pub fn print_help() {
    println!("Commands:");
    println!("  answer <text|n|n,m>   answer the current question (options are 1-based)");
    println!("  next | prev | goto <n>");
    println!("  status | submit | quit | help");
    println!("Simulated browser events:");
    println!("  :blur :hide :show :copy :cut :paste :menu :esc :unplug");
    println!("  :key <combo>          e.g. :key Ctrl+Shift+I");
}

/// Parse one command line.
pub fn parse_input(line: &str) -> Result<Input, InputError> {
    let line = line.trim();
    let (command, rest) = line
        .split_once(char::is_whitespace)
        .map_or((line, ""), |(c, r)| (c, r.trim()));

    let input = match command {
        "" => return Err(InputError::Empty),
        "answer" | "a" => {
            if rest.is_empty() {
                return Err(InputError::MissingArgument("answer"));
            }
            Input::Answer(rest.to_string())
        }
        "next" | "n" => Input::Next,
        "prev" | "p" => Input::Prev,
        "goto" | "g" => Input::Goto(one_based(rest)?),
        "submit" => Input::Submit,
        "status" | "s" => Input::Status,
        "quit" | "q" => Input::Quit,
        "help" | "?" => Input::Help,
        ":blur" => Input::Simulate(RawEvent::Blur),
        ":hide" => Input::Simulate(RawEvent::VisibilityChange { hidden: true }),
        ":show" => Input::Simulate(RawEvent::VisibilityChange { hidden: false }),
        ":copy" => Input::Simulate(RawEvent::Copy),
        ":cut" => Input::Simulate(RawEvent::Cut),
        ":paste" => Input::Simulate(RawEvent::Paste),
        ":menu" => Input::Simulate(RawEvent::ContextMenu),
        ":key" => {
            let combo = KeyCombo::parse(rest).ok_or_else(|| InputError::BadKey(rest.to_string()))?;
            Input::Simulate(RawEvent::KeyDown(combo))
        }
        ":esc" => Input::FullscreenExit,
        ":unplug" => Input::Unplug,
        other => return Err(InputError::Unknown(other.to_string())),
    };
    Ok(input)
}

fn one_based(raw: &str) -> Result<usize, InputError> {
    match raw.trim().parse::<usize>() {
        Ok(n) if n > 0 => Ok(n - 1),
        _ => Err(InputError::BadNumber(raw.to_string())),
    }
}

/// Turn typed text into an answer for `question`.
pub fn answer_value(question: &Question, raw: &str) -> Result<AnswerValue, InputError> {
    match question.kind() {
        QuestionKind::SingleChoice => Ok(AnswerValue::Choice(one_based(raw)?)),
        QuestionKind::MultiSelect => raw
            .split(',')
            .map(one_based)
            .collect::<Result<Vec<_>, _>>()
            .map(AnswerValue::Choices),
        QuestionKind::ShortAnswer | QuestionKind::Essay => Ok(AnswerValue::Text(raw.to_string())),
    }
}

/// Stdin reader shared by the password prompt and the command loop.
pub struct Console {
    lines: Lines<BufReader<Stdin>>,
}

impl Console {
    #[must_use]
    pub fn stdin() -> Self {
        Self {
            lines: BufReader::new(tokio::io::stdin()).lines(),
        }
    }

    /// Next line, or `None` at end of input. Safe to use in `select!`.
    pub async fn next_line(&mut self) -> std::io::Result<Option<String>> {
        self.lines.next_line().await
    }
}

#[async_trait]
impl PasswordPrompter for Console {
    async fn prompt(&mut self, attempt: u32) -> Option<String> {
        if attempt > 1 {
            println!("Wrong password.");
        }
        println!("Quiz password (empty line to cancel):");
        match self.next_line().await {
            Ok(Some(line)) if !line.trim().is_empty() => Some(line.trim().to_string()),
            Ok(_) => None,
            Err(err) => {
                tracing::warn!(error = %err, "could not read password");
                None
            }
        }
    }
}
