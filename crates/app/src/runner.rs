use std::sync::Arc;
use std::time::Duration;

use api::{AttemptApi, BehaviorApi, ReportApi, SettingsApi};
use exam_core::model::{AttemptId, AttemptStatus, EventCounters, QuizId};
use services::monitoring::Disposition;
use services::{
    AccessGate, AttemptController, AttemptError, Clock, MonitoringConfig, ReportService, SimulatedHost, Tick,
};
use tokio::time::{MissedTickBehavior, interval};

use crate::console::{Console, Input, answer_value, parse_input, print_help};

/// Backend operations the runner needs, possibly served by one object.
#[derive(Clone)]
pub struct Backends {
    pub settings: Arc<dyn SettingsApi>,
    pub attempts: Arc<dyn AttemptApi>,
    pub behavior: Arc<dyn BehaviorApi>,
    pub reports: Arc<dyn ReportApi>,
}

impl Backends {
    pub fn shared<B>(backend: B) -> Self
    where
        B: SettingsApi + AttemptApi + BehaviorApi + ReportApi + 'static,
    {
        let backend = Arc::new(backend);
        Self {
            settings: backend.clone(),
            attempts: backend.clone(),
            behavior: backend.clone(),
            reports: backend,
        }
    }
}

enum Flow {
    Continue,
    Done,
}

/// Run one attempt of `quiz_id` interactively.
pub async fn take(
    backends: &Backends,
    quiz_id: QuizId,
    config: MonitoringConfig,
) -> Result<Option<AttemptId>, Box<dyn std::error::Error>> {
    let mut console = Console::stdin();

    let gate = AccessGate::new(Arc::clone(&backends.settings));
    let decision = gate.check_access(quiz_id, &mut console).await?;
    if !decision.proceed {
        println!("Access cancelled; no attempt was started.");
        return Ok(None);
    }

    let host = SimulatedHost::new();
    let mut controller = AttemptController::new(
        Arc::clone(&backends.attempts),
        Arc::clone(&backends.behavior),
        Arc::new(host.clone()),
        Clock::system(),
        config,
    );
    controller.start(quiz_id, decision.settings).await?;
    let attempt_id = controller.attempt().map(|a| a.attempt_id());
    print_help();
    print_current(&controller);

    let mut countdown = interval(Duration::from_secs(1));
    countdown.set_missed_tick_behavior(MissedTickBehavior::Delay);
    countdown.tick().await;

    loop {
        let flow = tokio::select! {
            _ = countdown.tick(), if controller.status() == AttemptStatus::InProgress => {
                on_tick(&mut controller).await
            }
            line = console.next_line() => match line? {
                Some(line) => on_line(&mut controller, &host, &line).await,
                None => {
                    if controller.abandon().is_ok() {
                        println!("Input closed; attempt abandoned.");
                    }
                    Flow::Done
                }
            },
        };
        if matches!(flow, Flow::Done) {
            break;
        }
    }

    controller.flush_answers().await;
    if let Some(reporter) = controller.reporter() {
        reporter.flush().await;
    }
    if let Some(monitoring) = controller.monitoring() {
        print_counters(&monitoring.counters());
    }
    Ok(attempt_id)
}

async fn on_tick(controller: &mut AttemptController) -> Flow {
    match controller.tick().await {
        Ok(Tick::Running { remaining_seconds }) => {
            if remaining_seconds <= 10 || remaining_seconds % 60 == 0 {
                println!("{remaining_seconds}s left");
            }
            Flow::Continue
        }
        Ok(Tick::Untimed) => Flow::Continue,
        Ok(Tick::Submitted(receipt)) => {
            println!("Time is up. Submitted automatically; score {:.1}.", receipt.score);
            Flow::Done
        }
        Err(err) => {
            println!("{err}");
            Flow::Continue
        }
    }
}

async fn on_line(controller: &mut AttemptController, host: &SimulatedHost, line: &str) -> Flow {
    let input = match parse_input(line) {
        Ok(input) => input,
        Err(err) => {
            println!("{err}");
            return Flow::Continue;
        }
    };

    let result: Result<Flow, AttemptError> = match input {
        Input::Answer(raw) => {
            let Some(question) = controller.attempt().map(|a| a.current_question().clone()) else {
                return Flow::Continue;
            };
            let index = controller.attempt().map_or(0, |a| a.current_index());
            match answer_value(&question, &raw) {
                Ok(value) => controller.answer(index, value).map(|()| {
                    println!("Saved.");
                    Flow::Continue
                }),
                Err(err) => {
                    println!("{err}");
                    Ok(Flow::Continue)
                }
            }
        }
        Input::Next | Input::Prev | Input::Goto(_) => {
            let current = controller.attempt().map_or(0, |a| a.current_index());
            let target = match input {
                Input::Next => current + 1,
                Input::Prev => current.saturating_sub(1),
                Input::Goto(n) => n,
                _ => current,
            };
            controller.navigate(target).map(|_| {
                print_current(controller);
                Flow::Continue
            })
        }
        Input::Submit => controller.submit().await.map(|receipt| {
            println!("Submitted; score {:.1}.", receipt.score);
            Flow::Done
        }),
        Input::Status => {
            print_current(controller);
            Ok(Flow::Continue)
        }
        Input::Quit => controller.abandon().map(|()| {
            println!("Attempt abandoned.");
            Flow::Done
        }),
        Input::Help => {
            print_help();
            Ok(Flow::Continue)
        }
        Input::Simulate(event) => {
            if host.dispatch(&event) == Disposition::PreventDefault {
                println!("(blocked)");
            }
            Ok(Flow::Continue)
        }
        Input::FullscreenExit => {
            host.simulate_fullscreen_exit();
            Ok(Flow::Continue)
        }
        Input::Unplug => {
            host.fail_camera_stream();
            Ok(Flow::Continue)
        }
    };

    result.unwrap_or_else(|err| {
        println!("{err}");
        Flow::Continue
    })
}

fn print_current(controller: &AttemptController) {
    let Some(attempt) = controller.attempt() else {
        return;
    };
    let progress = attempt.progress();
    let question = attempt.current_question();
    let timer = progress
        .remaining_seconds
        .map_or_else(|| "untimed".to_string(), |s| format!("{s}s left"));
    println!();
    println!(
        "Question {}/{} ({}) | answered {}/{} | {timer}",
        progress.current_index + 1,
        progress.total,
        question.kind(),
        progress.answered,
        progress.total,
    );
    println!("  {}", question.text());
    for (i, option) in question.options().iter().enumerate() {
        println!("    {}) {option}", i + 1);
    }
    if let Some(answer) = question.answer() {
        println!("  current answer: {answer:?}");
    }
}

fn print_counters(counters: &EventCounters) {
    if counters.is_empty() {
        println!("No suspicious behavior recorded.");
        return;
    }
    println!("Recorded behavior:");
    for (event_type, count) in counters.iter() {
        println!("  {:<20} {count}", event_type.as_str());
    }
}

/// Print the proctoring report of `attempt_id`.
pub async fn report(backends: &Backends, attempt_id: AttemptId) -> Result<(), Box<dyn std::error::Error>> {
    let view = ReportService::new(Arc::clone(&backends.reports))
        .load(attempt_id)
        .await?;
    let report = &view.report;

    println!("Attempt {attempt_id}");
    println!(
        "  risk: {} (score {:.1})",
        report.risk_level, report.suspicious_score
    );
    if !view.agrees() {
        println!(
            "  local weights suggest {} (score {:.1})",
            view.local.risk_level, view.local.suspicious_score
        );
    }
    print_counters(&report.per_category_counts);
    println!("  screenshots: {}", report.screenshots.len());
    for event in report.timeline() {
        println!(
            "  {} {} #{}",
            event.occurred_at().to_rfc3339(),
            event.event_type(),
            event.sequence_in_category()
        );
    }
    Ok(())
}
