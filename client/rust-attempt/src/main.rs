use anyhow::{Context, Result};
use jeeprep_attempt::{
    config::Config,
    metrics::render_metrics,
    models::violation::{EnvironmentSignal, KeyEvent},
    services::{
        attempt_api::AttemptApi,
        attempt_session::{AttemptSnapshot, ScreenState},
        violation_monitor::ChannelSignalSource,
        AppState,
    },
    AttemptOutcome, UserCommand,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const HELP: &str = "commands: a-z (select option), next, prev, goto <n>, flag, submit, review, \
confirm, exit | signals: !hide, !blur, !pagehide, !contextmenu, !key <combo>";

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "jeeprep_attempt=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = Config::load().context("Failed to load configuration")?;
    let state = AppState::new(config);

    let credential = std::env::var("JEEPREP_TOKEN").ok();
    let test_id = std::env::args().nth(1);

    let (controller, mut snapshots) = state.attempt_controller();
    let (command_tx, command_rx) = mpsc::channel(32);
    let (emitter, signals) = ChannelSignalSource::channel();

    println!("{}", HELP);

    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let delivered = match parse_input(&line) {
                Some(Input::Command(command)) => command_tx.send(command).await.is_ok(),
                Some(Input::Signal(signal)) => emitter.emit(signal),
                None => {
                    println!("? {}", HELP);
                    true
                }
            };
            if !delivered {
                break;
            }
        }
    });

    tokio::spawn(async move {
        let mut last: Option<AttemptSnapshot> = None;
        while snapshots.changed().await.is_ok() {
            let snapshot = snapshots.borrow_and_update().clone();
            if needs_redraw(last.as_ref(), &snapshot) {
                render(&snapshot);
            }
            last = Some(snapshot);
        }
    });

    let outcome = controller
        .run(credential.clone(), test_id, command_rx, signals)
        .await;

    if let AttemptOutcome::Results { attempt_id, summary } = outcome {
        println!(
            "Submitted. Score {} ({} answered of {}, {} correct, {} incorrect, {} unattempted)",
            summary.score,
            summary.answered,
            summary.total_questions,
            summary.correct_answers,
            summary.incorrect_answers,
            summary.unattempted
        );

        let credential = credential.unwrap_or_default();
        match state.api.get_result(&attempt_id, &credential).await {
            Ok(result) => println!(
                "Result for {} ({}): accuracy {:.1}%, submitted at {}",
                result.test_id,
                result.subject,
                result.accuracy_percent(),
                result.submitted_at
            ),
            Err(err) => tracing::warn!("Could not load result for {}: {}", attempt_id, err),
        }
    }

    if let Ok(metrics) = render_metrics() {
        tracing::debug!("Session metrics:\n{}", metrics);
    }

    Ok(())
}

enum Input {
    Command(UserCommand),
    Signal(EnvironmentSignal),
}

fn parse_input(line: &str) -> Option<Input> {
    let line = line.trim();
    if let Some(signal) = line.strip_prefix('!') {
        return parse_signal(signal).map(Input::Signal);
    }

    let mut parts = line.split_whitespace();
    let command = match (parts.next()?, parts.next()) {
        ("next" | "n", None) => UserCommand::Next,
        ("prev" | "p", None) => UserCommand::Previous,
        ("goto" | "g", Some(n)) => UserCommand::JumpTo(n.parse::<usize>().ok()?.checked_sub(1)?),
        ("flag" | "f", None) => UserCommand::ToggleFlag,
        ("submit", None) => UserCommand::RequestSubmit,
        ("review", None) => UserCommand::CancelSubmit,
        ("confirm", None) => UserCommand::ConfirmSubmit,
        ("exit" | "back", None) => UserCommand::Exit,
        (letter, None) if letter.len() == 1 => {
            let c = letter.chars().next()?.to_ascii_lowercase();
            if !c.is_ascii_lowercase() {
                return None;
            }
            UserCommand::SelectOption(usize::from(c as u8 - b'a'))
        }
        _ => return None,
    };
    Some(Input::Command(command))
}

fn parse_signal(input: &str) -> Option<EnvironmentSignal> {
    let mut parts = input.split_whitespace();
    let signal = match (parts.next()?, parts.next()) {
        ("hide", None) => EnvironmentSignal::VisibilityChange { hidden: true },
        ("show", None) => EnvironmentSignal::VisibilityChange { hidden: false },
        ("blur", None) => EnvironmentSignal::WindowBlur,
        ("pagehide", None) => EnvironmentSignal::PageHide,
        ("contextmenu", None) => EnvironmentSignal::ContextMenu,
        ("key", Some(combo)) => {
            let mut event = KeyEvent::default();
            for part in combo.split('+') {
                match part.to_ascii_lowercase().as_str() {
                    "ctrl" => event.ctrl = true,
                    "cmd" | "meta" => event.meta = true,
                    "shift" => event.shift = true,
                    _ => event.key = part.to_string(),
                }
            }
            EnvironmentSignal::KeyDown(event)
        }
        _ => return None,
    };
    Some(signal)
}

/// Timer-only changes are redrawn once a minute, every second when urgent.
fn needs_redraw(last: Option<&AttemptSnapshot>, next: &AttemptSnapshot) -> bool {
    let Some(last) = last else {
        return true;
    };
    let mut timer_only = last.clone();
    timer_only.remaining_seconds = next.remaining_seconds;
    timer_only.time_display = next.time_display.clone();
    timer_only.urgent = next.urgent;

    timer_only != *next || next.urgent || next.remaining_seconds % 60 == 0
}

fn render(snapshot: &AttemptSnapshot) {
    let urgent = if snapshot.urgent { " !" } else { "" };
    match &snapshot.state {
        ScreenState::Loading => println!("Starting test..."),
        ScreenState::Error(message) => println!("{} (type 'back' to return to tests)", message),
        ScreenState::NoQuestions => {
            println!("No questions found for this test. (type 'back' to return to tests)")
        }
        ScreenState::Submitting => println!("Submitting..."),
        ScreenState::Completed { attempt_id } => println!("Attempt {} submitted", attempt_id),
        ScreenState::Confirming => {
            println!("Submit Test?");
            print!(
                "You have answered {} of {} questions.",
                snapshot.answered_count, snapshot.total_questions
            );
            if snapshot.flagged_count > 0 {
                print!(" {} flagged for review.", snapshot.flagged_count);
            }
            println!();
            if let Some(error) = &snapshot.action_error {
                println!("  {}", error);
            }
            println!("[review] [confirm]  {}{}", snapshot.time_display, urgent);
        }
        ScreenState::Ready => {
            let Some(question) = &snapshot.question else {
                return;
            };
            let index = snapshot.current_index;
            let flag = if snapshot.flagged.get(index).copied().unwrap_or(false) {
                " [flagged]"
            } else {
                ""
            };
            println!(
                "[{}{}] {} Q{} of {}{}",
                snapshot.time_display,
                urgent,
                question.subject,
                index + 1,
                snapshot.total_questions,
                flag
            );
            println!("{}", question.text);
            let selected = snapshot.answers.get(index).copied().flatten();
            for (option_index, option) in question.options.iter().enumerate() {
                let marker = if selected == Some(option_index) { "*" } else { " " };
                let letter = char::from(b'A' + (option_index % 26) as u8);
                println!(" {} {}. {}", marker, letter, option);
            }
            if let Some(error) = &snapshot.action_error {
                println!("  {}", error);
            }
        }
    }
}
