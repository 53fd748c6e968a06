//! The document chat assistant in the terminal.

#[macro_use]
extern crate tracing;

use std::future::Future;
use std::io::Write as _;
use std::time::Duration;

use docchat::command::{Command, is_affirmative};
use docchat::{Config, Session, SessionBuilder};
use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use tokio::io::{self, AsyncBufReadExt};

const BAR_CHAR: &str = "▎";

#[tokio::main(flavor = "current_thread")]
async fn main() {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{err}");
            return;
        }
    };
    let instructions = match config.load_instructions() {
        Ok(instructions) => instructions,
        Err(err) => {
            eprintln!("{err}");
            return;
        }
    };
    let mut session = match SessionBuilder::with_config(config)
        .with_instructions(instructions)
        .build()
    {
        Ok(session) => session,
        Err(err) => {
            eprintln!("failed to start: {err}");
            return;
        }
    };

    if let Some(dir) = session.index_dir() {
        debug!("index directory: {}", dir.display());
    }
    println!(
        "{} documents indexed. Commands: {}, {}, {}, {}.",
        session.indexed_documents(),
        "update".bold(),
        "save".bold(),
        "clear".bold(),
        "exit".bold()
    );

    loop {
        print!("> ");
        std::io::stdout().flush().ok();

        let Some(line) = read_line().await else {
            break;
        };
        let Some(command) = Command::parse(&line) else {
            continue;
        };

        match command {
            Command::Exit => break,
            Command::Clear => {
                session.clear();
                print_notice("Conversation cleared.");
            }
            Command::Update => {
                let indexed = session.update_index();
                match with_spinner("📚 Indexing...", indexed).await {
                    Ok(count) => {
                        print_notice(&format!("{count} documents indexed."))
                    }
                    Err(err) => print_error(&err),
                }
            }
            Command::Save => {
                if save(&session).await {
                    break;
                }
            }
            Command::Message(message) => {
                let reply = with_spinner(
                    "🤔 Thinking...",
                    session.send_message(&message),
                )
                .await;
                match reply {
                    Ok(reply) => {
                        println!(
                            "{}🤖 {}",
                            BAR_CHAR.bright_cyan(),
                            reply.bright_white()
                        );
                    }
                    Err(err) => print_error(&err),
                }
            }
        }
    }
}

/// Returns `true` if the summary was saved and the session should end.
async fn save(session: &Session) -> bool {
    let summary =
        match with_spinner("📝 Summarizing...", session.summarize()).await {
            Ok(summary) => summary,
            Err(err) => {
                print_error(&err);
                return false;
            }
        };

    let bar = BAR_CHAR.bright_yellow();
    println!("{bar}{}", summary.title.bright_white().bold());
    println!("{bar}{}", summary.summary);
    print!("Save this summary? [Y/n]: ");
    std::io::stdout().flush().ok();

    let Some(answer) = read_line().await else {
        return true;
    };
    if !is_affirmative(&answer) {
        return false;
    }

    match with_spinner("💾 Saving...", session.save(&summary)).await {
        Ok(saved) => {
            print_notice(&format!("Summary saved as {}.", saved.id));
            true
        }
        Err(err) => {
            print_error(&err);
            false
        }
    }
}

async fn with_spinner<F: Future>(message: &'static str, fut: F) -> F::Output {
    let progress_style = ProgressStyle::with_template("{spinner} {wide_msg}")
        .unwrap()
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏");
    let progress_bar = ProgressBar::new_spinner();
    progress_bar.set_style(progress_style);
    progress_bar.set_message(message);
    progress_bar.enable_steady_tick(Duration::from_millis(100));

    let output = fut.await;

    // Finish the progress bar before printing anything else.
    progress_bar.finish_and_clear();
    output
}

fn print_notice(message: &str) {
    println!("{}{}", BAR_CHAR.bright_green(), message.bright_white());
}

fn print_error(err: &dyn std::error::Error) {
    println!("{}⚠️  {}", BAR_CHAR.bright_red(), err.bright_red());
}

async fn read_line() -> Option<String> {
    let mut stdin = io::BufReader::new(io::stdin());
    let mut line = String::new();

    match stdin.read_line(&mut line).await {
        Ok(count) => {
            if count == 0 {
                return None;
            }
            Some(line)
        }
        Err(err) => {
            error!("error reading input: {}", err);
            None
        }
    }
}
