mod config;

use std::fmt;
use std::sync::{Arc, Mutex};

use api::{HttpApi, SharedTokenStore, TokenProvider};
use drill_core::model::{DifficultyTier, JobId, JobStatus, ResourceId};
use realtime::{ConnectionError, ConnectionState, RealtimeClient};
use services::{Clock, PracticeSession, SessionError, SessionLoopService, SessionSummary};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::oneshot;
use tracing_subscriber::EnvFilter;

use crate::config::{AppConfig, parse_positive};

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    MissingTarget { command: &'static str },
    UnknownArg(String),
    InvalidNumber { flag: &'static str, raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::MissingTarget { command } => write!(f, "{command} requires an id"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidNumber { flag, raw } => write!(f, "invalid {flag} value: {raw}"),
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

fn require_number(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<u32, ArgsError> {
    let raw = require_value(args, flag)?;
    parse_positive(flag, &raw).map_err(|_| ArgsError::InvalidNumber { flag, raw })
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p app -- watch <job-id> [--ws <url>] [--chunks <n>]");
    eprintln!("  cargo run -p app -- practice <resource-id> [--api <url>] [--page-size <n>] [--group <n>]");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  DRILL_API_URL, DRILL_WS_URL, DRILL_TOKEN, DRILL_PAGE_SIZE, DRILL_LOW_WATERMARK,");
    eprintln!("  DRILL_COMPLETION_DELAY_MS, RUST_LOG");
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Watch { job_id: JobId, total_chunks: u32 },
    Practice { resource_id: ResourceId },
}

impl Command {
    /// Parse the subcommand and its flags, applying flag overrides to `config`.
    fn parse(
        args: &mut impl Iterator<Item = String>,
        config: &mut AppConfig,
    ) -> Result<Option<Self>, ArgsError> {
        let Some(name) = args.next() else {
            return Ok(None);
        };
        let mut command = match name.as_str() {
            "watch" => {
                let id = args.next().ok_or(ArgsError::MissingTarget { command: "watch" })?;
                Self::Watch {
                    job_id: JobId::new(id),
                    total_chunks: 0,
                }
            }
            "practice" => {
                let id = args
                    .next()
                    .ok_or(ArgsError::MissingTarget { command: "practice" })?;
                Self::Practice {
                    resource_id: ResourceId::new(id),
                }
            }
            "--help" | "-h" => return Ok(None),
            _ => return Err(ArgsError::UnknownArg(name)),
        };

        while let Some(arg) = args.next() {
            match (arg.as_str(), &mut command) {
                ("--ws", Self::Watch { .. }) => {
                    config.realtime.ws_url = require_value(args, "--ws")?;
                }
                ("--chunks", Self::Watch { total_chunks, .. }) => {
                    *total_chunks = require_number(args, "--chunks")?;
                }
                ("--api", Self::Practice { .. }) => {
                    config.api_url = require_value(args, "--api")?;
                }
                ("--page-size", Self::Practice { .. }) => {
                    config.pool.page_size = require_number(args, "--page-size")?;
                }
                ("--group", Self::Practice { .. }) => {
                    let value = require_value(args, "--group")?;
                    let group = value.parse::<u32>().map_err(|_| ArgsError::InvalidNumber {
                        flag: "--group",
                        raw: value.clone(),
                    })?;
                    config.pool.group = Some(group);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }
        Ok(Some(command))
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn token_store(config: &AppConfig) -> Arc<dyn TokenProvider> {
    let tokens = SharedTokenStore::new();
    if let Some(token) = &config.token {
        tokens.set(token.clone());
    }
    Arc::new(tokens)
}

//
// ─── WATCH ─────────────────────────────────────────────────────────────────────
//

async fn watch_job(
    config: &AppConfig,
    job_id: JobId,
    total_chunks: u32,
) -> Result<(), Box<dyn std::error::Error>> {
    let client = RealtimeClient::websocket(&config.realtime, token_store(config));

    client.router().on_chunk_progress(|snapshot| {
        println!(
            "{}: {}/{} chunks done, {} items so far",
            snapshot.job_id,
            snapshot.completed_chunk_count,
            snapshot.total_chunks,
            snapshot.running_item_total
        );
    });
    let (done_tx, done_rx) = oneshot::channel();
    let done_tx = Mutex::new(Some(done_tx));
    client.router().on_job_completed(move |event| {
        let sender = done_tx
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take();
        if let Some(sender) = sender {
            let _ = sender.send(event.clone());
        }
    });

    let _watch = client.watch_job(job_id, total_chunks);
    client.connect().await;

    let mut status = client.watch_status();
    let outcome = async {
        loop {
            let current = status.borrow_and_update().clone();
            if current.state == ConnectionState::Disconnected {
                if let Some(err) = current.last_error {
                    return Err(err);
                }
            }
            if status.changed().await.is_err() {
                return Ok::<(), ConnectionError>(());
            }
        }
    };

    let result = tokio::select! {
        event = done_rx => {
            if let Ok(event) = event {
                match event.final_status {
                    JobStatus::Completed => println!(
                        "{}: completed, {} items from {} chunks",
                        event.job_id, event.total_items_produced, event.total_chunks
                    ),
                    JobStatus::Failed => println!(
                        "{}: failed: {}",
                        event.job_id,
                        event.error_message.as_deref().unwrap_or("no details")
                    ),
                }
            }
            Ok(())
        }
        auth = outcome => auth.map_err(|err| Box::new(err) as Box<dyn std::error::Error>),
        _ = tokio::signal::ctrl_c() => Ok(()),
    };

    client.disconnect();
    result
}

//
// ─── PRACTICE ──────────────────────────────────────────────────────────────────
//

type Input = Lines<BufReader<Stdin>>;

async fn prompt(input: &mut Input, text: &str) -> Result<Option<String>, std::io::Error> {
    println!("{text}");
    input.next_line().await
}

enum Step {
    Answered,
    Restart,
    Quit,
}

async fn practice(config: &AppConfig, resource_id: ResourceId) -> Result<(), Box<dyn std::error::Error>> {
    let tokens = token_store(config);
    let api = Arc::new(HttpApi::new(config.http()?, tokens));
    let loop_svc = SessionLoopService::new(Clock::default(), api.clone(), api.clone(), api)
        .with_config(config.pool);
    let mut input = BufReader::new(tokio::io::stdin()).lines();

    let mut session = loop_svc.start_session(resource_id).await?;
    loop {
        match practice_round(&loop_svc, &mut session, &mut input).await? {
            Step::Answered => {}
            Step::Restart => {
                session = loop_svc.handle_restart(session).await?;
                println!("-- restarted --");
            }
            Step::Quit => return Ok(()),
        }
        if session.is_complete() {
            match loop_svc.finalize_summary(&mut session).await {
                Ok(summary) => print_summary(&summary),
                Err(err) => eprintln!("session complete; summary unavailable: {err}"),
            }
            return Ok(());
        }
    }
}

async fn practice_round(
    loop_svc: &SessionLoopService,
    session: &mut PracticeSession,
    input: &mut Input,
) -> Result<Step, Box<dyn std::error::Error>> {
    let next = match loop_svc.next_item(session).await {
        Ok(next) => next,
        Err(SessionError::Pool(err)) => {
            eprintln!("could not load more items: {err}");
            let answer = prompt(input, "(enter to retry, q to quit)").await?;
            if answer.is_none_or(|line| line.trim() == "q") {
                return Ok(Step::Quit);
            }
            if let Err(err) = loop_svc.reload(session).await {
                eprintln!("retry failed: {err}");
            }
            return Ok(Step::Answered);
        }
        Err(err) => return Err(err.into()),
    };
    let Some(item) = next else {
        return Ok(Step::Answered);
    };
    let progress = session.progress();
    let expected = progress
        .expected
        .map_or_else(|| "?".to_owned(), |n| n.to_string());
    println!("[{}/{}] {}", progress.answered + 1, expected, item.front);
    if let Some(hint) = &item.hint {
        println!("  hint: {hint}");
    }

    if prompt(input, "(enter to reveal)").await?.is_none() {
        return Ok(Step::Quit);
    }
    println!("  {}", item.back);

    loop {
        let Some(line) = prompt(input, "difficulty? [e]asy [m]edium [h]ard, [r]estart, [q]uit").await? else {
            return Ok(Step::Quit);
        };
        match line.trim() {
            "q" | "quit" => return Ok(Step::Quit),
            "r" | "restart" => return Ok(Step::Restart),
            raw => {
                let Some(tier) = DifficultyTier::parse(raw) else {
                    continue;
                };
                let result = loop_svc.answer_current(session, tier).await?;
                if result.outcome.leveled_up {
                    let level = result
                        .outcome
                        .new_level
                        .map_or_else(String::new, |level| format!(" {level}"));
                    println!("  +{} xp, level up!{level}", result.outcome.xp_gained);
                } else {
                    println!("  +{} xp", result.outcome.xp_gained);
                }
                return Ok(Step::Answered);
            }
        }
    }
}

fn print_summary(summary: &SessionSummary) {
    let minutes = (summary.completed_at - summary.started_at).num_minutes();
    println!("Session complete for {}", summary.resource_id);
    println!("  answered:  {}", summary.items_answered);
    println!("  xp earned: {}", summary.xp_earned);
    println!("  level ups: {}", summary.level_ups);
    println!("  duration:  {minutes} min");
    println!(
        "  total xp {} / level {} / streak {} days",
        summary.stats.total_xp, summary.stats.level, summary.stats.streak_days
    );
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::from_env()?;
    let mut args = std::env::args().skip(1);

    let command = match Command::parse(&mut args, &mut config) {
        Ok(Some(command)) => command,
        Ok(None) => {
            print_usage();
            return Ok(());
        }
        Err(err) => {
            eprintln!("{err}");
            print_usage();
            return Err(err.into());
        }
    };

    match command {
        Command::Watch {
            job_id,
            total_chunks,
        } => watch_job(&config, job_id, total_chunks).await,
        Command::Practice { resource_id } => practice(&config, resource_id).await,
    }
}

#[tokio::main]
async fn main() {
    init_tracing();
    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &[&str]) -> (Result<Option<Command>, ArgsError>, AppConfig) {
        let mut config = AppConfig::default();
        let mut args = raw.iter().map(|s| (*s).to_owned());
        let parsed = Command::parse(&mut args, &mut config);
        (parsed, config)
    }

    #[test]
    fn parses_watch_with_flags() {
        let (parsed, config) = parse(&["watch", "job-9", "--ws", "wss://x/ws", "--chunks", "4"]);
        assert_eq!(
            parsed.unwrap(),
            Some(Command::Watch {
                job_id: JobId::new("job-9"),
                total_chunks: 4
            })
        );
        assert_eq!(config.realtime.ws_url, "wss://x/ws");
    }

    #[test]
    fn parses_practice_with_flags() {
        let (parsed, config) = parse(&["practice", "deck-1", "--page-size", "10", "--group", "0"]);
        assert_eq!(
            parsed.unwrap(),
            Some(Command::Practice {
                resource_id: ResourceId::new("deck-1")
            })
        );
        assert_eq!(config.pool.page_size, 10);
        assert_eq!(config.pool.group, Some(0));
    }

    #[test]
    fn rejects_flags_of_other_command() {
        let (parsed, _) = parse(&["watch", "job-9", "--page-size", "10"]);
        assert!(matches!(parsed, Err(ArgsError::UnknownArg(arg)) if arg == "--page-size"));
    }

    #[test]
    fn missing_id_and_values_are_reported() {
        let (parsed, _) = parse(&["practice"]);
        assert!(matches!(parsed, Err(ArgsError::MissingTarget { command: "practice" })));

        let (parsed, _) = parse(&["watch", "j", "--chunks"]);
        assert!(matches!(parsed, Err(ArgsError::MissingValue { flag: "--chunks" })));

        let (parsed, _) = parse(&["watch", "j", "--chunks", "zero"]);
        assert!(matches!(parsed, Err(ArgsError::InvalidNumber { .. })));
    }

    #[test]
    fn no_command_prints_usage() {
        let (parsed, _) = parse(&[]);
        assert!(matches!(parsed, Ok(None)));
    }
}
