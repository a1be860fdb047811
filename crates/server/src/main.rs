//! MapScript console runner
//!
//! Compiles an NPC script and plays it against a single console player:
//! dialog is printed, answers are read from stdin and `sleep` timers run on
//! the tokio clock.
//!
//! ```text
//! mapscript <script> [config] [label]
//! ```

mod flush;
mod host;

use anyhow::{bail, Context};
use host::{ConsoleHost, NPC, PLAYER};
use mapscript_config::ScriptConfig;
use mapscript_scripting::{Answer, InputKind, RunOutcome, ScriptEngine, ScriptError, Suspend, MENU_CANCEL};
use mapscript_storage::PersistentRegistry;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut args = std::env::args().skip(1);
    let Some(script_path) = args.next() else {
        bail!("usage: mapscript <script> [config] [label]");
    };
    let config_path = args.next();
    let label = args.next();

    info!("🚀 MapScript starting up...");

    let config = match &config_path {
        Some(path) => match ScriptConfig::load_from_file(path) {
            Ok(config) => {
                info!("✓ Configuration loaded from {}", path);
                config
            }
            Err(e) => {
                warn!("⚠️  Failed to load configuration: {}", e);
                warn!("   Using default configuration");
                ScriptConfig::default()
            }
        },
        None => ScriptConfig::default(),
    };
    config.display();

    let globals = Arc::new(
        PersistentRegistry::load(&config.global_reg_file)
            .with_context(|| format!("loading {}", config.global_reg_file.display()))?,
    );
    let flusher = flush::spawn_flush_task(
        globals.clone(),
        config.global_reg_file.clone(),
        Duration::from_secs(config.global_reg_flush_interval.max(1)),
    );

    let source = std::fs::read_to_string(&script_path).with_context(|| format!("reading {}", script_path))?;
    let mut engine = ScriptEngine::with_globals(config, globals);
    let unit = engine.compile(&script_path, &source)?;
    let offset = match &label {
        Some(name) => engine
            .unit(unit)
            .and_then(|code| code.label(name))
            .with_context(|| format!("no label '{}' in {}", name, script_path))?,
        None => 0,
    };
    info!("✓ Compiled {} as unit {}", script_path, unit);

    let mut host = ConsoleHost::new("Player");
    report(engine.run(&mut host, unit, offset, PLAYER, NPC));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let deadline = host.next_deadline();
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let line = line.trim();
                if line.eq_ignore_ascii_case("quit") {
                    break;
                }
                match engine.parked_state(PLAYER).and_then(|st| st.suspend()) {
                    Some(Suspend::AwaitingInput(kind)) => match parse_answer(kind, line) {
                        Some(answer) => report(engine.deliver(&mut host, PLAYER, answer)),
                        None => println!("  (expected {:?})", kind),
                    },
                    _ if host.has_timers() => println!("  (the script is sleeping)"),
                    _ => report(engine.run(&mut host, unit, offset, PLAYER, NPC)),
                }
            }
            _ = sleep_until(deadline) => {
                while let Some(state) = host.pop_due() {
                    report(engine.wake(&mut host, state));
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }

    flusher.abort();
    match engine.flush_globals() {
        Ok(true) => info!("✓ Saved global variables"),
        Ok(false) => {}
        Err(e) => error!("Failed to save global variables: {}", e),
    }
    Ok(())
}

async fn sleep_until(deadline: Option<tokio::time::Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

fn report(outcome: Result<RunOutcome, ScriptError>) {
    match outcome {
        Ok(RunOutcome::Finished { result }) => match result {
            Some(value) => println!("(script returned {}; press enter to talk again)", value),
            None => println!("(script finished; press enter to talk again)"),
        },
        Ok(RunOutcome::Sleeping { wake_at }) => println!("  ... (until {}ms)", wake_at.millis()),
        Ok(RunOutcome::AwaitingInput(_)) | Ok(RunOutcome::Discarded) => {}
        Err(e) => error!("Script error: {}", e),
    }
}

/// Turn a console line into the answer a parked state waits for
fn parse_answer(kind: InputKind, line: &str) -> Option<Answer> {
    let dismissed = line.eq_ignore_ascii_case("close") || line.eq_ignore_ascii_case("cancel");
    match kind {
        InputKind::Next if !dismissed => Some(Answer::Next),
        InputKind::Menu if dismissed => Some(Answer::Menu(MENU_CANCEL)),
        InputKind::Menu => line.parse().ok().map(Answer::Menu),
        _ if dismissed => Some(Answer::Closed),
        InputKind::Close => Some(Answer::Closed),
        InputKind::Number => line.parse().ok().map(Answer::Number),
        InputKind::Text => Some(Answer::Text(line.to_string())),
        InputKind::Next => None,
    }
}
