//! hazop-runner: headless JSON-lines front end for the HAZOP core.
//!
//! Usage:
//!   hazop-runner --db hazop.db --data-dir ./data --org "Acme Refining" --user u-1
//!   hazop-runner --ipc-mode --timeout-ms 5000 < commands.jsonl
//!
//! One command per input line, one JSON reply per output line.
//! `{"cmd": "quit"}` or EOF ends the session.

use anyhow::Result;
use hazop_core::{
    command::HazopCommand, engine::HazopEngine, error::HazopError, similarity::CancelToken,
    types::TenantContext,
};
use std::env;
use std::io::{self, BufRead, Write};
use std::time::Duration;

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let ipc_mode = args.iter().any(|a| a == "--ipc-mode");
    let timeout_ms = parse_arg(&args, "--timeout-ms", 0u64);
    let db = flag_value(&args, "--db").unwrap_or(":memory:");
    let data_dir = flag_value(&args, "--data-dir").unwrap_or("./data");
    let org_name = flag_value(&args, "--org").unwrap_or("default");
    let user = flag_value(&args, "--user");

    if !ipc_mode {
        eprintln!("HAZOP risk engine: hazop-runner");
        eprintln!("  db:        {db}");
        eprintln!("  data_dir:  {data_dir}");
        eprintln!("  org:       {org_name}");
        eprintln!();
    }

    let engine = HazopEngine::build(db, data_dir)?;
    let org = engine.store().ensure_organization(org_name)?;
    let mut ctx = TenantContext::new(org.id.clone());
    if let Some(u) = user {
        ctx = ctx.with_user(u);
    }
    log::info!("session for org {} ({})", org.name, org.id);

    run_ipc_loop(&engine, &ctx, timeout_ms)
}

fn run_ipc_loop(engine: &HazopEngine, ctx: &TenantContext, timeout_ms: u64) -> Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut handle = stdin.lock();
    let mut buffer = String::new();

    loop {
        buffer.clear();
        let bytes_read = handle.read_line(&mut buffer)?;
        if bytes_read == 0 {
            break; // EOF
        }
        if buffer.trim().is_empty() {
            continue;
        }

        let raw: serde_json::Value = match serde_json::from_str(&buffer) {
            Ok(v) => v,
            Err(e) => {
                reply(&mut stdout, &serde_json::json!({ "error": e.to_string(), "kind": "parse" }))?;
                continue;
            }
        };
        if raw.get("cmd").and_then(|c| c.as_str()) == Some("quit") {
            break;
        }

        let cmd: HazopCommand = match serde_json::from_value(raw) {
            Ok(c) => c,
            Err(e) => {
                reply(&mut stdout, &serde_json::json!({ "error": e.to_string(), "kind": "parse" }))?;
                continue;
            }
        };

        let cancel = if timeout_ms > 0 {
            CancelToken::with_timeout(Duration::from_millis(timeout_ms))
        } else {
            CancelToken::new()
        };
        let response = match engine.dispatch_with(ctx, cmd, &cancel) {
            Ok(value) => serde_json::json!({ "ok": value }),
            Err(e) => error_reply(&e),
        };
        reply(&mut stdout, &response)?;
    }
    Ok(())
}

fn error_reply(e: &HazopError) -> serde_json::Value {
    if !matches!(e, HazopError::Validation { .. } | HazopError::InvalidInput { .. }) {
        log::warn!("command failed: {e}");
    }
    serde_json::json!({ "error": e.to_string(), "kind": e.kind() })
}

fn reply(out: &mut impl Write, value: &serde_json::Value) -> Result<()> {
    writeln!(out, "{value}")?;
    out.flush()?;
    Ok(())
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].as_str())
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}
