//!
//! StructIQe CLI console
//! ---------------------
//! Command-line console for operating against a running StructIQe server.
//! Signs in through the HTTP API, keeps the session in a local state dir and
//! drives the directory/override endpoints. Supports one-shot commands and an
//! interactive interpreter.

use std::env;

use anyhow::{anyhow, Result};
use rustyline::error::ReadlineError;

use structiqe::cli::connectivity::ApiSession;
use structiqe::cli::outputformatter::print_rows;

const DEFAULT_API: &str = "http://127.0.0.1:3001";
const DEFAULT_STATE_DIR: &str = ".structiqe-cli";

fn print_usage(program: &str) {
    eprintln!(
        "Usage:\n  {program} [--api <url>] [--state <dir>] <command> [args]\n  {program} [--api <url>] [--state <dir>] --repl    # start interactive interpreter\n\nFlags:\n  --api <url>      StructIQe server base URL (default: {DEFAULT_API})\n  --state <dir>    Local session state directory (default: {DEFAULT_STATE_DIR})\n  --repl           Start interactive mode\n  -h, --help       Show this help\n\nCommands:\n  status                              show current sign-in state\n  signin <email> <password>           sign in and persist the session locally\n  signout                             sign out and clear the local session\n  companies                           list companies\n  employees <companyId>               list a company's employees with access\n  overrides                           list feature overrides (newest first)\n  allow <employeeId> <featureKey> <true|false>   set an override\n  clear <employeeId> <featureKey>     delete an override\n\nExamples:\n  {program} signin ops@example.com s3cret\n  {program} companies\n  {program} allow 42 darkMode true\n  {program} --repl"
    );
}

struct Options {
    api: String,
    state_dir: String,
    repl: bool,
    command: Vec<String>,
}

fn parse_args(args: &[String]) -> Result<Options> {
    let mut opts = Options {
        api: DEFAULT_API.to_string(),
        state_dir: DEFAULT_STATE_DIR.to_string(),
        repl: false,
        command: Vec::new(),
    };
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--api" => {
                i += 1;
                opts.api = args.get(i).cloned().ok_or_else(|| anyhow!("--api needs a URL"))?;
            }
            "--state" => {
                i += 1;
                opts.state_dir =
                    args.get(i).cloned().ok_or_else(|| anyhow!("--state needs a directory"))?;
            }
            "--repl" => opts.repl = true,
            "-h" | "--help" => {
                opts.command = vec!["help".to_string()];
                return Ok(opts);
            }
            _ => {
                // first non-flag token starts the command
                opts.command = args[i..].to_vec();
                break;
            }
        }
        i += 1;
    }
    Ok(opts)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    let program = args.first().cloned().unwrap_or_else(|| "structiqe_cli".to_string());
    let opts = match parse_args(&args[1..]) {
        Ok(o) => o,
        Err(e) => {
            eprintln!("{e}");
            print_usage(&program);
            std::process::exit(2);
        }
    };

    let mut session = ApiSession::open(&opts.api, &opts.state_dir)?;

    if opts.repl {
        return run_repl(&mut session).await;
    }
    if opts.command.is_empty() || opts.command[0] == "help" {
        print_usage(&program);
        return Ok(());
    }
    run_command(&mut session, &opts.command).await
}

async fn run_command(session: &mut ApiSession, parts: &[String]) -> Result<()> {
    match parts[0].as_str() {
        "status" => {
            match session.current() {
                Some((s, g)) => println!(
                    "signed in as {} ({}) until {}",
                    s.email, g.role, s.expires_at
                ),
                None => println!("not signed in"),
            }
            Ok(())
        }
        "signin" => {
            let (email, password) = match (parts.get(1), parts.get(2)) {
                (Some(e), Some(p)) => (e, p),
                _ => return Err(anyhow!("usage: signin <email> <password>")),
            };
            let message = session.sign_in(email, password).await?;
            println!("{message}");
            Ok(())
        }
        "signout" => {
            session.sign_out().await?;
            println!("signed out");
            Ok(())
        }
        "companies" => print_result(&session.companies().await?),
        "employees" => {
            let company = parts.get(1).ok_or_else(|| anyhow!("usage: employees <companyId>"))?;
            print_result(&session.employees(company).await?)
        }
        "overrides" => print_result(&session.overrides().await?),
        "allow" => {
            let (emp, key, allow) = match (parts.get(1), parts.get(2), parts.get(3)) {
                (Some(e), Some(k), Some(a)) => (e, k, a),
                _ => return Err(anyhow!("usage: allow <employeeId> <featureKey> <true|false>")),
            };
            let allow: bool = allow
                .parse()
                .map_err(|_| anyhow!("allow must be `true` or `false`, got `{allow}`"))?;
            print_result(&session.set_override(emp, key, allow).await?)
        }
        "clear" => {
            let (emp, key) = match (parts.get(1), parts.get(2)) {
                (Some(e), Some(k)) => (e, k),
                _ => return Err(anyhow!("usage: clear <employeeId> <featureKey>")),
            };
            session.clear_override(emp, key).await?;
            println!("cleared");
            Ok(())
        }
        other => Err(anyhow!("unknown command: {other} (try `help`)")),
    }
}

fn print_result(val: &serde_json::Value) -> Result<()> {
    if !print_rows(val) {
        println!("{}", serde_json::to_string_pretty(val)?);
    }
    Ok(())
}

async fn run_repl(session: &mut ApiSession) -> Result<()> {
    println!("StructIQe console — connected to {} (type `help` or `quit`)", session.base());
    let mut rl = rustyline::DefaultEditor::new()?;
    loop {
        match rl.readline("structiqe> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if line == "quit" || line == "exit" {
                    break;
                }
                let _ = rl.add_history_entry(line);
                let parts: Vec<String> = line.split_whitespace().map(|s| s.to_string()).collect();
                if parts[0] == "help" {
                    print_usage("structiqe_cli");
                    continue;
                }
                if let Err(e) = run_command(session, &parts).await {
                    eprintln!("error: {e}");
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}
