use std::io::{self, BufRead, Write};

use anyhow::{Context, Result};
use lxsh_client::{Console, LxdSession};
use serde_json::{json, Value};

use crate::cli_args::{Cli, CliCommand};

const SHELL_EXIT_COMMANDS: [&str; 2] = ["exit", "quit"];

pub(crate) fn run_cli(cli: Cli) -> Result<()> {
    let config = cli.session_config()?;
    let needs_auth = config.auth_material()?.is_configured();
    let mut session = LxdSession::new(config).context("failed to create LXD session")?;
    tracing::debug!(session = session.name(), command = ?cli.command, "lxsh dispatch");

    let outcome = dispatch(&mut session, &cli.command, needs_auth);
    session.close();
    outcome
}

fn dispatch(session: &mut LxdSession, command: &CliCommand, needs_auth: bool) -> Result<()> {
    if needs_auth && !matches!(command, CliCommand::Shell { no_login: false }) {
        session.ensure_authenticated()?;
    }
    match command {
        CliCommand::Run { command } => {
            let output = session.run(&command.join(" "), None)?;
            if !output.is_empty() {
                println!("{output}");
            }
        }
        CliCommand::Shell { no_login } => {
            if !no_login {
                session.login()?;
            }
            let stdin = io::stdin();
            let stdout = io::stdout();
            run_shell(session, stdin.lock(), stdout.lock())?;
        }
        CliCommand::Info => {
            let info = session.instance_info()?;
            print_json(&json!({
                "name": info.name,
                "status": info.status,
                "status_code": info.status_code,
            }))?;
        }
        CliCommand::Start => print_json(&session.start()?)?,
        CliCommand::Stop => print_json(&session.stop()?)?,
        CliCommand::Restart => print_json(&session.restart()?)?,
    }
    Ok(())
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Sends each input line as a command and echoes the result text. Returns the number of commands sent.
pub(crate) fn run_shell<R, W>(console: &mut dyn Console, input: R, mut output: W) -> Result<usize>
where
    R: BufRead,
    W: Write,
{
    let mut sent = 0;
    for line in input.lines() {
        let line = line.context("failed to read command from stdin")?;
        let command = line.trim();
        if SHELL_EXIT_COMMANDS.contains(&command) {
            break;
        }
        if command.is_empty() {
            continue;
        }
        let text = console.send(command).text();
        if text.ends_with('\n') || text.is_empty() {
            write!(output, "{text}")?;
        } else {
            writeln!(output, "{text}")?;
        }
        output.flush()?;
        sent += 1;
    }
    Ok(sent)
}
