//! Sample command set of the `termplex` binary

use crate::core::command::{CommandError, CommandTable, Output};
use clap::Parser;
use serde_json::Value;

/// Permission level required by `restart`
pub const RESTART_PERMISSION: u32 = 5;

/// Prints welcome message
#[derive(Parser, Debug)]
#[command(name = "welcome")]
pub struct WelcomeArgs {
    /// Print the long message
    #[arg(short, long)]
    pub verbose: bool,
    /// Print the short message
    #[arg(short, long)]
    pub quiet: bool,
}

/// Controls an led
#[derive(Parser, Debug)]
#[command(name = "led")]
pub struct LedArgs {
    /// Led state: on, off, 1 or 0
    #[arg(value_parser = parse_state, action = clap::ArgAction::Set, required = true)]
    pub state: bool,
    /// Report the new state
    #[arg(short, long)]
    pub verbose: bool,
}

/// Restarts the device
#[derive(Parser, Debug)]
#[command(name = "restart")]
pub struct RestartArgs {}

/// Shows the session and output this command runs with
#[derive(Parser, Debug)]
#[command(name = "whoami")]
pub struct WhoamiArgs {}

fn parse_state(value: &str) -> Result<bool, String> {
    match value.to_lowercase().as_str() {
        "on" | "1" | "true" => Ok(true),
        "off" | "0" | "false" => Ok(false),
        other => Err(format!("expected on/off or 1/0, got '{other}'")),
    }
}

/// Register the sample commands
pub fn load(table: &mut CommandTable) -> Result<(), CommandError> {
    table.register("welcome", 0, |args: WelcomeArgs, out: &mut Output| {
        if args.quiet && !args.verbose {
            out.println("Welcome to Termplex.");
        } else {
            out.println("Welcome to Termplex, a command line over every stream you mount!");
        }
        Ok(())
    })?;

    let mut led = false;
    table.register("led", 0, move |args: LedArgs, out: &mut Output| {
        led = args.state;
        if args.verbose {
            out.println(format!("Led turned {}.", if led { "on" } else { "off" }));
        }
        Ok(u8::from(led))
    })?;

    table.register("restart", RESTART_PERMISSION, |_: RestartArgs, out: &mut Output| {
        tracing::warn!(session = %out.source(), "restart requested");
        out.println("Restarting...");
        Ok(())
    })?;

    table.register("whoami", 0, |_: WhoamiArgs, out: &mut Output| {
        let text = format!("session {} writing to {}", out.source(), out.destination());
        out.println(&text);
        Ok(text)
    })?;

    Ok(())
}

/// Result handler printing non-null return values, e.g. `'led 1' returned: 1`
pub fn print_result(line: &str, value: &Value, out: &mut Output) -> anyhow::Result<()> {
    if !value.is_null() {
        out.println(format!("'{line}' returned: {value}"));
    }
    Ok(())
}
