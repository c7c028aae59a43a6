//! Termplex - command line over every stream you mount
//!
//! Runs the session engine with the sample command set on:
//! - Standard input/output
//! - TCP listening servers and outbound TCP connections
//! - Serial ports
//! - Command files

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use termplex_core::cli::{commands, print_exit_codes, CliResult, ExitCodes};
use termplex_core::config::{
    AppConfig, FileSessionConfig, LoggingConfig, SerialSessionConfig, StdioSessionConfig, TcpSessionConfig,
};
use termplex_core::core::command::CommandTable;
use termplex_core::core::dispatch::Engine;
use termplex_core::core::session::Session;
use termplex_core::core::transport::{file, serial, stdio, tcp, SerialConfig, TcpConfig, TcpServer, TcpServerConfig};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Termplex CLI
#[derive(Parser, Debug)]
#[command(name = "termplex", version, about = "Command line session engine over serial, TCP, files and stdio", long_about = None)]
struct Cli {
    /// Config file (defaults to the platform config dir)
    #[arg(short, long, global = true, env = "TERMPLEX_CONFIG")]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the engine on the configured transports plus the ones given here
    Run(RunArgs),

    /// List available serial ports
    ListPorts,

    /// Write a commented starting config
    InitConfig {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Print the effective config
    ShowConfig,

    /// Print the exit code table
    ExitCodes,
}

#[derive(clap::Args, Debug)]
struct RunArgs {
    /// Open a session on stdin/stdout
    #[arg(long)]
    stdio: bool,

    /// Accept sessions on an address, e.g. 0.0.0.0:5555
    #[arg(long, value_name = "ADDR")]
    listen: Vec<String>,

    /// Open a session to HOST:PORT
    #[arg(long, value_name = "HOST:PORT")]
    connect: Vec<String>,

    /// Open a session on a serial port
    #[arg(long, value_name = "PORT")]
    serial: Option<String>,

    /// Serial baud rate
    #[arg(long, default_value_t = 115_200)]
    baud: u32,

    /// Read commands from a file
    #[arg(long, requires = "output")]
    input: Option<PathBuf>,

    /// Write results of the file session here
    #[arg(long, requires = "input")]
    output: Option<PathBuf>,

    /// Permission level of the sessions opened by these flags
    #[arg(short, long, default_value_t = 0)]
    permission: u32,

    /// Echo template of the sessions opened by these flags
    #[arg(long)]
    echo: Option<String>,

    /// Answer `help` with the permitted commands
    #[arg(long)]
    builtin_help: bool,

    /// Stop once every session has ended
    #[arg(long)]
    exit_when_idle: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::from(ExitCodes::SUCCESS),
        Err(e) => {
            let result = CliResult::from_error(&e);
            tracing::error!(error = %format!("{e:#}"), "termplex failed");
            if let Some(message) = result.message() {
                eprintln!("error: {message}");
            }
            result.to_exit_code()
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config_path = match &cli.config {
        Some(path) => path.clone(),
        None => AppConfig::default_path()?,
    };

    match cli.command {
        Commands::ListPorts => list_ports(),
        Commands::ExitCodes => {
            print_exit_codes();
            Ok(())
        }
        Commands::InitConfig { force } => init_config(&config_path, force),
        Commands::ShowConfig => {
            let config = AppConfig::load_from(&config_path)?;
            println!("# {}", config_path.display());
            print!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
        Commands::Run(args) => {
            let mut config = AppConfig::load_from(&config_path)?;
            let _guard = init_logging(&config.logging, cli.verbose)?;
            tracing::info!("Starting Termplex v{}", termplex_core::VERSION);
            apply_run_args(&mut config, &args)?;
            serve(config).await
        }
    }
}

fn init_logging(config: &LoggingConfig, verbose: bool) -> anyhow::Result<Option<WorkerGuard>> {
    let level = if verbose { "debug" } else { config.level.as_str() };
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?;

    let stderr = tracing_subscriber::fmt::layer().with_writer(std::io::stderr).with_target(false);

    let (file_layer, guard) = if config.file {
        let directory = config
            .directory
            .clone()
            .or_else(termplex_core::config::log_dir)
            .context("no log directory available")?;
        std::fs::create_dir_all(&directory)
            .with_context(|| format!("creating log directory {}", directory.display()))?;
        let appender = tracing_appender::rolling::daily(directory, "termplex.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let layer = tracing_subscriber::fmt::layer().with_writer(writer).with_ansi(false);
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr)
        .with(file_layer)
        .try_init()?;
    Ok(guard)
}

fn apply_run_args(config: &mut AppConfig, args: &RunArgs) -> anyhow::Result<()> {
    config.engine.builtin_help |= args.builtin_help;
    config.engine.stop_when_idle |= args.exit_when_idle;

    if args.stdio {
        config.stdio = Some(StdioSessionConfig {
            permission: args.permission,
            echo: args.echo.clone(),
        });
    }
    for addr in &args.listen {
        let mut server = TcpServerConfig::new(addr).permission(args.permission);
        if let Some(echo) = &args.echo {
            server = server.echo(Some(echo.clone()));
        }
        config.tcp_servers.push(server);
    }
    for target in &args.connect {
        let (host, port) = target
            .rsplit_once(':')
            .context(format!("expected HOST:PORT, got '{target}'"))?;
        let port = port.parse().with_context(|| format!("invalid port in '{target}'"))?;
        config.tcp_clients.push(TcpSessionConfig {
            tcp: TcpConfig::new(host, port),
            permission: args.permission,
            echo: args.echo.clone(),
        });
    }
    if let Some(port) = &args.serial {
        config.serial.push(SerialSessionConfig {
            serial: SerialConfig::new(port, args.baud),
            permission: args.permission,
            echo: args.echo.clone(),
        });
    }
    if let (Some(input), Some(output)) = (&args.input, &args.output) {
        config.files.push(FileSessionConfig {
            input: input.clone(),
            output: output.clone(),
            append: false,
            permission: args.permission,
        });
    }
    Ok(())
}

fn with_echo(session: Session, echo: Option<&str>) -> Session {
    let session = session.on_result(commands::print_result);
    match echo.filter(|format| !format.is_empty()) {
        Some(format) => session.echo(format),
        None => session,
    }
}

async fn serve(mut config: AppConfig) -> anyhow::Result<()> {
    let mut table = CommandTable::new();
    commands::load(&mut table)?;
    let mut engine = Engine::with_commands(config.engine.clone(), table);

    let nothing_configured = config.stdio.is_none()
        && config.tcp_servers.is_empty()
        && config.tcp_clients.is_empty()
        && config.serial.is_empty()
        && config.files.is_empty();
    if nothing_configured {
        tracing::info!("no transport configured, using stdin/stdout");
        config.stdio = Some(StdioSessionConfig::default());
    }

    if let Some(console) = &config.stdio {
        engine.register_session(with_echo(stdio::open(console.permission), console.echo.as_deref()))?;
    }
    for server in &config.tcp_servers {
        engine.add_acceptor(TcpServer::bind(server.clone())?);
    }
    for client in &config.tcp_clients {
        let session = tcp::connect(&client.tcp, client.permission)
            .await
            .with_context(|| format!("connecting to {}:{}", client.tcp.host, client.tcp.port))?;
        engine.register_session(with_echo(session, client.echo.as_deref()))?;
    }
    for port in &config.serial {
        let session = serial::open(&port.serial, port.permission)
            .with_context(|| format!("opening {}", port.serial.describe()))?;
        engine.register_session(with_echo(session, port.echo.as_deref()))?;
    }
    for files in &config.files {
        let session = file::open(&files.input, &files.output, files.append, files.permission).await?;
        engine.register_session(with_echo(session, None))?;
    }

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };
    engine.run_until(shutdown).await?;
    Ok(())
}

fn list_ports() -> anyhow::Result<()> {
    let ports = serial::list_ports()?;
    if ports.is_empty() {
        println!("No serial ports found.");
        return Ok(());
    }
    for port in &ports {
        println!("  {} [{:?}]", port.port_name, port.port_type);
    }
    Ok(())
}

fn init_config(path: &Path, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!("{} already exists, use --force to overwrite", path.display());
    }

    let config = AppConfig {
        stdio: Some(StdioSessionConfig::default()),
        tcp_servers: vec![TcpServerConfig::new("127.0.0.1:5555")],
        ..AppConfig::default()
    };
    config.save_to(path)?;
    println!("Config written to {}", path.display());
    Ok(())
}
