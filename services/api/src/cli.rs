use crate::demo::{run_demo, run_roll_check, DemoArgs, RollCheckArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use homefax::error::AppError;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "HomeFax",
    about = "Run the HomeFax property record service or walk through its workflows",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Inspect county property roll exports before loading them
    Roll {
        #[command(subcommand)]
        command: RollCommand,
    },
    /// Run a scripted renovation walkthrough against an in-memory platform
    Demo(DemoArgs),
}

#[derive(Subcommand, Debug)]
enum RollCommand {
    /// Parse a roll CSV and summarize what would be imported
    Check(RollCheckArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
    /// County roll CSV to load at startup (overrides APP_PROPERTY_ROLL)
    #[arg(long)]
    pub(crate) roll: Option<PathBuf>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Roll {
            command: RollCommand::Check(args),
        } => run_roll_check(args),
        Command::Demo(args) => run_demo(args),
    }
}
