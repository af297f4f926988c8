use crate::demo::{run_demo, run_roster_check, DemoArgs, RosterCheckArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use food_rescue::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "Food Rescue Dispatcher",
    about = "Match surplus kitchen food to shelters and volunteer couriers",
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
    /// Work with volunteer roster exports
    Roster {
        #[command(subcommand)]
        command: RosterCommand,
    },
    /// Run an offline matching cycle over sample data and print the outcome
    Demo(DemoArgs),
}

#[derive(Subcommand, Debug)]
enum RosterCommand {
    /// Validate a roster CSV and list the rows that would be rejected
    Check(RosterCheckArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
    /// Seed the registry with volunteers from a roster CSV at startup
    #[arg(long)]
    pub(crate) roster: Option<std::path::PathBuf>,
    /// Address book CSV (Address, Latitude, Longitude) for the geocoder
    #[arg(long)]
    pub(crate) locations: Option<std::path::PathBuf>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Roster {
            command: RosterCommand::Check(args),
        } => run_roster_check(args),
        Command::Demo(args) => run_demo(args).await,
    }
}
