use crate::server;
use clap::{Args, Parser, Subcommand};
use slotboard::error::AppError;
use slotboard::workflows::directory::load_position_seeds;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "Slotboard",
    about = "Run the booking allocation and notification service from the command line",
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
    /// Validate a position-template seed file and print its entries
    SeedPositions(SeedArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

#[derive(Args, Debug)]
pub(crate) struct SeedArgs {
    /// CSV file with name,min_rating,description rows
    #[arg(long)]
    pub(crate) file: PathBuf,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::SeedPositions(args) => run_seed_check(args),
    }
}

fn run_seed_check(args: SeedArgs) -> Result<(), AppError> {
    let file = std::fs::File::open(&args.file)?;
    let seeds = load_position_seeds(file).map_err(|err| {
        AppError::Booking(slotboard::workflows::booking::BookingError::Validation(
            err.to_string(),
        ))
    })?;

    println!("{} position templates:", seeds.len());
    for seed in seeds {
        println!(
            "- {} (min {}){}",
            seed.designator,
            seed.min_rating,
            if seed.description.is_empty() {
                String::new()
            } else {
                format!(": {}", seed.description)
            }
        );
    }
    Ok(())
}
