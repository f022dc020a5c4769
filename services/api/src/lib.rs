mod cli;
mod infra;
mod routes;
mod server;
mod session;

use slotboard::error::AppError;

pub async fn run() -> Result<(), AppError> {
    cli::run().await
}
