use log::{error, info, warn};
use std::env;
use std::process::ExitCode;

use trusty_elect::election::{self, audit};
use trusty_elect::{Config, Database};

// Prints the results projection of an election as JSON, for report
// generators. Takes an election id, or uses the active election.
#[tokio::main]
async fn main() -> ExitCode {
    // Initialize logging
    dotenvy::dotenv().ok();
    env_logger::init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };
    info!(
        "Final scrutiny round is {}",
        config.rules.final_scrutiny_round
    );

    // Initialize database
    let database = match Database::connect(&config.database).await {
        Ok(db) => db,
        Err(e) => {
            error!("Failed to initialize database: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let election_id = match env::args().nth(1) {
        Some(id) => id,
        None => match election::active_election(&database).await {
            Ok(Some(active)) => active.id,
            Ok(None) => {
                warn!("No election is active and no election id was given");
                return ExitCode::SUCCESS;
            }
            Err(e) => {
                error!("Failed to look up the active election: {}", e);
                return ExitCode::FAILURE;
            }
        },
    };

    let report = match audit::project(&database, &election_id).await {
        Ok(report) => report,
        Err(e) => {
            error!("Failed to build results for election {}: {}", election_id, e);
            return ExitCode::FAILURE;
        }
    };

    match report.to_json() {
        Ok(json) => {
            println!("{}", json);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Failed to serialize results: {}", e);
            ExitCode::FAILURE
        }
    }
}
