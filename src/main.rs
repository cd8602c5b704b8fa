// kiln - build orchestrator
// Entry point with clean separation of concerns

use kiln::cli::CliHandler;
use kiln::utils::Logger;

#[tokio::main]
async fn main() {
    Logger::init();

    let handler = CliHandler::new();
    if let Err(e) = handler.run().await {
        eprintln!("❌ Error: {:#}", e);
        std::process::exit(1);
    }
}
