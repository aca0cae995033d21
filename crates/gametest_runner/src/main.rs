mod app;

use tracing::{error, info};

fn main() {
    app::init_tracing();
    info!("=== GameTest Runner Startup ===");

    match app::run() {
        Ok(summary) if summary.succeeded() => {}
        Ok(summary) => {
            error!(failed_required = summary.failed_required, "required_tests_failed");
            std::process::exit(1);
        }
        Err(err) => {
            error!(error = %err, "run_failed");
            std::process::exit(2);
        }
    }
}
