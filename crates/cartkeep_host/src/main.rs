use std::process::ExitCode;

use tracing::error;

mod app;

use app::bootstrap::{build_app, init_tracing};
use app::loop_runner;

fn main() -> ExitCode {
    init_tracing();

    match build_app() {
        Ok(app) => loop_runner::run(app),
        Err(err) => {
            error!(error = %err, "startup_failed");
            ExitCode::FAILURE
        }
    }
}
