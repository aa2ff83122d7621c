//! Switchyard gateway binary serving the built-in handlers.

use std::process::ExitCode;
use std::sync::Arc;

use switchyard::{StructuredHealthReporter, SystemConfigLoader, builtin, run};

#[tokio::main]
async fn main() -> ExitCode {
    let registry = match builtin::registry() {
        Ok(registry) => registry,
        Err(error) => {
            eprintln!("switchyard: {error}");
            return ExitCode::FAILURE;
        }
    };

    let shutdown = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %error, "failed to listen for shutdown signal");
        }
    };

    match run(
        &SystemConfigLoader,
        Arc::new(StructuredHealthReporter::new()),
        registry,
        shutdown,
    )
    .await
    {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            // Configuration errors surface before telemetry exists.
            eprintln!("switchyard: {error}");
            ExitCode::FAILURE
        }
    }
}
