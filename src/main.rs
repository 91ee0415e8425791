use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    portalflow_cli::cli::run().await
}
