// src/main.rs

use dagvisor::{cli, logging, run};

#[tokio::main]
async fn main() {
    match run_main().await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(err) => {
            eprintln!("dagvisor error: {err:?}");
            std::process::exit(1);
        }
    }
}

/// Returns whether the workflow succeeded.
async fn run_main() -> anyhow::Result<bool> {
    let args = cli::parse();
    logging::init_logging(args.log_level)?;
    let outcome = run(args).await?;
    Ok(outcome.is_success())
}
