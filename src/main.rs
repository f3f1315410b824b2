// src/main.rs

use batchdag::engine::{EXIT_CONFIG_ERROR, EXIT_TASK_FAILURE};
use batchdag::{cli, logging, run};

#[tokio::main]
async fn main() {
    let code = match run_main().await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("batchdag error: {err:?}");
            EXIT_TASK_FAILURE
        }
    };
    std::process::exit(code);
}

async fn run_main() -> anyhow::Result<i32> {
    let args = cli::parse();
    logging::init_logging(args.log_level)?;
    match run(args).await {
        Ok(code) => Ok(code),
        Err(err) if err.is_configuration() => {
            eprintln!("batchdag error: {err}");
            Ok(EXIT_CONFIG_ERROR)
        }
        Err(err) => Err(err.into()),
    }
}
