//! Migralock CLI - run schema migrations under a database lock
//!
//! Binary name: `migralock`

use std::process;

mod cli;

use clap::Parser;
use cli::{handlers::run, Cli};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let json = cli.json;

    if let Err(err) = run(cli).await {
        let core = err.downcast_ref::<migralock_core::Error>();
        if json {
            let code = core.map_or("ERROR", migralock_core::Error::code);
            println!(
                "{}",
                serde_json::json!({ "error": { "code": code, "message": format!("{err:#}") } })
            );
        } else {
            eprintln!("Error: {err:#}");
        }

        let code = core.map_or(1, migralock_core::Error::exit_code);
        #[allow(clippy::exit)]
        process::exit(code);
    }
}
