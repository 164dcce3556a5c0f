mod apportion;
mod config;
mod extract;
mod money;
mod oneshot;
mod parser;
mod pipeline;
mod repl;
mod report;
mod roster;
mod session_db;
mod settlement;
mod split;

use config::Config;
use tracing::{info, warn};

const CONFIG_PATH: &str = ".config/invoice_split.toml";

const USAGE: &str = "Usage:
  invoice_split                      interactive session
  invoice_split run <image> --friends a,b,c --payer a [--assign \"Item=a,b\"]... [--db path]
  invoice_split sessions             list stored sessions
  invoice_split show <session-id>    replay a stored session";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // init tracing
    tracing_subscriber::fmt()
        .with_target(true)
        .with_level(true)
        .with_env_filter("info")
        .with_writer(std::io::stderr)
        .init();

    let cfg = match Config::load(CONFIG_PATH) {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!(path = CONFIG_PATH, error = %e, "No config file, using defaults");
            Config::default()
        }
    };
    info!(backend = ?cfg.extraction.backend, db_path = %cfg.db_path, "Configuration loaded");

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        None | Some("interactive") => repl::run(&cfg).await,
        Some("run") => oneshot::run(&cfg, &args[1..]).await,
        Some("sessions") => oneshot::list_sessions(&cfg),
        Some("show") => match args.get(1) {
            Some(id) => oneshot::show_session(&cfg, id),
            None => {
                eprintln!("{USAGE}");
                Err("show needs a session id".into())
            }
        },
        Some(other) => {
            eprintln!("{USAGE}");
            Err(format!("unknown command {other:?}").into())
        }
    }
}
