use log::{error, info, warn};
use serde_json::json;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use vote_tally::db::FileStore;
use vote_tally::{Catalog, Config, VoteStore};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() {
    // Initialize logging
    dotenvy::dotenv().ok();
    env_logger::init();

    let config = Config::load();

    let catalog = Catalog::load_or_empty(&config.catalog_path).await;
    if catalog.is_empty() {
        warn!("Catalog is empty; every vote will be rejected");
    }

    let store = VoteStore::with_sink(
        catalog,
        Arc::new(FileStore::new(&config.data_path)),
        config.settings,
    )
    .await;

    if let Err(why) = run(&store).await {
        error!("Command loop error: {:?}", why);
    }

    // Best effort: a killed process still loses up to one debounce window.
    match store.shutdown().await {
        Ok(()) => info!("Snapshot written to {}", config.data_path.display()),
        Err(e) => error!("Final flush failed: {}", e),
    }
}

async fn run(store: &VoteStore) -> Result<(), BoxError> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, shutting down");
                return Ok(());
            }
        };
        let Some(line) = line else {
            return Ok(());
        };
        if line.trim().is_empty() {
            continue;
        }

        let reply = match handle_command(store, &line).await {
            Some(reply) => reply,
            None => return Ok(()),
        };
        stdout.write_all(reply.to_string().as_bytes()).await?;
        stdout.write_all(b"\n").await?;
        stdout.flush().await?;
    }
}

// Returns None when the session should end.
async fn handle_command(store: &VoteStore, line: &str) -> Option<serde_json::Value> {
    let line = line.trim();
    let (command, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    let rest = rest.trim();

    let reply = match (command, rest) {
        // Options may contain spaces, so everything after the poll id is the option.
        ("vote", args) if !args.is_empty() => {
            let (poll_id, option) = args.split_once(char::is_whitespace).unwrap_or((args, ""));
            match store.vote(poll_id, option).await {
                Ok(results) => json!(results),
                Err(e) => json!({ "error": e.to_string() }),
            }
        }
        ("results", poll_id) if !poll_id.is_empty() => match store.get_results(poll_id).await {
            Ok(results) => json!(results),
            Err(e) => json!({ "error": e.to_string() }),
        },
        ("polls", "") => json!(store.polls()),
        ("overview", "") => json!(store.overview().await),
        ("flush", "") => match store.force_flush().await {
            Ok(()) => json!({ "flushed": true }),
            Err(e) => json!({ "flushed": false, "error": e.to_string() }),
        },
        ("quit", "") | ("exit", "") => return None,
        _ => json!({
            "error": "Unknown command",
            "usage": ["vote <poll> <option>", "results <poll>", "polls", "overview", "flush", "quit"],
        }),
    };
    Some(reply)
}
