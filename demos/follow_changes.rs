use std::time::Duration;

use couch_stream::{ChangesQuery, ClientConfig, CouchDbClient};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct Note {
    text: Option<String>,
}

/// Polls the `_changes` feed of a database and resumes from the last sequence seen.
///
/// Usage: `cargo run --example follow_changes -- <database> [server url]`
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let database = args.next().unwrap_or_else(|| "notes".to_owned());
    let url = args.next().unwrap_or_else(|| "http://127.0.0.1:5984/".to_owned());
    let client = CouchDbClient::new(ClientConfig::new(url))?;

    let mut since = "0".to_owned();
    loop {
        let query = ChangesQuery::new()
            .since(&since)
            .feed("longpoll")
            .timeout(30_000)
            .include_docs(true);
        let mut changes = match client.query_for_streaming_changes(&database, &query).await {
            Ok(changes) => changes,
            Err(e) => {
                eprintln!("changes request failed: {e}");
                tokio::time::sleep(Duration::from_secs(5)).await;
                continue;
            }
        };

        let mut rows = changes.iterator()?;
        while rows.has_next().await? {
            let change = rows.next_row().await?;
            let note: Option<Note> = change.doc_as()?;
            println!(
                "{:?} {:?} deleted={} text={:?}",
                change.seq(),
                change.id(),
                change.is_deleted(),
                note.and_then(|n| n.text)
            );
        }
        if let Some(last_seq) = changes.last_seq().await? {
            since = last_seq;
        }
        changes.close();
    }
}
