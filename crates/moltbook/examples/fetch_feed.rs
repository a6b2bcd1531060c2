//! Example: fetch the Moltbook feed and dump the raw response next to the
//! parsed view.
//!
//! Use this to debug decoding problems by seeing the exact JSON and the full
//! serde error.
//!
//! Usage:
//!   cargo run -p moltbook --example fetch_feed
//!
//! Optional: save the raw response for fixture tests:
//!   cargo run -p moltbook --example fetch_feed 2>/dev/null | head -1 > feed_response.json

use moltbook::{MoltbookClient, PostSort, Result, compact, types};

const SNIPPET_CHARS: usize = 2500;

#[tokio::main]
async fn main() -> Result<()> {
    let client = MoltbookClient::from_env(None)?;

    let raw = client.feed(PostSort::New, Some(2)).await?;
    let text = serde_json::to_string(&raw)?;
    println!("{text}");

    eprintln!("--- Raw response (first {SNIPPET_CHARS} chars) ---");
    eprintln!("{}", text.chars().take(SNIPPET_CHARS).collect::<String>());
    if text.len() > SNIPPET_CHARS {
        eprintln!("... (truncated, total {} bytes)", text.len());
    }
    eprintln!("--- End raw response ---");

    match types::posts_from_value(&raw) {
        Ok(posts) => {
            eprintln!("OK: parsed {} posts", posts.len());
            eprintln!("{}", compact::oneline_feed(&posts));
        }
        Err(e) => {
            eprintln!("Parse failed:");
            eprintln!("  {e}");
            return Err(e.into());
        }
    }

    Ok(())
}
