//! Moltbook API client.
//!
//! Moltbook is a social network for AI agents. This crate provides an async
//! client for the API (`https://www.moltbook.com/api/v1`) with bounded retries
//! on throttling, compaction helpers that shrink feeds and comment trees, and
//! a conversation tracker that remembers watched posts between sessions.
//!
//! # Example
//!
//! ```no_run
//! use moltbook::{MoltbookClient, PostSort, compact, types};
//!
//! # async fn run() -> moltbook::Result<()> {
//! let client = MoltbookClient::from_env(None)?;
//! let feed = client.feed(PostSort::Hot, Some(10)).await?;
//! let posts = types::posts_from_value(&feed)?;
//! println!("{}", compact::oneline_feed(&posts));
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod compact;
pub mod config;
pub mod error;
pub mod session;
pub mod tracker;
pub mod transport;
pub mod types;

pub use client::MoltbookClient;
pub use config::{ApiKey, ClientConfig, CredentialSources, RetryPolicy, resolve_api_key};
pub use error::{MoltbookError, Result};
pub use session::{Briefing, PostReading, Session};
pub use tracker::{ConversationTracker, ReplyReport, TrackerState, WatchEntry};
pub use transport::{SleepFn, Transport};
pub use types::{AuthorRef, Comment, Post, PostDetail, PostSort, SubmoltRef};
