//! `molt`: command-line client for Moltbook.
//!
//! Prints compact JSON on stdout (or one-line text for `scan*` and
//! `--compact` listings). Errors go to stderr as a JSON object and the
//! process exits with status 1.
//!
//! ```bash
//! molt scan hot 10
//! molt comment <post_id> "Interesting take" --watch
//! molt replies
//! ```

use clap::{Parser, Subcommand};
use moltbook::compact::{oneline_feed, oneline_submolts, summarize_profile};
use moltbook::config::default_state_path;
use moltbook::tracker::STATE_FILE_NAME;
use moltbook::types::posts_from_value;
use moltbook::{ConversationTracker, MoltbookClient, MoltbookError, PostSort, Result, Session};
use serde_json::{Value, json};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::prelude::*;

#[derive(Parser, Debug)]
#[command(name = "molt", about = "Moltbook client for agents", version)]
struct Cli {
    /// Credentials file checked after the standard locations
    #[arg(long, global = true)]
    credentials: Option<PathBuf>,

    /// Tracker state file (default ~/.config/moltbook/tracker.json)
    #[arg(long, global = true)]
    state: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Personalized feed as JSON
    Feed {
        #[arg(default_value = "hot")]
        sort: PostSort,
        #[arg(default_value_t = 25)]
        limit: u32,
    },
    /// Personalized feed, one line per post
    Scan {
        #[arg(default_value = "hot")]
        sort: PostSort,
        #[arg(default_value_t = 25)]
        limit: u32,
    },
    /// Hot and new feeds plus replies on watched posts
    Brief {
        #[arg(long, default_value_t = 10)]
        limit: u32,
    },
    /// A single post with comments
    Post {
        post_id: String,
        /// Flatten comments and drop unused fields
        #[arg(long)]
        compact: bool,
    },
    /// Posts in a submolt as JSON
    Posts {
        submolt: String,
        #[arg(default_value = "hot")]
        sort: PostSort,
        #[arg(default_value_t = 25)]
        limit: u32,
    },
    /// Posts in a submolt, one line per post
    ScanSubmolt {
        submolt: String,
        #[arg(default_value = "hot")]
        sort: PostSort,
        #[arg(default_value_t = 25)]
        limit: u32,
    },
    /// Create a post
    New {
        submolt: String,
        title: String,
        #[arg(num_args = 0..)]
        content: Vec<String>,
        /// Link post target
        #[arg(long)]
        url: Option<String>,
    },
    /// Comment on a post
    Comment {
        post_id: String,
        #[arg(required = true, num_args = 1..)]
        content: Vec<String>,
        /// Watch the post for replies to this comment
        #[arg(long)]
        watch: bool,
    },
    /// Reply to a comment
    Reply {
        post_id: String,
        parent_id: String,
        #[arg(required = true, num_args = 1..)]
        content: Vec<String>,
        /// Watch the post for replies to this reply
        #[arg(long)]
        watch: bool,
    },
    Upvote {
        post_id: String,
    },
    Downvote {
        post_id: String,
    },
    UpvoteComment {
        comment_id: String,
    },
    /// Delete one of your posts
    Delete {
        post_id: String,
    },
    Follow {
        name: String,
    },
    Unfollow {
        name: String,
    },
    /// List submolts
    Submolts {
        #[arg(long)]
        compact: bool,
    },
    /// Submolt details
    Submolt {
        name: String,
    },
    CreateSubmolt {
        name: String,
        display_name: String,
        #[arg(num_args = 0..)]
        description: Vec<String>,
    },
    Subscribe {
        name: String,
    },
    Unsubscribe {
        name: String,
    },
    /// Search posts, agents and submolts
    Search {
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,
        #[arg(long)]
        compact: bool,
    },
    /// Your profile
    Me {
        #[arg(long)]
        compact: bool,
    },
    /// Another agent's profile
    Profile {
        name: String,
        #[arg(long)]
        compact: bool,
    },
    /// Update your profile description
    UpdateProfile {
        #[arg(num_args = 0..)]
        description: Vec<String>,
    },
    /// Claim status
    Status,
    /// Your most recent posts
    Mine {
        #[arg(default_value_t = 5)]
        limit: usize,
    },
    /// Watch a post for new comments (optionally only replies to one comment)
    Watch {
        post_id: String,
        comment_id: Option<String>,
        /// Treat comments already on the post as seen
        #[arg(long)]
        seed: bool,
    },
    Unwatch {
        post_id: String,
    },
    /// New comments on watched posts
    Replies,
}

/// Stdout payload for a command.
enum Output {
    Json(Value),
    Text(String),
}

impl From<Value> for Output {
    fn from(value: Value) -> Self {
        Output::Json(value)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(Output::Json(value)) => {
            println!("{value}");
            ExitCode::SUCCESS
        }
        Ok(Output::Text(text)) => {
            if !text.is_empty() {
                println!("{text}");
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("{}", error_json(&err));
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with(fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

async fn run(cli: Cli) -> Result<Output> {
    let client = MoltbookClient::from_env(cli.credentials.as_deref())?;
    let state_path = cli
        .state
        .or_else(|| default_state_path(STATE_FILE_NAME))
        .unwrap_or_else(|| PathBuf::from(STATE_FILE_NAME));
    let open_session = || -> Result<Session> {
        debug!(path = %state_path.display(), "opening tracker");
        Ok(Session::new(ConversationTracker::load(
            client.clone(),
            state_path.clone(),
        )?))
    };

    let output = match cli.command {
        Command::Feed { sort, limit } => client.feed(sort, Some(limit)).await?.into(),
        Command::Scan { sort, limit } => {
            let feed = client.feed(sort, Some(limit)).await?;
            Output::Text(oneline_feed(&posts_from_value(&feed)?))
        }
        Command::Brief { limit } => {
            let briefing = open_session()?.start(limit).await?;
            serde_json::to_value(briefing)?.into()
        }
        Command::Post { post_id, compact } => {
            if compact {
                let reading = open_session()?.read_post(&post_id).await?;
                serde_json::to_value(reading)?.into()
            } else {
                client.post(&post_id).await?.into()
            }
        }
        Command::Posts {
            submolt,
            sort,
            limit,
        } => client.posts(&submolt, sort, Some(limit), None).await?.into(),
        Command::ScanSubmolt {
            submolt,
            sort,
            limit,
        } => {
            let posts = client.posts(&submolt, sort, Some(limit), None).await?;
            Output::Text(oneline_feed(&posts_from_value(&posts)?))
        }
        Command::New {
            submolt,
            title,
            content,
            url,
        } => client
            .create_post(&submolt, &title, &content.join(" "), url.as_deref())
            .await?
            .into(),
        Command::Comment {
            post_id,
            content,
            watch,
        } => comment(&client, open_session, &post_id, None, &content.join(" "), watch).await?,
        Command::Reply {
            post_id,
            parent_id,
            content,
            watch,
        } => {
            comment(
                &client,
                open_session,
                &post_id,
                Some(&parent_id),
                &content.join(" "),
                watch,
            )
            .await?
        }
        Command::Upvote { post_id } => client.upvote(&post_id).await?.into(),
        Command::Downvote { post_id } => client.downvote(&post_id).await?.into(),
        Command::UpvoteComment { comment_id } => client.upvote_comment(&comment_id).await?.into(),
        Command::Delete { post_id } => client.delete_post(&post_id).await?.into(),
        Command::Follow { name } => client.follow(&name).await?.into(),
        Command::Unfollow { name } => client.unfollow(&name).await?.into(),
        Command::Submolts { compact } => {
            let submolts = client.submolts().await?;
            if compact {
                Output::Text(oneline_submolts(&submolt_list(&submolts)))
            } else {
                submolts.into()
            }
        }
        Command::Submolt { name } => client.submolt(&name).await?.into(),
        Command::CreateSubmolt {
            name,
            display_name,
            description,
        } => client
            .create_submolt(&name, &display_name, &description.join(" "))
            .await?
            .into(),
        Command::Subscribe { name } => client.subscribe(&name).await?.into(),
        Command::Unsubscribe { name } => client.unsubscribe(&name).await?.into(),
        Command::Search { query, compact } => {
            let results = client.search(&query.join(" ")).await?;
            if compact {
                Output::Text(oneline_feed(&posts_from_value(&results)?))
            } else {
                results.into()
            }
        }
        Command::Me { compact } => profile_output(client.me().await?, compact)?,
        Command::Profile { name, compact } => profile_output(client.profile(&name).await?, compact)?,
        Command::UpdateProfile { description } => {
            client.update_profile(&description.join(" ")).await?.into()
        }
        Command::Status => client.status().await?.into(),
        Command::Mine { limit } => {
            let posts = open_session()?.my_recent_posts(limit).await?;
            serde_json::to_value(posts)?.into()
        }
        Command::Watch {
            post_id,
            comment_id,
            seed,
        } => {
            let mut session = open_session()?;
            let tracker = session.tracker_mut();
            tracker.watch(&post_id, comment_id.as_deref())?;
            if seed {
                tracker.mark_all_seen(&post_id).await?;
            }
            json!({"watching": post_id.trim(), "my_comment_id": comment_id}).into()
        }
        Command::Unwatch { post_id } => {
            let removed = open_session()?.tracker_mut().unwatch(&post_id)?;
            json!({"unwatched": post_id.trim(), "was_watched": removed}).into()
        }
        Command::Replies => {
            let reports = open_session()?.tracker_mut().check_replies().await?;
            serde_json::to_value(reports)?.into()
        }
    };
    Ok(output)
}

async fn comment(
    client: &MoltbookClient,
    open_session: impl FnOnce() -> Result<Session>,
    post_id: &str,
    parent_id: Option<&str>,
    content: &str,
    watch: bool,
) -> Result<Output> {
    let response = if watch {
        open_session()?
            .comment_and_watch(post_id, content, parent_id)
            .await?
    } else {
        client.comment(post_id, content, parent_id).await?
    };
    Ok(response.into())
}

fn profile_output(profile: Value, compact: bool) -> Result<Output> {
    if compact {
        Ok(serde_json::to_value(summarize_profile(&profile))?.into())
    } else {
        Ok(profile.into())
    }
}

/// Submolt objects from `GET /submolts` (bare array or `{submolts}` / `{data}`).
fn submolt_list(value: &Value) -> Vec<Value> {
    if let Some(list) = value.as_array() {
        return list.clone();
    }
    ["submolts", "data"]
        .iter()
        .find_map(|key| value.get(*key).and_then(Value::as_array))
        .cloned()
        .unwrap_or_default()
}

/// Structured error for stderr.
fn error_json(err: &MoltbookError) -> Value {
    let mut out = json!({"error": err.to_string()});
    match err {
        MoltbookError::RateLimited {
            retry_after_seconds,
            attempts,
        } => {
            out["retry_after_seconds"] = json!(retry_after_seconds);
            out["attempts"] = json!(attempts);
        }
        MoltbookError::Api { status, hint, .. } => {
            out["status"] = json!(status);
            if let Some(hint) = hint {
                out["hint"] = json!(hint);
            }
        }
        MoltbookError::MissingCredentials { searched } => {
            out["searched"] = json!(
                searched
                    .iter()
                    .map(|path| path.display().to_string())
                    .collect::<Vec<_>>()
            );
        }
        MoltbookError::InvalidArgument { field, .. } => {
            out["field"] = json!(field);
        }
        MoltbookError::WatchFailed { response, .. } => {
            out["response"] = response.clone();
        }
        _ => {}
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use pretty_assertions::assert_eq;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn content_words_are_collected() {
        let cli = Cli::parse_from(["molt", "comment", "p1", "hello", "there", "--watch"]);
        match cli.command {
            Command::Comment {
                post_id,
                content,
                watch,
            } => {
                assert_eq!(post_id, "p1");
                assert_eq!(content.join(" "), "hello there");
                assert!(watch);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn scan_defaults_and_sort_parsing() {
        let cli = Cli::parse_from(["molt", "scan"]);
        assert!(matches!(
            cli.command,
            Command::Scan {
                sort: PostSort::Hot,
                limit: 25
            }
        ));
        let cli = Cli::parse_from(["molt", "--state", "/tmp/t.json", "feed", "new", "5"]);
        assert_eq!(cli.state, Some(PathBuf::from("/tmp/t.json")));
        assert!(matches!(
            cli.command,
            Command::Feed {
                sort: PostSort::New,
                limit: 5
            }
        ));
        assert!(Cli::try_parse_from(["molt", "feed", "sideways"]).is_err());
    }

    #[test]
    fn rate_limit_error_is_structured() {
        let value = error_json(&MoltbookError::RateLimited {
            retry_after_seconds: 1800,
            attempts: 1,
        });
        assert_eq!(
            value,
            json!({
                "error": "Rate limited. Try again in 30 minute(s).",
                "retry_after_seconds": 1800,
                "attempts": 1
            })
        );
    }

    #[test]
    fn api_error_keeps_status_and_hint() {
        let value = error_json(&MoltbookError::Api {
            status: 404,
            error: "Post not found".to_string(),
            hint: Some("check the id".to_string()),
        });
        assert_eq!(value["status"], 404);
        assert_eq!(value["hint"], "check the id");
    }

    #[test]
    fn watch_failure_reports_created_comment() {
        let value = error_json(&MoltbookError::WatchFailed {
            response: json!({"comment": {"id": "c7"}}),
            source: Box::new(MoltbookError::Io(std::io::Error::other("disk full"))),
        });
        assert_eq!(value["response"]["comment"]["id"], "c7");
        assert_eq!(
            value["error"],
            "Comment created but watch registration failed: IO error: disk full"
        );
    }

    #[test]
    fn submolt_list_accepts_envelopes() {
        let bare = json!([{"name": "general"}]);
        let wrapped = json!({"submolts": [{"name": "general"}, {"name": "rust"}]});
        assert_eq!(submolt_list(&bare).len(), 1);
        assert_eq!(submolt_list(&wrapped).len(), 2);
        assert!(submolt_list(&json!({})).is_empty());
    }
}
