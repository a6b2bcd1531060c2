//! High-level workflows that compose the client, compaction and tracker.

use crate::client::MoltbookClient;
use crate::compact::{ExtractedComment, PostSummary, extract_comments, summarize_posts};
use crate::error::{MoltbookError, Result};
use crate::tracker::{ConversationTracker, ReplyReport};
use crate::types::{PostDetail, PostSort, agent_name_from_value, created_comment_id, posts_from_value};
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

/// What an agent sees when it starts a session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Briefing {
    pub feed_hot: Vec<PostSummary>,
    pub feed_new: Vec<PostSummary>,
    pub replies: Vec<ReplyReport>,
}

/// A post with its comments flattened for reading.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PostReading {
    pub id: String,
    pub title: String,
    pub content: String,
    pub author: String,
    pub submolt: String,
    pub upvotes: i64,
    pub comment_count: u64,
    pub comments: Vec<ExtractedComment>,
}

/// Client plus tracker, for agent loops and the CLI.
#[derive(Debug)]
pub struct Session {
    client: MoltbookClient,
    tracker: ConversationTracker,
}

impl Session {
    pub fn new(tracker: ConversationTracker) -> Self {
        Self {
            client: tracker.client().clone(),
            tracker,
        }
    }

    pub fn client(&self) -> &MoltbookClient {
        &self.client
    }

    pub fn tracker(&self) -> &ConversationTracker {
        &self.tracker
    }

    pub fn tracker_mut(&mut self) -> &mut ConversationTracker {
        &mut self.tracker
    }

    /// Hot and new feeds plus any replies on watched posts.
    pub async fn start(&mut self, feed_limit: u32) -> Result<Briefing> {
        let hot = self.client.feed(PostSort::Hot, Some(feed_limit)).await?;
        let new = self.client.feed(PostSort::New, Some(feed_limit)).await?;
        let replies = self.tracker.check_replies().await?;
        Ok(Briefing {
            feed_hot: summarize_posts(&posts_from_value(&hot)?),
            feed_new: summarize_posts(&posts_from_value(&new)?),
            replies,
        })
    }

    pub async fn read_post(&self, post_id: &str) -> Result<PostReading> {
        let detail = PostDetail::from_value(&self.client.post(post_id).await?)?;
        let post = &detail.post;
        Ok(PostReading {
            id: post.id.clone(),
            title: post.title().to_string(),
            content: post.content.clone().unwrap_or_default(),
            author: post.author_name().to_string(),
            submolt: post.submolt_name().to_string(),
            upvotes: post.upvotes(),
            comment_count: post.comment_count(),
            comments: extract_comments(&detail.comments, true),
        })
    }

    /// Comment (or reply), then watch the post for replies to the new comment.
    ///
    /// The comment is not rolled back if saving the watch fails; the error is
    /// [`MoltbookError::WatchFailed`] carrying the server response.
    pub async fn comment_and_watch(
        &mut self,
        post_id: &str,
        content: &str,
        parent_id: Option<&str>,
    ) -> Result<Value> {
        let response = self.client.comment(post_id, content, parent_id).await?;
        let comment_id = created_comment_id(&response);
        if comment_id.is_none() {
            warn!(post_id, "comment response carried no id; watching the whole post");
        }
        match self.tracker.watch(post_id, comment_id.as_deref()) {
            Ok(()) => Ok(response),
            Err(err) => Err(MoltbookError::WatchFailed {
                response,
                source: Box::new(err),
            }),
        }
    }

    /// The authenticated agent's latest posts.
    pub async fn my_recent_posts(&self, limit: usize) -> Result<Vec<PostSummary>> {
        let me = self.client.me().await?;
        let Some(name) = agent_name_from_value(&me) else {
            return Ok(Vec::new());
        };
        let profile = self.client.profile(name).await?;
        let mut posts = posts_from_value(&profile)?;
        posts.truncate(limit);
        Ok(summarize_posts(&posts))
    }
}
