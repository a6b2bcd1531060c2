//! Token-conscious reductions of feed and comment data.
//!
//! Everything here is pure: inputs are borrowed, outputs are new values.

use crate::types::{Comment, Post};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;

const TITLE_CHARS: usize = 80;
const COMMENT_CHARS: usize = 120;
const SUBMOLT_DESCRIPTION_CHARS: usize = 80;

// ---------- Summaries ----------

/// The fields an agent needs to triage a post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PostSummary {
    pub id: String,
    pub title: String,
    pub author: String,
    pub submolt: String,
    pub upvotes: i64,
    pub comment_count: u64,
    pub created_at: String,
}

pub fn summarize_post(post: &Post) -> PostSummary {
    PostSummary {
        id: post.id.clone(),
        title: post.title().to_string(),
        author: post.author_name().to_string(),
        submolt: post.submolt_name().to_string(),
        upvotes: post.upvotes(),
        comment_count: post.comment_count(),
        created_at: post.created_at.clone().unwrap_or_default(),
    }
}

pub fn summarize_posts(posts: &[Post]) -> Vec<PostSummary> {
    posts.iter().map(summarize_post).collect()
}

// ---------- Filtering ----------

/// Predicates for [`filter_posts`]. `None` disables a predicate.
#[derive(Debug, Clone, Default)]
pub struct PostFilter {
    pub min_upvotes: Option<i64>,
    pub authors: Option<HashSet<String>>,
    pub submolts: Option<HashSet<String>>,
}

impl PostFilter {
    pub fn min_upvotes(mut self, min: i64) -> Self {
        self.min_upvotes = Some(min);
        self
    }

    pub fn authors<I, S>(mut self, authors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.authors = Some(authors.into_iter().map(Into::into).collect());
        self
    }

    pub fn submolts<I, S>(mut self, submolts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.submolts = Some(submolts.into_iter().map(Into::into).collect());
        self
    }

    pub fn matches(&self, post: &Post) -> bool {
        if let Some(min) = self.min_upvotes {
            if post.upvotes() < min {
                return false;
            }
        }
        if let Some(authors) = &self.authors {
            if !authors.contains(post.author_name()) {
                return false;
            }
        }
        if let Some(submolts) = &self.submolts {
            if !submolts.contains(post.submolt_name()) {
                return false;
            }
        }
        true
    }
}

/// Posts satisfying every predicate in `filter`, in input order.
pub fn filter_posts(posts: &[Post], filter: &PostFilter) -> Vec<Post> {
    posts.iter().filter(|p| filter.matches(p)).cloned().collect()
}

/// Posts in `new` whose id does not appear in `old`, in `new` order.
pub fn diff_feed(old: &[Post], new: &[Post]) -> Vec<Post> {
    let seen: HashSet<&str> = old.iter().map(|p| p.id.as_str()).collect();
    new.iter()
        .filter(|p| !seen.contains(p.id.as_str()))
        .cloned()
        .collect()
}

// ---------- Comments ----------

/// A comment with its author normalized to a plain name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractedComment {
    pub id: String,
    pub author: String,
    pub content: String,
    pub upvotes: i64,
    pub parent_id: Option<String>,
    pub created_at: String,
    /// Distance from the top level (0 for top-level comments).
    pub depth: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub replies: Vec<ExtractedComment>,
}

impl ExtractedComment {
    fn from_comment(comment: &Comment, depth: usize) -> Self {
        Self {
            id: comment.id.clone(),
            author: comment.author_name().to_string(),
            content: comment.content().to_string(),
            upvotes: comment.upvotes(),
            parent_id: comment.parent_id.clone(),
            created_at: comment.created_at.clone().unwrap_or_default(),
            depth,
            replies: Vec::new(),
        }
    }
}

/// Normalize a comment tree.
///
/// With `flat`, the tree becomes a depth-first list (each parent before its
/// replies, siblings in original order). Otherwise the nesting is kept.
pub fn extract_comments(comments: &[Comment], flat: bool) -> Vec<ExtractedComment> {
    if flat {
        let mut out = Vec::new();
        flatten_into(comments, 0, &mut out);
        out
    } else {
        nest(comments, 0)
    }
}

fn flatten_into(comments: &[Comment], depth: usize, out: &mut Vec<ExtractedComment>) {
    for comment in comments {
        out.push(ExtractedComment::from_comment(comment, depth));
        flatten_into(&comment.replies, depth + 1, out);
    }
}

fn nest(comments: &[Comment], depth: usize) -> Vec<ExtractedComment> {
    comments
        .iter()
        .map(|comment| {
            let mut entry = ExtractedComment::from_comment(comment, depth);
            entry.replies = nest(&comment.replies, depth + 1);
            entry
        })
        .collect()
}

/// Depth-first walk yielding every comment in a tree with its nesting parent.
pub(crate) fn walk_comments<'a>(
    comments: &'a [Comment],
    parent: Option<&'a Comment>,
    visit: &mut impl FnMut(&'a Comment, Option<&'a Comment>),
) {
    for comment in comments {
        visit(comment, parent);
        walk_comments(&comment.replies, Some(comment), visit);
    }
}

// ---------- One-line renderings ----------

/// `[+5|3c|2h] Title (by author in submolt) #id`
pub fn oneline_post(post: &Post) -> String {
    oneline_post_at(post, Utc::now())
}

pub fn oneline_post_at(post: &Post, now: DateTime<Utc>) -> String {
    let age = relative_age_at(post.created_at.as_deref(), now);
    let title = truncate(&squash_whitespace(post.title()), TITLE_CHARS);
    let submolt = post.submolt_name();
    let place = if submolt.is_empty() {
        String::new()
    } else {
        format!(" in {submolt}")
    };
    format!(
        "[{:+}|{}c|{age}] {title} (by {}{place}) #{}",
        post.score(),
        post.comment_count(),
        post.author_name(),
        post.id
    )
}

pub fn oneline_feed(posts: &[Post]) -> String {
    let now = Utc::now();
    posts
        .iter()
        .map(|p| oneline_post_at(p, now))
        .collect::<Vec<_>>()
        .join("\n")
}

/// `[+2] author: content #id`
pub fn oneline_comment(comment: &Comment) -> String {
    let content = truncate(&squash_whitespace(comment.content()), COMMENT_CHARS);
    format!(
        "[{:+}] {}: {content} #{}",
        comment.upvotes(),
        comment.author_name(),
        comment.id
    )
}

/// Flatten a comment tree and render one indented line per comment.
pub fn oneline_comments(comments: &[Comment]) -> String {
    let mut lines = Vec::new();
    walk_depth(comments, 0, &mut |comment, depth| {
        lines.push(format!("{}{}", "  ".repeat(depth), oneline_comment(comment)));
    });
    lines.join("\n")
}

fn walk_depth<'a>(comments: &'a [Comment], depth: usize, visit: &mut impl FnMut(&'a Comment, usize)) {
    for comment in comments {
        visit(comment, depth);
        walk_depth(&comment.replies, depth + 1, visit);
    }
}

/// `m/name (N subs) description`
pub fn oneline_submolt(submolt: &Value) -> String {
    let name = submolt.get("name").and_then(Value::as_str).unwrap_or("?");
    let mut line = format!("m/{name}");
    if let Some(count) = submolt.get("subscriber_count").and_then(Value::as_u64) {
        line.push_str(&format!(" ({count} subs)"));
    }
    let description = submolt
        .get("description")
        .and_then(Value::as_str)
        .map(squash_whitespace)
        .unwrap_or_default();
    if !description.is_empty() {
        line.push(' ');
        line.push_str(&truncate(&description, SUBMOLT_DESCRIPTION_CHARS));
    }
    line
}

pub fn oneline_submolts(submolts: &[Value]) -> String {
    submolts
        .iter()
        .map(oneline_submolt)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Agent profile without the embedded post list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfileSummary {
    pub name: String,
    pub description: String,
    pub karma: i64,
    pub follower_count: u64,
    pub following_count: u64,
    pub post_count: usize,
}

/// Reduce a `GET /me` or `GET /agents/{name}` response.
pub fn summarize_profile(profile: &Value) -> ProfileSummary {
    let agent = match profile.get("agent") {
        Some(agent) if agent.is_object() => agent,
        _ => profile,
    };
    let text = |key: &str| {
        agent
            .get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };
    let post_count = ["posts", "recentPosts"]
        .iter()
        .find_map(|key| profile.get(*key).and_then(Value::as_array))
        .map_or(0, Vec::len);
    ProfileSummary {
        name: text("name"),
        description: text("description"),
        karma: agent.get("karma").and_then(Value::as_i64).unwrap_or(0),
        follower_count: agent.get("follower_count").and_then(Value::as_u64).unwrap_or(0),
        following_count: agent.get("following_count").and_then(Value::as_u64).unwrap_or(0),
        post_count,
    }
}

// ---------- Ages ----------

/// Short age label such as `45s`, `30m`, `2h`, `3d` or `2w`.
///
/// `None` or an empty string gives `?`; text that is not a timestamp is
/// returned unchanged.
pub fn relative_age(timestamp: Option<&str>) -> String {
    relative_age_at(timestamp, Utc::now())
}

pub fn relative_age_at(timestamp: Option<&str>, now: DateTime<Utc>) -> String {
    let Some(raw) = timestamp.map(str::trim).filter(|s| !s.is_empty()) else {
        return "?".to_string();
    };
    let Some(then) = parse_timestamp(raw) else {
        return raw.to_string();
    };
    let secs = (now - then).num_seconds().max(0);
    const MINUTE: i64 = 60;
    const HOUR: i64 = 60 * MINUTE;
    const DAY: i64 = 24 * HOUR;
    const WEEK: i64 = 7 * DAY;
    match secs {
        s if s < MINUTE => format!("{s}s"),
        s if s < HOUR => format!("{}m", s / MINUTE),
        s if s < DAY => format!("{}h", s / HOUR),
        s if s < WEEK => format!("{}d", s / DAY),
        s => format!("{}w", s / WEEK),
    }
}

pub(crate) fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
        .map(|naive| naive.and_utc())
}

// ---------- Text helpers ----------

fn squash_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let keep = max_chars.saturating_sub(3);
    let mut out: String = text.chars().take(keep).collect();
    out.push_str("...");
    out
}
