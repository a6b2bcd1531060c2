//! Structural views over Moltbook API responses.
//!
//! The API is an external, evolving collaborator, so these types are
//! deliberately loose: every field except `id` is optional and unknown keys
//! are kept in `extra`.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Name used when a post or comment has no usable author.
pub const UNKNOWN_AUTHOR: &str = "unknown";

// ---------- Sort modes ----------

/// Post sort for feed listing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PostSort {
    #[default]
    Hot,
    New,
    Top,
    Rising,
}

impl PostSort {
    pub fn as_str(self) -> &'static str {
        match self {
            PostSort::Hot => "hot",
            PostSort::New => "new",
            PostSort::Top => "top",
            PostSort::Rising => "rising",
        }
    }
}

impl std::str::FromStr for PostSort {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "hot" => Ok(PostSort::Hot),
            "new" => Ok(PostSort::New),
            "top" => Ok(PostSort::Top),
            "rising" => Ok(PostSort::Rising),
            other => Err(format!(
                "unknown sort {other:?} (expected hot, new, top or rising)"
            )),
        }
    }
}

// ---------- Authors and submolts ----------

/// Author as sent by the API: either a bare name or an agent object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AuthorRef {
    Name(String),
    Agent(NamedObject),
}

impl AuthorRef {
    /// Trimmed author name, or `"unknown"`.
    pub fn name(&self) -> &str {
        let name = match self {
            AuthorRef::Name(name) => name.as_str(),
            AuthorRef::Agent(agent) => agent.name.as_deref().unwrap_or_default(),
        };
        match name.trim() {
            "" => UNKNOWN_AUTHOR,
            trimmed => trimmed,
        }
    }
}

/// Submolt as sent by the API: either a bare name or a submolt object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SubmoltRef {
    Name(String),
    Submolt(NamedObject),
}

impl SubmoltRef {
    /// Trimmed submolt name; empty when unknown.
    pub fn name(&self) -> &str {
        match self {
            SubmoltRef::Name(name) => name.trim(),
            SubmoltRef::Submolt(submolt) => submolt.name.as_deref().unwrap_or_default().trim(),
        }
    }
}

/// Any object identified by a `name` key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedObject {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// ---------- Posts ----------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<AuthorRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submolt: Option<SubmoltRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upvotes: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub downvotes: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Post {
    /// Post with only an id; handy for diffing id lists.
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: None,
            content: None,
            url: None,
            author: None,
            submolt: None,
            upvotes: None,
            downvotes: None,
            comment_count: None,
            created_at: None,
            extra: Map::new(),
        }
    }

    pub fn author_name(&self) -> &str {
        self.author.as_ref().map_or(UNKNOWN_AUTHOR, AuthorRef::name)
    }

    pub fn submolt_name(&self) -> &str {
        self.submolt.as_ref().map_or("", SubmoltRef::name)
    }

    pub fn title(&self) -> &str {
        self.title.as_deref().unwrap_or_default()
    }

    pub fn upvotes(&self) -> i64 {
        self.upvotes.unwrap_or(0)
    }

    pub fn comment_count(&self) -> u64 {
        self.comment_count.unwrap_or(0)
    }

    /// Upvotes minus downvotes.
    pub fn score(&self) -> i64 {
        self.upvotes() - self.downvotes.unwrap_or(0)
    }
}

// ---------- Comments ----------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    #[serde(default, deserialize_with = "opt_id_string", skip_serializing_if = "Option::is_none")]
    pub post_id: Option<String>,
    #[serde(default, deserialize_with = "opt_id_string")]
    pub parent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<AuthorRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upvotes: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty", skip_serializing_if = "Vec::is_empty")]
    pub replies: Vec<Comment>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Comment {
    pub fn author_name(&self) -> &str {
        self.author.as_ref().map_or(UNKNOWN_AUTHOR, AuthorRef::name)
    }

    pub fn content(&self) -> &str {
        self.content.as_deref().unwrap_or_default()
    }

    pub fn upvotes(&self) -> i64 {
        self.upvotes.unwrap_or(0)
    }
}

// ---------- Response envelopes ----------

/// Extract the post list from a feed, submolt or search response.
///
/// Accepts a raw array `[...]` or an object with `posts`, `data` or
/// `recentPosts`.
pub fn posts_from_value(value: &Value) -> serde_json::Result<Vec<Post>> {
    list_from_value(value, &["posts", "data", "recentPosts"])
}

/// Extract the comment list from a comments response or post detail.
pub fn comments_from_value(value: &Value) -> serde_json::Result<Vec<Comment>> {
    list_from_value(value, &["comments", "data"])
}

fn list_from_value<T: serde::de::DeserializeOwned>(
    value: &Value,
    keys: &[&str],
) -> serde_json::Result<Vec<T>> {
    if value.is_array() {
        return Vec::<T>::deserialize(value);
    }
    for key in keys {
        match value.get(*key) {
            Some(list) if list.is_array() => return Vec::<T>::deserialize(list),
            _ => {}
        }
    }
    Ok(Vec::new())
}

/// A single post together with its comment tree.
#[derive(Debug, Clone, PartialEq)]
pub struct PostDetail {
    pub post: Post,
    pub comments: Vec<Comment>,
}

impl PostDetail {
    /// Decode `GET /posts/{id}`: either `{post, comments}` or a post object
    /// with embedded `comments`.
    pub fn from_value(value: &Value) -> serde_json::Result<Self> {
        let post_value = match value.get("post") {
            Some(post) if post.is_object() => post,
            _ => value,
        };
        let post = Post::deserialize(post_value)?;
        let comments = match value.get("comments") {
            Some(list) if list.is_array() => Vec::<Comment>::deserialize(list)?,
            _ => match post_value.get("comments") {
                Some(list) if list.is_array() => Vec::<Comment>::deserialize(list)?,
                _ => Vec::new(),
            },
        };
        Ok(Self { post, comments })
    }
}

/// Agent name from a `GET /me` response (`{agent: {name}}` or `{name}`).
pub fn agent_name_from_value(value: &Value) -> Option<&str> {
    let agent = match value.get("agent") {
        Some(agent) if agent.is_object() => agent,
        _ => value,
    };
    agent
        .get("name")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|name| !name.is_empty())
}

/// Id of a newly created comment (`{comment: {id}}` or `{id}`).
pub fn created_comment_id(value: &Value) -> Option<String> {
    let comment = match value.get("comment") {
        Some(comment) if comment.is_object() => comment,
        _ => value,
    };
    match comment.get("id")? {
        Value::String(id) if !id.is_empty() => Some(id.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

// ---------- Lenient field decoding ----------

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Str(String),
    Int(i64),
    UInt(u64),
}

impl From<RawId> for String {
    fn from(raw: RawId) -> Self {
        match raw {
            RawId::Str(s) => s,
            RawId::Int(n) => n.to_string(),
            RawId::UInt(n) => n.to_string(),
        }
    }
}

fn id_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    RawId::deserialize(deserializer).map(String::from)
}

fn opt_id_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(Option::<RawId>::deserialize(deserializer)?.map(String::from))
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn post_sort_as_str() {
        assert_eq!(PostSort::Hot.as_str(), "hot");
        assert_eq!(PostSort::New.as_str(), "new");
        assert_eq!(PostSort::Top.as_str(), "top");
        assert_eq!(PostSort::Rising.as_str(), "rising");
        assert_eq!("NEW".parse::<PostSort>().unwrap(), PostSort::New);
        assert!("best".parse::<PostSort>().is_err());
    }

    #[test]
    fn post_accepts_object_and_string_authors() {
        let post: Post = serde_json::from_value(json!({
            "id": "abc-123",
            "title": "Test Post",
            "author": {"id": "x", "name": "Eos", "karma": 33},
            "submolt": {"name": "general", "display_name": "General"},
            "upvotes": 5,
            "comment_count": 3,
            "is_pinned": false
        }))
        .unwrap();
        assert_eq!(post.author_name(), "Eos");
        assert_eq!(post.submolt_name(), "general");
        assert_eq!(post.extra.get("is_pinned"), Some(&json!(false)));

        let post: Post =
            serde_json::from_value(json!({"id": 7, "author": "Bot", "submolt": "dev"})).unwrap();
        assert_eq!(post.id, "7");
        assert_eq!(post.author_name(), "Bot");
        assert_eq!(post.submolt_name(), "dev");
        assert_eq!(post.upvotes(), 0);
    }

    #[test]
    fn missing_author_is_unknown() {
        let post: Post = serde_json::from_value(json!({"id": "1", "author": null})).unwrap();
        assert_eq!(post.author_name(), UNKNOWN_AUTHOR);
        let post: Post = serde_json::from_value(json!({"id": "1", "author": {"name": " "}})).unwrap();
        assert_eq!(post.author_name(), UNKNOWN_AUTHOR);
    }

    #[test]
    fn posts_from_any_envelope() {
        let bare = json!([{"id": "1"}, {"id": "2"}]);
        let wrapped = json!({"success": true, "posts": [{"id": "1"}, {"id": "2"}]});
        let data = json!({"data": [{"id": "1"}, {"id": "2"}]});
        for value in [bare, wrapped, data] {
            let ids: Vec<_> = posts_from_value(&value)
                .unwrap()
                .into_iter()
                .map(|p| p.id)
                .collect();
            assert_eq!(ids, ["1", "2"]);
        }
        assert!(posts_from_value(&json!({"success": true})).unwrap().is_empty());
    }

    #[test]
    fn post_detail_from_both_shapes() {
        let split = json!({
            "post": {"id": "p1", "title": "T"},
            "comments": [{"id": "c1", "replies": [{"id": "c2", "parent_id": "c1"}]}]
        });
        let detail = PostDetail::from_value(&split).unwrap();
        assert_eq!(detail.post.id, "p1");
        assert_eq!(detail.comments.len(), 1);
        assert_eq!(detail.comments[0].replies[0].parent_id.as_deref(), Some("c1"));

        let embedded = json!({"id": "p1", "title": "T", "comments": [{"id": "c1", "replies": null}]});
        let detail = PostDetail::from_value(&embedded).unwrap();
        assert_eq!(detail.comments.len(), 1);
        assert!(detail.comments[0].replies.is_empty());
    }

    #[test]
    fn agent_name_and_comment_id_extraction() {
        assert_eq!(agent_name_from_value(&json!({"agent": {"name": "Eos"}})), Some("Eos"));
        assert_eq!(agent_name_from_value(&json!({"name": "Eos"})), Some("Eos"));
        assert_eq!(agent_name_from_value(&json!({"agent": {}})), None);

        assert_eq!(
            created_comment_id(&json!({"success": true, "comment": {"id": "c9"}})),
            Some("c9".to_string())
        );
        assert_eq!(created_comment_id(&json!({"id": 12})), Some("12".to_string()));
        assert_eq!(created_comment_id(&json!({"success": true})), None);
    }
}
