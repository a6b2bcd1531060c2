//! HTTP client for the Moltbook API.

use crate::config::{ApiKey, ClientConfig, resolve_api_key};
use crate::error::{MoltbookError, Result};
use crate::transport::{SleepFn, Transport};
use crate::types::PostSort;
use reqwest::Method;
use serde_json::{Value, json};
use std::path::Path;

const DEFAULT_LIMIT: u32 = 25;

/// Moltbook API client.
///
/// Every method returns the server's JSON unchanged; use [`crate::types`] and
/// [`crate::compact`] to shape it. Write methods check their arguments before
/// spending a rate-limited request.
#[derive(Clone, Debug)]
pub struct MoltbookClient {
    transport: Transport,
}

impl MoltbookClient {
    /// Create a client with the given API key and default settings.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Self::with_config(ApiKey::new(api_key), &ClientConfig::default())
    }

    /// Create a client, resolving the API key from the environment or
    /// credentials files (see [`crate::config::CredentialSources::discover`]).
    pub fn from_env(credentials_path: Option<&Path>) -> Result<Self> {
        Self::with_config(resolve_api_key(credentials_path)?, &ClientConfig::default())
    }

    /// Create a client with explicit settings. Fails on a non-canonical base URL.
    pub fn with_config(api_key: ApiKey, config: &ClientConfig) -> Result<Self> {
        Ok(Self {
            transport: Transport::new(config, api_key)?,
        })
    }

    /// Wrap an existing transport.
    pub fn from_transport(transport: Transport) -> Self {
        Self { transport }
    }

    /// Replace the delay used between retries.
    pub fn with_sleep(self, sleep: SleepFn) -> Self {
        Self {
            transport: self.transport.with_sleep(sleep),
        }
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    async fn get(&self, path: &str, query: &[(&str, String)]) -> Result<Value> {
        self.transport.request(Method::GET, path, query, None).await
    }

    async fn send(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value> {
        self.transport.request(method, path, &[], body.as_ref()).await
    }

    // ---------- Feed & posts ----------

    /// Personalized feed (subscribed submolts + followed agents).
    pub async fn feed(&self, sort: PostSort, limit: Option<u32>) -> Result<Value> {
        self.get(
            "feed",
            &[
                ("sort", sort.as_str().to_string()),
                ("limit", limit.unwrap_or(DEFAULT_LIMIT).to_string()),
            ],
        )
        .await
    }

    /// Posts in one submolt.
    pub async fn posts(
        &self,
        submolt: &str,
        sort: PostSort,
        limit: Option<u32>,
        offset: Option<u32>,
    ) -> Result<Value> {
        let submolt = required("submolt", submolt)?;
        self.get(
            &format!("submolts/{}/posts", segment(submolt)),
            &[
                ("sort", sort.as_str().to_string()),
                ("limit", limit.unwrap_or(DEFAULT_LIMIT).to_string()),
                ("offset", offset.unwrap_or(0).to_string()),
            ],
        )
        .await
    }

    /// A single post with its comment tree.
    pub async fn post(&self, post_id: &str) -> Result<Value> {
        let post_id = required("post_id", post_id)?;
        self.get(&format!("posts/{}", segment(post_id)), &[]).await
    }

    /// Create a text or link post. Posting is limited to one per 30 minutes.
    pub async fn create_post(
        &self,
        submolt: &str,
        title: &str,
        content: &str,
        url: Option<&str>,
    ) -> Result<Value> {
        let submolt = required("submolt", submolt)?;
        let title = required("title", title)?;
        let url = url.map(str::trim).filter(|u| !u.is_empty());
        if content.trim().is_empty() && url.is_none() {
            return Err(MoltbookError::InvalidArgument {
                field: "content",
                reason: "must not be empty unless a url is given",
            });
        }
        let mut body = json!({"title": title, "content": content, "submolt": submolt});
        if let Some(url) = url {
            body["url"] = json!(url);
        }
        self.send(Method::POST, "posts", Some(body)).await
    }

    /// Delete your own post.
    pub async fn delete_post(&self, post_id: &str) -> Result<Value> {
        let post_id = required("post_id", post_id)?;
        self.send(Method::DELETE, &format!("posts/{}", segment(post_id)), None)
            .await
    }

    // ---------- Comments ----------

    /// Comment on a post, or reply to `parent_id` when given.
    pub async fn comment(
        &self,
        post_id: &str,
        content: &str,
        parent_id: Option<&str>,
    ) -> Result<Value> {
        let post_id = required("post_id", post_id)?;
        if content.trim().is_empty() {
            return Err(MoltbookError::empty("content"));
        }
        let mut body = json!({"content": content});
        if let Some(parent_id) = parent_id {
            body["parent_id"] = json!(required("parent_id", parent_id)?);
        }
        self.send(
            Method::POST,
            &format!("posts/{}/comments", segment(post_id)),
            Some(body),
        )
        .await
    }

    // ---------- Voting ----------

    pub async fn upvote(&self, post_id: &str) -> Result<Value> {
        let post_id = required("post_id", post_id)?;
        self.send(Method::POST, &format!("posts/{}/upvote", segment(post_id)), None)
            .await
    }

    pub async fn downvote(&self, post_id: &str) -> Result<Value> {
        let post_id = required("post_id", post_id)?;
        self.send(Method::POST, &format!("posts/{}/downvote", segment(post_id)), None)
            .await
    }

    pub async fn upvote_comment(&self, comment_id: &str) -> Result<Value> {
        let comment_id = required("comment_id", comment_id)?;
        self.send(
            Method::POST,
            &format!("comments/{}/upvote", segment(comment_id)),
            None,
        )
        .await
    }

    // ---------- Following ----------

    pub async fn follow(&self, agent_name: &str) -> Result<Value> {
        let agent_name = required("agent_name", agent_name)?;
        self.send(Method::POST, &format!("agents/{}/follow", segment(agent_name)), None)
            .await
    }

    pub async fn unfollow(&self, agent_name: &str) -> Result<Value> {
        let agent_name = required("agent_name", agent_name)?;
        self.send(Method::DELETE, &format!("agents/{}/follow", segment(agent_name)), None)
            .await
    }

    // ---------- Submolts ----------

    /// List all submolts.
    pub async fn submolts(&self) -> Result<Value> {
        self.get("submolts", &[]).await
    }

    /// Details for a single submolt.
    pub async fn submolt(&self, name: &str) -> Result<Value> {
        let name = required("name", name)?;
        self.get(&format!("submolts/{}", segment(name)), &[]).await
    }

    pub async fn create_submolt(
        &self,
        name: &str,
        display_name: &str,
        description: &str,
    ) -> Result<Value> {
        let name = required("name", name)?;
        let display_name = required("display_name", display_name)?;
        let body = json!({
            "name": name,
            "display_name": display_name,
            "description": description,
        });
        self.send(Method::POST, "submolts", Some(body)).await
    }

    pub async fn subscribe(&self, submolt: &str) -> Result<Value> {
        let submolt = required("submolt", submolt)?;
        self.send(
            Method::POST,
            &format!("submolts/{}/subscribe", segment(submolt)),
            None,
        )
        .await
    }

    pub async fn unsubscribe(&self, submolt: &str) -> Result<Value> {
        let submolt = required("submolt", submolt)?;
        self.send(
            Method::DELETE,
            &format!("submolts/{}/subscribe", segment(submolt)),
            None,
        )
        .await
    }

    // ---------- Search ----------

    /// Search posts, agents and submolts.
    pub async fn search(&self, query: &str) -> Result<Value> {
        let query = required("query", query)?;
        self.get("search", &[("q", query.to_string())]).await
    }

    // ---------- Profile ----------

    /// The authenticated agent's profile.
    pub async fn me(&self) -> Result<Value> {
        self.get("me", &[]).await
    }

    /// Another agent's profile by name.
    pub async fn profile(&self, name: &str) -> Result<Value> {
        let name = required("name", name)?;
        self.get(&format!("agents/{}", segment(name)), &[]).await
    }

    /// Claim status (pending_claim or claimed).
    pub async fn status(&self) -> Result<Value> {
        self.get("claim/status", &[]).await
    }

    pub async fn update_profile(&self, description: &str) -> Result<Value> {
        self.send(Method::PUT, "me", Some(json!({"description": description})))
            .await
    }
}

fn required<'a>(field: &'static str, value: &'a str) -> Result<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(MoltbookError::empty(field));
    }
    Ok(trimmed)
}

fn segment(value: &str) -> std::borrow::Cow<'_, str> {
    urlencoding::encode(value)
}
