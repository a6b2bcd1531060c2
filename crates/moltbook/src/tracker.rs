//! Cross-session reply tracking for watched posts.

use crate::client::MoltbookClient;
use crate::compact::walk_comments;
use crate::error::{MoltbookError, Result};
use crate::types::{Comment, PostDetail};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

/// Default tracker file name under the config directory.
pub const STATE_FILE_NAME: &str = "tracker.json";

/// One watched post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchEntry {
    pub post_id: String,
    /// When set, only replies beneath this comment count as new.
    #[serde(default)]
    pub my_comment_id: Option<String>,
    #[serde(default)]
    pub known_comment_ids: BTreeSet<String>,
    #[serde(default)]
    pub last_checked: Option<DateTime<Utc>>,
}

impl WatchEntry {
    pub fn new(post_id: impl Into<String>, my_comment_id: Option<String>) -> Self {
        Self {
            post_id: post_id.into(),
            my_comment_id,
            known_comment_ids: BTreeSet::new(),
            last_checked: None,
        }
    }
}

/// Persisted tracker document: post id to watch entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackerState {
    pub entries: BTreeMap<String, WatchEntry>,
}

impl TrackerState {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, post_id: &str) -> Option<&WatchEntry> {
        self.entries.get(post_id)
    }
}

/// New comments found on one watched post.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReplyReport {
    pub post_id: String,
    pub post_title: String,
    pub new_comments: Vec<Comment>,
}

/// Watches posts and reports comments that appeared since the last check.
#[derive(Debug)]
pub struct ConversationTracker {
    client: MoltbookClient,
    path: PathBuf,
    state: TrackerState,
}

impl ConversationTracker {
    /// Load state from `path`. A missing file starts empty.
    pub fn load(client: MoltbookClient, path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let state = read_state(&path)?;
        debug!(path = %path.display(), watched = state.entries.len(), "loaded tracker state");
        Ok(Self {
            client,
            path,
            state,
        })
    }

    pub fn state(&self) -> &TrackerState {
        &self.state
    }

    pub fn client(&self) -> &MoltbookClient {
        &self.client
    }

    /// Start (or restart) watching a post. Existing comments are not seeded;
    /// call [`Self::mark_all_seen`] to ignore them.
    pub fn watch(&mut self, post_id: &str, my_comment_id: Option<&str>) -> Result<()> {
        let post_id = post_id.trim();
        if post_id.is_empty() {
            return Err(MoltbookError::empty("post_id"));
        }
        let my_comment_id = my_comment_id
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string);
        self.state.entries.insert(
            post_id.to_string(),
            WatchEntry::new(post_id, my_comment_id),
        );
        write_state(&self.path, &self.state)
    }

    /// Stop watching a post. Returns whether it was watched.
    pub fn unwatch(&mut self, post_id: &str) -> Result<bool> {
        let removed = self.state.entries.remove(post_id.trim()).is_some();
        write_state(&self.path, &self.state)?;
        Ok(removed)
    }

    /// Add every comment currently on the post to its known set.
    pub async fn mark_all_seen(&mut self, post_id: &str) -> Result<()> {
        let post_id = post_id.trim();
        if !self.state.entries.contains_key(post_id) {
            return Ok(());
        }
        let detail = PostDetail::from_value(&self.client.post(post_id).await?)?;
        let mut ids = Vec::new();
        walk_comments(&detail.comments, None, &mut |comment, _| {
            ids.push(comment.id.clone())
        });
        if let Some(entry) = self.state.entries.get_mut(post_id) {
            entry.known_comment_ids.extend(ids);
        }
        write_state(&self.path, &self.state)
    }

    /// Fetch every watched post and report unseen replies.
    ///
    /// All observed comment ids become known and the state is saved once.
    /// A failed fetch aborts the call without saving.
    pub async fn check_replies(&mut self) -> Result<Vec<ReplyReport>> {
        let mut next = self.state.clone();
        let mut reports = Vec::new();

        for (post_id, entry) in next.entries.iter_mut() {
            let value = self.client.post(post_id).await?;
            let detail = PostDetail::from_value(&value)?;
            let new_comments = new_replies(&detail.comments, entry);

            let mut observed = Vec::new();
            walk_comments(&detail.comments, None, &mut |comment, _| {
                observed.push(comment.id.clone())
            });
            entry.known_comment_ids.extend(observed);
            entry.last_checked = Some(Utc::now());

            if !new_comments.is_empty() {
                debug!(post_id = %post_id, count = new_comments.len(), "new replies");
                reports.push(ReplyReport {
                    post_id: post_id.clone(),
                    post_title: detail.post.title().to_string(),
                    new_comments,
                });
            }
        }

        write_state(&self.path, &next)?;
        self.state = next;
        Ok(reports)
    }
}

/// Comments that are unknown, not the agent's own, and (when the entry is
/// scoped) below `my_comment_id`.
fn new_replies(comments: &[Comment], entry: &WatchEntry) -> Vec<Comment> {
    let mut all: Vec<&Comment> = Vec::new();
    let mut children: HashMap<&str, Vec<&str>> = HashMap::new();
    walk_comments(comments, None, &mut |comment, nested_under| {
        all.push(comment);
        if let Some(parent) = comment.parent_id.as_deref() {
            children.entry(parent).or_default().push(comment.id.as_str());
        }
        if let Some(nested_under) = nested_under {
            if comment.parent_id.as_deref() != Some(nested_under.id.as_str()) {
                children
                    .entry(nested_under.id.as_str())
                    .or_default()
                    .push(comment.id.as_str());
            }
        }
    });

    let scope = entry
        .my_comment_id
        .as_deref()
        .map(|root| descendants(root, &children));

    all.into_iter()
        .filter(|comment| !entry.known_comment_ids.contains(&comment.id))
        .filter(|comment| entry.my_comment_id.as_deref() != Some(comment.id.as_str()))
        .filter(|comment| {
            scope
                .as_ref()
                .is_none_or(|scope| scope.contains(comment.id.as_str()))
        })
        .cloned()
        .collect()
}

fn descendants<'a>(root: &str, children: &HashMap<&'a str, Vec<&'a str>>) -> BTreeSet<&'a str> {
    let mut found = BTreeSet::new();
    let mut queue: VecDeque<&str> = VecDeque::from([root]);
    while let Some(id) = queue.pop_front() {
        for &child in children.get(id).into_iter().flatten() {
            if found.insert(child) {
                queue.push_back(child);
            }
        }
    }
    found
}

fn read_state(path: &Path) -> Result<TrackerState> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Ok(TrackerState::default());
        }
        Err(err) => return Err(err.into()),
    };
    if contents.trim().is_empty() {
        return Ok(TrackerState::default());
    }
    serde_json::from_str(&contents).map_err(|source| MoltbookError::CorruptState {
        path: path.to_path_buf(),
        source,
    })
}

fn write_state(path: &Path, state: &TrackerState) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;
    let tmp_file = NamedTempFile::new_in(dir)?;
    serde_json::to_writer_pretty(tmp_file.as_file(), state)?;
    tmp_file.persist(path).map_err(|err| err.error)?;
    debug!(path = %path.display(), watched = state.entries.len(), "saved tracker state");
    Ok(())
}
