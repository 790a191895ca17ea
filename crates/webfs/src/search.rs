//! File search over a volume.
//!
//! [`FileSearcher`] asks the server when the client offers a
//! [`SearchClient`](crate::remote::SearchClient), and otherwise walks the
//! folders itself through [`Volume::update_directory`]. Either way every
//! match passes through the volume cache, so results are addressable
//! entries once the search returns.

use std::collections::{HashSet, VecDeque};

use regex::Regex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::cache::ListMode;
use crate::error::{WebFsError, WebFsResult};
use crate::url::{UrlKind, WebfsUrl};
use crate::volume::Volume;

/// What a search matches against entry names.
#[derive(Clone, Debug)]
pub enum SearchQuery {
    /// Case-insensitive substring.
    Contains(String),
    Pattern(Regex),
}

impl SearchQuery {
    pub fn contains(term: impl Into<String>) -> Self {
        Self::Contains(term.into().to_lowercase())
    }

    pub fn pattern(pattern: &str) -> WebFsResult<Self> {
        Regex::new(pattern)
            .map(Self::Pattern)
            .map_err(|e| WebFsError::invalid_argument(e.to_string()))
    }

    pub fn matches(&self, name: &str) -> bool {
        match self {
            Self::Contains(term) => name.to_lowercase().contains(term.as_str()),
            Self::Pattern(regex) => regex.is_match(name),
        }
    }
}

/// Receives search results as they are found.
pub trait SearchSink: Send {
    fn add_result(&mut self, url: WebfsUrl);
}

impl SearchSink for Vec<WebfsUrl> {
    fn add_result(&mut self, url: WebfsUrl) {
        self.push(url);
    }
}

impl SearchSink for mpsc::UnboundedSender<WebfsUrl> {
    fn add_result(&mut self, url: WebfsUrl) {
        // A dropped receiver just stops listening.
        let _ = self.send(url);
    }
}

/// One search below a start folder.
#[derive(Clone, Debug)]
pub struct FileSearcher {
    start: WebfsUrl,
    query: SearchQuery,
    recursive: bool,
}

impl FileSearcher {
    pub fn new(start: WebfsUrl, query: SearchQuery) -> Self {
        Self {
            start: start.with_kind(UrlKind::Folder),
            query,
            recursive: true,
        }
    }

    /// Limit the search to the start folder's direct children.
    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    pub fn start(&self) -> &WebfsUrl {
        &self.start
    }

    /// Run the search, returning the number of results delivered to `sink`.
    ///
    /// Cancellation is checked between results and before each folder and
    /// ends the search with [`WebFsError::Cancelled`]; results already
    /// delivered stay in the sink.
    #[tracing::instrument(skip_all, fields(volume = %volume.name(), start = %self.start))]
    pub async fn find(
        &self,
        volume: &Volume,
        sink: &mut dyn SearchSink,
        cancel: &CancellationToken,
    ) -> WebFsResult<usize> {
        if cancel.is_cancelled() {
            return Err(WebFsError::Cancelled);
        }

        if let Some(client) = volume.connect().await {
            if let Some(search) = client.search_client() {
                let root = volume.remote_path(&self.start);
                let hits = search.find(&root, &self.query, cancel).await?;
                let mut count = 0;
                for hit in hits {
                    if cancel.is_cancelled() {
                        return Err(WebFsError::Cancelled);
                    }
                    let url = volume.insert_search_result(&hit);
                    if !self.recursive && url.ascend().as_ref() != Some(&self.start) {
                        continue;
                    }
                    tracing::trace!(url = %url, "Search hit");
                    sink.add_result(url);
                    count += 1;
                }
                return Ok(count);
            }
        }

        self.traverse(volume, sink, cancel).await
    }

    /// Breadth-first walk, listing each folder once.
    async fn traverse(
        &self,
        volume: &Volume,
        sink: &mut dyn SearchSink,
        cancel: &CancellationToken,
    ) -> WebFsResult<usize> {
        let mut pending = VecDeque::from([self.start.clone()]);
        let mut visited = HashSet::new();
        let mut count = 0;

        while let Some(folder) = pending.pop_front() {
            if cancel.is_cancelled() {
                return Err(WebFsError::Cancelled);
            }
            if !visited.insert(folder.clone()) {
                continue;
            }

            match volume.update_directory(&folder, cancel).await {
                Ok(()) => {}
                Err(err) if folder == self.start || err.is_cancelled() => return Err(err),
                Err(err) => {
                    tracing::warn!(url = %folder, error = %err, "Skipping folder during search");
                    continue;
                }
            }

            let Some(items) = volume.file_system().new_iterator(&folder, ListMode::ALL) else {
                continue;
            };
            for item in items {
                if cancel.is_cancelled() {
                    return Err(WebFsError::Cancelled);
                }
                if self.query.matches(&item.name) {
                    tracing::trace!(url = %item.url, "Search hit");
                    sink.add_result(item.url.clone());
                    count += 1;
                }
                if item.directory && self.recursive {
                    pending.push_back(item.url);
                }
            }
        }
        Ok(count)
    }
}
