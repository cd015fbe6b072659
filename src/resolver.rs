use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::error::ResolveError;
use crate::reference::{has_tag, strip_tag, tag_of};
use crate::runtime::{Connector, ImageInspection, Runtime};

/// A repository digest together with the local tags of its repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageRecord {
    #[serde(rename = "id")]
    pub digest: String,
    #[serde(rename = "name")]
    pub repository: String,
    pub tags: Vec<String>,
}

/// Turns pushed image references into catalog records.
pub struct Resolver<C> {
    connector: Arc<C>,
}

impl<C> Clone for Resolver<C> {
    fn clone(&self) -> Self {
        Self {
            connector: Arc::clone(&self.connector),
        }
    }
}

impl<C: Connector> Resolver<C> {
    pub fn new(connector: Arc<C>) -> Self {
        Self { connector }
    }

    /// Resolves a tagged image reference into one record per repo digest
    /// of its repository.
    ///
    /// Each call opens its own runtime connection and releases it before
    /// returning. The runtime client does not reconnect on its own, so a
    /// long-lived handle could silently go stale.
    pub async fn resolve(&self, name: &str) -> Result<Vec<ImageRecord>, ResolveError> {
        if !has_tag(name) {
            return Err(ResolveError::NoTag(name.to_string()));
        }

        let inspection = {
            let runtime = self
                .connector
                .connect()
                .await
                .map_err(ResolveError::Connection)?;
            runtime
                .inspect_image(name)
                .await
                .map_err(ResolveError::Query)?
        };

        let digests = map_repo_digests_to_tags(name, &inspection);
        if digests.is_empty() {
            return Err(ResolveError::NoDigests(name.to_string()));
        }
        debug!("{} resolved to {} repo digest(s)", name, digests.len());

        let repository = strip_tag(name);
        Ok(digests
            .into_iter()
            .map(|(digest, tags)| ImageRecord {
                digest,
                repository: repository.to_string(),
                tags,
            })
            .collect())
    }
}

/// Maps every repo digest of `name`'s repository to the tags of that
/// repository.
///
/// Digests and tags are correlated only by sharing the repository prefix,
/// so every matching digest receives the same full tag list, even if some
/// of those tags point at a different digest. The runtime metadata does not
/// expose which tag belongs to which digest.
pub fn map_repo_digests_to_tags(
    name: &str,
    image: &ImageInspection,
) -> BTreeMap<String, Vec<String>> {
    let mut digests = BTreeMap::new();
    if name.is_empty() {
        return digests;
    }

    let repository = strip_tag(name);

    let tags: Vec<String> = image
        .repo_tags
        .iter()
        .filter(|entry| entry.starts_with(repository))
        .filter_map(|entry| tag_of(entry))
        .map(str::to_string)
        .collect();

    for entry in &image.repo_digests {
        if entry.starts_with(repository) {
            digests.insert(entry.clone(), tags.clone());
        }
    }

    digests
}
