//! Search-index maintenance for published modules.

use crate::error::Result;
use crate::metadata::read_module_info;
use crate::publisher::PublishedModule;
use crate::store::{SearchIndex, SearchIndexEntry};
use log::debug;
use modarchive_common::Identity;

/// Keeps the search index in step with the repository.
pub struct SearchIndexer<'a, S: SearchIndex> {
    index: &'a S,
    info_file: &'a str,
}

impl<'a, S: SearchIndex> SearchIndexer<'a, S> {
    /// Creates an indexer reading `info_file` from each published module.
    #[must_use]
    pub const fn new(index: &'a S, info_file: &'a str) -> Self {
        Self { index, info_file }
    }

    /// Indexes `module`, with `submitter` as author if this is the first
    /// time the module is seen.
    ///
    /// A missing or malformed description file still produces an entry,
    /// titled with the module name and with an empty description.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::IngestError::Database`] if the upsert fails.
    pub fn index(&self, module: &PublishedModule, submitter: &Identity) -> Result<SearchIndexEntry> {
        let (title, description) = read_module_info(&module.path().join(self.info_file))
            .map_or_else(
                || (module.name().to_string(), String::new()),
                |info| (info.title().to_owned(), info.description_text()),
            );

        let entry = SearchIndexEntry {
            module: module.name().to_string(),
            author: submitter.to_string(),
            title,
            description,
        };
        self.index.upsert(&entry)?;
        debug!("indexed {}", entry.module);

        Ok(self.index.lookup(&entry.module)?.unwrap_or(entry))
    }
}
