//! Upload pipeline orchestration.
//!
//! Ties the extractor, quality gate, resolver, publisher, indexer and review
//! notifier together. One call to [`IngestPipeline::process`] handles one
//! upload from start to finish and always ends in exactly one
//! [`UploadOutcome`] or one [`crate::error::IngestError`].

use crate::config::ArchiveConfig;
use crate::error::Result;
use crate::executor::CommandExecutor;
use crate::extraction::ArchiveExtractor;
use crate::gate::{GateVerdict, QualityGate};
use crate::guard::SubmitterGuard;
use crate::indexer::SearchIndexer;
use crate::mail::Mailer;
use crate::notifier::{ReviewNotifier, ReviewOutcome};
use crate::publisher::{JunkEntry, PublishedModule, RepositoryPublisher};
use crate::resolver::{ConflictResolver, Resolution};
use crate::store::{IdentityDirectory, OwnershipRegistry, SearchIndex, SearchIndexEntry};
use crate::upload::UploadedArchive;
use log::{debug, info};

/// How an upload ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    /// Accepted, committed and indexed.
    Published {
        /// The published module.
        module: PublishedModule,
        /// How its final name was chosen.
        resolution: Resolution,
        /// The passing gate verdict.
        verdict: GateVerdict,
        /// The search-index row after the update.
        entry: SearchIndexEntry,
    },
    /// Failed the gate and moved to junk.
    Quarantined {
        /// Where the module was parked.
        entry: JunkEntry,
        /// The failing gate verdict.
        verdict: GateVerdict,
    },
    /// Anonymous upload held for administrator review.
    RoutedForReview {
        /// Where the module was parked and whether mail went out.
        review: ReviewOutcome,
        /// The gate verdict forwarded to the administrators.
        verdict: GateVerdict,
    },
}

/// Collaborators shared by every run.
pub struct PipelineContext<'a, E, X, S, M> {
    /// Archive configuration.
    pub config: &'a ArchiveConfig,
    /// Runs external tools.
    pub executor: &'a E,
    /// Unpacks uploads.
    pub extractor: &'a X,
    /// Ownership registry, search index and identity directory.
    pub store: &'a S,
    /// Delivers review notifications.
    pub mailer: &'a M,
}

/// Processes uploads.
pub struct IngestPipeline<'a, E, X, S, M> {
    context: PipelineContext<'a, E, X, S, M>,
}

impl<'a, E, X, S, M> IngestPipeline<'a, E, X, S, M>
where
    E: CommandExecutor,
    X: ArchiveExtractor,
    S: OwnershipRegistry + SearchIndex + IdentityDirectory,
    M: Mailer,
{
    /// Creates a pipeline over `context`.
    #[must_use]
    pub const fn new(context: PipelineContext<'a, E, X, S, M>) -> Self {
        Self { context }
    }

    /// Runs one upload through the pipeline.
    ///
    /// Input is validated before anything touches the filesystem. An
    /// authenticated submitter's staging directory is claimed before
    /// extraction and released when the run ends, whatever the result.
    ///
    /// # Errors
    ///
    /// Returns the first fatal error: input rejection, an upload already in
    /// progress, extraction failure, a gate that cannot be started, or a
    /// publish-stage failure. A failed gate is not an error.
    pub fn process(&self, upload: UploadedArchive) -> Result<UploadOutcome> {
        let ctx = &self.context;
        let paths = &ctx.config.paths;

        upload.kind()?;
        let name = upload.module_name()?;
        debug!("processing {} as {name} from {}", upload.filename(), upload.submitter());

        let identity = upload.submitter().identity();
        let _guard = identity
            .map(|id| SubmitterGuard::acquire(&paths.staging, id))
            .transpose()?;

        let staged = ctx.extractor.extract(&upload)?;
        let verdict = QualityGate::new(ctx.executor, &ctx.config.tools.gate).evaluate(staged.path())?;

        let Some(identity) = identity else {
            let review = ReviewNotifier::new(&paths.pending_review, ctx.store, ctx.mailer)
                .route_for_review(staged, &verdict)?;
            return Ok(UploadOutcome::RoutedForReview { review, verdict });
        };

        let publisher = RepositoryPublisher::new(ctx.config, ctx.executor, ctx.store);
        if !verdict.passed() {
            let entry = publisher.quarantine(staged, identity)?;
            return Ok(UploadOutcome::Quarantined { entry, verdict });
        }

        let resolution = ConflictResolver::new(paths, ctx.store).resolve(&name, identity)?;
        let module = publisher.publish(staged, &resolution, identity)?;
        let entry = SearchIndexer::new(ctx.store, &paths.info_file).index(&module, identity)?;
        info!("{} published as {}", upload.filename(), module.name());

        Ok(UploadOutcome::Published {
            module,
            resolution,
            verdict,
            entry,
        })
    }
}
