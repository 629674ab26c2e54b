//! Review routing for uploads from anonymous submitters.

use crate::error::Result;
use crate::extraction::StagedModule;
use crate::gate::GateVerdict;
use crate::mail::{Mailer, Notification};
use crate::store::IdentityDirectory;
use camino::{Utf8Path, Utf8PathBuf};
use log::{info, warn};
use modarchive_common::ModuleName;

/// Subject line of review requests.
pub const REVIEW_SUBJECT: &str = "Review: code upload at temporary repository";

/// Where an anonymous upload was parked and whether administrators heard
/// about it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewOutcome {
    /// Module name.
    pub name: ModuleName,
    /// Holding directory under pending review.
    pub path: Utf8PathBuf,
    /// Whether the notification was handed over for delivery.
    pub delivered: bool,
}

/// Parks anonymous uploads and alerts the administrators.
pub struct ReviewNotifier<'a, D: IdentityDirectory, M: Mailer> {
    pending_root: &'a Utf8Path,
    directory: &'a D,
    mailer: &'a M,
}

impl<'a, D: IdentityDirectory, M: Mailer> ReviewNotifier<'a, D, M> {
    /// Creates a notifier parking modules under `pending_root`.
    #[must_use]
    pub const fn new(pending_root: &'a Utf8Path, directory: &'a D, mailer: &'a M) -> Self {
        Self {
            pending_root,
            directory,
            mailer,
        }
    }

    /// Moves `staged` to `<pending>/<name>`, replacing any earlier upload of
    /// the same name, and makes one delivery attempt.
    ///
    /// Delivery problems, including an empty administrator list, are logged
    /// and reported through [`ReviewOutcome::delivered`].
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::IngestError::Io`] if the module cannot be
    /// moved.
    pub fn route_for_review(
        &self,
        staged: StagedModule,
        verdict: &GateVerdict,
    ) -> Result<ReviewOutcome> {
        let name = staged.name().clone();
        let path = self.pending_root.join(name.as_str());
        staged.relocate_to(&path)?;
        info!("holding {name} for review at {path}");

        let delivered = match self.notify(&path, verdict) {
            Ok(delivered) => delivered,
            Err(e) => {
                warn!("review notification for {name} not sent: {e}");
                false
            }
        };

        Ok(ReviewOutcome {
            name,
            path,
            delivered,
        })
    }

    fn notify(&self, path: &Utf8Path, verdict: &GateVerdict) -> Result<bool> {
        let recipients = self.directory.administrator_addresses()?;
        if recipients.is_empty() {
            warn!("no administrators to notify about {path}");
            return Ok(false);
        }
        self.mailer.send(&Notification {
            recipients,
            subject: REVIEW_SUBJECT.to_owned(),
            body: review_body(path, verdict),
        })?;
        Ok(true)
    }
}

fn review_body(path: &Utf8Path, verdict: &GateVerdict) -> String {
    format!(
        "A module was uploaded by a submitter who was not logged in.\n\n\
         Module is stored in {path}.\n\n\
         Quality gate {}:\n{}",
        if verdict.passed() { "passed" } else { "failed" },
        verdict.report_text()
    )
}
