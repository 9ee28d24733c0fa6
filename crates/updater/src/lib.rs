//! Manifest-driven self-update engine.
//!
//! This crate checks a remote manifest for a newer release, downloads the
//! release files one at a time with verified MD5 digests, and then swaps the
//! installed files through a detached helper process. The helper is needed
//! because a running executable cannot delete or overwrite itself: the
//! engine schedules the swap, the application exits, and the helper waits,
//! deletes the old files, moves the staged downloads into place and
//! relaunches the updated executable.
//!
//! ```ignore
//! use updater::{UpdateRun, Updater, UpdaterConfig};
//!
//! # async fn demo(ui: impl updater::UpdateUi) -> updater::Result<()> {
//! let config = UpdaterConfig::for_current_exe(
//!     "Demo App",
//!     "https://releases.example.com/update.json",
//!     semver::Version::parse(env!("CARGO_PKG_VERSION")).unwrap(),
//! )?;
//!
//! match Updater::new(config, ui).run().await? {
//!     UpdateRun::RestartScheduled { .. } => std::process::exit(0),
//!     outcome => {
//!         tracing::debug!(?outcome, "no restart needed");
//!     }
//! }
//! # Ok(())
//! # }
//! ```

mod cancel;
mod error;
mod fetcher;
mod manifest;
mod pipeline;
mod progress;
mod replace;
mod updater;
mod verifier;

pub use cancel::CancelToken;
pub use error::{Result, UpdateError};
pub use fetcher::{FileFetcher, HttpFetcher, ProgressFn};
pub use manifest::{ManifestClient, RemoteFile, UpdateDescriptor};
pub use pipeline::{DownloadOutcome, DownloadPipeline, StagedFile};
pub use progress::{format_bytes, ProgressPhase, ProgressSnapshot};
pub use replace::{DetachedHelper, ReplacePlan, ReplaceScheduler};
pub use updater::{
    Consent, ReportKind, UpdateDetails, UpdatePrompt, UpdateReport, UpdateRun, UpdateUi, Updater,
    UpdaterConfig,
};
pub use verifier::{hash_file, verify_file};
