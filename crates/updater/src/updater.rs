use crate::cancel::CancelToken;
use crate::error::{Result, UpdateError};
use crate::fetcher::{FileFetcher, HttpFetcher};
use crate::manifest::{ManifestClient, UpdateDescriptor};
use crate::pipeline::{DownloadOutcome, DownloadPipeline};
use crate::progress::ProgressSnapshot;
use crate::replace::{DetachedHelper, ReplacePlan, ReplaceScheduler};
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::sync::watch;

/// Identity and location of the application being updated.
#[derive(Debug, Clone)]
pub struct UpdaterConfig {
    /// Display name used in prompts and reports.
    pub app_name: String,
    /// Where the update manifest lives.
    pub manifest_url: String,
    /// Version of the running application.
    pub current_version: semver::Version,
    /// Directory holding the installed files.
    pub install_dir: PathBuf,
    /// File name of the main executable inside `install_dir`.
    pub executable_name: String,
}

impl UpdaterConfig {
    /// Build a config for the running executable: the install directory is
    /// the directory containing it.
    pub fn for_current_exe(
        app_name: impl Into<String>,
        manifest_url: impl Into<String>,
        current_version: semver::Version,
    ) -> Result<Self> {
        let exe = std::env::current_exe()?;
        let install_dir = exe
            .parent()
            .ok_or_else(|| UpdateError::Other("executable has no parent directory".into()))?
            .to_path_buf();
        let executable_name = exe
            .file_name()
            .ok_or_else(|| UpdateError::Other("executable has no file name".into()))?
            .to_string_lossy()
            .into_owned();
        Ok(Self {
            app_name: app_name.into(),
            manifest_url: manifest_url.into(),
            current_version,
            install_dir,
            executable_name,
        })
    }
}

/// User's answer to the consent prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Consent {
    /// Proceed with the download.
    Accept,
    /// Skip this update.
    Decline,
    /// Show the release details, then ask again.
    ShowDetails,
}

/// Data for the consent prompt.
#[derive(Debug, Clone)]
pub struct UpdatePrompt {
    pub app_name: String,
    pub new_version: semver::Version,
}

/// Data for the details view.
#[derive(Debug, Clone)]
pub struct UpdateDetails {
    pub current_version: semver::Version,
    pub new_version: semver::Version,
    pub description: String,
}

/// Terminal classification of an attempt, for the result notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportKind {
    Succeeded,
    Cancelled,
    Failed,
}

/// User-facing result notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateReport {
    pub kind: ReportKind,
    pub message: String,
}

/// Presentation boundary. The engine drives this trait; dialogs, console
/// output or a test double sit behind it.
#[async_trait]
pub trait UpdateUi: Send + Sync {
    /// Ask whether to download the new version.
    async fn prompt_consent(&self, prompt: &UpdatePrompt) -> Consent;

    /// Show the release description.
    async fn show_details(&self, details: &UpdateDetails);

    /// A download is starting. `progress` yields immutable snapshots;
    /// cancelling `cancel` aborts the run (closing the download view, in
    /// dialog terms).
    fn watch_progress(&self, progress: watch::Receiver<ProgressSnapshot>, cancel: CancelToken);

    /// Final notification for this attempt.
    async fn show_result(&self, report: &UpdateReport);
}

/// What happened during one update attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateRun {
    /// No descriptor, or the installed version is current and complete.
    UpToDate,
    /// The user declined the update.
    Declined,
    /// The user cancelled the download; nothing changed on disk.
    Cancelled,
    /// The download or verification failed; nothing changed on disk.
    Failed { message: String },
    /// The replace helper is scheduled. The caller should exit promptly so
    /// the helper can swap the files and relaunch.
    RestartScheduled { version: semver::Version },
}

const CANCELLED_MESSAGE: &str =
    "The update download was cancelled. This program has not been modified.";
const FAILED_MESSAGE: &str =
    "There was a problem downloading the update. Please try again later.";

/// Top-level update driver: evaluates the descriptor, applies the decision
/// policy, runs the download pipeline and schedules the file swap.
pub struct Updater<U, F = HttpFetcher, S = DetachedHelper> {
    config: UpdaterConfig,
    manifest: ManifestClient,
    fetcher: F,
    scheduler: S,
    ui: U,
}

impl<U> Updater<U>
where
    U: UpdateUi,
{
    /// Create an updater with the default HTTP fetcher and detached helper.
    pub fn new(config: UpdaterConfig, ui: U) -> Self {
        Self {
            config,
            manifest: ManifestClient::default(),
            fetcher: HttpFetcher::default(),
            scheduler: DetachedHelper,
            ui,
        }
    }
}

impl<U, F, S> Updater<U, F, S>
where
    U: UpdateUi,
    F: FileFetcher + Clone,
    S: ReplaceScheduler,
{
    /// Create an updater with explicit collaborators.
    pub fn with_parts(
        config: UpdaterConfig,
        ui: U,
        manifest: ManifestClient,
        fetcher: F,
        scheduler: S,
    ) -> Self {
        Self {
            config,
            manifest,
            fetcher,
            scheduler,
            ui,
        }
    }

    /// Perform one full update attempt. Returns `Ok` for every outcome the
    /// application can continue from; the only `Err` worth special-casing
    /// is [`UpdateError::ReplaceScheduling`], after which the update will
    /// not happen.
    pub async fn run(&self) -> Result<UpdateRun> {
        match self.manifest.fetch(&self.config.manifest_url).await? {
            Some(descriptor) => self.run_with_descriptor(descriptor).await,
            None => {
                tracing::debug!("no update descriptor on server");
                Ok(UpdateRun::UpToDate)
            }
        }
    }

    /// Decision policy and pipeline driver for an already-fetched
    /// descriptor. A missing installed file forces a repair download with
    /// no consent prompt; a version upgrade asks first; anything else is a
    /// no-op.
    pub async fn run_with_descriptor(&self, descriptor: UpdateDescriptor) -> Result<UpdateRun> {
        descriptor.validate()?;
        let new_version = descriptor.version()?;

        if !descriptor.has_all_files(&self.config.install_dir) {
            tracing::info!(version = %new_version, "installed files missing; forcing repair download");
        } else if descriptor.is_newer_than(&self.config.current_version)? {
            let prompt = UpdatePrompt {
                app_name: self.config.app_name.clone(),
                new_version: new_version.clone(),
            };
            loop {
                match self.ui.prompt_consent(&prompt).await {
                    Consent::Accept => break,
                    Consent::Decline => return Ok(UpdateRun::Declined),
                    Consent::ShowDetails => {
                        self.ui
                            .show_details(&UpdateDetails {
                                current_version: self.config.current_version.clone(),
                                new_version: new_version.clone(),
                                description: descriptor.description.clone(),
                            })
                            .await;
                    }
                }
            }
        } else {
            return Ok(UpdateRun::UpToDate);
        }

        let pipeline = DownloadPipeline::new(self.fetcher.clone(), descriptor.files.clone());
        self.ui
            .watch_progress(pipeline.progress(), pipeline.cancel_token());

        match pipeline.run().await {
            DownloadOutcome::Succeeded(manifest) => {
                let plan = ReplacePlan::new(
                    &manifest,
                    &self.config.install_dir,
                    &self.config.executable_name,
                    &descriptor.launch_args,
                );
                if let Err(err) = self.scheduler.schedule(&plan) {
                    // Exiting now would silently drop the update, so this is
                    // surfaced before the caller terminates.
                    self.ui
                        .show_result(&UpdateReport {
                            kind: ReportKind::Failed,
                            message: format!("The update could not be applied: {err}"),
                        })
                        .await;
                    return Err(err);
                }
                self.ui
                    .show_result(&UpdateReport {
                        kind: ReportKind::Succeeded,
                        message: format!(
                            "{} will restart to finish installing version {}.",
                            self.config.app_name, new_version
                        ),
                    })
                    .await;
                Ok(UpdateRun::RestartScheduled {
                    version: new_version,
                })
            }
            DownloadOutcome::Cancelled => {
                self.ui
                    .show_result(&UpdateReport {
                        kind: ReportKind::Cancelled,
                        message: CANCELLED_MESSAGE.into(),
                    })
                    .await;
                Ok(UpdateRun::Cancelled)
            }
            DownloadOutcome::Failed(err) => {
                tracing::warn!(error = %err, "update attempt failed");
                self.ui
                    .show_result(&UpdateReport {
                        kind: ReportKind::Failed,
                        message: FAILED_MESSAGE.into(),
                    })
                    .await;
                Ok(UpdateRun::Failed {
                    message: err.to_string(),
                })
            }
        }
    }
}
