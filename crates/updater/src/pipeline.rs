use crate::cancel::CancelToken;
use crate::error::UpdateError;
use crate::fetcher::FileFetcher;
use crate::manifest::RemoteFile;
use crate::progress::{ProgressPhase, ProgressSnapshot};
use crate::verifier;
use std::path::PathBuf;
use tempfile::NamedTempFile;
use tokio::sync::watch;

/// A file that has been downloaded and verified, staged in the temp
/// directory and awaiting installation by the replace helper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedFile {
    /// Destination file name inside the install directory.
    pub file_name: String,
    /// Where the verified contents currently live.
    pub temp_path: PathBuf,
}

/// Terminal result of one pipeline run. Exactly one is produced per run.
#[derive(Debug)]
pub enum DownloadOutcome {
    /// Every file downloaded and verified; the staged manifest is in
    /// manifest order.
    Succeeded(Vec<StagedFile>),
    /// The user aborted; nothing was installed and staged files were removed.
    Cancelled,
    /// A transfer or verification failed; remaining files were not attempted.
    Failed(UpdateError),
}

/// Sequential download-then-verify pipeline over an ordered file list.
///
/// Files are processed strictly one at a time: file `i + 1` never starts
/// before file `i` has been both transferred and verified. The pipeline is
/// single-use; [`run`] consumes it and returns the terminal outcome.
///
/// [`run`]: DownloadPipeline::run
pub struct DownloadPipeline<F> {
    fetcher: F,
    files: Vec<RemoteFile>,
    cancel: CancelToken,
    progress: watch::Sender<ProgressSnapshot>,
}

impl<F> DownloadPipeline<F>
where
    F: FileFetcher,
{
    /// Create a pipeline over `files` in download order.
    pub fn new(fetcher: F, files: Vec<RemoteFile>) -> Self {
        let (progress, _) = watch::channel(ProgressSnapshot::idle(files.len()));
        Self {
            fetcher,
            files,
            cancel: CancelToken::new(),
            progress,
        }
    }

    /// Token that aborts this run when cancelled. Clones observe the same
    /// signal, so the caller can hand one to a UI before starting the run.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Subscribe to progress snapshots.
    pub fn progress(&self) -> watch::Receiver<ProgressSnapshot> {
        self.progress.subscribe()
    }

    fn emit(&self, files_completed: usize, phase: ProgressPhase) {
        self.progress.send_replace(ProgressSnapshot {
            files_total: self.files.len(),
            files_completed,
            phase,
        });
    }

    /// Drive every file through download and verification, in order.
    pub async fn run(self) -> DownloadOutcome {
        let mut completed = 0usize;
        let mut staged: Vec<(String, NamedTempFile)> = Vec::with_capacity(self.files.len());

        for (file_index, file) in self.files.iter().enumerate() {
            if self.cancel.is_cancelled() {
                return DownloadOutcome::Cancelled;
            }

            // Fresh empty temp file per remote file; dropped (and deleted)
            // automatically unless the whole run succeeds.
            let temp = match NamedTempFile::new() {
                Ok(temp) => temp,
                Err(err) => return DownloadOutcome::Failed(err.into()),
            };

            let progress = &self.progress;
            let files_total = self.files.len();
            let report = move |bytes_received: u64, bytes_total: Option<u64>| {
                progress.send_replace(ProgressSnapshot {
                    files_total,
                    files_completed: completed,
                    phase: ProgressPhase::Transferring {
                        file_index,
                        bytes_received,
                        bytes_total,
                    },
                });
            };

            tracing::debug!(file = %file.file_name, url = %file.url, "downloading");
            match self
                .fetcher
                .fetch(&file.url, temp.path(), &self.cancel, &report)
                .await
            {
                Ok(_) => {}
                Err(UpdateError::Cancelled) => return DownloadOutcome::Cancelled,
                Err(err) => {
                    tracing::warn!(file = %file.file_name, error = %err, "transfer failed");
                    return DownloadOutcome::Failed(err);
                }
            }

            self.emit(completed, ProgressPhase::Verifying { file_index });
            let actual = match verifier::hash_file(temp.path(), &self.cancel).await {
                Ok(digest) => digest,
                Err(UpdateError::Cancelled) => return DownloadOutcome::Cancelled,
                Err(err) => return DownloadOutcome::Failed(err),
            };
            let expected = file.md5.to_ascii_lowercase();
            if actual != expected {
                tracing::warn!(file = %file.file_name, %expected, %actual, "integrity mismatch");
                return DownloadOutcome::Failed(UpdateError::IntegrityMismatch {
                    file_name: file.file_name.clone(),
                    expected,
                    actual,
                });
            }

            staged.push((file.file_name.clone(), temp));
            completed += 1;
        }

        // Only a fully verified set is persisted past this function.
        let mut manifest = Vec::with_capacity(staged.len());
        for (file_name, temp) in staged {
            match temp.keep() {
                Ok((_, temp_path)) => manifest.push(StagedFile {
                    file_name,
                    temp_path,
                }),
                Err(err) => return DownloadOutcome::Failed(err.error.into()),
            }
        }

        self.emit(completed, ProgressPhase::Finished);
        tracing::info!(files = manifest.len(), "download pipeline succeeded");
        DownloadOutcome::Succeeded(manifest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::ProgressFn;
    use async_trait::async_trait;
    use md5::{Digest, Md5};
    use std::collections::HashMap;
    use std::path::Path;
    use std::sync::{Arc, Mutex};

    #[derive(Clone)]
    enum Behavior {
        Serve(Vec<u8>),
        FailTransfer,
        CancelMidway,
    }

    #[derive(Clone, Default)]
    struct MockFetcher {
        behaviors: HashMap<String, Behavior>,
        calls: Arc<Mutex<Vec<String>>>,
    }

    impl MockFetcher {
        fn with(mut self, url: &str, behavior: Behavior) -> Self {
            self.behaviors.insert(url.to_string(), behavior);
            self
        }

        fn calls(&self) -> Arc<Mutex<Vec<String>>> {
            Arc::clone(&self.calls)
        }
    }

    #[async_trait]
    impl FileFetcher for MockFetcher {
        async fn fetch(
            &self,
            url: &str,
            dest: &Path,
            cancel: &CancelToken,
            on_progress: ProgressFn<'_>,
        ) -> crate::Result<u64> {
            self.calls.lock().unwrap().push(url.to_string());
            match self.behaviors.get(url).expect("unexpected url in mock") {
                Behavior::Serve(bytes) => {
                    std::fs::write(dest, bytes)?;
                    on_progress(bytes.len() as u64, Some(bytes.len() as u64));
                    Ok(bytes.len() as u64)
                }
                Behavior::FailTransfer => Err(UpdateError::Io(std::io::Error::new(
                    std::io::ErrorKind::ConnectionReset,
                    "connection reset",
                ))),
                Behavior::CancelMidway => {
                    // Emulates the user closing the download view while this
                    // transfer is in flight.
                    cancel.cancel();
                    Err(UpdateError::Cancelled)
                }
            }
        }
    }

    fn md5_of(bytes: &[u8]) -> String {
        hex::encode(Md5::digest(bytes))
    }

    fn remote(url: &str, file_name: &str, md5: &str) -> RemoteFile {
        RemoteFile {
            url: url.into(),
            file_name: file_name.into(),
            md5: md5.into(),
        }
    }

    #[tokio::test]
    async fn stages_all_files_in_manifest_order() {
        let first = b"first payload".to_vec();
        let second = b"second payload".to_vec();
        let fetcher = MockFetcher::default()
            .with("u/1", Behavior::Serve(first.clone()))
            .with("u/2", Behavior::Serve(second.clone()));

        let pipeline = DownloadPipeline::new(
            fetcher,
            vec![
                remote("u/1", "one.bin", &md5_of(&first)),
                remote("u/2", "two.bin", &md5_of(&second).to_ascii_uppercase()),
            ],
        );
        let progress = pipeline.progress();

        let manifest = match pipeline.run().await {
            DownloadOutcome::Succeeded(manifest) => manifest,
            other => panic!("expected success, got {other:?}"),
        };

        assert_eq!(manifest.len(), 2);
        assert_eq!(manifest[0].file_name, "one.bin");
        assert_eq!(manifest[1].file_name, "two.bin");
        assert_eq!(std::fs::read(&manifest[0].temp_path).unwrap(), first);
        assert_eq!(std::fs::read(&manifest[1].temp_path).unwrap(), second);

        let last = progress.borrow().clone();
        assert_eq!(last.files_completed, 2);
        assert_eq!(last.phase, ProgressPhase::Finished);

        for staged in manifest {
            std::fs::remove_file(staged.temp_path).ok();
        }
    }

    #[tokio::test]
    async fn hash_mismatch_fails_fast() {
        let first = b"good".to_vec();
        let second = b"bad".to_vec();
        let fetcher = MockFetcher::default()
            .with("u/1", Behavior::Serve(first.clone()))
            .with("u/2", Behavior::Serve(second))
            .with("u/3", Behavior::Serve(b"never reached".to_vec()));
        let calls = fetcher.calls();

        let pipeline = DownloadPipeline::new(
            fetcher,
            vec![
                remote("u/1", "one.bin", &md5_of(&first)),
                remote("u/2", "two.bin", &md5_of(b"something else")),
                remote("u/3", "three.bin", &md5_of(b"never reached")),
            ],
        );

        match pipeline.run().await {
            DownloadOutcome::Failed(UpdateError::IntegrityMismatch { file_name, .. }) => {
                assert_eq!(file_name, "two.bin");
            }
            other => panic!("expected integrity failure, got {other:?}"),
        }
        assert_eq!(*calls.lock().unwrap(), vec!["u/1", "u/2"]);
    }

    #[tokio::test]
    async fn transfer_error_aborts_remaining_files() {
        let first = b"ok".to_vec();
        let fetcher = MockFetcher::default()
            .with("u/1", Behavior::Serve(first.clone()))
            .with("u/2", Behavior::FailTransfer)
            .with("u/3", Behavior::Serve(b"unused".to_vec()));
        let calls = fetcher.calls();

        let pipeline = DownloadPipeline::new(
            fetcher,
            vec![
                remote("u/1", "one.bin", &md5_of(&first)),
                remote("u/2", "two.bin", &md5_of(b"x")),
                remote("u/3", "three.bin", &md5_of(b"unused")),
            ],
        );

        assert!(matches!(
            pipeline.run().await,
            DownloadOutcome::Failed(UpdateError::Io(_))
        ));
        assert_eq!(calls.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn cancelling_mid_transfer_stages_nothing_and_skips_the_rest() {
        let first = b"done before the abort".to_vec();
        let fetcher = MockFetcher::default()
            .with("u/1", Behavior::Serve(first.clone()))
            .with("u/2", Behavior::CancelMidway)
            .with("u/3", Behavior::Serve(b"never started".to_vec()));
        let calls = fetcher.calls();

        let pipeline = DownloadPipeline::new(
            fetcher,
            vec![
                remote("u/1", "one.bin", &md5_of(&first)),
                remote("u/2", "two.bin", &md5_of(b"x")),
                remote("u/3", "three.bin", &md5_of(b"never started")),
            ],
        );

        assert!(matches!(pipeline.run().await, DownloadOutcome::Cancelled));
        assert_eq!(*calls.lock().unwrap(), vec!["u/1", "u/2"]);
    }

    #[tokio::test]
    async fn pre_cancelled_pipeline_never_fetches() {
        let fetcher = MockFetcher::default().with("u/1", Behavior::Serve(b"x".to_vec()));
        let calls = fetcher.calls();

        let pipeline =
            DownloadPipeline::new(fetcher, vec![remote("u/1", "one.bin", &md5_of(b"x"))]);
        pipeline.cancel_token().cancel();

        assert!(matches!(pipeline.run().await, DownloadOutcome::Cancelled));
        assert!(calls.lock().unwrap().is_empty());
    }
}
