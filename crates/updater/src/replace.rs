use crate::error::{Result, UpdateError};
use crate::pipeline::StagedFile;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Seconds the helper waits for the current process to exit before deleting
/// the installed files, and for file locks to clear before moving the new
/// ones in. Timings inherited from the manifest format's reference tooling.
const EXIT_GRACE_SECS: u64 = 4;
const UNLOCK_GRACE_SECS: u64 = 2;

/// Data-driven description of the file swap: which installed files to
/// delete, which staged files to move where, and how to relaunch the
/// application afterwards. The helper never reads the update descriptor;
/// this plan is all it gets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplacePlan {
    /// Installed files to force-delete, in manifest order.
    pub deletes: Vec<PathBuf>,
    /// `(staged temp path, install destination)` pairs, in manifest order.
    pub moves: Vec<(PathBuf, PathBuf)>,
    /// Working directory for the relaunch (the install directory).
    pub launch_dir: PathBuf,
    /// Executable file name to relaunch, relative to `launch_dir`.
    pub launch_exe: String,
    /// Raw argument string appended to the relaunch command.
    pub launch_args: String,
}

impl ReplacePlan {
    /// Build the swap plan for a verified staged manifest.
    pub fn new(
        manifest: &[StagedFile],
        install_dir: &Path,
        executable_name: &str,
        launch_args: &str,
    ) -> Self {
        let deletes = manifest
            .iter()
            .map(|staged| install_dir.join(&staged.file_name))
            .collect();
        let moves = manifest
            .iter()
            .map(|staged| {
                (
                    staged.temp_path.clone(),
                    install_dir.join(&staged.file_name),
                )
            })
            .collect();
        Self {
            deletes,
            moves,
            launch_dir: install_dir.to_path_buf(),
            launch_exe: executable_name.to_string(),
            launch_args: launch_args.to_string(),
        }
    }

    /// Render the plan as a POSIX shell script: wait, delete, wait, move,
    /// relaunch.
    pub fn shell_script(&self) -> String {
        let mut script = format!("sleep {EXIT_GRACE_SECS}");
        for target in &self.deletes {
            script.push_str(&format!("; rm -f {}", sh_quote(target)));
        }
        script.push_str(&format!("; sleep {UNLOCK_GRACE_SECS}"));
        for (from, to) in &self.moves {
            script.push_str(&format!("; mv -f {} {}", sh_quote(from), sh_quote(to)));
        }
        script.push_str(&format!(
            "; cd {}; exec {}",
            sh_quote(&self.launch_dir),
            sh_quote(Path::new(&format!("./{}", self.launch_exe)))
        ));
        if !self.launch_args.is_empty() {
            script.push(' ');
            script.push_str(&self.launch_args);
        }
        script
    }

    /// Render the plan as a single `cmd.exe` command chain: `choice /T` for
    /// the grace periods, `Del /F /Q` + `Move /Y` for the swap, `Start` for
    /// the relaunch.
    pub fn cmd_chain(&self) -> String {
        let mut chain = format!("choice /C Y /N /D Y /T {EXIT_GRACE_SECS} & ");
        for target in &self.deletes {
            chain.push_str(&format!("Del /F /Q \"{}\" & ", target.display()));
        }
        chain.push_str(&format!("choice /C Y /N /D Y /T {UNLOCK_GRACE_SECS} & "));
        for (from, to) in &self.moves {
            chain.push_str(&format!(
                "Move /Y \"{}\" \"{}\" & ",
                from.display(),
                to.display()
            ));
        }
        chain.push_str(&format!(
            "Start \"\" /D \"{}\" \"{}\"",
            self.launch_dir.display(),
            self.launch_exe
        ));
        if !self.launch_args.is_empty() {
            chain.push(' ');
            chain.push_str(&self.launch_args);
        }
        chain
    }
}

fn sh_quote(path: &Path) -> String {
    format!("'{}'", path.display().to_string().replace('\'', r"'\''"))
}

/// Hands a [`ReplacePlan`] to something that will carry it out after the
/// current process exits.
pub trait ReplaceScheduler: Send + Sync {
    /// Start the replace action. On success the caller is expected to
    /// terminate promptly; the action runs regardless of whether it does.
    fn schedule(&self, plan: &ReplacePlan) -> Result<()>;
}

/// Platform implementation: spawns a detached, windowless helper process
/// (`/bin/sh` or `cmd.exe`) that outlives the caller.
#[derive(Clone, Copy, Default)]
pub struct DetachedHelper;

impl ReplaceScheduler for DetachedHelper {
    fn schedule(&self, plan: &ReplacePlan) -> Result<()> {
        let child = helper_command(plan)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(UpdateError::ReplaceScheduling)?;
        tracing::info!(
            pid = child.id(),
            files = plan.moves.len(),
            "replace helper scheduled; caller should exit now"
        );
        Ok(())
    }
}

#[cfg(unix)]
fn helper_command(plan: &ReplacePlan) -> Command {
    use std::os::unix::process::CommandExt;

    let mut command = Command::new("/bin/sh");
    command.arg("-c").arg(plan.shell_script());
    // Own process group, so the helper survives the caller's exit and any
    // terminal job-control signals aimed at it.
    command.process_group(0);
    command
}

#[cfg(windows)]
fn helper_command(plan: &ReplacePlan) -> Command {
    use std::os::windows::process::CommandExt;

    const CREATE_NO_WINDOW: u32 = 0x0800_0000;
    let mut command = Command::new("cmd.exe");
    command.raw_arg(format!("/C {}", plan.cmd_chain()));
    command.creation_flags(CREATE_NO_WINDOW);
    command
}
