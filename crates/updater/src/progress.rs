/// Immutable snapshot of overall download progress, published on every
/// transition. Observers read snapshots from a watch channel instead of
/// polling shared fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressSnapshot {
    /// Total number of files in this update attempt.
    pub files_total: usize,
    /// Files that have been downloaded and verified so far.
    pub files_completed: usize,
    /// What the pipeline is doing right now.
    pub phase: ProgressPhase,
}

/// Current pipeline activity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressPhase {
    /// Nothing has started yet.
    Idle,
    /// File `file_index` is being transferred. `bytes_total` is absent when
    /// the server did not supply a content length; progress then degrades
    /// to a byte count.
    Transferring {
        file_index: usize,
        bytes_received: u64,
        bytes_total: Option<u64>,
    },
    /// File `file_index` is being hashed. Indeterminate; no byte-level signal.
    Verifying { file_index: usize },
    /// All files downloaded and verified.
    Finished,
}

impl ProgressSnapshot {
    pub(crate) fn idle(files_total: usize) -> Self {
        Self {
            files_total,
            files_completed: 0,
            phase: ProgressPhase::Idle,
        }
    }

    /// Percentage of the current file, when the remote size is known.
    pub fn percent(&self) -> Option<u8> {
        match self.phase {
            ProgressPhase::Transferring {
                bytes_received,
                bytes_total: Some(total),
                ..
            } if total > 0 => Some(((bytes_received * 100) / total).min(100) as u8),
            _ => None,
        }
    }
}

const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];

/// Format a byte count with the largest unit among B/KB/MB/GB whose scaled
/// value is at least one; exactly 1024^n promotes to the next unit.
pub fn format_bytes(bytes: u64, decimal_places: usize, show_unit: bool) -> String {
    let mut scaled = bytes as f64;
    let mut unit = 0;
    while unit + 1 < UNITS.len() && scaled >= 1024.0 {
        scaled /= 1024.0;
        unit += 1;
    }

    let mut formatted = format!("{scaled:.decimal_places$}");
    if show_unit {
        formatted.push_str(UNITS[unit]);
    }
    formatted
}
