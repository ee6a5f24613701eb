//! Small helpers shared by the library and the binary.

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Format a duration as hours, minutes, and seconds.
pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    format!("{}h {:02}m {:02}s", hours, minutes, seconds)
}

/// Path of the statistics file written next to a solution file:
/// `run.sol` gives `run_stats.csv`, any other name gets `_stats.csv` appended.
pub fn stats_path<P: AsRef<Path>>(solution_path: P) -> PathBuf {
    let text = solution_path.as_ref().to_string_lossy();
    let stem = text.strip_suffix(".sol").unwrap_or(&text);
    PathBuf::from(format!("{}_stats.csv", stem))
}

/// Path of the search progress file: `run.sol` gives `run.sol.PG.csv`.
pub fn progress_path<P: AsRef<Path>>(solution_path: P) -> PathBuf {
    let mut text = solution_path.as_ref().as_os_str().to_owned();
    text.push(".PG.csv");
    PathBuf::from(text)
}
