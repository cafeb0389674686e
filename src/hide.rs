use std::path::Path;
use anyhow::Result;

use crate::log;
use crate::util::{file_match, list_files};

/// Hides every file directly inside `dir` whose name matches one of the
/// patterns. Failures are logged and tolerated.
pub fn hide_matching(dir: &Path, patterns: &[String]) {
    if patterns.is_empty() {
        return;
    }
    for file in list_files(dir) {
        let Some(name) = file.file_name().map(|n| n.to_string_lossy().to_string()) else {
            continue;
        };
        if file_match(&name, patterns) {
            if let Err(e) = hide(&file) {
                log::error(&format!("hide file failed: {} : {}", file.display(), e));
            }
        }
    }
}

/// Sets the hidden attribute on Windows. A no-op elsewhere, where "hidden"
/// would mean renaming the file and breaking resolution.
#[cfg(windows)]
pub fn hide(file: &Path) -> Result<()> {
    use std::process::Command;
    let status = Command::new("attrib").arg("+h").arg(file).status()?;
    if !status.success() {
        anyhow::bail!("attrib exited with {}", status);
    }
    Ok(())
}

#[cfg(not(windows))]
pub fn hide(_file: &Path) -> Result<()> {
    Ok(())
}
