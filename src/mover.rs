use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::deps::{Dep, DepKind};
use crate::util::{ensure_dir_exists, file_hash, file_match, normalize_slashes, string_hash};
use crate::log;

/// Flags that steer the physical relocation.
#[derive(Debug, Clone, Copy, Default)]
pub struct MoveOptions {
    pub shared_runtime: bool,
    pub enable_debug: bool,
    pub use_patch: bool,
}

/// What a [`move_deps`] run did.
#[derive(Debug, Default)]
pub struct MoveOutcome {
    /// Deps that existed on disk and were eligible to move.
    pub candidates: usize,
    /// Deps actually renamed into the libs dir.
    pub moved: usize,
    /// First-level subdirectories that appeared below the libs dir.
    pub sub_dirs: Vec<String>,
    /// Shared-runtime file-to-hash mapping.
    pub srm_mapping: BTreeMap<String, String>,
}

/// Moves the dependency files of one app into `libs_dir` below `dir`.
/// Individual move failures are logged and tolerated.
pub fn move_deps(
    dir: &Path,
    libs_dir: &str,
    deps: &[Dep],
    entry: &str,
    excludes: &[String],
    opts: MoveOptions,
) -> MoveOutcome {
    let mut outcome = MoveOutcome::default();

    for dep in deps {
        let mut candidates = vec![dep.second_path.as_str()];
        if dep.path != dep.second_path {
            candidates.push(dep.path.as_str());
        }

        let Some((abs_file, using_path)) = candidates.into_iter().find_map(|rel| {
            let abs = dir.join(rel);
            abs.exists().then(|| (abs, rel.to_string()))
        }) else {
            continue;
        };

        if file_match(&dep.name, excludes) {
            continue;
        }

        // Debugger libraries:
        //   no patch, no debug  -> delete
        //   no patch, debug     -> leave in place
        //   patch, no debug     -> delete
        //   patch, debug        -> move
        if dep.name.contains("mscordaccore") || dep.name.contains("mscordbi") {
            if !opts.enable_debug {
                let _ = fs::remove_file(&abs_file);
                continue;
            } else if !opts.use_patch {
                continue;
            }
        }

        outcome.candidates += 1;

        let using_path = normalize_slashes(&using_path);
        let mut parts: Vec<String> = using_path.split('/').map(str::to_string).collect();
        let file_name = parts.last().cloned().unwrap_or_default();
        let sub_dir = parts[..parts.len() - 1].join("/");

        if dep.kind != DepKind::Resource
            && !sub_dir.is_empty()
            && !outcome.sub_dirs.contains(&sub_dir)
        {
            outcome.sub_dirs.push(sub_dir);
        }

        if opts.shared_runtime {
            if dep.kind != DepKind::Native {
                let hash = file_hash(&abs_file).unwrap_or_else(|_| "generic".to_string());
                parts.push(hash.clone());
                parts.push(file_name.clone());
                let srm_key = if dep.kind == DepKind::Resource {
                    format!("{}/{}", parts[0], file_name)
                } else {
                    file_name.clone()
                };
                outcome.srm_mapping.insert(srm_key, hash);
            } else {
                // natives must stay flat, nested dirs break dll loading
                let app_id = string_hash(entry);
                let mut prefixed = vec!["srm_native".to_string(), app_id];
                prefixed.append(&mut parts);
                parts = prefixed;
            }
        }

        if dep.kind == DepKind::Resource {
            parts.insert(0, "locales".to_string());
        }

        let new_abs_file = dir.join(libs_dir).join(parts.join("/"));
        let old_dir = abs_file.parent().map(Path::to_path_buf);
        let new_dir = new_abs_file.parent().map(Path::to_path_buf);

        if let Some(new_dir) = &new_dir {
            if ensure_dir_exists(new_dir).is_err() {
                log::error(&format!("{} is not writeable", new_dir.display()));
            }
        }

        match fs::rename(&abs_file, &new_abs_file) {
            Ok(()) => outcome.moved += 1,
            Err(e) => log::error(&format!(
                "move failed: {} : {}",
                abs_file.display(),
                e
            )),
        }

        move_sidecars(old_dir.as_deref(), new_dir.as_deref(), &file_name);

        // drop source dirs the move emptied out
        if let Some(old_dir) = old_dir {
            if old_dir != dir {
                let emptied = fs::read_dir(&old_dir)
                    .map(|mut d| d.next().is_none())
                    .unwrap_or(false);
                if emptied {
                    let _ = fs::remove_dir(&old_dir);
                }
            }
        }
    }

    outcome
}

/// Moves the `.pdb`/`.xml` files published next to an assembly along with it.
fn move_sidecars(old_dir: Option<&Path>, new_dir: Option<&Path>, file_name: &str) {
    let (Some(old_dir), Some(new_dir)) = (old_dir, new_dir) else {
        return;
    };
    let stem = Path::new(file_name)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| file_name.to_string());
    for ext in ["pdb", "xml"] {
        let sidecar = format!("{stem}.{ext}");
        let old_file = old_dir.join(&sidecar);
        if old_file.exists() {
            let _ = fs::rename(&old_file, new_dir.join(&sidecar));
        }
    }
}
