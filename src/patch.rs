use std::fs;
use std::path::Path;
use anyhow::{Result, bail};

use crate::artifacts::{ArtifactStore, hostfxr_name_by_rid};
use crate::log;

/// Installs the patched hostfxr into the publish dir: resolves a compatible
/// RID, refreshes the cached artifact when the online version moved, backs up
/// the published hostfxr and copies the patch over it.
///
/// Returns `false` when the install itself failed but the run can go on; a
/// missing compatible RID or a failed download is fatal.
pub fn patch_hostfxr(
    store: &mut ArtifactStore,
    dir: &Path,
    fxr_version: &str,
    rid: &str,
) -> Result<bool> {
    log::detail("patching hostfxr...");

    let fxr_name = hostfxr_name_by_rid(rid);
    let Some(compatible_rid) = store.find_compatible_rid(rid) else {
        bail!("cannot find a compatible rid for {}", rid);
    };
    log::detail(&format!("using compatible rid {compatible_rid} for {rid}"));
    let rid = compatible_rid.as_str();

    let local_version = store.local_version(fxr_version, rid).unwrap_or_default();
    let online_version = store.online_version(fxr_version, rid).unwrap_or_default();
    if local_version != online_version {
        log::detail(&format!("downloading patched hostfxr: {fxr_version}/{rid}"));
        if store.download_artifact(fxr_version, rid).is_err()
            || store
                .write_local_version(fxr_version, rid, &online_version)
                .is_err()
        {
            bail!("download patch failed");
        }
    }

    let fxr_path = dir.join(fxr_name);
    let backup_path = dir.join(format!("{fxr_name}.bak"));
    log::info(&format!("backuping fxr to {}", backup_path.display()));
    if let Err(e) = fs::copy(&fxr_path, &backup_path) {
        log::error(&format!("backup failed: {e}"));
        return Ok(false);
    }

    match store.copy_artifact_to(fxr_version, rid, dir) {
        Ok(()) => {
            log::info("patch succeeded");
            Ok(true)
        }
        Err(e) => {
            log::error(&format!("patch failed: {e}"));
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::ensure_dir_exists;
    use tempfile::tempdir;

    fn store_with_artifact(root: &Path, fxr: &str, rid: &str, version: &str) -> ArtifactStore {
        let store = ArtifactStore::with_local_dir(
            "http://127.0.0.1:1".to_string(),
            "master".to_string(),
            root.join("artifacts"),
        )
        .unwrap();
        // compatibility table maps the rid to itself
        std::fs::write(
            root.join("artifacts/runtime.compatibility.json"),
            format!(r#"{{ "{rid}": ["{rid}"] }}"#),
        )
        .unwrap();
        store.write_local_version(fxr, rid, version).unwrap();
        let file = root.join(format!("artifacts/{fxr}/{rid}.Release/{}", hostfxr_name_by_rid(rid)));
        ensure_dir_exists(file.parent().unwrap()).unwrap();
        std::fs::write(file, b"patched-fxr").unwrap();
        store
    }

    #[test]
    fn test_patch_installs_and_backs_up() {
        let root = tempdir().unwrap();
        // local and online versions match (online lookup fails -> empty, so
        // record an empty local version too) by writing no version at all
        let mut store = ArtifactStore::with_local_dir(
            "http://127.0.0.1:1".to_string(),
            "master".to_string(),
            root.path().join("artifacts"),
        )
        .unwrap();
        std::fs::write(
            root.path().join("artifacts/runtime.compatibility.json"),
            r#"{ "linux-x64": ["linux-x64"] }"#,
        )
        .unwrap();
        let cached = root
            .path()
            .join("artifacts/v6.0.5/linux-x64.Release/libhostfxr.so");
        ensure_dir_exists(cached.parent().unwrap()).unwrap();
        std::fs::write(&cached, b"patched-fxr").unwrap();

        let publish = root.path().join("publish");
        ensure_dir_exists(&publish).unwrap();
        std::fs::write(publish.join("libhostfxr.so"), b"original-fxr").unwrap();

        let ok = patch_hostfxr(&mut store, &publish, "v6.0.5", "linux-x64").unwrap();
        assert!(ok);
        assert_eq!(fs::read(publish.join("libhostfxr.so")).unwrap(), b"patched-fxr");
        assert_eq!(
            fs::read(publish.join("libhostfxr.so.bak")).unwrap(),
            b"original-fxr"
        );
    }

    #[test]
    fn test_patch_without_compatible_rid_is_fatal() {
        let root = tempdir().unwrap();
        let mut store = ArtifactStore::with_local_dir(
            "http://127.0.0.1:1".to_string(),
            "master".to_string(),
            root.path().join("artifacts"),
        )
        .unwrap();
        let publish = root.path().join("publish");
        ensure_dir_exists(&publish).unwrap();
        assert!(patch_hostfxr(&mut store, &publish, "v6.0.5", "win-x64").is_err());
    }

    #[test]
    fn test_patch_missing_original_is_tolerated() {
        let root = tempdir().unwrap();
        let mut store = store_with_artifact(root.path(), "v6.0.5", "linux-x64", "");
        let publish = root.path().join("publish");
        ensure_dir_exists(&publish).unwrap();
        // no libhostfxr.so published: backup fails, run keeps going
        let ok = patch_hostfxr(&mut store, &publish, "v6.0.5", "linux-x64").unwrap();
        assert!(!ok);
    }
}
