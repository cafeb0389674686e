use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use anyhow::{Context, Result, anyhow};
use directories::ProjectDirs;
use reqwest::blocking::Client;
use serde_json::Value;

use crate::log;
use crate::util::ensure_dir_exists;

const ARTIFACTS_VERSION_TXT: &str = "ArtifactsVersion.txt";
const ARTIFACTS_VERSION_JSON: &str = "ArtifactsVersion.json";
const ONLINE_ARTIFACTS_VERSION_JSON: &str = "OnlineArtifactsVersion.json";
const RUNTIME_COMPATIBILITY_JSON: &str = "runtime.compatibility.json";
const RUNTIME_SUPPORTED_JSON: &str = "runtime.supported.json";
const GIT_CDN_FILE: &str = "git.cdn";

const MARKER_TIMEOUT: Duration = Duration::from_secs(5);
const INDEX_TIMEOUT: Duration = Duration::from_secs(10);
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(60);

/// Returns the hostfxr file name the given RID publishes.
pub fn hostfxr_name_by_rid(rid: &str) -> &'static str {
    if rid.contains("win") {
        "hostfxr.dll"
    } else if rid.contains("osx") {
        "libhostfxr.dylib"
    } else {
        "libhostfxr.so"
    }
}

fn project_dirs() -> Result<ProjectDirs> {
    ProjectDirs::from("org", "nbeauty", "nbeauty")
        .ok_or_else(|| anyhow!("Could not get project directories"))
}

fn cdn_file() -> Result<PathBuf> {
    let dirs = project_dirs()?;
    Ok(dirs.config_dir().join(GIT_CDN_FILE))
}

/// Reads the persisted default CDN, if any.
pub fn get_cdn() -> Option<String> {
    let path = cdn_file().ok()?;
    let cdn = fs::read_to_string(path).ok()?;
    let cdn = cdn.trim().to_string();
    (!cdn.is_empty()).then_some(cdn)
}

/// Persists `cdn` as the default mirror.
pub fn set_cdn(cdn: &str) -> Result<()> {
    let path = cdn_file()?;
    if let Some(parent) = path.parent() {
        ensure_dir_exists(parent)?;
    }
    fs::write(&path, cdn).with_context(|| format!("can not write {}", path.display()))?;
    Ok(())
}

/// Deletes the persisted default CDN.
pub fn del_cdn() -> Result<()> {
    let path = cdn_file()?;
    fs::remove_file(&path).with_context(|| format!("can not remove {}", path.display()))?;
    Ok(())
}

/// Local cache of patched hostfxr artifacts plus the version bookkeeping
/// around it. The online side is a git repo served raw from a CDN mirror.
pub struct ArtifactStore {
    cdn: String,
    tree: String,
    local_dir: PathBuf,
    client: Client,
    online_cache: Option<Value>,
}

impl ArtifactStore {
    /// Opens the store below the user cache dir.
    pub fn new(cdn: String, tree: String) -> Result<Self> {
        let dirs = project_dirs()?;
        let local_dir = dirs.cache_dir().join("artifacts");
        Self::with_local_dir(cdn, tree, local_dir)
    }

    /// Opens the store with an explicit artifacts dir (used by tests).
    pub fn with_local_dir(cdn: String, tree: String, local_dir: PathBuf) -> Result<Self> {
        ensure_dir_exists(&local_dir)?;
        Ok(ArtifactStore {
            cdn: cdn.trim_end_matches('/').to_string(),
            tree,
            local_dir,
            client: Client::new(),
            online_cache: None,
        })
    }

    fn artifacts_online_path(&self) -> String {
        format!("{}/raw/{}/artifacts", self.cdn, self.tree)
    }

    fn artifact_url(&self, fxr_version: &str, rid: &str) -> String {
        format!(
            "{}/{}/{}.Release/{}",
            self.artifacts_online_path(),
            fxr_version,
            rid,
            hostfxr_name_by_rid(rid)
        )
    }

    fn artifact_file(&self, fxr_version: &str, rid: &str) -> PathBuf {
        self.local_dir
            .join(fxr_version)
            .join(format!("{rid}.Release"))
            .join(hostfxr_name_by_rid(rid))
    }

    fn fetch(&self, url: &str, timeout: Duration) -> Option<Vec<u8>> {
        let response = self.client.get(url).timeout(timeout).send().ok()?;
        if !response.status().is_success() {
            return None;
        }
        response.bytes().ok().map(|b| b.to_vec())
    }

    fn read_local_versions(&self) -> BTreeMap<String, String> {
        let path = self.local_dir.join(ARTIFACTS_VERSION_JSON);
        fs::read(&path)
            .ok()
            .and_then(|bytes| serde_json::from_slice(&bytes).ok())
            .unwrap_or_default()
    }

    /// The locally recorded artifact version for `fxr_version`/`rid`.
    pub fn local_version(&self, fxr_version: &str, rid: &str) -> Option<String> {
        self.read_local_versions()
            .get(&format!("{fxr_version}/{rid}"))
            .cloned()
    }

    /// Records (or, with an empty version, forgets) the local artifact
    /// version for `fxr_version`/`rid`.
    pub fn write_local_version(&self, fxr_version: &str, rid: &str, version: &str) -> Result<()> {
        let mut versions = self.read_local_versions();
        let key = format!("{fxr_version}/{rid}");
        if version.is_empty() {
            versions.remove(&key);
        } else {
            versions.insert(key, version.to_string());
        }
        let path = self.local_dir.join(ARTIFACTS_VERSION_JSON);
        let pretty = serde_json::to_string_pretty(&versions)?;
        fs::write(&path, pretty)
            .with_context(|| format!("cannot create path or path is not writeable: {}", path.display()))?;
        Ok(())
    }

    /// The online artifact version for `fxr_version`/`rid`, going through the
    /// cached version index when it is still fresh. Network failures degrade
    /// to whatever the cache knows.
    pub fn online_version(&mut self, fxr_version: &str, rid: &str) -> Option<String> {
        if self.online_cache.is_none() {
            self.load_online_index();
        }
        self.online_cache
            .as_ref()?
            .get(format!("{fxr_version}/{rid}"))
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    fn load_online_index(&mut self) {
        let marker_path = self.local_dir.join(ARTIFACTS_VERSION_TXT);
        let index_path = self.local_dir.join(ONLINE_ARTIFACTS_VERSION_JSON);

        // A tiny marker file tells whether the cached index is current, so
        // the full index is only re-fetched when it actually changed.
        let mut fresh = false;
        let marker_url = format!("{}/{}", self.artifacts_online_path(), ARTIFACTS_VERSION_TXT);
        if let Some(bytes) = self.fetch(&marker_url, MARKER_TIMEOUT) {
            let known = fs::read(&marker_path).unwrap_or_default();
            fresh = known == bytes;
            if !fresh {
                if let Err(e) = fs::write(&marker_path, &bytes) {
                    log::error(&e.to_string());
                }
            }
        }

        if fresh && index_path.exists() {
            self.online_cache = fs::read(&index_path)
                .ok()
                .and_then(|bytes| serde_json::from_slice(&bytes).ok());
            if self.online_cache.is_some() {
                return;
            }
        }

        let index_url = format!(
            "{}/{}",
            self.artifacts_online_path(),
            ONLINE_ARTIFACTS_VERSION_JSON
        );
        if let Some(bytes) = self.fetch(&index_url, INDEX_TIMEOUT) {
            self.online_cache = serde_json::from_slice(&bytes).ok();
            if let Err(e) = fs::write(&index_path, &bytes) {
                log::error(&e.to_string());
            }
        }
    }

    /// Downloads `url` to `dest`, creating parent dirs as needed.
    pub fn download_file(&self, url: &str, dest: &Path) -> Result<()> {
        let bytes = self
            .fetch(url, DOWNLOAD_TIMEOUT)
            .ok_or_else(|| anyhow!("download failed: {}", url))?;
        if let Some(parent) = dest.parent() {
            ensure_dir_exists(parent)
                .with_context(|| format!("cannot create path or path is not writeable: {}", parent.display()))?;
        }
        fs::write(dest, bytes).with_context(|| format!("can not write {}", dest.display()))?;
        Ok(())
    }

    /// Downloads the patched hostfxr for `fxr_version`/`rid` into the cache.
    pub fn download_artifact(&self, fxr_version: &str, rid: &str) -> Result<()> {
        let url = self.artifact_url(fxr_version, rid);
        let dest = self.artifact_file(fxr_version, rid);
        self.download_file(&url, &dest)
    }

    /// Whether the cache holds an artifact for `fxr_version`/`rid`.
    pub fn is_local_artifact(&self, fxr_version: &str, rid: &str) -> bool {
        self.artifact_file(fxr_version, rid).exists()
    }

    /// Copies a cached artifact into `dir` under its hostfxr name.
    pub fn copy_artifact_to(&self, fxr_version: &str, rid: &str, dir: &Path) -> Result<()> {
        if !self.is_local_artifact(fxr_version, rid) {
            anyhow::bail!("Artifact does not exist. {}/{}", fxr_version, rid);
        }
        let src = self.artifact_file(fxr_version, rid);
        let dest = dir.join(hostfxr_name_by_rid(rid));
        fs::copy(&src, &dest).with_context(|| {
            format!("Cannot copy artifact from {} to {}", src.display(), dest.display())
        })?;
        Ok(())
    }

    /// Refreshes the RID compatibility/support tables whenever their online
    /// versions moved. Failures are logged, the tables may just be stale.
    pub fn check_runtime_jsons(&mut self) {
        log::info("checking runtime.*.json version...");
        let Some(online_compat) = self.online_version("runtime", "compatibility") else {
            log::detail("fetch online runtime compatibility version failed");
            return;
        };
        let Some(online_supported) = self.online_version("runtime", "supported") else {
            log::detail("fetch online runtime supported version failed");
            return;
        };

        let updates = [
            (RUNTIME_COMPATIBILITY_JSON, "compatibility", online_compat),
            (RUNTIME_SUPPORTED_JSON, "supported", online_supported),
        ];

        for (name, kind, online) in updates {
            let local = self.local_version("runtime", kind).unwrap_or_default();
            if local == online {
                log::info(&format!("{name} no need to update"));
                continue;
            }
            log::detail(&format!("updating {name}..."));
            let url = format!("{}/{}", self.artifacts_online_path(), name);
            let path = self.local_dir.join(name);
            let result = self
                .download_file(&url, &path)
                .and_then(|_| self.write_local_version("runtime", kind, &online));
            match result {
                Ok(()) => log::info(&format!("update {name} succeeded")),
                Err(_) => log::detail(&format!("update {name} failed")),
            }
        }
    }

    /// Resolves the first RID the online artifacts are compatible with.
    pub fn find_compatible_rid(&self, rid: &str) -> Option<String> {
        let path = self.local_dir.join(RUNTIME_COMPATIBILITY_JSON);
        let json: Value = fs::read(&path)
            .ok()
            .and_then(|bytes| serde_json::from_slice(&bytes).ok())?;
        json.get(rid)?
            .as_array()?
            .first()?
            .as_str()
            .map(str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn store(dir: &Path) -> ArtifactStore {
        ArtifactStore::with_local_dir(
            "http://127.0.0.1:1".to_string(),
            "master".to_string(),
            dir.join("artifacts"),
        )
        .unwrap()
    }

    #[test]
    fn test_hostfxr_name_by_rid() {
        assert_eq!(hostfxr_name_by_rid("win-x64"), "hostfxr.dll");
        assert_eq!(hostfxr_name_by_rid("osx-arm64"), "libhostfxr.dylib");
        assert_eq!(hostfxr_name_by_rid("linux-x64"), "libhostfxr.so");
    }

    #[test]
    fn test_local_version_roundtrip() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());

        assert!(store.local_version("v6.0.5", "win-x64").is_none());
        store.write_local_version("v6.0.5", "win-x64", "abc").unwrap();
        assert_eq!(
            store.local_version("v6.0.5", "win-x64").as_deref(),
            Some("abc")
        );

        // empty version forgets the entry
        store.write_local_version("v6.0.5", "win-x64", "").unwrap();
        assert!(store.local_version("v6.0.5", "win-x64").is_none());
    }

    #[test]
    fn test_local_versions_are_keyed_per_rid() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());
        store.write_local_version("v6.0.5", "win-x64", "a").unwrap();
        store.write_local_version("v6.0.5", "linux-x64", "b").unwrap();
        assert_eq!(store.local_version("v6.0.5", "win-x64").as_deref(), Some("a"));
        assert_eq!(store.local_version("v6.0.5", "linux-x64").as_deref(), Some("b"));
    }

    #[test]
    fn test_artifact_url_layout() {
        let dir = tempdir().unwrap();
        let store = ArtifactStore::with_local_dir(
            "https://example.com/mirror".to_string(),
            "master".to_string(),
            dir.path().join("artifacts"),
        )
        .unwrap();
        assert_eq!(
            store.artifact_url("v6.0.5", "win-x64"),
            "https://example.com/mirror/raw/master/artifacts/v6.0.5/win-x64.Release/hostfxr.dll"
        );
    }

    #[test]
    fn test_copy_artifact_to() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());
        let cached = store.artifact_file("v6.0.5", "linux-x64");
        ensure_dir_exists(cached.parent().unwrap()).unwrap();
        fs::write(&cached, b"patched").unwrap();

        let publish = dir.path().join("publish");
        ensure_dir_exists(&publish).unwrap();
        store.copy_artifact_to("v6.0.5", "linux-x64", &publish).unwrap();
        assert_eq!(
            fs::read(publish.join("libhostfxr.so")).unwrap(),
            b"patched"
        );
    }

    #[test]
    fn test_copy_artifact_missing_fails() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());
        assert!(
            store
                .copy_artifact_to("v9.9.9", "win-x64", dir.path())
                .is_err()
        );
    }

    #[test]
    fn test_find_compatible_rid() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());
        fs::write(
            dir.path().join("artifacts").join(RUNTIME_COMPATIBILITY_JSON),
            r#"{ "win10-x64": ["win-x64", "win7-x64"] }"#,
        )
        .unwrap();
        assert_eq!(
            store.find_compatible_rid("win10-x64").as_deref(),
            Some("win-x64")
        );
        assert!(store.find_compatible_rid("unknown-rid").is_none());
    }
}
