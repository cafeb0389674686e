use std::fs;
use std::path::{Path, PathBuf};
use anyhow::Result;
use regex::Regex;
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

/// Splits a `;`-separated pattern list into its non-empty parts.
pub fn split_patterns(patterns: &str) -> Vec<String> {
    patterns
        .split(';')
        .filter(|p| !p.trim().is_empty())
        .map(|p| p.to_string())
        .collect()
}

/// Checks a file name against a list of glob-ish patterns (`*` matches
/// anything). Invalid patterns are ignored rather than failing the run.
pub fn file_match(file: &str, patterns: &[String]) -> bool {
    for pattern in patterns {
        if pattern.is_empty() {
            continue;
        }
        let translated = regex::escape(pattern).replace(r"\*", ".*");
        if let Ok(regex) = Regex::new(&translated) {
            if regex.is_match(file) {
                return true;
            }
        }
    }
    false
}

/// SHA-256 of a file's contents, hex encoded.
pub fn file_hash<P: AsRef<Path>>(path: P) -> Result<String> {
    let bytes = fs::read(path)?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

/// SHA-256 of a string, hex encoded. Used for stable app IDs.
pub fn string_hash(s: &str) -> String {
    hex::encode(Sha256::digest(s.as_bytes()))
}

/// Creates `dir` and all parents if missing.
pub fn ensure_dir_exists<P: AsRef<Path>>(dir: P) -> Result<()> {
    fs::create_dir_all(dir.as_ref())?;
    Ok(())
}

/// Non-recursive list of the plain files directly inside `dir`.
pub fn list_files<P: AsRef<Path>>(dir: P) -> Vec<PathBuf> {
    WalkDir::new(dir.as_ref())
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .collect()
}

/// Non-recursive list of the names of the directories directly inside `dir`.
pub fn list_dirs<P: AsRef<Path>>(dir: P) -> Vec<String> {
    WalkDir::new(dir.as_ref())
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_dir())
        .map(|e| e.file_name().to_string_lossy().to_string())
        .collect()
}

/// Files directly inside `dir` whose name matches `predicate`.
pub fn find_files_matching<P, F>(dir: P, predicate: F) -> Vec<PathBuf>
where
    P: AsRef<Path>,
    F: Fn(&str) -> bool,
{
    let mut matches: Vec<PathBuf> = list_files(dir)
        .into_iter()
        .filter(|p| {
            p.file_name()
                .map(|n| predicate(&n.to_string_lossy()))
                .unwrap_or(false)
        })
        .collect();
    matches.sort();
    matches
}

/// Deduplicates while keeping first-seen order.
pub fn unique(values: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    values.into_iter().filter(|v| seen.insert(v.clone())).collect()
}

/// Normalizes a manifest-relative path to forward slashes.
pub fn normalize_slashes(path: &str) -> String {
    path.replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_split_patterns_drops_empty() {
        assert_eq!(
            split_patterns("a.dll;;lib*; "),
            vec!["a.dll".to_string(), "lib*".to_string()]
        );
        assert!(split_patterns("").is_empty());
    }

    #[test]
    fn test_file_match_plain_and_wildcard() {
        let patterns = vec!["exact.dll".to_string(), "lib*".to_string()];
        assert!(file_match("exact.dll", &patterns));
        assert!(file_match("libSkiaSharp.so", &patterns));
        assert!(!file_match("Newtonsoft.Json.dll", &patterns));
    }

    #[test]
    fn test_file_match_empty_patterns() {
        assert!(!file_match("anything.dll", &[]));
        assert!(!file_match("anything.dll", &[String::new()]));
    }

    #[test]
    fn test_string_hash_is_stable() {
        assert_eq!(string_hash("MyApp"), string_hash("MyApp"));
        assert_ne!(string_hash("MyApp"), string_hash("OtherApp"));
        assert_eq!(string_hash("MyApp").len(), 64);
    }

    #[test]
    fn test_file_hash_matches_contents() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a.bin");
        let b = dir.path().join("b.bin");
        std::fs::write(&a, b"same").unwrap();
        std::fs::write(&b, b"same").unwrap();
        assert_eq!(file_hash(&a).unwrap(), file_hash(&b).unwrap());
    }

    #[test]
    fn test_list_files_and_dirs() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("file.txt"), "x").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        let files = list_files(dir.path());
        assert_eq!(files.len(), 1);
        assert_eq!(list_dirs(dir.path()), vec!["sub".to_string()]);
    }

    #[test]
    fn test_unique_keeps_order() {
        let values = vec!["b".to_string(), "a".to_string(), "b".to_string()];
        assert_eq!(unique(values), vec!["b".to_string(), "a".to_string()]);
    }
}
