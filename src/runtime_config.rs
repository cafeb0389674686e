use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use anyhow::{Context, Result, bail};
use serde_json::{Map, Value, json};

use crate::deps::write_pretty;
use crate::util::{find_files_matching, normalize_slashes, string_hash};
use crate::{HOOK_CLOSURE, WPF_CORE_SET};

/// Flags that steer how a `*.runtimeconfig*.json` is rewritten.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuntimeConfigOptions {
    pub shared_runtime: bool,
    pub use_patch: bool,
    pub uses_wpf: bool,
}

/// Finds every `*runtimeconfig*.json` directly inside `dir`.
pub fn find_runtime_config_json<P: AsRef<Path>>(dir: P) -> Vec<PathBuf> {
    find_files_matching(dir, |name| name.contains("runtimeconfig") && name.ends_with(".json"))
}

/// Registers the startup hook in a `*.runtimeconfig*.json`.
pub fn add_startup_hook_to_runtime_config<P: AsRef<Path>>(config: P, hook: &str) -> Result<()> {
    let config = config.as_ref();
    let mut json = read_config(config)?;
    config_properties(&mut json).insert("STARTUP_HOOKS".to_string(), json!(hook));
    write_pretty(config, &json)
}

/// Points the runtime at the relocated dependency directories: records the
/// probe directories the startup hook reads, the shared runtime properties,
/// and (with the patched host) the `additionalProbingPaths`.
pub fn fix_runtime_config<P: AsRef<Path>>(
    config: P,
    libs_dir: &str,
    sub_dirs: &[String],
    srm_mapping: &BTreeMap<String, String>,
    opts: RuntimeConfigOptions,
) -> Result<()> {
    let config = config.as_ref();
    let mut json = read_config(config)?;

    let libs_dir = normalize_slashes(libs_dir);
    let libs_dir = libs_dir.trim_end_matches('/');

    let mut libs_dirs = vec![".".to_string(), libs_dir.to_string()];
    for sub in sub_dirs {
        libs_dirs.push(format!("{}/{}", libs_dir, normalize_slashes(sub)));
    }

    config_properties(&mut json).insert("NetBeautyLibsDir".to_string(), json!(libs_dirs.join(";")));

    let mut app_id = String::new();

    if opts.shared_runtime {
        let file_name = config
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let entry = file_name
            .split(".runtimeconfig.")
            .next()
            .unwrap_or_default();
        app_id = string_hash(entry);

        let mapping = srm_mapping
            .iter()
            .map(|(file, hash)| format!("{file}:{hash}"))
            .collect::<Vec<_>>()
            .join("|");

        let props = config_properties(&mut json);
        props.insert("NetBeautyAppID".to_string(), json!(app_id));
        props.insert("NetBeautySharedRuntimeMode".to_string(), json!("default"));
        props.insert("NetBeautySharedRuntimeMapping".to_string(), json!(mapping));
    } else {
        config_properties(&mut json)
            .insert("NetBeautySharedRuntimeMode".to_string(), json!("no"));
    }

    if opts.use_patch {
        let probing = merged_probing_paths(&json, libs_dir, &app_id, srm_mapping, opts)
            .with_context(|| format!("invalid runtimeconfig.json: {}", config.display()))?;
        let options = json
            .get_mut("runtimeOptions")
            .and_then(Value::as_object_mut)
            .expect("runtimeOptions created above");
        options.insert("additionalProbingPaths".to_string(), json!(probing));
    }

    write_pretty(config, &json)
}

fn merged_probing_paths(
    json: &Value,
    libs_dir: &str,
    app_id: &str,
    srm_mapping: &BTreeMap<String, String>,
    opts: RuntimeConfigOptions,
) -> Result<Vec<String>> {
    let mut paths: Vec<String> = Vec::new();

    if let Some(existing) = json.pointer("/runtimeOptions/additionalProbingPaths") {
        let Some(existing) = existing.as_array() else {
            bail!("additionalProbingPaths is not an array");
        };
        for path in existing {
            let Some(path) = path.as_str() else {
                bail!("additionalProbingPaths contains a non-string entry");
            };
            push_unique(&mut paths, path.to_string());
        }
    }

    if !opts.shared_runtime {
        push_unique(&mut paths, libs_dir.to_string());
        return Ok(paths);
    }

    // Hashed assembly dirs the host must probe before the hook takes over.
    for (file, hash) in srm_mapping {
        if file.contains('/') {
            // resources resolve through the hook, never through the host
            continue;
        }
        let rooted = HOOK_CLOSURE.contains(&file.as_str())
            || (opts.uses_wpf && WPF_CORE_SET.contains(&file.as_str()));
        if rooted {
            push_unique(&mut paths, format!("{libs_dir}/{file}/{hash}"));
        }
    }

    // The flat libs dir goes last: probing it earlier would mistake the
    // hashed per-file directories for plain assemblies.
    let srm_native_dir = format!("{libs_dir}/srm_native/{app_id}");
    paths.retain(|p| p != &srm_native_dir && p != libs_dir);
    let mut result = vec![srm_native_dir];
    result.extend(paths);
    result.push(libs_dir.to_string());
    Ok(result)
}

fn push_unique(paths: &mut Vec<String>, path: String) {
    if !path.is_empty() && !paths.contains(&path) {
        paths.push(path);
    }
}

fn read_config(path: &Path) -> Result<Value> {
    let bytes = fs::read(path)
        .with_context(|| format!("can not read runtimeconfig.json: {}", path.display()))?;
    serde_json::from_slice(&bytes)
        .with_context(|| format!("invalid runtimeconfig.json: {}", path.display()))
}

fn config_properties(json: &mut Value) -> &mut Map<String, Value> {
    if !json.is_object() {
        *json = json!({});
    }
    let root = json.as_object_mut().expect("object ensured above");
    let options = root
        .entry("runtimeOptions".to_string())
        .or_insert_with(|| json!({}));
    if !options.is_object() {
        *options = json!({});
    }
    let options = options.as_object_mut().expect("object ensured above");
    let props = options
        .entry("configProperties".to_string())
        .or_insert_with(|| json!({}));
    if !props.is_object() {
        *props = json!({});
    }
    props.as_object_mut().expect("object ensured above")
}
