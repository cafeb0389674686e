use std::fs;
use std::path::{Path, PathBuf};
use anyhow::{Context, Result};
use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value, json};

use crate::util::{find_files_matching, list_dirs, list_files, normalize_slashes};
use crate::{HOOK_CLOSURE, WPF_CORE_SET, log};

/// Which manifest section a dependency came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepKind {
    Assembly,
    Resource,
    Native,
}

/// A dependency file listed in a `*.deps.json`, resolved to the relative
/// paths it may live at inside the publish directory.
#[derive(Debug, Clone)]
pub struct Dep {
    /// Bare file name, e.g. `Newtonsoft.Json.dll`.
    pub name: String,
    /// Primary relative path (resources keep their culture directory).
    pub path: String,
    /// Fallback relative path; for natives this is the full manifest path.
    pub second_path: String,
    pub kind: DepKind,
    /// Culture of a resource assembly, empty otherwise.
    pub locale: String,
}

/// Flags that steer how a `*.deps.json` is rewritten.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixOptions {
    /// Keep the debugger support libraries around.
    pub enable_debug: bool,
    /// A patched hostfxr will be installed, so entries can be re-rooted.
    pub use_patch: bool,
    /// Shared runtime mode: assemblies land in content-hashed directories.
    pub shared_runtime: bool,
}

/// What [`fix_deps`] learned about the app while rewriting its manifest.
#[derive(Debug, Default)]
pub struct DepsAnalysis {
    pub deps: Vec<Dep>,
    pub uses_wpf: bool,
    pub is_aspnet: bool,
}

/// Finds every `*.deps.json` directly inside `dir`.
pub fn find_deps_json<P: AsRef<Path>>(dir: P) -> Vec<PathBuf> {
    find_files_matching(dir, |name| name.ends_with(".deps.json"))
}

/// Extracts the self-contained runtime version and RID from a `*.deps.json`,
/// if the app carries one. The target entry naming changed across .NET
/// releases, so three shapes are recognized.
pub fn find_fxr_version<P: AsRef<Path>>(deps: P) -> Option<(String, String)> {
    let bytes = fs::read(deps.as_ref()).ok()?;
    let json: Value = serde_json::from_slice(&bytes).ok()?;

    let patterns = [
        // 2.x
        r"^runtime\.([\w\-\.]+)\.Microsoft\.NETCore\.DotNetHostResolver/([\w\-\.]+)$",
        // 3.0.x
        r"^runtimepack\.runtime\.([\w\-\.]+)\.Microsoft\.NETCore\.DotNetHostResolver/([\w\-\.]+)$",
        // >= 3.1.x
        r"^runtimepack\.Microsoft\.NETCore\.App\.Runtime\.([\w\-\.]+)/([\w\-\.]+)$",
    ];

    let targets = json.get("targets")?.as_object()?;
    for target in targets.values() {
        let Some(target) = target.as_object() else {
            continue;
        };
        for target_name in target.keys() {
            if !target_name.starts_with("runtime") {
                continue;
            }
            let is_resolver = target_name.contains("Microsoft.NETCore.DotNetHostResolver");
            let is_runtime = target_name.contains("Microsoft.NETCore.App.Runtime");
            if !is_resolver && !is_runtime {
                continue;
            }
            for pattern in &patterns {
                let regex = Regex::new(pattern).ok()?;
                if let Some(caps) = regex.captures(target_name) {
                    let rid = caps[1].to_string();
                    let fxr_version = format!("v{}", &caps[2]);
                    return Some((fxr_version, rid));
                }
            }
        }
    }
    None
}

#[derive(Serialize)]
struct HookLibrary {
    #[serde(rename = "type")]
    kind: String,
    serviceable: bool,
    sha512: String,
}

/// Registers the startup hook assembly in a `*.deps.json` so the runtime
/// accepts it as a resolvable project dependency. Missing `targets` or
/// `libraries` objects are created, a minimal manifest still gets the hook.
pub fn add_startup_hook_to_deps<P: AsRef<Path>>(deps: P, hook: &str) -> Result<()> {
    let deps = deps.as_ref();
    let bytes = fs::read(deps).with_context(|| format!("can not read deps.json: {}", deps.display()))?;
    let mut json: Value =
        serde_json::from_slice(&bytes).with_context(|| format!("invalid deps.json: {}", deps.display()))?;

    let runtime_target = json
        .pointer("/runtimeTarget/name")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let hook_dll = format!("{hook}.dll");
    if !json.is_object() {
        json = json!({});
    }
    let root = json.as_object_mut().expect("object ensured above");

    object_entry(object_entry(root, "targets"), &runtime_target)
        .insert(hook.to_string(), json!({ "runtime": { hook_dll: {} } }));

    object_entry(root, "libraries").insert(
        hook.to_string(),
        serde_json::to_value(HookLibrary {
            kind: "project".to_string(),
            serviceable: false,
            sha512: String::new(),
        })?,
    );

    write_pretty(deps, &json)
}

fn object_entry<'a>(map: &'a mut Map<String, Value>, key: &str) -> &'a mut Map<String, Value> {
    let value = map.entry(key).or_insert_with(|| json!({}));
    if !value.is_object() {
        *value = json!({});
    }
    value.as_object_mut().expect("object ensured above")
}

struct AnalyzedDep {
    target: String,
    entry_name: String,
    section: &'static str,
    item_key: String,
    name: String,
    locale: String,
    kind: DepKind,
    dep: Dep,
}

/// Rewrites a `*.deps.json` for the relocated layout and returns every
/// dependency file that should be moved.
pub fn fix_deps<P: AsRef<Path>>(deps: P, entry: &str, opts: FixOptions) -> Result<DepsAnalysis> {
    let deps_path = deps.as_ref();
    let dir = deps_path.parent().unwrap_or_else(|| Path::new("."));

    let bytes =
        fs::read(deps_path).with_context(|| format!("can not read deps.json: {}", deps_path.display()))?;
    let mut json: Value = serde_json::from_slice(&bytes)
        .with_context(|| format!("invalid deps.json: {}", deps_path.display()))?;

    let analyzed = collect_deps(&json);

    let uses_wpf = analyzed
        .iter()
        .any(|a| a.kind == DepKind::Assembly && a.name == "PresentationCore.dll");
    let is_aspnet = dir.join("web.config").exists();
    let verify_wpf_dll_set = uses_wpf && windows_base_has_verify_marker(dir);

    log::detail(&format!("ASP.NET Core: {}", yes_no(is_aspnet)));
    if uses_wpf {
        log::detail("Use WPF: Yes");
        log::detail(&format!("VerifyWpfDllSet: {}", yes_no(verify_wpf_dll_set)));
    } else {
        log::detail("Use WPF: No");
    }
    log::detail(&format!("Enable Debugging: {}", yes_no(opts.enable_debug)));

    let mut result = DepsAnalysis {
        deps: Vec::new(),
        uses_wpf,
        is_aspnet,
    };

    for item in &analyzed {
        if should_skip(&item.name, entry, &opts, is_aspnet, uses_wpf, verify_wpf_dll_set) {
            continue;
        }

        result.deps.push(item.dep.clone());

        let Some(section) = section_map(&mut json, item) else {
            continue;
        };

        // Debugger libraries are dropped from the manifest entirely unless
        // debugging stays enabled.
        if !opts.enable_debug
            && (item.name.contains("mscordaccore") || item.name.contains("mscordbi"))
        {
            if !item.item_key.starts_with("./") {
                section.remove(&item.item_key);
            }
            continue;
        }

        if opts.use_patch && needs_rooting(item, &opts) {
            if item.kind == DepKind::Resource {
                section.insert(
                    format!("./{}/{}", item.locale, item.name),
                    json!({ "locale": item.locale }),
                );
            } else {
                section.insert(format!("./{}", item.name), json!({}));
            }
        }

        if !item.item_key.starts_with("./") {
            section.remove(&item.item_key);
        }
    }

    // With the patched host every library resolves from the publish root.
    if opts.use_patch {
        if let Some(libraries) = json.get_mut("libraries").and_then(Value::as_object_mut) {
            for lib in libraries.values_mut() {
                if let Some(lib) = lib.as_object_mut() {
                    lib.insert("path".to_string(), json!("./"));
                }
            }
        }
    }

    write_pretty(deps_path, &json)?;

    append_satellite_assemblies(dir, &mut result.deps);

    Ok(result)
}

/// Satellite `*.resources.dll` files published one directory level down are
/// not always listed in the manifest, but still need to move.
fn append_satellite_assemblies(dir: &Path, deps: &mut Vec<Dep>) {
    for culture in list_dirs(dir) {
        for file in list_files(dir.join(&culture)) {
            let Some(name) = file.file_name().map(|n| n.to_string_lossy().to_string()) else {
                continue;
            };
            if !name.ends_with(".resources.dll") {
                continue;
            }
            let rel = format!("{culture}/{name}");
            deps.push(Dep {
                name,
                path: rel.clone(),
                second_path: rel,
                kind: DepKind::Resource,
                locale: culture.clone(),
            });
        }
    }
}

fn collect_deps(json: &Value) -> Vec<AnalyzedDep> {
    let mut analyzed = Vec::new();
    let Some(targets) = json.get("targets").and_then(Value::as_object) else {
        return analyzed;
    };

    for (target_name, target) in targets {
        let Some(target) = target.as_object() else {
            continue;
        };
        for (entry_name, entry) in target {
            if entry_name.starts_with(&format!("{}/", crate::STARTUP_HOOK))
                || entry_name == crate::STARTUP_HOOK
            {
                continue;
            }

            if let Some(runtime) = entry.get("runtime").and_then(Value::as_object) {
                for item_key in runtime.keys() {
                    let name = file_name_of(item_key);
                    analyzed.push(AnalyzedDep {
                        target: target_name.clone(),
                        entry_name: entry_name.clone(),
                        section: "runtime",
                        item_key: item_key.clone(),
                        name: name.clone(),
                        locale: String::new(),
                        kind: DepKind::Assembly,
                        dep: Dep {
                            name: name.clone(),
                            path: name.clone(),
                            second_path: name,
                            kind: DepKind::Assembly,
                            locale: String::new(),
                        },
                    });
                }
            }

            if let Some(resources) = entry.get("resources").and_then(Value::as_object) {
                for (item_key, meta) in resources {
                    let name = file_name_of(item_key);
                    let locale = meta
                        .get("locale")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string();
                    let rel = format!("{locale}/{name}");
                    analyzed.push(AnalyzedDep {
                        target: target_name.clone(),
                        entry_name: entry_name.clone(),
                        section: "resources",
                        item_key: item_key.clone(),
                        name: name.clone(),
                        locale: locale.clone(),
                        kind: DepKind::Resource,
                        dep: Dep {
                            name,
                            path: rel.clone(),
                            second_path: rel,
                            kind: DepKind::Resource,
                            locale,
                        },
                    });
                }
            }

            if let Some(native) = entry.get("native").and_then(Value::as_object) {
                for item_key in native.keys() {
                    let name = file_name_of(item_key);
                    analyzed.push(AnalyzedDep {
                        target: target_name.clone(),
                        entry_name: entry_name.clone(),
                        section: "native",
                        item_key: item_key.clone(),
                        name: name.clone(),
                        locale: String::new(),
                        kind: DepKind::Native,
                        dep: Dep {
                            name: name.clone(),
                            path: name,
                            second_path: normalize_slashes(item_key),
                            kind: DepKind::Native,
                            locale: String::new(),
                        },
                    });
                }
            }
        }
    }
    analyzed
}

fn section_map<'a>(json: &'a mut Value, item: &AnalyzedDep) -> Option<&'a mut Map<String, Value>> {
    json.get_mut("targets")?
        .get_mut(&item.target)?
        .get_mut(&item.entry_name)?
        .get_mut(item.section)?
        .as_object_mut()
}

fn should_skip(
    name: &str,
    entry: &str,
    opts: &FixOptions,
    is_aspnet: bool,
    uses_wpf: bool,
    verify_wpf_dll_set: bool,
) -> bool {
    // The entry assembly and the host pieces must stay where the host
    // expects them.
    if name == format!("{entry}.dll") || name.contains("hostfxr.") || name.contains("hostpolicy.") {
        return true;
    }

    // clr
    if (is_aspnet || !opts.use_patch) && (name.contains("clrjit.") || name.contains("coreclr.")) {
        return true;
    }

    if !opts.use_patch {
        if name == format!("{}.dll", crate::STARTUP_HOOK) {
            return true;
        }
        if HOOK_CLOSURE.contains(&name) || name.contains("libSystem.Native") {
            return true;
        }
    }

    if is_aspnet && name.contains("aspnetcore") {
        return true;
    }

    // WPF loads these before any startup hook runs.
    if !opts.use_patch && uses_wpf {
        if name == "PresentationFramework.dll" || name == "WindowsBase.dll" || name == "System.Xaml.dll"
        {
            return true;
        }
    }

    if !opts.use_patch && verify_wpf_dll_set {
        if name == "PresentationCore.dll"
            || name.contains("PresentationNative_")
            || name.contains("wpfgfx_")
            || name.contains("vcruntime")
            || name.contains("D3DCompiler_")
            || name.contains("PenImc_")
            || name.contains("PenImc2_")
        {
            return true;
        }
    }

    false
}

fn needs_rooting(item: &AnalyzedDep, opts: &FixOptions) -> bool {
    if !opts.shared_runtime {
        return true;
    }
    item.kind == DepKind::Native
        || HOOK_CLOSURE.contains(&item.name.as_str())
        || WPF_CORE_SET.contains(&item.name.as_str())
}

/// Newer WindowsBase builds verify the WPF dll set lives next to the entry
/// assembly, so those files must not move without the patched host.
fn windows_base_has_verify_marker(dir: &Path) -> bool {
    let path = dir.join("WindowsBase.dll");
    match fs::read(&path) {
        Ok(content) => content
            .windows(b"VerifyWpfDllSet".len())
            .any(|w| w == b"VerifyWpfDllSet"),
        Err(_) => false,
    }
}

fn file_name_of(item_key: &str) -> String {
    normalize_slashes(item_key)
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .to_string()
}

fn yes_no(v: bool) -> &'static str {
    if v { "Yes" } else { "No" }
}

pub(crate) fn write_pretty(path: &Path, json: &Value) -> Result<()> {
    let pretty = serde_json::to_string_pretty(json)?;
    fs::write(path, pretty).with_context(|| format!("can not write json: {}", path.display()))?;
    Ok(())
}
