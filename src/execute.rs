use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use anyhow::{Result, bail};
use clap::CommandFactory;

use nbeauty::artifacts::{ArtifactStore, del_cdn, get_cdn, set_cdn};
use nbeauty::deps::{FixOptions, add_startup_hook_to_deps, find_deps_json, find_fxr_version, fix_deps};
use nbeauty::hide::hide_matching;
use nbeauty::mover::{MoveOptions, move_deps};
use nbeauty::patch::patch_hostfxr;
use nbeauty::runtime_config::{
    RuntimeConfigOptions, add_startup_hook_to_runtime_config, find_runtime_config_json,
    fix_runtime_config,
};
use nbeauty::util::{split_patterns, unique};
use nbeauty::{DEFAULT_GIT_CDN, STARTUP_HOOK, log};
use crate::cli::{CLI, CdnCommand};

pub fn execute(cli: CLI) -> Result<()> {
    log::set_level(cli.loglevel.into());

    match &cli.command {
        Some(CdnCommand::SetCdn { url }) => execute_set_cdn(url),
        Some(CdnCommand::GetCdn) => execute_get_cdn(),
        Some(CdnCommand::DelCdn) => execute_del_cdn(),
        None => match cli.dir.clone() {
            Some(dir) => execute_beautify(&cli, dir),
            None => {
                CLI::command().print_help()?;
                Ok(())
            }
        },
    }
}

pub fn execute_set_cdn(url: &str) -> Result<()> {
    match set_cdn(url.trim_matches('"')) {
        Ok(()) => {
            println!("set default git cdn successfully");
            Ok(())
        }
        Err(e) => {
            println!("set default git cdn failed");
            Err(e)
        }
    }
}

pub fn execute_get_cdn() -> Result<()> {
    match get_cdn() {
        Some(cdn) => println!("current default git cdn: {cdn}"),
        None => println!("default git cdn has not been set yet"),
    }
    Ok(())
}

pub fn execute_del_cdn() -> Result<()> {
    match get_cdn() {
        Some(cdn) => {
            del_cdn()?;
            println!("current default git cdn has been deleted, it was: [{cdn}] before");
        }
        None => println!("default git cdn has not been set yet"),
    }
    Ok(())
}

struct CheckedManifest {
    path: PathBuf,
    entry: String,
    scd: Option<(String, String)>,
}

pub fn execute_beautify(cli: &CLI, dir: PathBuf) -> Result<()> {
    let dir = std::path::absolute(&dir)
        .map_err(|e| anyhow::anyhow!("invalid beauty dir: {}", e))?;
    if !dir.is_dir() {
        bail!("invalid beauty dir: {}", dir.display());
    }

    let cdn = cli
        .gitcdn
        .clone()
        .or_else(get_cdn)
        .unwrap_or_else(|| DEFAULT_GIT_CDN.to_string());
    let tree = cli.gittree.clone().unwrap_or_else(|| "master".to_string());
    let mut store = ArtifactStore::new(cdn, tree)?;

    log::info("running nbeauty...");

    let deps_files = find_deps_json(&dir);
    if deps_files.is_empty() {
        log::detail(&format!("no deps.json found in {}", dir.display()));
        log::detail("skipping");
        return Ok(());
    }

    // All manifests in one publish dir must agree on the self-contained
    // runtime, otherwise there is no single hostfxr to patch.
    let mut scd: Option<(String, String)> = None;
    let mut checked = Vec::new();
    for path in deps_files {
        let entry = path
            .file_name()
            .map(|n| n.to_string_lossy().replace(".deps.json", ""))
            .unwrap_or_default();
        let current = find_fxr_version(&path);
        if let Some(current) = &current {
            match &scd {
                None => scd = Some(current.clone()),
                Some(known) if known != current => bail!(
                    "Multiple SCD versions detected:\n[{}/{}]\n[{}/{}]",
                    known.0,
                    known.1,
                    current.0,
                    current.1
                ),
                Some(_) => {}
            }
        }
        checked.push(CheckedManifest {
            path,
            entry,
            scd: current,
        });
    }

    let mut use_patch = cli.usepatch;

    if let Some((fxr_version, rid)) = &scd {
        store.check_runtime_jsons();
        let online = store.online_version(fxr_version, rid);
        if use_patch && online.is_none() {
            bail!(
                "Artifact does not exist. {}/{}\nYou can report the missing artifact in here: https://github.com/nulastudio/NetBeauty2/discussions/36",
                fxr_version,
                rid
            );
        }
    }

    let excludes = split_patterns(&cli.excludes);
    let mut sub_dirs: Vec<String> = Vec::new();
    let mut srm_mapping: BTreeMap<String, String> = BTreeMap::new();
    let mut uses_wpf = false;

    for manifest in &checked {
        log::detail(&format!("fixing {}", manifest.path.display()));

        let scd_mode = manifest.scd.is_some();
        use_patch = use_patch && scd_mode;
        if scd_mode {
            log::detail("SCD Mode: Yes");
            if let Some((fxr_version, rid)) = &manifest.scd {
                log::detail(&format!("SCD Version: {fxr_version}, {rid}"));
            }
        } else {
            log::detail("SCD Mode: No");
        }
        log::detail(&format!("Use Patch: {}", if use_patch { "Yes" } else { "No" }));
        if cli.srmode {
            log::detail("Shared Runtime Mode: Yes");
            log::detail("moving deps may take some time");
        } else {
            log::detail("Shared Runtime Mode: No");
        }

        let hooked = match add_startup_hook_to_deps(&manifest.path, STARTUP_HOOK) {
            Ok(()) => true,
            Err(e) => {
                log::error(&e.to_string());
                false
            }
        };

        let analysis = match fix_deps(
            &manifest.path,
            &manifest.entry,
            FixOptions {
                enable_debug: cli.enabledebug,
                use_patch,
                shared_runtime: cli.srmode,
            },
        ) {
            Ok(analysis) => analysis,
            Err(e) => {
                log::error(&e.to_string());
                continue;
            }
        };
        uses_wpf = analysis.uses_wpf;

        let outcome = move_deps(
            &dir,
            &cli.libs_dir,
            &analysis.deps,
            &manifest.entry,
            &excludes,
            MoveOptions {
                shared_runtime: cli.srmode,
                enable_debug: cli.enabledebug,
                use_patch,
            },
        );
        srm_mapping = outcome.srm_mapping;
        sub_dirs.extend(outcome.sub_dirs);
        log::info(&format!(
            "moved {} of {} deps",
            outcome.moved, outcome.candidates
        ));

        if hooked {
            log::detail(&format!("{} fixed", manifest.path.display()));
        }
    }

    if use_patch {
        if let Some((fxr_version, rid)) = &scd {
            patch_hostfxr(&mut store, &dir, fxr_version, rid)?;
        }
    }

    let sub_dirs = unique(sub_dirs);

    let runtime_configs = find_runtime_config_json(&dir);
    if runtime_configs.is_empty() {
        log::detail(&format!("no runtimeconfig.json found in {}", dir.display()));
        log::detail("skipping");
        return Ok(());
    }
    for config in runtime_configs {
        log::detail(&format!("fixing {}", config.display()));
        let fixed = fix_config(&config, cli, &sub_dirs, &srm_mapping, use_patch, uses_wpf)?;
        if fixed {
            log::detail(&format!("{} fixed", config.display()));
        }
    }

    hide_matching(&dir, &split_patterns(&cli.hiddens));

    log::detail("nbeauty done. Enjoy it!");
    Ok(())
}

// A manifest the hook step cannot read is skipped; malformed content in one
// it could read is fatal, the app would not start with a half-fixed config.
fn fix_config(
    config: &Path,
    cli: &CLI,
    sub_dirs: &[String],
    srm_mapping: &BTreeMap<String, String>,
    use_patch: bool,
    uses_wpf: bool,
) -> Result<bool> {
    if let Err(e) = add_startup_hook_to_runtime_config(config, STARTUP_HOOK) {
        log::error(&e.to_string());
        return Ok(false);
    }
    fix_runtime_config(
        config,
        &cli.libs_dir,
        sub_dirs,
        srm_mapping,
        RuntimeConfigOptions {
            shared_runtime: cli.srmode,
            use_patch,
            uses_wpf,
        },
    )?;
    Ok(true)
}
