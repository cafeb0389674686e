//! # nbeauty Core Library
//!
//! This crate contains the core logic of the `nbeauty` tool – a post-publish
//! step for .NET applications that moves the bulk of the published dependency
//! files into a subdirectory (`libraries` by default) and rewrites the
//! runtime manifests (`*.deps.json`, `*.runtimeconfig*.json`) so the runtime
//! still resolves everything.
//!
//! For self-contained apps it can additionally download a patched `hostfxr`
//! from a git CDN and install it over the published one, so the host itself
//! probes the relocated directory.
//!
//! This library is built for the `nbeauty` CLI, but you can also reuse it as
//! a backend in other build tooling.
//!
//! ## Modules Overview
//! - [`deps`] – Analysis and rewriting of `*.deps.json` manifests
//! - [`runtime_config`] – Rewriting of `*.runtimeconfig*.json` manifests
//! - [`mover`] – Physical relocation of dependency files
//! - [`artifacts`] – Patch artifact cache, versions and CDN handling
//! - [`patch`] – Installing the patched hostfxr
//! - [`hide`] – Hiding selected files in the publish root
//! - [`log`] – Leveled progress/error output
//! - [`util`] – Shared utilities (paths, hashing, pattern matching)

pub mod artifacts;
pub mod deps;
pub mod hide;
pub mod log;
pub mod mover;
pub mod patch;
pub mod runtime_config;
pub mod util;

pub use artifacts::*;
pub use deps::*;
pub use mover::*;
pub use patch::*;
pub use runtime_config::*;
pub use util::*;

/// Name of the startup hook assembly wired into the manifests.
pub const STARTUP_HOOK: &str = "nbloader";

/// Default HostFXRPatcher mirror used when no CDN is configured.
pub const DEFAULT_GIT_CDN: &str = "https://github.com/nulastudio/HostFXRPatcher";

/// Assemblies the startup hook itself needs before any probing logic runs.
/// These must stay resolvable from the publish root (or be rooted in the
/// manifest when patching).
pub const HOOK_CLOSURE: &[&str] = &[
    "System.Collections.dll",
    "System.Memory.dll",
    "System.Private.CoreLib.dll",
    "System.Runtime.dll",
    "System.Runtime.Extensions.dll",
    "System.Runtime.InteropServices.dll",
    "System.Runtime.InteropServices.RuntimeInformation.dll",
    "System.Runtime.Loader.dll",
    "System.IO.FileSystem.dll",
    "System.IO.Packaging.dll",
];

/// Core WPF assemblies that the runtime loads before the hook can probe.
pub const WPF_CORE_SET: &[&str] = &[
    "PresentationCore.dll",
    "PresentationFramework.dll",
    "WindowsBase.dll",
    "System.Xaml.dll",
];
