use std::path::PathBuf;
use clap::{Parser, Subcommand, ValueEnum};

use nbeauty::log;

#[derive(Debug, Parser, Clone)]
#[clap(author, version, about, long_about = None, args_conflicts_with_subcommands = true)]
pub struct CLI {
    #[command(subcommand)]
    pub(crate) command: Option<CdnCommand>,

    /// Publish directory to beautify
    pub(crate) dir: Option<PathBuf>,

    /// Subdirectory the dependencies are moved into
    #[clap(default_value = "libraries")]
    pub(crate) libs_dir: String,

    /// Dlls that must stay in place, ';'-separated. Example: dll1.dll;lib*;...
    #[clap(default_value = "")]
    pub(crate) excludes: String,

    /// Log level
    #[clap(long, value_enum, default_value_t = LogLevel::Error)]
    pub(crate) loglevel: LogLevel,

    /// Dlls that end users never need, so hide them. ';'-separated
    #[clap(long, default_value = "")]
    pub(crate) hiddens: String,

    /// HostFXRPatcher mirror repo, for when github is unreachable
    #[clap(long)]
    pub(crate) gitcdn: Option<String>,

    /// Git branch or commit hash (up to 40) to pin the artifacts to.
    /// Defaults to master, which always uses the latest artifacts
    #[clap(long)]
    pub(crate) gittree: Option<String>,

    /// Share the runtime between apps
    #[clap(long)]
    pub(crate) srmode: bool,

    /// Allow 3rd party debuggers (like dnSpy) to debug the app
    #[clap(long)]
    pub(crate) enabledebug: bool,

    /// Use the patched hostfxr to reduce files
    #[clap(long)]
    pub(crate) usepatch: bool,
}

#[derive(Debug, Subcommand, Clone, PartialEq)]
pub enum CdnCommand {
    /// Persist a default git CDN
    SetCdn { url: String },
    /// Print the persisted default git CDN
    GetCdn,
    /// Delete the persisted default git CDN
    DelCdn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    /// Log errors only
    Error,
    /// Log useful infos
    Detail,
    /// Log everything
    Info,
}

impl From<LogLevel> for log::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => log::Level::Error,
            LogLevel::Detail => log::Level::Detail,
            LogLevel::Info => log::Level::Info,
        }
    }
}
