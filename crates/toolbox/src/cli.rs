//! Command-line interface definitions for the toolbox host.

use std::path::PathBuf;

use clap::Parser;
use logging::LogArgs;
use toolbox_engine::DEFAULT_TICK_MS;

use crate::error::{Error, Result};

/// Directory under the platform data dir used when `--state-dir` is absent.
const STATE_DIR_NAME: &str = "ntr-toolbox";

/// Command-line interface for the `toolbox` binary.
#[derive(Parser, Debug)]
#[command(
    name = "toolbox",
    about = "Keybinding-driven automation for translation workspaces",
    version
)]
pub struct Cli {
    /// Logging controls shared across toolbox binaries.
    #[command(flatten)]
    pub log: LogArgs,

    /// Directory holding persisted configuration and workspace state.
    #[arg(long, value_name = "DIR")]
    pub state_dir: Option<PathBuf>,

    /// Site origin the session pretends to be on.
    #[arg(long, default_value = "https://n.novelia.cc")]
    pub origin: String,

    /// Initial page path.
    #[arg(long, default_value = "/")]
    pub path: String,

    /// Keep-alive tick interval in milliseconds.
    #[arg(long, default_value_t = DEFAULT_TICK_MS, value_name = "MS")]
    pub interval: u64,

    /// Bearer token attached to authenticated API requests.
    #[arg(long, env = "NTR_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Page snapshot (JSON) to load at startup.
    #[arg(long, value_name = "PATH")]
    pub page: Option<PathBuf>,
}

impl Cli {
    /// Resolve the state directory.
    pub fn state_dir(&self) -> Result<PathBuf> {
        match &self.state_dir {
            Some(dir) => Ok(dir.clone()),
            None => dirs::data_dir()
                .map(|d| d.join(STATE_DIR_NAME))
                .ok_or(Error::NoStateDir),
        }
    }
}
