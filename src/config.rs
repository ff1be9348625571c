use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use serde::Deserialize;

pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 1024 * 1024 * 1024;

#[derive(Parser, Debug)]
#[command(name = "filedrop", version, about = "Single-page file upload manager")]
pub struct Cli {
    /// Optional TOML config file; CLI flags override its values.
    #[arg(long, env = "FILEDROP_CONFIG")]
    pub config: Option<PathBuf>,

    /// Address to listen on.
    #[arg(long, env = "FILEDROP_BIND")]
    pub bind: Option<SocketAddr>,

    /// Directory holding the uploaded files.
    #[arg(long, env = "FILEDROP_STORAGE_DIR")]
    pub storage_dir: Option<PathBuf>,

    /// Upload size ceiling in bytes.
    #[arg(long, env = "FILEDROP_MAX_UPLOAD_BYTES")]
    pub max_upload_bytes: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub bind: SocketAddr,
    pub storage_dir: PathBuf,
    pub max_upload_bytes: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 8080)),
            storage_dir: PathBuf::from("uploaded_data"),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

impl Config {
    pub fn load(cli: &Cli) -> anyhow::Result<Self> {
        let mut config = match &cli.config {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("reading config file {}", path.display()))?;
                toml::from_str(&raw)
                    .with_context(|| format!("parsing config file {}", path.display()))?
            }
            None => Self::default(),
        };

        if let Some(bind) = cli.bind {
            config.bind = bind;
        }
        if let Some(dir) = &cli.storage_dir {
            config.storage_dir = dir.clone();
        }
        if let Some(max) = cli.max_upload_bytes {
            config.max_upload_bytes = max;
        }
        Ok(config)
    }
}
