//! Command-line arguments

use std::path::PathBuf;

use clap::Parser;
use prepdeck_core::config::default_data_dir;
use prepdeck_core::{PrepdeckConfig, Result};

#[derive(Debug, Parser)]
#[command(name = "prepdeck", version, about = "PrepDeck session console")]
pub struct Cli {
    /// Config file (defaults to prepdeck.toml in the user config directory)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Directory for the session database
    #[arg(long, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    /// Override the auth API base URL
    #[arg(long, value_name = "URL")]
    pub api_url: Option<String>,
}

impl Cli {
    /// Config file contents with command-line overrides applied
    pub fn load_config(&self) -> Result<PrepdeckConfig> {
        let mut config = PrepdeckConfig::load(self.config.as_deref())?;
        if let Some(url) = &self.api_url {
            config.api.base_url = url.trim_end_matches('/').to_string();
        }
        Ok(config)
    }

    pub fn session_db_path(&self) -> Result<PathBuf> {
        let dir = match &self.data_dir {
            Some(dir) => dir.clone(),
            None => default_data_dir()?,
        };
        Ok(dir.join("session.db"))
    }
}
