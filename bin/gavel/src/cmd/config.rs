use anyhow::Result;
use clap::Args;
use gavel_rs::config::Config;

#[derive(Debug, Args)]
#[clap(about = "(debug) utility to verify configuration")]
pub struct Command {
    /// Optional TOML config; the environment is used when absent.
    #[clap(long, env = "GAVEL_CONFIG_FILE", value_name = "FILE")]
    config_file: Option<String>,
}

impl Command {
    pub async fn execute(self) -> Result<()> {
        let config = match &self.config_file {
            Some(path) => Config::from_toml_file(path)?,
            None => Config::from_env()?,
        };

        // secrets are redacted by the Debug impl
        tracing::info!("{:?}", config);
        Ok(())
    }
}
