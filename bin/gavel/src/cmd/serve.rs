use anyhow::Result;
use clap::Args;
use gavel_rs::config::Config;
use gavel_server_rs::Service;

#[derive(Debug, Args)]
#[clap(about = "run the auction server")]
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

        tracing::info!(
            port = config.listen_port,
            origin = %config.allowed_origin,
            "starting auction server"
        );
        Service::from(config).run().await
    }
}
