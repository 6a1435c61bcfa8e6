use anyhow::{Context, Result};
use clap::Args;
use gavel_rs::clock::unix_ms;
use gavel_rs::signing::{issue_credential, CredentialClaims, MIN_SECRET_LEN};
use uuid::Uuid;

/// Development stand-in for the identity collaborator's issue path; the
/// format matches what the gateway verifies.
#[derive(Debug, Args)]
#[clap(about = "mint a signed credential for local development")]
pub struct Command {
    #[clap(long)]
    username: String,

    #[clap(long)]
    email: String,

    /// Defaults to a fresh random id.
    #[clap(long)]
    user_id: Option<Uuid>,

    #[clap(long, default_value_t = 24)]
    lifetime_hours: u32,

    #[clap(long, env = "CREDENTIAL_SECRET", hide_env_values = true)]
    secret: String,
}

impl Command {
    pub async fn execute(self) -> Result<()> {
        anyhow::ensure!(
            self.secret.len() >= MIN_SECRET_LEN,
            "secret must be at least {MIN_SECRET_LEN} bytes"
        );

        let now = unix_ms();
        let claims = CredentialClaims {
            user_id: self.user_id.unwrap_or_else(Uuid::new_v4),
            user_email: self.email,
            username: self.username,
            issued_at: now,
            expires_at: now + i64::from(self.lifetime_hours) * 3_600 * 1_000,
        };
        let token = issue_credential(&claims, self.secret.as_bytes())
            .context("could not sign credential")?;

        println!("{token}");
        Ok(())
    }
}
