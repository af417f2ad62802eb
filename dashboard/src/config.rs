use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use crate::registry::DEFAULT_FLEET_SIZE;
use crate::session::Credentials;

#[derive(Debug, Clone, Parser)]
#[command(name = "dashboard", about = "Fleet temperature monitoring dashboard")]
pub struct Config {
    /// Workbook used as the fleet database
    #[arg(long, env = "FLEET_WORKBOOK", default_value = "flota.json")]
    pub workbook: PathBuf,

    /// Trucks created when the workbook does not exist yet
    #[arg(long, env = "FLEET_SIZE", default_value_t = DEFAULT_FLEET_SIZE)]
    pub trucks: u32,

    /// Delay between live monitoring updates
    #[arg(long, env = "TICK_MS", default_value_t = 1500)]
    pub tick_ms: u64,

    #[arg(long, env = "ADMIN_USER", default_value = "admin")]
    pub admin_user: String,

    #[arg(long, env = "ADMIN_PASSWORD", default_value = "admin", hide_env_values = true)]
    pub admin_password: String,
}

impl Config {
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    pub fn tenant(&self) -> Credentials {
        Credentials::new(self.admin_user.trim(), self.admin_password.trim())
    }
}
