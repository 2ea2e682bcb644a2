use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "msu-manager",
    version,
    about = "Host power lifecycle controller and uplink watchdog"
)]
pub(crate) struct Args {
    #[arg(long, env = "SETTINGS_FILE", default_value = "settings.toml")]
    pub(crate) config: PathBuf,
    #[arg(long, default_value = "0.0.0.0:8000")]
    pub(crate) http_listen_addr: String,
    /// Also write JSON logs to a daily-rolling file in this directory.
    #[arg(long)]
    pub(crate) log_dir: Option<PathBuf>,
}
