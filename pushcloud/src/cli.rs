use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(
    name = "pushcloud",
    version,
    about = "Upload a database dump to a cloud console and start the import"
)]
pub struct Cli {
    /// Database dump file to upload
    pub dump: PathBuf,

    /// Base URL of the import console
    #[arg(long, env = "PUSHCLOUD_CONSOLE_URL")]
    pub console_url: String,

    /// Console user with administrative access to the target database
    #[arg(long, short = 'u', env = "PUSHCLOUD_USERNAME")]
    pub username: String,

    /// Password; read from the terminal when omitted
    #[arg(long, env = "PUSHCLOUD_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Log every protocol step
    #[arg(long, short = 'v')]
    pub verbose: bool,
}
