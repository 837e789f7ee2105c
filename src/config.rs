use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::PathBuf,
};

use clap::{Args, Parser, Subcommand};

pub const APPLICATIONS_FILE_NAME: &str = "applications.json";

#[derive(clap::ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SubmissionPolicy {
    /// Every field is optional; missing fields are stored as empty strings.
    #[default]
    Lenient,
    /// `name` and `discord` must be non-blank.
    Strict,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "shadowmc",
    about = "ShadowMC staff applications site",
    version = crate::version::VERSION,
    disable_help_subcommand = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    #[command(flatten)]
    pub config: Config,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Start the HTTP server (default).
    Run,

    /// Print an argon2id hash for use in a credentials file.
    HashPassword(HashPasswordArgs),
}

#[derive(Args, Debug, Clone)]
pub struct HashPasswordArgs {
    #[arg(long, value_name = "PASSWORD", conflicts_with = "password_stdin")]
    pub password: Option<String>,

    /// Read the password from the first line of stdin.
    #[arg(long)]
    pub password_stdin: bool,
}

#[derive(Args, Debug, Clone)]
pub struct Config {
    #[arg(
        long,
        global = true,
        env = "SHADOWMC_HOST",
        value_name = "ADDR",
        default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED)
    )]
    pub host: IpAddr,

    #[arg(
        long,
        global = true,
        env = "PORT",
        value_name = "PORT",
        default_value_t = 3000
    )]
    pub port: u16,

    #[arg(
        long,
        global = true,
        env = "SHADOWMC_DATA_DIR",
        value_name = "PATH",
        default_value = "./data"
    )]
    pub data_dir: PathBuf,

    #[arg(
        long,
        global = true,
        env = "SHADOWMC_CREDENTIALS_FILE",
        value_name = "PATH"
    )]
    pub credentials_file: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        env = "SHADOWMC_SESSION_SECRET",
        value_name = "SECRET",
        default_value = "",
        hide_env_values = true
    )]
    pub session_secret: String,

    #[arg(
        long = "session-ttl-secs",
        global = true,
        env = "SHADOWMC_SESSION_TTL_SECS",
        value_name = "SECS",
        default_value_t = 43_200,
        value_parser = clap::value_parser!(u64).range(60..=2_592_000)
    )]
    pub session_ttl_secs: u64,

    /// Mark the session cookie `Secure`; enable when served over HTTPS.
    #[arg(
        long,
        global = true,
        env = "SHADOWMC_SECURE_COOKIES",
        value_name = "BOOL",
        default_value_t = false,
        action = clap::ArgAction::Set,
        value_parser = clap::builder::BoolishValueParser::new()
    )]
    pub secure_cookies: bool,

    #[arg(
        long = "submission-policy",
        global = true,
        env = "SHADOWMC_SUBMISSION_POLICY",
        value_name = "POLICY",
        default_value = "lenient",
        value_enum
    )]
    pub submission_policy: SubmissionPolicy,
}

impl Config {
    pub fn bind(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn applications_path(&self) -> PathBuf {
        self.data_dir.join(APPLICATIONS_FILE_NAME)
    }
}
