//! CLI 参数、运行模式与启动后不可变的服务配置。

use clap::{Parser, ValueEnum};
use shadow_rs::formatcp;
use std::time::Duration;

use crate::auth::SecretToken;
use crate::build;

const VERSION_INFO: &str = formatcp!(
    r#"{}\ncommit_hash: {}\nbuild_time: {}\nbuild_env: {},{}"#,
    build::PKG_VERSION,
    build::SHORT_COMMIT,
    build::BUILD_TIME,
    build::RUST_VERSION,
    build::RUST_CHANNEL
);

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_TIMEOUT_MINUTES: u64 = 10;
pub const UPLOAD_FORM_PATH: &str = "/fs-upload";
pub const RECEIVE_PATH: &str = "/fs-receive";
pub const UPLOAD_FIELD: &str = "file";
pub const AUTH_REALM: &str = "dirshare";

/// 运行模式，决定启用的路由表。
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    /// Accept uploads into the current directory
    Up,
    /// Serve the current directory for download
    Down,
    /// Serve downloads and accept uploads
    #[value(alias = "up/down")]
    Both,
}

impl Mode {
    /// 目录列表页是否需要附加上传入口。
    pub fn shows_upload_banner(self) -> bool {
        matches!(self, Mode::Both)
    }

    /// 启动日志中描述当前能力的短语。
    pub fn capability(self) -> &'static str {
        match self {
            Mode::Up => "Allowing uploads to",
            Mode::Down => "Allowing downloads from",
            Mode::Both => "Allowing downloads from (and uploads to)",
        }
    }
}

/// CLI arguments and environment configuration for the server.
#[derive(Parser, Debug)]
#[command(
    name = "dirshare",
    version = VERSION_INFO,
    about = "Share the current directory over HTTP for a limited time"
)]
pub struct Args {
    #[arg(value_enum, env = "DIRSHARE_MODE", help = "What to allow: up, down or both")]
    pub mode: Mode,
    #[arg(
        short = 'p',
        long,
        env = "DIRSHARE_PORT",
        default_value_t = DEFAULT_PORT,
        value_parser = clap::value_parser!(u16).range(1..),
        help = "TCP port to listen on"
    )]
    pub port: u16,
    #[arg(
        short = 't',
        long = "timeout",
        env = "DIRSHARE_TIMEOUT",
        default_value_t = DEFAULT_TIMEOUT_MINUTES,
        value_parser = clap::value_parser!(u64).range(1..),
        help = "Minutes to run before the server exits"
    )]
    pub timeout_minutes: u64,
    #[arg(
        short = 'i',
        long,
        env = "DIRSHARE_INSECURE",
        help = "Do not require the generated secret username"
    )]
    pub insecure: bool,
}

/// 启动时构建一次、之后只读共享的服务配置。
#[derive(Debug)]
pub struct ServerConfig {
    pub mode: Mode,
    pub port: u16,
    pub timeout: Duration,
    pub insecure: bool,
    pub token: Option<SecretToken>,
}

impl ServerConfig {
    /// 由命令行参数构建配置；非 insecure 模式下生成一次性令牌。
    pub fn from_args(args: &Args) -> Self {
        let token = if args.insecure {
            None
        } else {
            Some(SecretToken::generate())
        };
        Self {
            mode: args.mode,
            port: args.port,
            timeout: Duration::from_secs(args.timeout_minutes.saturating_mul(60)),
            insecure: args.insecure,
            token,
        }
    }

    pub fn timeout_minutes(&self) -> u64 {
        self.timeout.as_secs() / 60
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::TOKEN_LENGTH;

    #[test]
    fn parses_mode_and_defaults() {
        let args = Args::try_parse_from(["dirshare", "down"]).expect("parse args");
        assert_eq!(args.mode, Mode::Down);
        assert_eq!(args.port, DEFAULT_PORT);
        assert_eq!(args.timeout_minutes, DEFAULT_TIMEOUT_MINUTES);
        assert!(!args.insecure);
    }

    #[test]
    fn accepts_legacy_combined_mode_name() {
        let args = Args::try_parse_from(["dirshare", "up/down", "-p", "9000", "-t", "3"])
            .expect("parse args");
        assert_eq!(args.mode, Mode::Both);
        assert_eq!(args.port, 9000);
        assert_eq!(args.timeout_minutes, 3);
    }

    #[test]
    fn rejects_zero_port_and_timeout() {
        assert!(Args::try_parse_from(["dirshare", "up", "-p", "0"]).is_err());
        assert!(Args::try_parse_from(["dirshare", "up", "-t", "0"]).is_err());
        assert!(Args::try_parse_from(["dirshare", "sideways"]).is_err());
    }

    #[test]
    fn token_generated_unless_insecure() {
        let secure = Args::try_parse_from(["dirshare", "both"]).expect("parse args");
        let config = ServerConfig::from_args(&secure);
        let token = config.token.as_ref().expect("token generated");
        assert_eq!(token.to_string().len(), TOKEN_LENGTH);
        assert_eq!(config.timeout, Duration::from_secs(600));
        assert_eq!(config.timeout_minutes(), 10);

        let insecure = Args::try_parse_from(["dirshare", "both", "--insecure"]).expect("parse args");
        let config = ServerConfig::from_args(&insecure);
        assert!(config.insecure);
        assert!(config.token.is_none());
    }
}
