use std::time::Duration;

use clap::Parser;
use tracing::Level;

use crate::service::RuntimeOptions;

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for Level {
    fn from(log_level: LogLevel) -> Self {
        match log_level {
            LogLevel::Trace => Self::TRACE,
            LogLevel::Debug => Self::DEBUG,
            LogLevel::Info => Self::INFO,
            LogLevel::Warn => Self::WARN,
            LogLevel::Error => Self::ERROR,
        }
    }
}

/// Process configuration, read from flags or the environment.
#[derive(Parser, Debug, Clone)]
#[command(name = "edupage-services", about = "EduPage2 public API services")]
pub struct Env {
    /// Message broker connection string. When absent no service is started.
    #[clap(long, env)]
    pub amqp_url: Option<String>,
    #[clap(long, env, default_value = "0.0.0.0")]
    pub http_host: String,
    #[clap(long, env, default_value = "80")]
    pub http_port: u16,
    /// Prefix of every exposed command route
    #[clap(long, env, default_value = "/api")]
    pub api_mount_path: String,
    /// Upper bound on a single handler run, in milliseconds
    #[clap(long, env)]
    pub handler_timeout_ms: Option<u64>,
    #[clap(long, env, default_value = "debug")]
    pub log_level: LogLevel,
}

impl Env {
    pub fn http_addr(&self) -> String {
        format!("{}:{}", self.http_host, self.http_port)
    }

    pub fn runtime_options(&self) -> RuntimeOptions {
        RuntimeOptions {
            handler_timeout: self.handler_timeout_ms.map(Duration::from_millis),
        }
    }
}

pub fn setup_tracing(log_level: LogLevel) {
    let level: Level = log_level.into();
    let default_filter = format!("edupage_services={level}");

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .init();
}
