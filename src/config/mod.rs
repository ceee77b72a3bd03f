//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{
    net::SocketAddr,
    num::NonZeroU64,
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "corrente";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PUBLIC_PORT: u16 = 3000;
// If an element hasn't rendered in this long it gets the axe.
const DEFAULT_RENDER_TIMEOUT_MS: u64 = 20_000;
// If navigation fails to resolve a page this fast it gets the axe too.
const DEFAULT_NAVIGATION_TIMEOUT_MS: u64 = 20_000;

/// Command-line arguments for the corrente binary.
#[derive(Debug, Parser)]
#[command(name = "corrente", version, about = "corrente streaming render server")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "CORRENTE_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the HTTP service.
    Serve(Box<ServeArgs>),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    /// Override the public listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the public listener port.
    #[arg(long = "server-public-port", value_name = "PORT")]
    pub public_port: Option<u16>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the navigation watchdog window.
    #[arg(long = "engine-navigation-timeout-ms", value_name = "MILLIS")]
    pub engine_navigation_timeout_ms: Option<u64>,

    /// Override the render watchdog window.
    #[arg(long = "engine-render-timeout-ms", value_name = "MILLIS")]
    pub engine_render_timeout_ms: Option<u64>,

    /// Cap how long a response waits for late-arriving data after the body
    /// closes. Unset waits for the data layer's own timeout policy.
    #[arg(long = "engine-late-arrival-ceiling-ms", value_name = "MILLIS")]
    pub engine_late_arrival_ceiling_ms: Option<u64>,
}

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub engine: EngineSettings,
    /// Operator-only section, never exposed to the client.
    pub internal: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub public_addr: SocketAddr,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub navigation_timeout_ms: NonZeroU64,
    pub render_timeout_ms: NonZeroU64,
    pub late_arrival_ceiling_ms: Option<NonZeroU64>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            navigation_timeout_ms: NonZeroU64::new(DEFAULT_NAVIGATION_TIMEOUT_MS)
                .expect("default navigation timeout is non-zero"),
            render_timeout_ms: NonZeroU64::new(DEFAULT_RENDER_TIMEOUT_MS)
                .expect("default render timeout is non-zero"),
            late_arrival_ceiling_ms: None,
        }
    }
}

impl EngineSettings {
    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_millis(self.navigation_timeout_ms.get())
    }

    pub fn render_timeout(&self) -> Duration {
        Duration::from_millis(self.render_timeout_ms.get())
    }

    pub fn late_arrival_ceiling(&self) -> Option<Duration> {
        self.late_arrival_ceiling_ms
            .map(|ms| Duration::from_millis(ms.get()))
    }
}

impl Settings {
    /// The configuration exposed to the client at bootstrap: everything
    /// except the `internal` section.
    pub fn client_config(&self) -> serde_json::Value {
        serde_json::json!({
            "server": {
                "publicAddr": self.server.public_addr.to_string(),
            },
            "logging": {
                "level": self.logging.level.to_string(),
                "json": matches!(self.logging.format, LogFormat::Json),
            },
            "engine": {
                "navigationTimeoutMs": self.engine.navigation_timeout_ms.get(),
                "renderTimeoutMs": self.engine.render_timeout_ms.get(),
                "lateArrivalCeilingMs": self.engine.late_arrival_ceiling_ms.map(NonZeroU64::get),
            },
        })
    }
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("CORRENTE").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

/// Parse CLI arguments and load the matching settings.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let cli = CliArgs::parse();
    let settings = load(&cli)?;
    Ok((cli, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    engine: RawEngineSettings,
    internal: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    public_port: Option<u16>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawEngineSettings {
    navigation_timeout_ms: Option<u64>,
    render_timeout_ms: Option<u64>,
    late_arrival_ceiling_ms: Option<u64>,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.public_port {
            self.server.public_port = Some(port);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(timeout) = overrides.engine_navigation_timeout_ms {
            self.engine.navigation_timeout_ms = Some(timeout);
        }
        if let Some(timeout) = overrides.engine_render_timeout_ms {
            self.engine.render_timeout_ms = Some(timeout);
        }
        if let Some(ceiling) = overrides.engine_late_arrival_ceiling_ms {
            self.engine.late_arrival_ceiling_ms = Some(ceiling);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            engine,
            internal,
        } = raw;

        let server = build_server_settings(server)?;
        let logging = build_logging_settings(logging)?;
        let engine = build_engine_settings(engine)?;

        Ok(Self {
            server,
            logging,
            engine,
            internal,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());

    let public_port = server.public_port.unwrap_or(DEFAULT_PUBLIC_PORT);
    if public_port == 0 {
        return Err(LoadError::invalid(
            "server.public_port",
            "port must be greater than zero",
        ));
    }

    let public_addr = parse_socket_addr(&host, public_port)
        .map_err(|reason| LoadError::invalid("server.public_addr", reason))?;

    Ok(ServerSettings { public_addr })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_engine_settings(engine: RawEngineSettings) -> Result<EngineSettings, LoadError> {
    let navigation_value = engine
        .navigation_timeout_ms
        .unwrap_or(DEFAULT_NAVIGATION_TIMEOUT_MS);
    let navigation_timeout_ms = NonZeroU64::new(navigation_value).ok_or_else(|| {
        LoadError::invalid("engine.navigation_timeout_ms", "must be greater than zero")
    })?;

    let render_value = engine.render_timeout_ms.unwrap_or(DEFAULT_RENDER_TIMEOUT_MS);
    let render_timeout_ms = NonZeroU64::new(render_value).ok_or_else(|| {
        LoadError::invalid("engine.render_timeout_ms", "must be greater than zero")
    })?;

    let late_arrival_ceiling_ms = match engine.late_arrival_ceiling_ms {
        Some(value) => Some(NonZeroU64::new(value).ok_or_else(|| {
            LoadError::invalid(
                "engine.late_arrival_ceiling_ms",
                "must be greater than zero; omit to disable the ceiling",
            )
        })?),
        None => None,
    };

    Ok(EngineSettings {
        navigation_timeout_ms,
        render_timeout_ms,
        late_arrival_ceiling_ms,
    })
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    format!("{host}:{port}")
        .parse()
        .map_err(|err| format!("failed to parse `{host}:{port}`: {err}"))
}

#[cfg(test)]
mod tests;
