use std::env;
use std::fs;
use std::io::{self, IsTerminal, Write};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use config::{Config, Environment, File, FileFormat};

use log::{LevelFilter, debug, info, warn};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;

use authgate::api;
use authgate::auth::{AuthConfig, AuthState};

const APP_NAME: &str = "authgate";
const ENV_PREFIX: &str = "AUTHGATE";

fn main() {
    if let Err(err) = run() {
        let _ = writeln!(io::stderr(), "{err:?}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    // Completions need neither config nor logging
    if let Command::Completions { shell } = cli.command {
        clap_complete::generate(shell, &mut Cli::command(), APP_NAME, &mut io::stdout());
        return Ok(());
    }

    let config_file = resolve_config_file(cli.global.config.as_deref())?;
    let settings = Settings::load(&config_file, cli.global.dry_run)?;
    cli.global.init_logging(&settings.logging);
    debug!("config file: {}", config_file.display());

    match cli.command {
        Command::Serve(args) => serve(settings, args),
        Command::Config { action } => config_command(&cli.global, &config_file, &settings, action),
        Command::Secret {
            action: SecretAction::Generate,
        } => {
            println!("{}", AuthConfig::generate_jwt_secret());
            Ok(())
        }
        Command::Completions { .. } => Ok(()),
    }
}

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Authgate - session sign-in and role-based page access.",
    propagate_version = true
)]
struct Cli {
    #[command(flatten)]
    global: GlobalOpts,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Args)]
struct GlobalOpts {
    /// Config file (or directory containing config.toml)
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,
    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,
    /// More log output; repeat for trace
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    /// Shorthand for -vv
    #[arg(long, global = true)]
    debug: bool,
    /// Log everything
    #[arg(long, global = true)]
    trace: bool,
    /// JSON output for logs and `config show`
    #[arg(long, global = true)]
    json: bool,
    /// Never colorize output
    #[arg(long = "no-color", global = true, conflicts_with = "color")]
    no_color: bool,
    /// When to colorize output
    #[arg(long, value_enum, default_value_t = ColorChoice::Auto, global = true)]
    color: ColorChoice,
    /// Report file writes instead of doing them
    #[arg(long = "dry-run", global = true)]
    dry_run: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ColorChoice {
    Auto,
    Always,
    Never,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP server
    Serve(ServeArgs),
    /// Show, locate or reset the config file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Signing secret helpers
    Secret {
        #[command(subcommand)]
        action: SecretAction,
    },
    /// Print shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Debug, Clone, Args)]
struct ServeArgs {
    /// Bind address (default: server.host)
    #[arg(long)]
    host: Option<String>,
    /// Bind port (default: server.port)
    #[arg(short, long)]
    port: Option<u16>,
}

#[derive(Debug, Subcommand)]
enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Print the config file location
    Path,
    /// Overwrite the config file with defaults
    Reset,
}

#[derive(Debug, Subcommand)]
enum SecretAction {
    /// Print a fresh value for auth.jwt_secret
    Generate,
}

impl GlobalOpts {
    /// Level from flags, falling back to `logging.level`.
    fn level(&self, logging: &LoggingSettings) -> LevelFilter {
        if self.quiet {
            return LevelFilter::Error;
        }
        if self.trace || self.verbose >= 2 {
            return LevelFilter::Trace;
        }
        if self.debug || self.verbose == 1 {
            return LevelFilter::Debug;
        }
        logging.level.parse().unwrap_or(LevelFilter::Info)
    }

    fn use_color(&self) -> bool {
        match self.color {
            _ if self.no_color => false,
            ColorChoice::Never => false,
            ColorChoice::Always => true,
            ColorChoice::Auto => {
                env::var_os("NO_COLOR").is_none()
                    && (env::var_os("FORCE_COLOR").is_some() || io::stderr().is_terminal())
            }
        }
    }

    /// Install the tracing subscriber and env_logger (the auth layer logs
    /// through `log`). With `logging.file` set, tracing output is also
    /// appended to that file.
    fn init_logging(&self, logging: &LoggingSettings) {
        use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

        let level = self.level(logging);
        let directive = level.to_string().to_lowercase();
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{APP_NAME}={directive},tower_http={directive}"))
        });

        let file_layer = logging.file.as_deref().and_then(|path| match open_log_file(path) {
            Ok(file) => Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Arc::new(file)),
            ),
            Err(e) => {
                let _ = writeln!(io::stderr(), "warning: {e:#}");
                None
            }
        });

        let registry = tracing_subscriber::registry().with(filter).with(file_layer);
        let installed = if self.json {
            registry
                .with(tracing_subscriber::fmt::layer().json())
                .try_init()
        } else {
            registry
                .with(tracing_subscriber::fmt::layer().with_ansi(self.use_color()))
                .try_init()
        };
        installed.ok();

        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
            .filter_level(level)
            .try_init()
            .ok();
    }
}

/// Open `path` for appending, creating it and its directory as needed.
fn open_log_file(path: &str) -> Result<fs::File> {
    let path = Path::new(path);
    if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(dir)
            .with_context(|| format!("creating log directory {}", dir.display()))?;
    }
    fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("opening log file {}", path.display()))
}

/// Everything read from the config file and `AUTHGATE__*` variables.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct Settings {
    logging: LoggingSettings,
    server: ServerSettings,
    auth: AuthConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
struct LoggingSettings {
    level: String,
    file: Option<String>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
struct ServerSettings {
    host: String,
    port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

impl Settings {
    /// Contents of a freshly written config file. Dev mode is on so the
    /// default stub credentials pass validation.
    fn initial() -> Self {
        let mut settings = Self::default();
        settings.auth.dev_mode = true;
        settings
    }

    /// Layer defaults, the TOML file and the environment. Writes a default
    /// file first if none exists.
    fn load(path: &Path, dry_run: bool) -> Result<Self> {
        if !path.exists() && !dry_run {
            Self::write_default(path)?;
        }

        let defaults = Self::default();
        let layered = Config::builder()
            .set_default("logging.level", defaults.logging.level)?
            .set_default("server.host", defaults.server.host)?
            .set_default("server.port", i64::from(defaults.server.port))?
            .add_source(File::from(path).format(FileFormat::Toml).required(false))
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()
            .with_context(|| format!("reading configuration from {}", path.display()))?;

        let mut settings: Settings = layered
            .try_deserialize()
            .context("invalid configuration")?;

        if let Some(file) = settings.logging.file.take() {
            settings.logging.file = Some(expand(&file)?.display().to_string());
        }

        Ok(settings)
    }

    fn write_default(path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("creating config directory {}", dir.display()))?;
        }

        let body = toml::to_string_pretty(&Self::initial()).context("rendering default config")?;
        let contents = format!(
            "# {APP_NAME} configuration ({})\n\
             # auth.dev_mode = true allows stub sign-in. For production set it to false,\n\
             # switch auth.credentials.mode to \"dev_users\" and run\n\
             # `{APP_NAME} secret generate` for auth.jwt_secret.\n\n{body}",
            path.display()
        );
        fs::write(path, contents).with_context(|| format!("writing {}", path.display()))?;
        info!("Wrote default config to {}", path.display());
        Ok(())
    }
}

fn config_command(
    opts: &GlobalOpts,
    config_file: &Path,
    settings: &Settings,
    action: ConfigAction,
) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let rendered = if opts.json {
                serde_json::to_string_pretty(settings).context("rendering config as JSON")?
            } else {
                toml::to_string_pretty(settings).context("rendering config as TOML")?
            };
            println!("{rendered}");
        }
        ConfigAction::Path => println!("{}", config_file.display()),
        ConfigAction::Reset if opts.dry_run => {
            info!("dry-run: would reset {}", config_file.display());
        }
        ConfigAction::Reset => Settings::write_default(config_file)?,
    }
    Ok(())
}

#[tokio::main]
async fn serve(settings: Settings, args: ServeArgs) -> Result<()> {
    let Settings { server, auth, .. } = settings;

    auth.validate().context("Invalid auth configuration")?;
    info!(
        "Starting {} ({} mode, {:?} credentials)",
        APP_NAME,
        if auth.dev_mode { "development" } else { "production" },
        auth.credentials.mode
    );

    let auth_state = AuthState::new(auth);
    if auth_state.github().is_some() {
        info!("GitHub sign-in enabled");
    }
    let app = api::create_router(api::AppState::new(auth_state));

    let host = args.host.unwrap_or(server.host);
    let port = args.port.unwrap_or(server.port);
    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .with_context(|| format!("invalid listen address {host}:{port}"))?;

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(wait_for_shutdown())
        .await
        .context("server error")?;

    info!("Stopped");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM.
async fn wait_for_shutdown() {
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Ctrl+C handler unavailable: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("SIGTERM handler unavailable: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = interrupt => {},
        _ = terminate => {},
    }
    info!("Shutting down");
}

/// `--config` (file or directory) or `<config dir>/authgate/config.toml`.
fn resolve_config_file(explicit: Option<&Path>) -> Result<PathBuf> {
    let path = match explicit {
        Some(path) => {
            let path = match path.to_str() {
                Some(text) => expand(text)?,
                None => path.to_path_buf(),
            };
            if path.is_dir() {
                path.join("config.toml")
            } else {
                path
            }
        }
        None => config_home()?.join(APP_NAME).join("config.toml"),
    };

    if path.parent().is_none() {
        return Err(anyhow!("invalid config file path: {}", path.display()));
    }
    Ok(path)
}

fn config_home() -> Result<PathBuf> {
    env::var_os("XDG_CONFIG_HOME")
        .filter(|dir| !dir.is_empty())
        .map(PathBuf::from)
        .or_else(dirs::config_dir)
        .or_else(|| dirs::home_dir().map(|home| home.join(".config")))
        .ok_or_else(|| anyhow!("unable to determine configuration directory"))
}

/// Expand `~` and `$VAR` in a path.
fn expand(text: &str) -> Result<PathBuf> {
    let expanded = shellexpand::full(text).with_context(|| format!("expanding {text}"))?;
    Ok(PathBuf::from(expanded.into_owned()))
}
