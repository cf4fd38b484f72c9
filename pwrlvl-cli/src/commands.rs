use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use tracing::info;

use pwrlvl_api::ApiServer;
use pwrlvl_config::validation::validate_bind_addr;
use pwrlvl_config::{ConfigError, PwrlvlConfig};
use pwrlvl_core::{EventBus, EventLevel};
use pwrlvl_engine::Orchestrator;
use pwrlvl_telemetry::{EventLogger, MetricsRecorder};

use crate::error::CliError;

#[derive(Parser)]
#[command(name = "pwrlvl", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the control server
    Serve(ServeArgs),
    /// Print the effective configuration as YAML
    Config(ConfigArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    /// Base configuration file (default: config/pwrlvl.yaml if present)
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    #[arg(short, long, value_parser = clap::value_parser!(u16).range(1..))]
    pub port: Option<u16>,
    #[arg(short, long)]
    pub bind: Option<String>,
    /// Directory holding the browser client
    #[arg(long)]
    pub web_root: Option<PathBuf>,
}

impl ServeArgs {
    fn apply(&self, config: &mut PwrlvlConfig) -> Result<(), CliError> {
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(bind) = &self.bind {
            validate_bind_addr(bind)
                .map_err(|_| CliError::InvalidArgument(format!("--bind {bind}")))?;
            config.server.bind = bind.clone();
        }
        if let Some(web_root) = &self.web_root {
            config.server.web_root = web_root.clone();
        }
        Ok(())
    }
}

#[derive(Args, Debug, Clone)]
pub struct ConfigArgs {
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

/// Layered load. An explicit path must exist.
pub fn load_config(path: Option<&Path>) -> Result<PwrlvlConfig, CliError> {
    let config = match path {
        Some(path) if !path.exists() => {
            return Err(ConfigError::FileNotFound(path.to_path_buf()).into())
        }
        Some(path) => PwrlvlConfig::load_layered(path)?,
        None => PwrlvlConfig::load()?,
    };
    Ok(config)
}

pub fn run_command(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Commands::Serve(args) => serve(args),
        Commands::Config(args) => {
            let config = load_config(args.config.as_deref())?;
            print!("{}", config.to_yaml()?);
            Ok(())
        }
    }
}

fn serve(args: ServeArgs) -> Result<(), CliError> {
    let mut config = load_config(args.config.as_deref())?;
    args.apply(&mut config)?;
    EventLogger::init(&config.telemetry);

    let metrics = Arc::new(MetricsRecorder::new()?);
    let bus = EventBus::new(
        config.events.log_capacity,
        config.events.subscriber_capacity,
        config.events.backfill,
    );
    let orchestrator = Arc::new(Orchestrator::new(&config, bus.clone(), Some(metrics)));
    install_shutdown(orchestrator.clone())?;

    let addr = config.server.listen_addr();
    let server = ApiServer::bind(&config, orchestrator)
        .map_err(|source| CliError::Bind { addr, source })?;
    bus.publish(
        EventLevel::Info,
        format!("PWRLVL9000 starting on port {}", config.server.port),
    );
    server.serve()?;
    Ok(())
}

/// SIGINT/SIGTERM: stop every operation, kill leftover processes, exit.
fn install_shutdown(orchestrator: Arc<Orchestrator>) -> Result<(), CliError> {
    ctrlc::set_handler(move || {
        info!("Shutdown signal received");
        orchestrator.shutdown();
        process::exit(0);
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serve_flags_override_config() {
        let cli = Cli::try_parse_from([
            "pwrlvl", "serve", "--port", "9100", "--bind", "127.0.0.1", "--web-root", "/srv/ui",
        ])
        .unwrap();
        let Commands::Serve(args) = cli.command else {
            panic!("expected serve");
        };
        let mut config = PwrlvlConfig::default();
        args.apply(&mut config).unwrap();
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.server.listen_addr(), "127.0.0.1:9100");
        assert_eq!(config.server.web_root, PathBuf::from("/srv/ui"));
    }

    #[test]
    fn rejects_bad_flags() {
        assert!(Cli::try_parse_from(["pwrlvl", "serve", "--port", "0"]).is_err());

        let cli = Cli::try_parse_from(["pwrlvl", "serve", "--bind", "not an address"]).unwrap();
        let Commands::Serve(args) = cli.command else {
            panic!("expected serve");
        };
        let mut config = PwrlvlConfig::default();
        assert!(matches!(
            args.apply(&mut config),
            Err(CliError::InvalidArgument(_))
        ));
    }

    #[test]
    fn explicit_config_must_exist() {
        let err = load_config(Some(Path::new("/nonexistent/pwrlvl.yaml"))).unwrap_err();
        assert!(matches!(err, CliError::Config(ConfigError::FileNotFound(_))));
    }
}
