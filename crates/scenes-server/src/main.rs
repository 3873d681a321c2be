//! Stateful scenes runner
//!
//! `scenes check` validates a hub options file and its scene list.
//! `scenes run` builds the hub on top of a simulated platform, logs every
//! change of a scene's on/off state and runs until interrupted.

mod platform;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use scenes_config::{load_hub_config, HubConfig};
use stateful_scenes::{discover_external_scenes, Hub};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::platform::{load_fixture, Fixture, SimulatedPlatform};

#[derive(Parser, Debug)]
#[command(
    name = "scenes",
    version,
    about = "Scenes that know whether they are still applied",
    subcommand_required = true,
    arg_required_else_help = true
)]
struct Cli {
    /// Log filter; overrides RUST_LOG
    #[arg(long, global = true, value_name = "FILTER")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate hub options and the scene list
    Check(CheckArgs),
    /// Run the scenes against a simulated platform
    Run(RunArgs),
}

#[derive(Parser, Debug)]
struct CheckArgs {
    /// Hub options file
    #[arg(long, value_name = "FILE")]
    config: PathBuf,
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// Hub options file
    #[arg(long, value_name = "FILE")]
    config: PathBuf,

    /// JSON fixture with initial states, platform scenes and registries
    #[arg(long, value_name = "FILE")]
    states: Option<PathBuf>,

    /// Scenes to activate once everything is set up
    #[arg(long = "activate", value_name = "ENTITY_ID")]
    activate: Vec<String>,
}

fn init_tracing(log_level: Option<&str>) -> Result<()> {
    let filter = match log_level {
        Some(directive) => EnvFilter::try_new(directive)
            .with_context(|| format!("invalid log filter '{}'", directive))?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_deref())?;

    match cli.command {
        Command::Check(args) => check(args).await,
        Command::Run(args) => run(args).await,
    }
}

fn load_config(path: &Path) -> Result<HubConfig> {
    load_hub_config(path).with_context(|| format!("failed to load {}", path.display()))
}

async fn check(args: CheckArgs) -> Result<()> {
    let config = load_config(&args.config)?;
    let platform = SimulatedPlatform::new(Fixture::default())?;
    let hub = Hub::from_config(platform.host(), &config)
        .with_context(|| format!("invalid scenes in {}", config.scene_path.display()))?;

    println!(
        "{} scene(s) in {}",
        hub.scenes().len(),
        config.scene_path.display()
    );
    for scene in hub.scenes() {
        let definition = scene.definition();
        println!(
            "  {:<24} {:<32} {} member(s)",
            definition.name,
            definition.activation_target.as_deref().unwrap_or("-"),
            definition.members.len()
        );
    }

    hub.shutdown();
    Ok(())
}

async fn run(args: RunArgs) -> Result<()> {
    let config = load_config(&args.config)?;
    let fixture = match &args.states {
        Some(path) => load_fixture(path)?,
        None => Fixture::default(),
    };

    info!("Starting stateful scenes");
    let platform = SimulatedPlatform::new(fixture)?;
    let host = platform.host();
    let mut hub = Hub::from_config(host.clone(), &config)
        .with_context(|| format!("invalid scenes in {}", config.scene_path.display()))?;

    if config.enable_discovery {
        let configured = hub.get_available_scenes();
        for found in discover_external_scenes(host.metadata.as_ref(), &configured) {
            let Some(members) = platform.scene_members(&found.entity_id) else {
                warn!(entity_id = %found.entity_id, "No members known, not learning");
                continue;
            };
            if let Err(e) = hub.learn_external_scene(&found.entity_id, &members) {
                warn!(entity_id = %found.entity_id, error = %e, "Failed to learn scene");
            }
        }
    }

    for scene in hub.scenes() {
        if let Some(target) = scene.activation_target() {
            platform.define_scene(&target, scene.definition());
        }

        let name = scene.name().to_string();
        scene.set_update_listener(Arc::new(move |is_on: bool| {
            info!(scene = %name, is_on, "Scene updated");
        }));
    }

    for target in &args.activate {
        match hub.get_scene(target) {
            Some(scene) => {
                if let Err(e) = scene.activate().await {
                    warn!(scene = %target, error = %e, "Activation failed");
                }
            }
            None => warn!(scene = %target, "No such scene"),
        }
    }

    info!(scenes = hub.scenes().len(), "Stateful scenes running");
    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");

    hub.shutdown();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_parse_run() {
        let cli = Cli::try_parse_from([
            "scenes",
            "--log-level",
            "debug",
            "run",
            "--config",
            "hub.yaml",
            "--states",
            "states.json",
            "--activate",
            "scene.movie_night",
        ])
        .unwrap();

        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.config, PathBuf::from("hub.yaml"));
        assert_eq!(args.states, Some(PathBuf::from("states.json")));
        assert_eq!(args.activate, vec!["scene.movie_night"]);
    }

    #[test]
    fn test_subcommand_required() {
        assert!(Cli::try_parse_from(["scenes"]).is_err());
        assert!(Cli::try_parse_from(["scenes", "check"]).is_err());
    }

    #[tokio::test]
    async fn test_check_accepts_valid_files() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("hub.yaml"), "transition_time: 2\n").unwrap();
        fs::write(
            dir.path().join("scenes.yaml"),
            "- id: \"1\"\n  name: Reading\n  entity_id: scene.reading\n  entities:\n    light.desk:\n      state: \"on\"\n",
        )
        .unwrap();

        check(CheckArgs {
            config: dir.path().join("hub.yaml"),
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_check_rejects_invalid_scene() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("hub.yaml"), "number_tolerance: 2\n").unwrap();
        fs::write(
            dir.path().join("scenes.yaml"),
            "- id: \"1\"\n  entities:\n    light.desk:\n      state: \"on\"\n",
        )
        .unwrap();

        let err = check(CheckArgs {
            config: dir.path().join("hub.yaml"),
        })
        .await
        .unwrap_err();
        assert!(format!("{:#}", err).contains("Scene is missing name: 1"));
    }
}
