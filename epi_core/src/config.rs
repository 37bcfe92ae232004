use std::{
    env, fs, io,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;
use thiserror::Error;

use epi_runtime::{ContagionParameters, Position};

pub const BUILTIN_SIMULATION_CONFIG: &str = include_str!("data/simulation_config.json");
pub const CONFIG_PATH_ENV: &str = "EPIGRID_CONFIG_PATH";

/// Coordinator-side settings: where to listen, how big the world is and how
/// the demo population is seeded.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub bind: SocketAddr,
    pub world_size: Position,
    pub shards: usize,
    pub population: u32,
    pub households: u32,
    pub workplaces: u32,
    pub restaurants: u32,
    pub initial_infected_rate: f64,
    pub initial_vaccinated_rate: f64,
    pub seed: Option<u64>,
    pub autoplay_delay_ms: u64,
    pub contagion: ContagionParameters,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 1666),
            world_size: Position::new(200, 200),
            shards: 4,
            population: 2000,
            households: 700,
            workplaces: 40,
            restaurants: 15,
            initial_infected_rate: 0.01,
            initial_vaccinated_rate: 0.05,
            seed: None,
            autoplay_delay_ms: 250,
            contagion: ContagionParameters::default(),
        }
    }
}

impl SimulationConfig {
    pub fn builtin() -> Self {
        Self::from_json_str(BUILTIN_SIMULATION_CONFIG).unwrap_or_default()
    }

    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::ReadFailed {
            path: path.to_path_buf(),
            source,
        })?;
        let config = SimulationConfig::from_json_str(&contents)?;
        Ok(config)
    }

    pub fn autoplay_delay(&self) -> Duration {
        Duration::from_millis(self.autoplay_delay_ms)
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse simulation config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("failed to read simulation config from {path:?}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Loads the config named by `EPIGRID_CONFIG_PATH`, falling back to the
/// builtin copy when the variable is unset or the file is unusable.
pub fn load_simulation_config_from_env() -> (SimulationConfig, Option<PathBuf>) {
    let Some(path) = env::var(CONFIG_PATH_ENV).ok().map(PathBuf::from) else {
        tracing::info!(
            target: "epigrid::config",
            "simulation_config.loaded=builtin"
        );
        return (SimulationConfig::builtin(), None);
    };

    match SimulationConfig::from_file(&path) {
        Ok(config) => {
            tracing::info!(
                target: "epigrid::config",
                path = %path.display(),
                "simulation_config.loaded=file"
            );
            (config, Some(path))
        }
        Err(err) => {
            tracing::warn!(
                target: "epigrid::config",
                path = %path.display(),
                error = %err,
                "simulation_config.load_failed"
            );
            (SimulationConfig::builtin(), None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_config_parses() {
        let config = SimulationConfig::from_json_str(BUILTIN_SIMULATION_CONFIG).unwrap();
        assert_eq!(config.bind.port(), 1666);
        assert_eq!(config.world_size, Position::new(200, 200));
        assert_eq!(config.shards, 4);
        assert!(config.contagion.restaurants_open);
    }

    #[test]
    fn partial_config_keeps_defaults() {
        let config = SimulationConfig::from_json_str(
            r#"{ "shards": 2, "contagion": { "masks": true } }"#,
        )
        .unwrap();
        assert_eq!(config.shards, 2);
        assert!(config.contagion.masks);
        assert_eq!(config.population, SimulationConfig::default().population);
        assert_eq!(config.autoplay_delay(), Duration::from_millis(250));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = SimulationConfig::from_file(Path::new("/nonexistent/epigrid.json")).unwrap_err();
        assert!(matches!(err, ConfigError::ReadFailed { .. }));
        assert!(err.to_string().contains("epigrid.json"));
    }
}
