use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

pub static CONFIG: OnceCell<Config> = OnceCell::new();

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct LoggingConfig {
    pub gentech_migrate: String,
    pub dependencies: String,
}

impl LoggingConfig {
    const LOG_LEVELS: [&str; 6] = ["off", "error", "warn", "info", "debug", "trace"];
    const GENTECH_MIGRATE_LEVEL: &str = "info";
    const DEPENDENCIES_LEVEL: &str = "warn";

    fn default() -> Self {
        LoggingConfig {
            gentech_migrate: Self::GENTECH_MIGRATE_LEVEL.to_string(),
            dependencies: Self::DEPENDENCIES_LEVEL.to_string(),
        }
    }

    /// Builds the flexi_logger spec string, e.g. `warn, gentech_migrate=info`
    pub fn log_spec(&self) -> String {
        format!(
            "{}, gentech_migrate={}",
            self.dependencies, self.gentech_migrate
        )
    }

    fn ensure_valid(&mut self) {
        Self::ensure_valid_level(
            &mut self.gentech_migrate,
            "gentech_migrate",
            Self::GENTECH_MIGRATE_LEVEL,
        );
        Self::ensure_valid_level(
            &mut self.dependencies,
            "dependencies",
            Self::DEPENDENCIES_LEVEL,
        );
    }

    // Trim and lowercase the level. An unknown level is reported and replaced
    // with the default rather than failing the whole run.
    fn ensure_valid_level(level: &mut String, name: &str, default: &str) {
        let str_original = level.clone();
        *level = level.trim().to_ascii_lowercase();
        if !Self::LOG_LEVELS.contains(&level.as_str()) {
            eprintln!(
                "Config error: {} log level of '{}' is invalid - using default of '{}'",
                name, str_original, default
            );
            *level = default.to_owned();
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DatabaseConfig {
    pub path: String,
}

impl DatabaseConfig {
    pub const DEFAULT_PATH: &str = "gentech.sqlite";

    fn default() -> Self {
        DatabaseConfig {
            path: Self::DEFAULT_PATH.to_owned(),
        }
    }

    fn ensure_valid(&mut self) {
        if self.path.trim().is_empty() {
            eprintln!(
                "Config error: database path is empty - using default of '{}'",
                Self::DEFAULT_PATH
            );
            self.path = Self::DEFAULT_PATH.to_owned();
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Config {
    pub logging: LoggingConfig,
    pub database: DatabaseConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            logging: LoggingConfig::default(),
            database: DatabaseConfig::default(),
        }
    }
}

impl Config {
    pub const ENV_PREFIX: &str = "GENTECH_MIGRATE_";

    /// Loads the configuration from `config.toml` in the app's local data
    /// directory, then applies `GENTECH_MIGRATE_*` environment overrides.
    /// A missing file is fine; a malformed one falls back to defaults.
    pub fn load_config(project_dirs: Option<&ProjectDirs>) -> Self {
        let config_path = project_dirs.map(|dirs| dirs.data_local_dir().join("config.toml"));
        let figment = Self::figment(config_path.as_deref());

        let mut config: Config = figment.extract().unwrap_or_else(|err| {
            eprintln!(
                "Could not load configuration: {}. Using default configuration.",
                err
            );
            Config::default()
        });

        config.ensure_valid();

        config
    }

    /// Defaults, merged with the TOML file (if given) and then the environment.
    pub fn figment(config_path: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }
        figment.merge(Env::prefixed(Self::ENV_PREFIX).split("__"))
    }

    /// The loaded configuration, or defaults if nothing was loaded.
    pub fn get() -> &'static Config {
        CONFIG.get_or_init(Config::default)
    }

    /// An explicit path from the command line wins over the configured one.
    pub fn resolve_db_path(&self, cli_path: Option<&Path>) -> PathBuf {
        match cli_path {
            Some(path) => path.to_path_buf(),
            None => PathBuf::from(&self.database.path),
        }
    }

    fn ensure_valid(&mut self) {
        self.logging.ensure_valid();
        self.database.ensure_valid();
    }
}
