//! Run settings from the environment and the per-user config directory.

use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};
use tracing::debug;

pub const ENV_MAPPING: &str = "MEAL_ORDERS_MAPPING";
pub const ENV_OUTPUT_DIR: &str = "MEAL_ORDERS_OUTPUT_DIR";

const APP_DIR: &str = "meal-orders";
const DEFAULT_MAPPING_FILE: &str = "mappings.json";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settings {
    /// Normalization config (`replacements` / `mappings`) to load over the builtin rules.
    pub mapping_file: Option<PathBuf>,
    /// Where the database and exports go. The input folder when unset.
    pub output_dir: Option<PathBuf>,
}

/// `<config dir>/meal-orders`, if the platform has one.
pub fn app_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR))
}

impl Settings {
    /// Load `.env` (working directory, then the app config dir) and read the
    /// `MEAL_ORDERS_*` variables. Variables already set in the process win.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        let config_dir = app_config_dir();
        if let Some(dir) = &config_dir {
            let env_path = dir.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
            }
        }
        let settings = Self::from_lookup(|key| std::env::var(key).ok(), config_dir.as_deref());
        debug!(?settings, "settings resolved");
        settings
    }

    /// Settings from an arbitrary variable source. When no mapping file is
    /// named, `<config_dir>/mappings.json` is used if it exists.
    pub fn from_lookup<F>(lookup: F, config_dir: Option<&Path>) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_blank = |key: &str| lookup(key).filter(|v| !v.trim().is_empty()).map(PathBuf::from);
        let mapping_file = non_blank(ENV_MAPPING).or_else(|| {
            config_dir
                .map(|dir| dir.join(DEFAULT_MAPPING_FILE))
                .filter(|path| path.is_file())
        });
        Self {
            mapping_file,
            output_dir: non_blank(ENV_OUTPUT_DIR),
        }
    }

    /// Command-line values take precedence over the environment.
    #[must_use]
    pub fn with_overrides(
        mut self,
        mapping_file: Option<PathBuf>,
        output_dir: Option<PathBuf>,
    ) -> Self {
        if mapping_file.is_some() {
            self.mapping_file = mapping_file;
        }
        if output_dir.is_some() {
            self.output_dir = output_dir;
        }
        self
    }

    pub fn output_dir_for(&self, input_dir: &Path) -> PathBuf {
        self.output_dir
            .clone()
            .unwrap_or_else(|| input_dir.to_path_buf())
    }
}

/// `commandes_<YYYYmmdd_HHMMSS>.db`
pub fn database_file_name(now: DateTime<Local>) -> String {
    format!("commandes_{}.db", now.format("%Y%m%d_%H%M%S"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn reads_variables() {
        let settings = Settings::from_lookup(
            lookup(&[(ENV_MAPPING, "/etc/map.json"), (ENV_OUTPUT_DIR, "/srv/out")]),
            None,
        );
        assert_eq!(settings.mapping_file, Some(PathBuf::from("/etc/map.json")));
        assert_eq!(settings.output_dir, Some(PathBuf::from("/srv/out")));
    }

    #[test]
    fn blank_variables_are_ignored() {
        let settings = Settings::from_lookup(lookup(&[(ENV_OUTPUT_DIR, "  ")]), None);
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn config_dir_mapping_is_the_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::from_lookup(lookup(&[]), Some(dir.path()));
        assert_eq!(settings.mapping_file, None);

        std::fs::write(dir.path().join("mappings.json"), "{}").unwrap();
        let settings = Settings::from_lookup(lookup(&[]), Some(dir.path()));
        assert_eq!(settings.mapping_file, Some(dir.path().join("mappings.json")));
    }

    #[test]
    fn overrides_and_output_fallback() {
        let settings = Settings::from_lookup(lookup(&[(ENV_OUTPUT_DIR, "/srv/out")]), None)
            .with_overrides(Some(PathBuf::from("cli.json")), None);
        assert_eq!(settings.mapping_file, Some(PathBuf::from("cli.json")));
        assert_eq!(settings.output_dir_for(Path::new("/in")), PathBuf::from("/srv/out"));
        assert_eq!(Settings::default().output_dir_for(Path::new("/in")), PathBuf::from("/in"));
    }

    #[test]
    fn database_name_is_timestamped() {
        let now = Local.with_ymd_and_hms(2024, 3, 11, 8, 5, 9).unwrap();
        assert_eq!(database_file_name(now), "commandes_20240311_080509.db");
    }
}
