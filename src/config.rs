//! Application-level configuration loading: timings, limits, and catalog paths.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "QUIZ_BUZZER_BACK_CONFIG_PATH";

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    /// Maximum number of buzzer devices accepted at once.
    pub max_buzzers: usize,
    /// Directory jingle audio files must live under.
    pub jingle_root: PathBuf,
    /// JSON file holding the question catalog.
    pub questions_path: PathBuf,
    /// JSON file holding the jingle catalog.
    pub jingles_path: PathBuf,
    /// Append-only JSONL file receiving answer results.
    pub results_path: PathBuf,
    /// Seconds an unidentified connection may linger before close 4001.
    pub identification_timeout_secs: u64,
    /// Seconds between liveness pings; a peer missing one interval is dropped.
    pub heartbeat_secs: u64,
    /// Width of the buzz simultaneity window in milliseconds.
    pub buzz_window_ms: u64,
    /// Default per-game settings handed to new sessions.
    pub game_settings: GameSettings,
}

/// Per-game settings, defaulted from the configuration file.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GameSettings {
    /// Seconds players get to answer a multiple-choice question.
    pub mcq_duration_secs: u64,
    /// Seconds the buzz window stays open on a rapidity question.
    pub buzzer_duration_secs: u64,
    /// Whether the correct answer is revealed to buzzers after scoring.
    pub show_correct_answer: bool,
    /// Whether intermediate rankings are pushed between questions.
    pub show_intermediate_ranking: bool,
}

impl Default for GameSettings {
    fn default() -> Self {
        Self {
            mcq_duration_secs: 30,
            buzzer_duration_secs: 15,
            show_correct_answer: true,
            show_intermediate_ranking: false,
        }
    }
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let config: Self = raw.into();
                    info!(path = %path.display(), "loaded runtime configuration");
                    config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// Identification deadline as a [`Duration`].
    pub fn identification_timeout(&self) -> Duration {
        Duration::from_secs(self.identification_timeout_secs)
    }

    /// Heartbeat period as a [`Duration`].
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs)
    }

    /// Buzz simultaneity window as a [`Duration`].
    pub fn buzz_window(&self) -> Duration {
        Duration::from_millis(self.buzz_window_ms)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            max_buzzers: 10,
            jingle_root: PathBuf::from("data/jingles"),
            questions_path: PathBuf::from("data/questions.json"),
            jingles_path: PathBuf::from("data/jingles.json"),
            results_path: PathBuf::from("data/results.jsonl"),
            identification_timeout_secs: 30,
            heartbeat_secs: 30,
            buzz_window_ms: 200,
            game_settings: GameSettings::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    max_buzzers: Option<usize>,
    jingle_root: Option<PathBuf>,
    questions_path: Option<PathBuf>,
    jingles_path: Option<PathBuf>,
    results_path: Option<PathBuf>,
    identification_timeout_secs: Option<u64>,
    heartbeat_secs: Option<u64>,
    buzz_window_ms: Option<u64>,
    #[serde(default)]
    game_settings: Option<GameSettings>,
}

impl From<RawConfig> for AppConfig {
    fn from(raw: RawConfig) -> Self {
        let defaults = Self::default();
        Self {
            max_buzzers: raw.max_buzzers.unwrap_or(defaults.max_buzzers),
            jingle_root: raw.jingle_root.unwrap_or(defaults.jingle_root),
            questions_path: raw.questions_path.unwrap_or(defaults.questions_path),
            jingles_path: raw.jingles_path.unwrap_or(defaults.jingles_path),
            results_path: raw.results_path.unwrap_or(defaults.results_path),
            identification_timeout_secs: raw
                .identification_timeout_secs
                .unwrap_or(defaults.identification_timeout_secs),
            heartbeat_secs: raw.heartbeat_secs.unwrap_or(defaults.heartbeat_secs),
            buzz_window_ms: raw.buzz_window_ms.unwrap_or(defaults.buzz_window_ms),
            game_settings: raw.game_settings.unwrap_or(defaults.game_settings),
        }
    }
}
