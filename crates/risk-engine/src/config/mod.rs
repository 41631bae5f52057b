use std::collections::BTreeMap;
use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub scoring: ScoringSettings,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            scoring: ScoringSettings::from_env()?,
        })
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing and metrics controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Artifact locations and decision/drift tuning supplied by the deployment.
///
/// Everything here has a default so a local checkout runs out of the box, but
/// nothing beyond defaults is hardcoded in the scoring core itself.
#[derive(Debug, Clone)]
pub struct ScoringSettings {
    pub model_path: PathBuf,
    pub reference_path: PathBuf,
    /// Overrides the trained threshold shipped inside the model artifact.
    pub threshold_override: Option<f64>,
    pub drift_psi_threshold: f64,
    pub drift_feature_thresholds: BTreeMap<String, f64>,
    pub drift_min_samples: usize,
    pub drift_min_flagged: usize,
    pub explain_top_features: usize,
}

impl ScoringSettings {
    pub fn from_env() -> Result<Self, ConfigError> {
        let model_path = env::var("RISK_MODEL_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("artifacts/model.json"));
        let reference_path = env::var("RISK_REFERENCE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("artifacts/reference.json"));

        let threshold_override = match env::var("RISK_SCORE_THRESHOLD") {
            Ok(raw) => Some(parse_unit_interval("RISK_SCORE_THRESHOLD", &raw)?),
            Err(_) => None,
        };

        let drift_psi_threshold = match env::var("RISK_DRIFT_PSI_THRESHOLD") {
            Ok(raw) => parse_positive_f64("RISK_DRIFT_PSI_THRESHOLD", &raw)?,
            Err(_) => 0.2,
        };

        let drift_feature_thresholds = match env::var("RISK_DRIFT_FEATURE_THRESHOLDS") {
            Ok(raw) => parse_feature_thresholds(&raw)?,
            Err(_) => BTreeMap::new(),
        };

        let drift_min_samples = match env::var("RISK_DRIFT_MIN_SAMPLES") {
            Ok(raw) => parse_usize("RISK_DRIFT_MIN_SAMPLES", &raw)?,
            Err(_) => 30,
        };

        let drift_min_flagged = match env::var("RISK_DRIFT_MIN_FLAGGED") {
            Ok(raw) => parse_usize("RISK_DRIFT_MIN_FLAGGED", &raw)?.max(1),
            Err(_) => 1,
        };

        let explain_top_features = match env::var("RISK_EXPLAIN_TOP_FEATURES") {
            Ok(raw) => parse_usize("RISK_EXPLAIN_TOP_FEATURES", &raw)?,
            Err(_) => 10,
        };

        Ok(Self {
            model_path,
            reference_path,
            threshold_override,
            drift_psi_threshold,
            drift_feature_thresholds,
            drift_min_samples,
            drift_min_flagged,
            explain_top_features,
        })
    }
}

fn parse_unit_interval(var: &'static str, raw: &str) -> Result<f64, ConfigError> {
    let value = raw
        .trim()
        .parse::<f64>()
        .map_err(|_| ConfigError::InvalidNumber { var })?;
    if !(0.0..=1.0).contains(&value) {
        return Err(ConfigError::OutOfRange { var });
    }
    Ok(value)
}

fn parse_positive_f64(var: &'static str, raw: &str) -> Result<f64, ConfigError> {
    let value = raw
        .trim()
        .parse::<f64>()
        .map_err(|_| ConfigError::InvalidNumber { var })?;
    if !value.is_finite() || value <= 0.0 {
        return Err(ConfigError::OutOfRange { var });
    }
    Ok(value)
}

fn parse_usize(var: &'static str, raw: &str) -> Result<usize, ConfigError> {
    raw.trim()
        .parse::<usize>()
        .map_err(|_| ConfigError::InvalidNumber { var })
}

/// Parses `FEATURE=0.1,OTHER=0.3` pairs for per-feature drift overrides.
fn parse_feature_thresholds(raw: &str) -> Result<BTreeMap<String, f64>, ConfigError> {
    let mut thresholds = BTreeMap::new();
    for pair in raw.split(',').filter(|pair| !pair.trim().is_empty()) {
        let (name, value) = pair
            .split_once('=')
            .ok_or(ConfigError::InvalidFeatureThresholds)?;
        let parsed = value
            .trim()
            .parse::<f64>()
            .map_err(|_| ConfigError::InvalidFeatureThresholds)?;
        if !parsed.is_finite() || parsed <= 0.0 {
            return Err(ConfigError::InvalidFeatureThresholds);
        }
        thresholds.insert(name.trim().to_string(), parsed);
    }
    Ok(thresholds)
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidNumber { var: &'static str },
    OutOfRange { var: &'static str },
    InvalidFeatureThresholds,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidNumber { var } => write!(f, "{var} must be a valid number"),
            ConfigError::OutOfRange { var } => write!(f, "{var} is outside its allowed range"),
            ConfigError::InvalidFeatureThresholds => write!(
                f,
                "RISK_DRIFT_FEATURE_THRESHOLDS must be NAME=value pairs separated by commas"
            ),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::{Mutex, OnceLock};

    fn env_guard() -> &'static Mutex<()> {
        static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
        GUARD.get_or_init(|| Mutex::new(()))
    }

    fn reset_env() {
        env::remove_var("APP_ENV");
        env::remove_var("APP_HOST");
        env::remove_var("APP_PORT");
        env::remove_var("APP_LOG_LEVEL");
        env::remove_var("RISK_MODEL_PATH");
        env::remove_var("RISK_REFERENCE_PATH");
        env::remove_var("RISK_SCORE_THRESHOLD");
        env::remove_var("RISK_DRIFT_PSI_THRESHOLD");
        env::remove_var("RISK_DRIFT_FEATURE_THRESHOLDS");
        env::remove_var("RISK_DRIFT_MIN_SAMPLES");
        env::remove_var("RISK_DRIFT_MIN_FLAGGED");
        env::remove_var("RISK_EXPLAIN_TOP_FEATURES");
    }

    #[test]
    fn load_uses_defaults_when_env_missing() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        let config = AppConfig::load().expect("config loads with defaults");
        assert_eq!(config.environment, AppEnvironment::Development);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.scoring.model_path, PathBuf::from("artifacts/model.json"));
        assert_eq!(config.scoring.drift_psi_threshold, 0.2);
        assert_eq!(config.scoring.drift_min_samples, 30);
        assert_eq!(config.scoring.explain_top_features, 10);
        assert!(config.scoring.threshold_override.is_none());
    }

    #[test]
    fn accepts_localhost_host() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_HOST", "localhost");
        let config = AppConfig::load().expect("config loads");
        let addr = config.server.socket_addr().expect("localhost resolves");
        assert_eq!(addr, SocketAddr::new(IpAddr::from([127, 0, 0, 1]), 3000));
    }

    #[test]
    fn threshold_override_must_be_a_probability() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("RISK_SCORE_THRESHOLD", "1.5");
        let result = AppConfig::load();
        assert!(matches!(
            result,
            Err(ConfigError::OutOfRange {
                var: "RISK_SCORE_THRESHOLD"
            })
        ));
        env::remove_var("RISK_SCORE_THRESHOLD");
    }

    #[test]
    fn feature_threshold_pairs_are_parsed() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var(
            "RISK_DRIFT_FEATURE_THRESHOLDS",
            "EXT_SOURCE_2=0.1, AMT_CREDIT=0.35",
        );
        let config = AppConfig::load().expect("config loads");
        assert_eq!(
            config.scoring.drift_feature_thresholds.get("EXT_SOURCE_2"),
            Some(&0.1)
        );
        assert_eq!(
            config.scoring.drift_feature_thresholds.get("AMT_CREDIT"),
            Some(&0.35)
        );
        env::remove_var("RISK_DRIFT_FEATURE_THRESHOLDS");
    }
}
