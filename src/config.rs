use std::{env, fmt::Display, path::PathBuf, str::FromStr};

use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Mongo,
    Memory,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub mongo_url: String,
    pub mongo_db: String,
    pub jwt_secret: String,
    pub store: StoreKind,
    /// External prediction service the bare `/predict` route proxies to.
    pub predict_url: String,
    /// Directory holding the CSV side channels, `analytics_data.json` and the
    /// training scripts.
    pub data_dir: PathBuf,
    pub python_bin: String,
}

impl Config {
    pub fn load() -> Self {
        Self {
            port: try_load("PORT", "4000"),
            mongo_url: try_load("MONGO_URL", "mongodb://127.0.0.1:27017"),
            mongo_db: try_load("MONGO_DB", "donation_app"),
            jwt_secret: try_load("JWT_SECRET", "dev-secret-change-me"),
            store: match try_load::<String>("STORE", "mongo").as_str() {
                "memory" => StoreKind::Memory,
                _ => StoreKind::Mongo,
            },
            predict_url: try_load("PREDICT_URL", "http://127.0.0.1:8000/predict"),
            data_dir: PathBuf::from(try_load::<String>("DATA_DIR", ".")),
            python_bin: try_load("PYTHON_BIN", "python"),
        }
    }
}

fn var(key: &str) -> Result<String, ()> {
    env::var(key).map_err(|_| {
        warn!("Environment variable {key} not found, using default");
    })
}

fn try_load<T: FromStr>(key: &str, default: &str) -> T
where
    T::Err: Display,
{
    var(key)
        .unwrap_or_else(|_| {
            info!("{key} not set, using default: {default}");
            default.to_string()
        })
        .parse()
        .map_err(|e| {
            warn!("Invalid {key} value: {e}");
        })
        .expect("Environment misconfigured!")
}
