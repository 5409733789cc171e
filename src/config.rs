use std::str::FromStr;

use anyhow::Context;

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
}

/// Argon2 work factor.
#[derive(Debug, Clone)]
pub struct HashConfig {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for HashConfig {
    fn default() -> Self {
        Self {
            memory_kib: 19 * 1024,
            iterations: 2,
            parallelism: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

impl StoreBackend {
    pub fn label(self) -> &'static str {
        match self {
            StoreBackend::Postgres => "PostgreSQL",
            StoreBackend::Memory => "In-Memory",
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub backend: StoreBackend,
    pub database_url: String,
    pub db_max_connections: u32,
    pub jwt: JwtConfig,
    pub hash: HashConfig,
    pub host: String,
    pub port: u16,
    pub production: bool,
    pub cors_origins: Vec<String>,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let backend = if env_or("USE_POSTGRESQL", "false") == "true" {
            StoreBackend::Postgres
        } else {
            StoreBackend::Memory
        };
        let database_url = std::env::var("DATABASE_URL").unwrap_or_else(|_| {
            format!(
                "postgres://{}:{}@{}:{}/{}",
                env_or("DB_USER", "postgres"),
                env_or("DB_PASS", "password"),
                env_or("DB_HOST", "localhost"),
                env_or("DB_PORT", "5432"),
                env_or("DB_NAME", "coolair_db"),
            )
        });
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET").context("JWT_SECRET must be set")?,
            issuer: env_or("JWT_ISSUER", "coolair"),
            audience: env_or("JWT_AUDIENCE", "coolair-clients"),
        };
        let defaults = HashConfig::default();
        let hash = HashConfig {
            memory_kib: env_parse("HASH_MEMORY_KIB", defaults.memory_kib)?,
            iterations: env_parse("HASH_ITERATIONS", defaults.iterations)?,
            parallelism: env_parse("HASH_PARALLELISM", defaults.parallelism)?,
        };

        let mut cors_origins: Vec<String> = ["3000", "3001", "3002"]
            .iter()
            .map(|p| format!("http://localhost:{p}"))
            .collect();
        if let Ok(origin) = std::env::var("CORS_ORIGIN") {
            if !origin.trim().is_empty() {
                cors_origins.push(origin.trim().to_string());
            }
        }

        Ok(Self {
            backend,
            database_url,
            db_max_connections: env_parse("DB_MAX_CONNECTIONS", 5)?,
            jwt,
            hash,
            host: env_or("APP_HOST", "0.0.0.0"),
            port: env_parse("APP_PORT", 5000)?,
            production: env_or("APP_ENV", "development") == "production",
            cors_origins,
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn env_parse<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => v
            .trim()
            .parse::<T>()
            .with_context(|| format!("{key} has an invalid value `{v}`")),
        _ => Ok(default),
    }
}
