use anyhow::{Context, Result};
use clap::Parser;
use std::env;

use crate::services::validator::{AdmissionLimits, DEFAULT_MAX_UPLOAD_BYTES};

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub storage_dir: String,
    pub database_url: String,
    pub max_upload_bytes: u64,
    pub allowed_media_types: Vec<String>,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Identity document intake API")]
pub struct Args {
    /// Host to bind to (overrides ID_INTAKE_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides ID_INTAKE_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory where document payloads are stored (overrides ID_INTAKE_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Database URL (overrides ID_INTAKE_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Maximum accepted upload size in bytes (overrides ID_INTAKE_MAX_UPLOAD_BYTES)
    #[arg(long)]
    pub max_upload_bytes: Option<u64>,

    /// Comma-separated media-type whitelist (overrides ID_INTAKE_ALLOWED_MEDIA_TYPES)
    #[arg(long)]
    pub allowed_media_types: Option<String>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        let args = Args::parse();
        Self::merge(args)
    }

    fn merge(args: Args) -> Result<(Self, bool)> {
        // --- Environment fallback ---
        let env_host = env::var("ID_INTAKE_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = match env::var("ID_INTAKE_PORT") {
            Ok(value) => value
                .parse::<u16>()
                .with_context(|| format!("parsing ID_INTAKE_PORT value `{}`", value))?,
            Err(env::VarError::NotPresent) => 3000,
            Err(err) => return Err(err).context("reading ID_INTAKE_PORT"),
        };
        let env_storage =
            env::var("ID_INTAKE_STORAGE_DIR").unwrap_or_else(|_| "./data/documents".into());
        let env_db = env::var("ID_INTAKE_DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./data/meta/id_intake.db".into());
        let env_max = match env::var("ID_INTAKE_MAX_UPLOAD_BYTES") {
            Ok(value) => Some(value.parse::<u64>().with_context(|| {
                format!("parsing ID_INTAKE_MAX_UPLOAD_BYTES value `{}`", value)
            })?),
            Err(env::VarError::NotPresent) => None,
            Err(err) => return Err(err).context("reading ID_INTAKE_MAX_UPLOAD_BYTES"),
        };
        let env_types = env::var("ID_INTAKE_ALLOWED_MEDIA_TYPES").ok();

        // --- Merge ---
        let defaults = AdmissionLimits::default();
        let cfg = Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            storage_dir: args.storage_dir.unwrap_or(env_storage),
            database_url: args.database_url.unwrap_or(env_db),
            max_upload_bytes: args
                .max_upload_bytes
                .or(env_max)
                .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES),
            allowed_media_types: args
                .allowed_media_types
                .or(env_types)
                .map(|raw| parse_media_types(&raw))
                .unwrap_or(defaults.allowed_media_types),
        };

        Ok((cfg, args.migrate))
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// The admission rules derived from this configuration.
    pub fn admission_limits(&self) -> AdmissionLimits {
        AdmissionLimits {
            max_upload_bytes: self.max_upload_bytes,
            allowed_media_types: self.allowed_media_types.clone(),
        }
    }
}

fn parse_media_types(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_type_list_parses_with_whitespace_and_empties() {
        assert_eq!(
            parse_media_types("image/jpeg, image/png,,  image/webp "),
            vec!["image/jpeg", "image/png", "image/webp"]
        );
    }
}
