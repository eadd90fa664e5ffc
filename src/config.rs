use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::code::{CodeGrammar, IssuerOptions, Randomness, SegmentAlphabet};
use crate::error::Result;
use crate::payments::{PayPalConfig, PayPalMode};
use crate::plans::PlanCatalog;
use crate::store::RealtimeConfig;
use crate::util::ExpiryPolicy;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// Application name stamped on every record
    pub app_name: String,
    /// `None` when the realtime database is not configured at all
    pub realtime: Option<RealtimeConfig>,
    /// Directory of the local fallback store
    pub offline_store_dir: PathBuf,
    pub plans_file: Option<PathBuf>,
    pub issuer: IssuerOptions,
    pub expiry: ExpiryPolicy,
    pub support_email: String,
    /// Attach a salted hash of the caller's IP to records
    pub ip_hashing: bool,
    pub ip_hash_salt: String,
    /// Take the client address from `X-Forwarded-For` (behind a trusted proxy)
    pub trust_forwarded_for: bool,
    pub widget_timeout: Duration,
    pub click_debounce: Duration,
    pub paypal: Option<PayPalConfig>,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from any key lookup (the environment in production).
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let host = var("HOST").unwrap_or_else(|| "127.0.0.1".to_string());
        let port: u16 = parse_var(&var, "PORT").unwrap_or(3000);

        let realtime = match (
            var("REALTIME_DB_API_KEY"),
            var("REALTIME_DB_AUTH_DOMAIN"),
            var("REALTIME_DB_URL"),
            var("REALTIME_DB_PROJECT_ID"),
        ) {
            (None, None, None, None) => None,
            (api_key, auth_domain, database_url, project_id) => Some(RealtimeConfig {
                api_key: api_key.unwrap_or_default(),
                auth_domain: auth_domain.unwrap_or_default(),
                database_url: database_url.unwrap_or_default(),
                project_id: project_id.unwrap_or_default(),
                auth_token: var("REALTIME_DB_AUTH_TOKEN"),
            }),
        };

        let grammar = CodeGrammar {
            random_segments: parse_var(&var, "CODE_RANDOM_SEGMENTS").unwrap_or(1),
            random_len: parse_var(&var, "CODE_RANDOM_LENGTH").unwrap_or(4),
            alphabet: var("CODE_ALPHABET")
                .and_then(|v| SegmentAlphabet::from_str(&v))
                .unwrap_or_default(),
        };
        let randomness = match parse_var::<bool>(&var, "CODE_SECURE_RANDOM") {
            Some(false) => Randomness::Thread,
            _ => Randomness::Secure,
        };
        let issuer = IssuerOptions {
            grammar,
            randomness,
            max_attempts: parse_var(&var, "CODE_MAX_ATTEMPTS").unwrap_or(5),
        };

        let expiry = var("EXPIRY_POLICY")
            .and_then(|v| ExpiryPolicy::from_str(&v))
            .unwrap_or_default();

        let paypal = match (var("PAYPAL_CLIENT_ID"), var("PAYPAL_CLIENT_SECRET")) {
            (Some(client_id), Some(client_secret)) => Some(PayPalConfig {
                client_id,
                client_secret,
                mode: var("PAYPAL_MODE")
                    .and_then(|v| PayPalMode::from_str(&v))
                    .unwrap_or_default(),
                brand_name: var("PAYPAL_BRAND_NAME")
                    .unwrap_or_else(|| "App-Animes Premium".to_string()),
                locale: var("PAYPAL_LOCALE").unwrap_or_else(|| "es-ES".to_string()),
            }),
            _ => None,
        };

        Self {
            host,
            port,
            app_name: var("CHECKOUT_APP_NAME").unwrap_or_else(|| "App-Animes".to_string()),
            realtime,
            offline_store_dir: var("OFFLINE_STORE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(".")),
            plans_file: var("PLANS_FILE").map(PathBuf::from),
            issuer,
            expiry,
            support_email: var("SUPPORT_EMAIL")
                .unwrap_or_else(|| "support@example.com".to_string()),
            ip_hashing: parse_var(&var, "IP_HASHING").unwrap_or(true),
            ip_hash_salt: var("IP_HASH_SALT").unwrap_or_default(),
            trust_forwarded_for: parse_var(&var, "TRUST_FORWARDED_FOR").unwrap_or(false),
            widget_timeout: Duration::from_secs(
                parse_var(&var, "WIDGET_TIMEOUT_SECS").unwrap_or(10),
            ),
            click_debounce: Duration::from_secs(
                parse_var(&var, "CLICK_DEBOUNCE_SECS").unwrap_or(3),
            ),
            paypal,
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Plans from `PLANS_FILE`, or the built-in catalog.
    pub fn load_catalog(&self) -> Result<PlanCatalog> {
        match &self.plans_file {
            Some(path) => PlanCatalog::from_file(path),
            None => Ok(PlanCatalog::default()),
        }
    }
}

fn parse_var<T: FromStr>(var: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let value = var(key)?;
    match value.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!("Ignoring unparseable {}={:?}, using default", key, value);
            None
        }
    }
}
