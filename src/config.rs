//! Configuration, read from environment variables.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::llm::LlmConfig;
use crate::mail::auth::read_refresh_token;
use crate::mail::{AccessTokenSource, RefreshTokenSource, StaticTokenSource};
use crate::pipeline::CycleConfig;
use crate::worker::Schedule;

pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";
const DEFAULT_LLM_TIMEOUT_SECS: u64 = 30;
const DEFAULT_TOKENS_FILE: &str = "tokens.json";
const DEFAULT_DB_PATH: &str = "./data/autoreply.db";
const DEFAULT_CHECKPOINT_FILE: &str = "./data/last_message_id.txt";
const DEFAULT_FROM: &str = "me@localhost";

/// Where the checkpoint lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointBackend {
    LibSql,
    File,
}

impl FromStr for CheckpointBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "libsql" | "sqlite" => Ok(Self::LibSql),
            "file" => Ok(Self::File),
            other => Err(ConfigError::InvalidValue {
                key: "AUTOREPLY_CHECKPOINT_BACKEND".to_string(),
                message: format!("expected 'libsql' or 'file', got '{other}'"),
            }),
        }
    }
}

/// How the mail client gets its bearer token.
#[derive(Debug, Clone)]
pub enum MailAuth {
    Static(SecretString),
    Refresh {
        client_id: String,
        client_secret: SecretString,
        refresh_token: SecretString,
    },
}

impl MailAuth {
    pub fn token_source(&self) -> Arc<dyn AccessTokenSource> {
        match self {
            MailAuth::Static(token) => Arc::new(StaticTokenSource::new(token.clone())),
            MailAuth::Refresh {
                client_id,
                client_secret,
                refresh_token,
            } => Arc::new(RefreshTokenSource::new(
                client_id.clone(),
                client_secret.clone(),
                refresh_token.clone(),
            )),
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            MailAuth::Static(_) => "static access token",
            MailAuth::Refresh { .. } => "refresh token",
        }
    }
}

/// Full process configuration.
#[derive(Debug, Clone)]
pub struct PollerConfig {
    pub llm: LlmConfig,
    pub mail_auth: MailAuth,
    pub schedule: Schedule,
    pub cycle: CycleConfig,
    pub checkpoint_backend: CheckpointBackend,
    pub checkpoint_path: PathBuf,
    pub from_address: String,
    pub run_once: bool,
    pub log_dir: Option<PathBuf>,
}

impl PollerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let api_key = get("GEMINI_API_KEY").ok_or_else(|| ConfigError::MissingRequired {
            key: "GEMINI_API_KEY".to_string(),
            hint: "export GEMINI_API_KEY=...".to_string(),
        })?;
        let llm = LlmConfig {
            api_key: SecretString::from(api_key),
            model: get("AUTOREPLY_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            timeout: Duration::from_secs(parse_or(
                &get,
                "AUTOREPLY_LLM_TIMEOUT_SECS",
                DEFAULT_LLM_TIMEOUT_SECS,
            )?),
            base_url: None,
        };

        let mail_auth = mail_auth(&get)?;

        let schedule = match get("AUTOREPLY_SCHEDULE") {
            Some(raw) => raw.parse()?,
            None => Schedule::default(),
        };

        let page_size: u32 = parse_or(&get, "AUTOREPLY_PAGE_SIZE", 10)?;
        if page_size == 0 {
            return Err(ConfigError::InvalidValue {
                key: "AUTOREPLY_PAGE_SIZE".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        let cycle = CycleConfig {
            query: get("AUTOREPLY_QUERY").unwrap_or_else(|| "is:unread".to_string()),
            page_size,
            ignore_senders: get("AUTOREPLY_IGNORE_SENDERS")
                .unwrap_or_default()
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        };

        let checkpoint_backend = match get("AUTOREPLY_CHECKPOINT_BACKEND") {
            Some(raw) => raw.parse()?,
            None => CheckpointBackend::LibSql,
        };
        let checkpoint_path = get("AUTOREPLY_CHECKPOINT_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| match checkpoint_backend {
                CheckpointBackend::LibSql => PathBuf::from(DEFAULT_DB_PATH),
                CheckpointBackend::File => PathBuf::from(DEFAULT_CHECKPOINT_FILE),
            });

        Ok(Self {
            llm,
            mail_auth,
            schedule,
            cycle,
            checkpoint_backend,
            checkpoint_path,
            from_address: get("AUTOREPLY_FROM").unwrap_or_else(|| DEFAULT_FROM.to_string()),
            run_once: get("AUTOREPLY_RUN_ONCE").is_some_and(|v| is_truthy(&v)),
            log_dir: get("AUTOREPLY_LOG_DIR").map(PathBuf::from),
        })
    }
}

fn mail_auth(get: &impl Fn(&str) -> Option<String>) -> Result<MailAuth, ConfigError> {
    if let Some(token) = get("GMAIL_ACCESS_TOKEN") {
        return Ok(MailAuth::Static(SecretString::from(token)));
    }

    let (Some(client_id), Some(client_secret)) =
        (get("GOOGLE_CLIENT_ID"), get("GOOGLE_CLIENT_SECRET"))
    else {
        return Err(ConfigError::MissingRequired {
            key: "GMAIL_ACCESS_TOKEN".to_string(),
            hint: "set it, or GOOGLE_CLIENT_ID and GOOGLE_CLIENT_SECRET with a refresh token"
                .to_string(),
        });
    };

    let refresh_token = match get("GMAIL_REFRESH_TOKEN") {
        Some(token) => SecretString::from(token),
        None => {
            let path = get("GMAIL_TOKENS_FILE").unwrap_or_else(|| DEFAULT_TOKENS_FILE.to_string());
            read_refresh_token(Path::new(&path))?.ok_or_else(|| ConfigError::MissingRequired {
                key: "GMAIL_REFRESH_TOKEN".to_string(),
                hint: format!("set it, or provide {path} with a refresh_token field"),
            })?
        }
    };

    Ok(MailAuth::Refresh {
        client_id,
        client_secret: SecretString::from(client_secret),
        refresh_token,
    })
}

fn parse_or<T: FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match get(key) {
        Some(raw) => raw.parse().map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("'{raw}': {e}"),
        }),
        None => Ok(default),
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;

    use secrecy::ExposeSecret;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> + use<> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const MINIMAL: &[(&str, &str)] = &[
        ("GEMINI_API_KEY", "g-key"),
        ("GMAIL_ACCESS_TOKEN", "ya29.token"),
    ];

    #[test]
    fn defaults() {
        let config = PollerConfig::from_lookup(lookup(MINIMAL)).unwrap();
        assert_eq!(config.llm.model, DEFAULT_MODEL);
        assert_eq!(config.llm.timeout, Duration::from_secs(30));
        assert!(matches!(config.schedule, Schedule::Cron(_)));
        assert_eq!(config.cycle.query, "is:unread");
        assert_eq!(config.cycle.page_size, 10);
        assert!(config.cycle.ignore_senders.is_empty());
        assert_eq!(config.checkpoint_backend, CheckpointBackend::LibSql);
        assert_eq!(config.checkpoint_path, PathBuf::from(DEFAULT_DB_PATH));
        assert_eq!(config.from_address, DEFAULT_FROM);
        assert!(!config.run_once);
        assert!(config.log_dir.is_none());
        assert!(matches!(config.mail_auth, MailAuth::Static(_)));
    }

    #[test]
    fn missing_api_key() {
        let err = PollerConfig::from_lookup(lookup(&[("GMAIL_ACCESS_TOKEN", "t")])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingRequired { ref key, .. } if key == "GEMINI_API_KEY"));
    }

    #[test]
    fn blank_value_counts_as_unset() {
        let err = PollerConfig::from_lookup(lookup(&[
            ("GEMINI_API_KEY", "   "),
            ("GMAIL_ACCESS_TOKEN", "t"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::MissingRequired { .. }));
    }

    #[test]
    fn missing_mail_credentials() {
        let err = PollerConfig::from_lookup(lookup(&[("GEMINI_API_KEY", "k")])).unwrap_err();
        assert!(
            matches!(err, ConfigError::MissingRequired { ref key, .. } if key == "GMAIL_ACCESS_TOKEN")
        );
    }

    #[test]
    fn overrides() {
        let mut pairs = MINIMAL.to_vec();
        pairs.extend_from_slice(&[
            ("AUTOREPLY_SCHEDULE", "120"),
            ("AUTOREPLY_PAGE_SIZE", "25"),
            ("AUTOREPLY_QUERY", "is:unread in:inbox"),
            ("AUTOREPLY_CHECKPOINT_BACKEND", "file"),
            ("AUTOREPLY_IGNORE_SENDERS", "noreply@x.com, @bots.io ,"),
            ("AUTOREPLY_RUN_ONCE", "true"),
            ("AUTOREPLY_FROM", "Sales <sales@example.com>"),
        ]);
        let config = PollerConfig::from_lookup(lookup(&pairs)).unwrap();
        assert!(matches!(config.schedule, Schedule::Every(d) if d == Duration::from_secs(120)));
        assert_eq!(config.cycle.page_size, 25);
        assert_eq!(config.cycle.query, "is:unread in:inbox");
        assert_eq!(config.checkpoint_backend, CheckpointBackend::File);
        assert_eq!(config.checkpoint_path, PathBuf::from(DEFAULT_CHECKPOINT_FILE));
        assert_eq!(config.cycle.ignore_senders, vec!["noreply@x.com", "@bots.io"]);
        assert!(config.run_once);
        assert_eq!(config.from_address, "Sales <sales@example.com>");
    }

    #[test]
    fn invalid_numbers_and_backends() {
        let mut pairs = MINIMAL.to_vec();
        pairs.push(("AUTOREPLY_PAGE_SIZE", "many"));
        assert!(matches!(
            PollerConfig::from_lookup(lookup(&pairs)),
            Err(ConfigError::InvalidValue { ref key, .. }) if key == "AUTOREPLY_PAGE_SIZE"
        ));

        let mut pairs = MINIMAL.to_vec();
        pairs.push(("AUTOREPLY_CHECKPOINT_BACKEND", "redis"));
        assert!(matches!(
            PollerConfig::from_lookup(lookup(&pairs)),
            Err(ConfigError::InvalidValue { .. })
        ));

        let mut pairs = MINIMAL.to_vec();
        pairs.push(("AUTOREPLY_SCHEDULE", "sometimes"));
        assert!(PollerConfig::from_lookup(lookup(&pairs)).is_err());
    }

    #[test]
    fn refresh_token_from_env() {
        let config = PollerConfig::from_lookup(lookup(&[
            ("GEMINI_API_KEY", "k"),
            ("GOOGLE_CLIENT_ID", "cid"),
            ("GOOGLE_CLIENT_SECRET", "secret"),
            ("GMAIL_REFRESH_TOKEN", "1//rt"),
        ]))
        .unwrap();
        match config.mail_auth {
            MailAuth::Refresh {
                client_id,
                refresh_token,
                ..
            } => {
                assert_eq!(client_id, "cid");
                assert_eq!(refresh_token.expose_secret(), "1//rt");
            }
            other => panic!("expected refresh auth, got {}", other.describe()),
        }
    }

    #[test]
    fn refresh_token_from_tokens_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"refresh_token":"1//from-file"}}"#).unwrap();
        let path = file.path().to_string_lossy().into_owned();

        let config = PollerConfig::from_lookup(lookup(&[
            ("GEMINI_API_KEY", "k"),
            ("GOOGLE_CLIENT_ID", "cid"),
            ("GOOGLE_CLIENT_SECRET", "secret"),
            ("GMAIL_TOKENS_FILE", path.as_str()),
        ]))
        .unwrap();
        assert!(matches!(
            config.mail_auth,
            MailAuth::Refresh { ref refresh_token, .. } if refresh_token.expose_secret() == "1//from-file"
        ));
    }
}
