use std::{
    collections::BTreeSet,
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;
use serde_yaml::{Mapping, Value};
use tracing::{info, warn};

use crate::{
    checkpoint::Checkpoint,
    domain::{ChatId, MessageId, UserId},
    errors::Error,
    ports::CheckpointSink,
    rate_limit::{DelayKind, RateLimiter},
    Result,
};

/// Largest window the Bot API accepts in one `forwardMessages` call.
pub const MAX_PAGINATION_LIMIT: usize = 100;

const DEFAULT_CONFIG_FILE: &str = "config.yaml";

/// Shape of `config.yaml` on disk. Unknown keys are ignored here and kept
/// verbatim by `YamlConfigSink` when the checkpoint is written back.
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    api_id: Option<i64>,
    api_hash: Option<String>,
    user_id: Option<i64>,
    chat_id: Option<i64>,
    forward_to_id: Option<i64>,
    #[serde(default)]
    last_read_message_id: i32,
    #[serde(default)]
    ids_to_retry: Vec<i32>,

    bot_token: Option<String>,
    history_export: Option<PathBuf>,
    pagination_limit: Option<usize>,
    full_batch_delay_secs: Option<u64>,
    final_batch_delay_secs: Option<u64>,
}

/// Typed configuration for one forwarding run.
#[derive(Clone, Debug)]
pub struct Config {
    pub path: PathBuf,

    // Client credentials, carried through untouched.
    pub api_id: Option<i64>,
    pub api_hash: Option<String>,
    pub user_id: Option<UserId>,

    pub chat_id: ChatId,
    pub forward_to_id: ChatId,
    pub bot_token: String,
    pub history_export: PathBuf,

    pub pagination_limit: usize,
    pub full_batch_delay: Duration,
    pub final_batch_delay: Duration,

    pub checkpoint: Checkpoint,
}

impl Config {
    /// Config path: first CLI argument, else `TGFWD_CONFIG`, else `./config.yaml`.
    pub fn resolve_path(arg: Option<String>) -> PathBuf {
        arg.and_then(non_empty)
            .or_else(|| env_str("TGFWD_CONFIG").and_then(non_empty))
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
    }

    pub fn load(path: &Path) -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));

        let txt = fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read config {}: {e}", path.display()))
        })?;
        let mut file: FileConfig = serde_yaml::from_str(&txt)?;

        // Environment overrides
        if let Some(token) = env_str("TELEGRAM_BOT_TOKEN").and_then(non_empty) {
            file.bot_token = Some(token);
        }
        if let Some(export) = env_path("TGFWD_HISTORY_EXPORT") {
            file.history_export = Some(export);
        }
        if let Some(limit) = env_usize("TGFWD_PAGINATION_LIMIT") {
            file.pagination_limit = Some(limit);
        }

        let cfg = Self::from_file(path, file)?;
        info!(
            path = %path.display(),
            chat_id = cfg.chat_id.0,
            forward_to_id = cfg.forward_to_id.0,
            last_read_message_id = cfg.checkpoint.last_read_message_id.0,
            "config loaded"
        );
        Ok(cfg)
    }

    /// Parse and validate a YAML document without consulting the environment.
    pub fn from_yaml(path: &Path, txt: &str) -> Result<Self> {
        let file: FileConfig = serde_yaml::from_str(txt)?;
        Self::from_file(path, file)
    }

    fn from_file(path: &Path, file: FileConfig) -> Result<Self> {
        let chat_id = required_chat(file.chat_id, "chat_id")?;
        let forward_to_id = required_chat(file.forward_to_id, "forward_to_id")?;
        if chat_id == forward_to_id {
            warn!(chat_id = chat_id.0, "source and destination chat are the same");
        }

        let bot_token = file.bot_token.and_then(non_empty).ok_or_else(|| {
            Error::Config(
                "bot_token (or TELEGRAM_BOT_TOKEN environment variable) is required".to_string(),
            )
        })?;

        let history_export = file.history_export.ok_or_else(|| {
            Error::Config(
                "history_export (or TGFWD_HISTORY_EXPORT environment variable) is required"
                    .to_string(),
            )
        })?;

        let pagination_limit = file.pagination_limit.unwrap_or(MAX_PAGINATION_LIMIT);
        if !(1..=MAX_PAGINATION_LIMIT).contains(&pagination_limit) {
            return Err(Error::Config(format!(
                "pagination_limit must be between 1 and {MAX_PAGINATION_LIMIT}, got {pagination_limit}"
            )));
        }

        let defaults = RateLimiter::default();
        let full_batch_delay = file
            .full_batch_delay_secs
            .map(Duration::from_secs)
            .unwrap_or_else(|| defaults.duration_for(DelayKind::FullBatch));
        let final_batch_delay = file
            .final_batch_delay_secs
            .map(Duration::from_secs)
            .unwrap_or_else(|| defaults.duration_for(DelayKind::FinalBatch));

        if file.last_read_message_id < 0 {
            return Err(Error::Config(format!(
                "last_read_message_id must not be negative, got {}",
                file.last_read_message_id
            )));
        }
        let checkpoint = Checkpoint {
            last_read_message_id: MessageId(file.last_read_message_id),
            ids_to_retry: file.ids_to_retry.into_iter().map(MessageId).collect(),
        };

        Ok(Self {
            path: path.to_path_buf(),
            api_id: file.api_id,
            api_hash: file.api_hash,
            user_id: file.user_id.map(UserId),
            chat_id,
            forward_to_id,
            bot_token,
            history_export,
            pagination_limit,
            full_batch_delay,
            final_batch_delay,
            checkpoint,
        })
    }

    pub fn rate_limiter(&self) -> RateLimiter {
        RateLimiter::new(self.full_batch_delay, self.final_batch_delay)
    }

    pub fn checkpoint_sink(&self) -> YamlConfigSink {
        YamlConfigSink::new(&self.path)
    }
}

/// Writes the checkpoint back into `config.yaml`.
///
/// The whole document is rewritten through a temp file + rename, so the
/// previous checkpoint is replaced and a crash mid-write leaves the old file.
#[derive(Clone, Debug)]
pub struct YamlConfigSink {
    path: PathBuf,
}

impl YamlConfigSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn read_document(&self) -> Result<Mapping> {
        if !self.path.exists() {
            return Ok(Mapping::new());
        }
        let txt = fs::read_to_string(&self.path)?;
        if txt.trim().is_empty() {
            return Ok(Mapping::new());
        }
        match serde_yaml::from_str::<Value>(&txt)? {
            Value::Mapping(m) => Ok(m),
            Value::Null => Ok(Mapping::new()),
            _ => Err(Error::Config(format!(
                "{} is not a YAML mapping",
                self.path.display()
            ))),
        }
    }
}

impl CheckpointSink for YamlConfigSink {
    fn save(&mut self, checkpoint: &Checkpoint) -> Result<()> {
        let mut doc = self.read_document()?;
        doc.insert(
            Value::from("last_read_message_id"),
            Value::from(checkpoint.last_read_message_id.0),
        );
        doc.insert(
            Value::from("ids_to_retry"),
            Value::Sequence(retry_values(&checkpoint.ids_to_retry)),
        );

        let txt = serde_yaml::to_string(&Value::Mapping(doc))?;
        let tmp = self.path.with_extension("yaml.tmp");
        fs::write(&tmp, txt)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

fn retry_values(ids: &BTreeSet<MessageId>) -> Vec<Value> {
    ids.iter().map(|id| Value::from(id.0)).collect()
}

fn required_chat(v: Option<i64>, key: &str) -> Result<ChatId> {
    match v {
        Some(id) if id != 0 => Ok(ChatId(id)),
        Some(_) => Err(Error::Config(format!("{key} must not be 0"))),
        None => Err(Error::Config(format!("{key} is required"))),
    }
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn env_path(key: &str) -> Option<PathBuf> {
    env::var_os(key)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

fn env_usize(key: &str) -> Option<usize> {
    env_str(key).and_then(|s| s.trim().parse::<usize>().ok())
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() || env::var_os(key).is_some() {
            continue;
        }

        let val = v.trim();
        let val = val
            .strip_prefix('"')
            .and_then(|s| s.strip_suffix('"'))
            .or_else(|| val.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')))
            .unwrap_or(val);

        env::set_var(key, val);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"
api_hash: 0123456789abcdef0123456789abcdef
api_id: 123456
user_id: 42
chat_id: -1001111111111
forward_to_id: -1002222222222
last_read_message_id: 0
ids_to_retry: []
bot_token: "123:abc"
history_export: /data/export/result.json
"#;

    fn parse(txt: &str) -> Result<Config> {
        Config::from_yaml(Path::new("config.yaml"), txt)
    }

    #[test]
    fn parses_full_config_with_defaults() {
        let cfg = parse(CONFIG).unwrap();
        assert_eq!(cfg.chat_id, ChatId(-1001111111111));
        assert_eq!(cfg.forward_to_id, ChatId(-1002222222222));
        assert_eq!(cfg.user_id, Some(UserId(42)));
        assert_eq!(cfg.api_id, Some(123456));
        assert_eq!(cfg.pagination_limit, 100);
        assert_eq!(cfg.rate_limiter(), RateLimiter::default());
        assert_eq!(cfg.checkpoint, Checkpoint::default());
    }

    #[test]
    fn missing_destination_is_a_config_error() {
        let txt = CONFIG.replace("forward_to_id: -1002222222222\n", "");
        let err = parse(&txt).unwrap_err();
        assert!(matches!(err, Error::Config(msg) if msg.contains("forward_to_id")));
    }

    #[test]
    fn pagination_limit_is_bounded() {
        for bad in ["0", "101"] {
            let txt = format!("{CONFIG}pagination_limit: {bad}\n");
            assert!(matches!(parse(&txt), Err(Error::Config(_))));
        }
        let txt = format!("{CONFIG}pagination_limit: 25\n");
        assert_eq!(parse(&txt).unwrap().pagination_limit, 25);
    }

    #[test]
    fn empty_bot_token_is_rejected() {
        let txt = CONFIG.replace("\"123:abc\"", "\"  \"");
        assert!(matches!(parse(&txt), Err(Error::Config(_))));
    }

    #[test]
    fn checkpoint_and_delays_are_read() {
        let txt = CONFIG
            .replace("last_read_message_id: 0", "last_read_message_id: 201")
            .replace("ids_to_retry: []", "ids_to_retry: [7, 3]")
            + "full_batch_delay_secs: 10\nfinal_batch_delay_secs: 5\n";
        let cfg = parse(&txt).unwrap();
        assert_eq!(cfg.checkpoint.last_read_message_id, MessageId(201));
        assert_eq!(
            cfg.checkpoint.ids_to_retry,
            [MessageId(3), MessageId(7)].into_iter().collect()
        );
        assert_eq!(cfg.full_batch_delay, Duration::from_secs(10));
        assert_eq!(cfg.final_batch_delay, Duration::from_secs(5));
    }

    #[test]
    fn sink_replaces_checkpoint_and_keeps_other_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, format!("{CONFIG}custom_note: keep me\n")).unwrap();
        let mut sink = YamlConfigSink::new(&path);

        for offset in [101, 201, 251] {
            let cp = Checkpoint {
                last_read_message_id: MessageId(offset),
                ids_to_retry: [MessageId(5)].into_iter().collect(),
            };
            sink.save(&cp).unwrap();
        }

        let txt = fs::read_to_string(&path).unwrap();
        assert_eq!(txt.matches("last_read_message_id").count(), 1);
        assert!(txt.contains("custom_note: keep me"));
        assert!(!path.with_extension("yaml.tmp").exists());

        let cfg = Config::from_yaml(&path, &txt).unwrap();
        assert_eq!(cfg.checkpoint.last_read_message_id, MessageId(251));
        assert_eq!(cfg.checkpoint.ids_to_retry.len(), 1);
        assert_eq!(cfg.api_hash.as_deref(), Some("0123456789abcdef0123456789abcdef"));
    }

    #[test]
    fn sink_creates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fresh.yaml");
        let mut sink = YamlConfigSink::new(&path);

        sink.save(&Checkpoint::default()).unwrap();

        let doc: Value = serde_yaml::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(doc["last_read_message_id"], Value::from(0));
    }

    #[test]
    fn resolve_path_prefers_argument() {
        assert_eq!(
            Config::resolve_path(Some("other.yaml".to_string())),
            PathBuf::from("other.yaml")
        );
    }
}
