//! Configuration loading.
//!
//! 優先順位: 既定値 → `stemsep.toml`（任意）→ 環境変数 `STEMSEP__*`
//! 例: `STEMSEP__REDIS__HOST=localhost`, `STEMSEP__STORAGE__BACKEND=local`

use std::path::PathBuf;
use std::time::Duration;

use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;

const CONFIG_FILE: &str = "stemsep";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error(transparent)]
    Build(#[from] config::ConfigError),
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub redis: RedisSettings,
    pub storage: StorageSettings,
    pub queue: QueueSettings,
    pub worker: WorkerSettings,
    pub server: ServerSettings,
    pub submission: SubmissionSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisSettings {
    pub host: String,
    pub port: u16,
}

impl RedisSettings {
    pub fn url(&self) -> String {
        format!("redis://{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    S3,
    Local,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageSettings {
    pub backend: StorageBackend,
    pub endpoint: String,
    pub region: String,
    pub access_key: String,
    pub secret_key: String,
    /// local backend のルートディレクトリ
    pub local_root: PathBuf,
    /// 入力アーティファクト用（投入側が書き、ワーカーが読む）
    pub input_bucket: String,
    pub output_bucket: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueueSettings {
    pub name: String,
    /// キュー参照 API が返す最大件数
    pub inspect_limit: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkerSettings {
    pub work_dir: PathBuf,
    pub transform_program: String,
    pub transform_args: Vec<String>,
    pub transform_model: String,
    /// 起動時の接続リトライ間隔・pop 失敗後の待ち時間
    pub reconnect_delay_secs: u64,
}

impl WorkerSettings {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub listen_addr: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubmissionSettings {
    pub max_payload_bytes: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    pub level: String,
    pub json: bool,
}

impl Settings {
    /// `path` を指定した場合はそのファイルを必須として読む
    pub fn load_from(path: Option<&str>) -> Result<Self, SettingsError> {
        let file = match path {
            Some(p) => File::with_name(p).required(true),
            None => File::with_name(CONFIG_FILE).required(false),
        };
        let cfg = Self::defaults()?
            .add_source(file)
            .add_source(
                Environment::with_prefix("STEMSEP")
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(" ")
                    .with_list_parse_key("worker.transform_args")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        Ok(cfg)
    }

    fn defaults() -> Result<config::ConfigBuilder<config::builder::DefaultState>, SettingsError> {
        let builder = Config::builder()
            .set_default("redis.host", "redis")?
            .set_default("redis.port", 6379)?
            .set_default("storage.backend", "s3")?
            .set_default("storage.endpoint", "http://minio:9000")?
            .set_default("storage.region", "us-east-1")?
            .set_default("storage.access_key", "rootuser")?
            .set_default("storage.secret_key", "rootpass123")?
            .set_default("storage.local_root", "./data")?
            .set_default("storage.input_bucket", "queue")?
            .set_default("storage.output_bucket", "output")?
            .set_default("queue.name", "toWorker")?
            .set_default("queue.inspect_limit", 50)?
            .set_default("worker.work_dir", "/app/demucs")?
            .set_default("worker.transform_program", "python3")?
            .set_default(
                "worker.transform_args",
                vec!["-m", "demucs.separate", "--mp3", "-o", "{output}", "{input}"],
            )?
            .set_default("worker.transform_model", "htdemucs")?
            .set_default("worker.reconnect_delay_secs", 3)?
            .set_default("server.listen_addr", "0.0.0.0:5000")?
            .set_default("submission.max_payload_bytes", 50 * 1024 * 1024)?
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?;
        Ok(builder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_container_deployment() {
        let settings: Settings = Settings::defaults()
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(settings.redis.url(), "redis://redis:6379");
        assert_eq!(settings.queue.name, "toWorker");
        assert_eq!(settings.storage.backend, StorageBackend::S3);
        assert_eq!(settings.storage.input_bucket, "queue");
        assert_eq!(settings.storage.output_bucket, "output");
        assert_eq!(settings.worker.reconnect_delay(), Duration::from_secs(3));
        assert_eq!(settings.worker.transform_args.len(), 6);
        assert_eq!(settings.submission.max_payload_bytes, 50 * 1024 * 1024);
    }

    #[test]
    fn file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(
            &path,
            "[storage]\nbackend = \"memory\"\n[queue]\nname = \"jobs\"\n",
        )
        .unwrap();

        let settings = Settings::load_from(Some(path.to_str().unwrap())).unwrap();
        assert_eq!(settings.storage.backend, StorageBackend::Memory);
        assert_eq!(settings.queue.name, "jobs");
        assert_eq!(settings.redis.port, 6379);
    }
}
