// ==========================================
// 会友关怀系统 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、覆写
// 存储: config_kv 表 (key-value + scope)
// ==========================================

use crate::config::classifier_config_trait::{ClassifierConfigReader, ConfigError};
use crate::db::open_sqlite_connection;
use async_trait::async_trait;
use rusqlite::{params, Connection};
use std::str::FromStr;
use std::sync::{Arc, Mutex};

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> Result<Self, ConfigError> {
        let conn = open_sqlite_connection(db_path)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    ///
    /// 说明：为保证连接行为一致，会对传入连接再次应用统一 PRAGMA（幂等）。
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Result<Self, ConfigError> {
        {
            let conn_guard = conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
            crate::db::configure_sqlite_connection(&conn_guard)?;
        }

        Ok(Self { conn })
    }

    /// 从 config_kv 表读取配置值（scope_id='global'）
    fn get_config_value(&self, key: &str) -> Result<Option<String>, ConfigError> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let result = conn.query_row(
            "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
            params![key],
            |row| row.get::<_, String>(0),
        );

        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(Box::new(e)),
        }
    }

    /// 写入 global scope 的配置值（UPSERT）
    pub fn set_global_config_value(&self, key: &str, value: &str) -> Result<(), ConfigError> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        conn.execute(
            "INSERT INTO config_kv (scope_id, key, value) VALUES ('global', ?1, ?2)
             ON CONFLICT(scope_id, key) DO UPDATE SET value = ?2, updated_at = datetime('now')",
            params![key, value],
        )?;
        Ok(())
    }

    /// 读取并解析配置值；缺失用默认值，格式错误告警后用默认值
    fn get_parsed_or_default<T>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr + Copy + std::fmt::Display,
    {
        let raw = match self.get_config_value(key)? {
            Some(v) => v,
            None => return Ok(default),
        };

        match raw.trim().parse::<T>() {
            Ok(v) => Ok(v),
            Err(_) => {
                tracing::warn!(
                    config_key = key,
                    raw_value = %raw,
                    default = %default,
                    "配置格式错误，使用默认值"
                );
                Ok(default)
            }
        }
    }
}

// ==========================================
// ClassifierConfigReader Trait 实现
// ==========================================
#[async_trait]
impl ClassifierConfigReader for ConfigManager {
    // ===== 派生规则配置 =====

    async fn get_new_member_window_days(&self) -> Result<i64, ConfigError> {
        let days = self.get_parsed_or_default(config_keys::NEW_MEMBER_WINDOW_DAYS, 31i64)?;
        Ok(if days < 0 { 31 } else { days })
    }

    async fn get_follow_up_window_months(&self) -> Result<u32, ConfigError> {
        let months = self.get_parsed_or_default(config_keys::FOLLOW_UP_WINDOW_MONTHS, 1u32)?;
        Ok(if months == 0 { 1 } else { months })
    }

    async fn get_reference_utc_offset_minutes(&self) -> Result<i32, ConfigError> {
        let minutes = self.get_parsed_or_default(config_keys::REFERENCE_UTC_OFFSET_MINUTES, 0i32)?;
        // FixedOffset 合法范围: ±24h
        if minutes.abs() >= 24 * 60 {
            tracing::warn!(minutes, "参考时区偏移超出范围，回退到 UTC");
            return Ok(0);
        }
        Ok(minutes)
    }

    async fn get_preserve_inactive(&self) -> Result<bool, ConfigError> {
        let value = self
            .get_config_value(config_keys::PRESERVE_INACTIVE)?
            .unwrap_or_else(|| "false".to_string());
        match value.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(true),
            _ => Ok(false),
        }
    }

    // ===== 批处理执行配置 =====

    async fn get_runner_max_concurrency(&self) -> Result<usize, ConfigError> {
        let n = self.get_parsed_or_default(config_keys::RUNNER_MAX_CONCURRENCY, 4usize)?;
        Ok(n.max(1))
    }

    async fn get_runner_max_write_retries(&self) -> Result<u32, ConfigError> {
        self.get_parsed_or_default(config_keys::RUNNER_MAX_WRITE_RETRIES, 2u32)
    }

    async fn get_runner_retry_backoff_ms(&self) -> Result<u64, ConfigError> {
        self.get_parsed_or_default(config_keys::RUNNER_RETRY_BACKOFF_MS, 200u64)
    }

    async fn get_runner_batch_timeout_secs(&self) -> Result<u64, ConfigError> {
        self.get_parsed_or_default(config_keys::RUNNER_BATCH_TIMEOUT_SECS, 0u64)
    }

    // ===== 定时任务 =====

    async fn get_schedule_cron(&self) -> Result<String, ConfigError> {
        let value = self
            .get_config_value(config_keys::SCHEDULE_CRON)?
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());
        Ok(value.unwrap_or_else(|| DEFAULT_SCHEDULE_CRON.to_string()))
    }
}

/// 默认定时: 每天 06:00（秒 分 时 日 月 周）
pub const DEFAULT_SCHEDULE_CRON: &str = "0 0 6 * * *";

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    // 派生规则
    pub const NEW_MEMBER_WINDOW_DAYS: &str = "new_member_window_days";
    pub const FOLLOW_UP_WINDOW_MONTHS: &str = "follow_up_window_months";
    pub const REFERENCE_UTC_OFFSET_MINUTES: &str = "reference_utc_offset_minutes";
    pub const PRESERVE_INACTIVE: &str = "preserve_inactive";

    // 批处理执行
    pub const RUNNER_MAX_CONCURRENCY: &str = "runner_max_concurrency";
    pub const RUNNER_MAX_WRITE_RETRIES: &str = "runner_max_write_retries";
    pub const RUNNER_RETRY_BACKOFF_MS: &str = "runner_retry_backoff_ms";
    pub const RUNNER_BATCH_TIMEOUT_SECS: &str = "runner_batch_timeout_secs";

    // 定时任务
    pub const SCHEDULE_CRON: &str = "schedule_cron";
}
