// ==========================================
// 会友关怀系统 - 状态派生配置读取 Trait
// ==========================================
// 职责: 定义派生引擎/批处理执行器所需的配置读取接口（不包含实现）
// 红线: 不包含配置写入、不包含业务逻辑
// ==========================================

use async_trait::async_trait;
use std::error::Error;

/// 配置读取错误（需跨 tokio 任务传递）
pub type ConfigError = Box<dyn Error + Send + Sync>;

// ==========================================
// ClassifierConfigReader Trait
// ==========================================
// 实现者: ConfigManager（从 config_kv 表读取）
#[async_trait]
pub trait ClassifierConfigReader: Send + Sync {
    // ===== 派生规则配置 =====

    /// 新朋友宽限期（天）
    ///
    /// # 默认值
    /// - 31
    async fn get_new_member_window_days(&self) -> Result<i64, ConfigError>;

    /// 跟进窗口（自然月）
    ///
    /// # 默认值
    /// - 1
    async fn get_follow_up_window_months(&self) -> Result<u32, ConfigError>;

    /// 参考时区相对 UTC 的偏移（分钟）
    ///
    /// # 默认值
    /// - 0（UTC）
    async fn get_reference_utc_offset_minutes(&self) -> Result<i32, ConfigError>;

    /// 是否保留人工标记的 Inactive
    ///
    /// # 默认值
    /// - false（每次批处理全部覆写）
    async fn get_preserve_inactive(&self) -> Result<bool, ConfigError>;

    // ===== 批处理执行配置 =====

    /// 并发写入上限
    ///
    /// # 默认值
    /// - 4
    async fn get_runner_max_concurrency(&self) -> Result<usize, ConfigError>;

    /// 单个会友写入失败的最大重试次数
    ///
    /// # 默认值
    /// - 2
    async fn get_runner_max_write_retries(&self) -> Result<u32, ConfigError>;

    /// 重试初始退避（毫秒，指数增长）
    ///
    /// # 默认值
    /// - 200
    async fn get_runner_retry_backoff_ms(&self) -> Result<u64, ConfigError>;

    /// 批处理超时（秒，0 表示不限）
    ///
    /// # 默认值
    /// - 0
    async fn get_runner_batch_timeout_secs(&self) -> Result<u64, ConfigError>;

    // ===== 定时任务 =====

    /// 定时批处理 cron 表达式（6 段，含秒）
    ///
    /// # 默认值
    /// - "0 0 6 * * *"
    async fn get_schedule_cron(&self) -> Result<String, ConfigError>;
}
