// ==========================================
// 会友关怀系统 - 配置层
// ==========================================
// 职责: 系统配置管理
// 存储: config_kv 表
// ==========================================

pub mod classifier_config_trait;
pub mod config_manager;

// 重导出核心配置管理器
pub use classifier_config_trait::{ClassifierConfigReader, ConfigError};
pub use config_manager::{config_keys, ConfigManager, DEFAULT_SCHEDULE_CRON};
