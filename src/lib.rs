// ==========================================
// 会友关怀系统 - 核心库
// ==========================================
// 技术栈: Rust + SQLite + tokio
// 系统定位: 按出席/跟进历史派生会友状态，提醒同工及时跟进
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 引擎层 - 状态派生与批处理
pub mod engine;

// 导入层 - 外部数据
pub mod importer;

// 配置层 - 系统配置
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一）
pub mod db;

// 日志系统
pub mod logging;

// API 层 - 业务接口
pub mod api;

// 应用层 - 组装
pub mod app;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{MemberStatus, StatusReason};

// 领域实体
pub use domain::{AttendanceRecord, FollowUpNote, Member, MemberPatch, NewMember};

// 引擎
pub use engine::{
    classify, ClassificationReport, ClassificationRunner, ClassifierPolicy, StatusClassifier,
    StatusDecision,
};

// 仓储
pub use repository::{MemberRepository, MemberStore};

// API
pub use api::{MemberApi, StatusApi};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "会友关怀系统";

// 数据库版本
pub const DB_VERSION: &str = "v1";
