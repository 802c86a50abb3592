// ==========================================
// 会友关怀系统 - 应用状态
// ==========================================
// 职责: 管理应用级别的共享状态和API实例
// ==========================================

use std::sync::{Arc, Mutex};

use chrono::FixedOffset;

use crate::api::{MemberApi, StatusApi};
use crate::config::{ClassifierConfigReader, ConfigManager};
use crate::db::open_and_migrate;
use crate::engine::ClassificationRunner;
use crate::importer::CsvMemberImporter;
use crate::repository::{MemberRepository, MemberStore};

/// 应用状态
///
/// 包含所有API实例和共享资源（共享同一个 SQLite 连接）
pub struct AppState {
    /// 数据库路径
    pub db_path: String,

    /// 会友管理API
    pub member_api: Arc<MemberApi>,

    /// 状态批处理API
    pub status_api: Arc<StatusApi>,

    /// CSV 导入
    pub importer: Arc<CsvMemberImporter>,

    /// 配置管理器
    pub config_manager: Arc<ConfigManager>,
}

impl AppState {
    /// 创建新的AppState实例
    ///
    /// 该方法会：
    /// 1. 打开数据库并确保 schema 存在
    /// 2. 初始化 Repository / ConfigManager
    /// 3. 按配置构建批处理执行器
    /// 4. 创建所有API实例
    pub async fn new(db_path: String) -> Result<Self, String> {
        tracing::info!("初始化AppState，数据库路径: {}", db_path);

        let conn = open_and_migrate(&db_path).map_err(|e| format!("无法打开数据库: {}", e))?;
        let conn = Arc::new(Mutex::new(conn));

        // ==========================================
        // 初始化Repository / 配置
        // ==========================================
        let member_repo = Arc::new(
            MemberRepository::from_connection(conn.clone())
                .map_err(|e| format!("无法创建MemberRepository: {}", e))?,
        );
        let config_manager = Arc::new(
            ConfigManager::from_connection(conn)
                .map_err(|e| format!("无法创建ConfigManager: {}", e))?,
        );

        // ==========================================
        // 初始化Engine
        // ==========================================
        let store: Arc<dyn MemberStore> = member_repo.clone();
        let runner: Arc<ClassificationRunner<dyn MemberStore>> = Arc::new(
            ClassificationRunner::from_config(store.clone(), config_manager.as_ref())
                .await
                .map_err(|e| format!("无法创建ClassificationRunner: {}", e))?,
        );

        let offset_minutes = config_manager
            .get_reference_utc_offset_minutes()
            .await
            .map_err(|e| format!("读取参考时区失败: {}", e))?;
        let reference_offset = FixedOffset::east_opt(offset_minutes * 60)
            .ok_or_else(|| format!("参考时区偏移非法: {} 分钟", offset_minutes))?;

        // ==========================================
        // 创建API实例
        // ==========================================
        let member_api =
            Arc::new(MemberApi::new(member_repo.clone()).with_reference_offset(reference_offset));
        let status_api = Arc::new(StatusApi::new(store, runner));
        let importer = Arc::new(CsvMemberImporter::new(member_repo));

        tracing::info!("AppState初始化完成");

        Ok(Self {
            db_path,
            member_api,
            status_api,
            importer,
            config_manager,
        })
    }
}

/// 获取默认数据库路径
///
/// 优先级: 环境变量 MEMBER_CARE_DB_PATH > 用户数据目录 > 当前目录
pub fn get_default_db_path() -> String {
    use std::path::PathBuf;

    if let Ok(path) = std::env::var("MEMBER_CARE_DB_PATH") {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let mut path = PathBuf::from("./member_care.db");

    if let Some(data_dir) = dirs::data_dir() {
        let dir = data_dir.join("member-care");
        if std::fs::create_dir_all(&dir).is_ok() {
            path = dir.join("member_care.db");
        }
    }

    path.to_string_lossy().to_string()
}
