// ==========================================
// 会友关怀系统 - API 层
// ==========================================
// 职责: 提供业务 API 接口,供外层传输（HTTP/定时任务/命令行）调用
// ==========================================

pub mod error;
pub mod member_api;
pub mod status_api;

// 重导出核心类型
pub use error::{ApiError, ApiResult};
pub use member_api::{MemberApi, MemberDetail, MemberListResponse};
pub use status_api::StatusApi;
