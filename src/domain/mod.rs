// ==========================================
// 会友关怀系统 - 领域模型层
// ==========================================
// 职责: 定义领域实体、类型
// 红线: 不含数据访问逻辑,不含引擎逻辑
// ==========================================

pub mod member;
pub mod types;

// 重导出核心类型
pub use member::{
    normalize_email, parse_iso_date, AttendanceRecord, FollowUpNote, Member, MemberPatch,
    NewMember,
};
pub use types::{MemberStatus, StatusReason};
