// ==========================================
// 会友关怀系统 - 导入层
// ==========================================
// 职责: 外部文件 → 会友记录
// ==========================================

pub mod csv_member_importer;
pub mod error;

pub use csv_member_importer::{CsvMemberImporter, ImportSummary};
pub use error::ImportError;
