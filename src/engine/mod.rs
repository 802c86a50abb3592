// ==========================================
// 会友关怀系统 - 引擎层
// ==========================================
// 职责: 实现业务规则引擎,不拼 SQL
// 红线: Engine 不拼 SQL, 所有规则必须输出 reason
// ==========================================

pub mod classification_runner;
pub mod status_classifier;
pub mod status_scheduler;

// 重导出核心引擎
pub use classification_runner::{
    ClassificationReport, ClassificationRunner, MemberWriteFailure, RunnerError, RunnerOptions,
    RunnerResult,
};
pub use status_classifier::{
    classify, ActivityFacts, ClassifierPolicy, ReferenceDates, StatusClassifier, StatusDecision,
};
pub use status_scheduler::start_status_scheduler;
