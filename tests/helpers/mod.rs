// ==========================================
// 集成测试辅助模块
// ==========================================

#![allow(dead_code)]

pub mod mock_member_store;

pub use mock_member_store::MockMemberStore;
