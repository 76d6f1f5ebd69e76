pub mod attempt_service;
pub mod audit_service;
pub mod draft;
pub mod entry_service;
pub mod grading_service;
pub mod grading_worker;
pub mod monitor_service;
pub mod sweep_service;
