pub mod attempt;
pub mod audit_log;
pub mod exam;
pub mod exam_code;
pub mod question;
