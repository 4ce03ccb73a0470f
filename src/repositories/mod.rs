//! Repository layer encapsulating SeaORM operations per table.

pub mod email_log;
pub mod report;
pub mod token;

pub use email_log::EmailLogRepository;
pub use report::ReportRepository;
pub use token::TokenRepository;
