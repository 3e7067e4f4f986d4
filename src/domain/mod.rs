pub mod error;
pub mod reports;
