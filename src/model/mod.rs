pub mod patch;
pub mod types;
