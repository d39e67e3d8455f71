pub mod cli;
pub mod http;
pub mod mlb;
pub mod odds;
pub mod providers;
pub mod report;
pub mod savant;
