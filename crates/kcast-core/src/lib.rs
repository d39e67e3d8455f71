// Library root: resolution primitives shared by the projection pipeline
// (content-addressed cache, provider capability, retry decorator, fallback
// resolver) and the configuration they are driven by.

pub mod cache;
pub mod config;
pub mod identity;
pub mod resolver;
pub mod retry;
pub mod source;
