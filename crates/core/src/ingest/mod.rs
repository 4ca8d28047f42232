pub mod client;
pub mod error;
pub mod fetchers;
pub mod normalize;
pub mod orchestrator;
pub mod rate_limiter;
pub mod retry;

#[cfg(test)]
pub(crate) mod fake;
