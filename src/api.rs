pub mod queue;
pub mod rate_limit;
