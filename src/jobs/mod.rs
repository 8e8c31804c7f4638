pub mod minima;
pub mod penalty;
pub mod template;
pub mod ts_jobs;
