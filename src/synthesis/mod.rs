pub mod builder;
pub mod placer;
