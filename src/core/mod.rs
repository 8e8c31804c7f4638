pub mod connectivity;
pub mod elements;
pub mod error;
pub mod structure;
