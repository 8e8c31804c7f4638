pub mod parser;
pub mod reaction;
pub mod writer;
