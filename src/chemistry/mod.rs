pub mod resolver;
pub mod rules;
pub mod species;
pub mod tagging;
