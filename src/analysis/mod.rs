pub mod results;
pub mod symmetry;
