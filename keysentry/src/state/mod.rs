pub mod intervals;
pub mod sequence;
