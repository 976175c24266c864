pub mod cadence;
pub mod paste;
