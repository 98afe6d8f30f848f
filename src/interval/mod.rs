pub mod set;
pub mod span;
