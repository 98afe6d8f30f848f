pub mod listener;
pub mod node;
