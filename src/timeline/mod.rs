pub mod interface;
pub mod switch;
