pub mod store;
pub mod stroke;
pub mod undo;
