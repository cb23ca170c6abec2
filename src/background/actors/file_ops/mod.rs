pub mod delete;
pub mod write;
