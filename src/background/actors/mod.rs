pub mod file_ops;

pub use file_ops::delete;
pub use file_ops::write as persist;
