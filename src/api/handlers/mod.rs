pub mod batch;
pub mod photostrip;
pub mod upload;
