pub mod memory;
pub mod model;
pub mod repository;

mod tests;
