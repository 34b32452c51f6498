pub mod batch;
pub mod health;
pub mod process;
pub mod schema;
