pub mod engine;
pub mod shutdown;
