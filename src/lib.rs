pub mod app;
pub mod classifier;
pub mod config;
pub mod meals;
pub mod owner;
pub mod queue;
pub mod state;
pub mod storage;
pub mod worker;
