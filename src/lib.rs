pub mod api;
pub mod contracts;
pub mod generator;
pub mod metrics;
pub mod storage;
