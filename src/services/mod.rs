pub mod browser;
pub mod fetcher;
pub mod generation;
pub mod progress;
pub mod provider;
pub mod queue;
pub mod status;
pub mod storage;
pub mod throttle;
pub mod worker;
