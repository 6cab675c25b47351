// Netpulse - network throughput collector
// Library root

pub mod collector;
pub mod config;
pub mod error;
pub mod measure;
pub mod resilience;
pub mod storage;
pub mod version;

#[cfg(test)]
mod config_tests;
#[cfg(test)]
mod resilience_tests;
#[cfg(test)]
mod test_support;
