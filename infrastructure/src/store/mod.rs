//! Record store adapters
//!
//! The durable store is an external collaborator. [`InMemoryRecordStore`]
//! backs a single gateway process and the test suites.

mod memory;

pub use memory::InMemoryRecordStore;
