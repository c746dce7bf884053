//! Round-synchronous distributed mutual exclusion.
//!
//! `N` peers with no shared memory take turns in a critical section by exchanging
//! REQUEST/REPLY/RELEASE messages stamped with Lamport clocks, and meet at a barrier after every
//! critical section.
pub mod cluster;
pub mod config;
pub mod logging;
pub mod order;
pub mod sync;
pub mod transport;
