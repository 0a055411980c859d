//! Health recovery and retry-queue flushing for the capture agent.
//!
//! A health cycle first nudges the external capture service back to life
//! ([`reconnect::ReconnectOrchestrator`]) and then drains payloads that previously
//! failed to reach the collector ([`flusher::RetryQueueFlusher`]).

pub mod capture;
pub mod delivery;
pub mod flusher;
pub mod reconnect;
pub mod triggers;
pub mod worker;
