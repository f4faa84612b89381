//! Homenet - visibility into and control over a home LAN.
//!
//! Homenet runs two independent engines side by side: a device discovery
//! pipeline that keeps a persistent registry of hosts on the local /24, and a
//! DNS gatekeeper that answers blocked names with NXDOMAIN and forwards the
//! rest upstream over UDP or DNS-over-HTTPS.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`config`]: Configuration loading and validation
//! - [`discovery`]: Probing, ARP and mDNS enrichment, the device registry
//! - [`dns`]: Blocking, upstream resolution and query accounting
//! - [`server`]: The UDP gatekeeper
//! - [`network`]: Interface inspection and MAC parsing
//! - [`wol`]: Wake-on-LAN magic packets
//! - [`error`]: Error types
//!
//! # Testing
//!
//! Every outside dependency sits behind a trait so the engines can be tested
//! without touching the real network:
//!
//! ```rust
//! use homenet::dns::Blocker;
//!
//! let blocker = Blocker::new(["ads.example.com."]);
//! assert!(blocker.is_blocked(&"ads.example.com.".parse().unwrap()));
//! assert!(!blocker.is_blocked(&"sub.ads.example.com.".parse().unwrap()));
//! ```

pub mod config;
pub mod discovery;
pub mod dns;
pub mod error;
pub mod metrics;
pub mod network;
pub mod server;
pub mod wol;

pub use config::Config;
pub use error::{Error, Result};
