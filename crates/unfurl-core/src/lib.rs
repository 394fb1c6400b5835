//! unfurl-core - Link unfurling engine
//!
//! Watches a document for links to registered service tenants and rewrites
//! their URL text into human-readable titles fetched from the tenant's API.

pub mod api;
pub mod cache;
pub mod client;
pub mod config;
pub mod dom;
pub mod engine;
pub mod error;
pub mod replacer;
pub mod router;
pub mod tenant;
pub mod transport;
pub mod watcher;

pub use cache::{CacheEntry, CacheStore, MemoryStore, ResponseCache};
pub use client::CachingClient;
pub use config::{CacheConfig, UnfurlConfig};
pub use dom::{Document, DocumentEvent, NodeId, ReadyState};
pub use engine::{UnfurlEngine, UnfurlReport};
pub use error::CoreError;
pub use router::{ResourceDescriptor, ResourceKind, Router, TtlPolicy};
pub use tenant::{StaticTenantRegistry, Tenant, TenantRegistry};
pub use transport::{ReqwestTransport, Transport};
pub use watcher::{LinkMatcher, NodeWatcher, WatchHandle};
