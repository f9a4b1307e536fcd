//! OpenSearch Admin API Client
//!
//! A Rust client library for the administrative REST API of an OpenSearch
//! cluster: health, nodes, shards and settings, the security plugin, index
//! state management, snapshot management and templates.
//!
//! # Example
//!
//! ```no_run
//! use opensearch_client::{OpenSearchClient, OpenSearchClientTrait, services};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = OpenSearchClient::new(
//!     "https://logs.search.svc.cluster.local:9200".to_string(),
//!     "admin".to_string(),
//!     "admin".to_string(),
//!     true,
//! )?;
//!
//! let health = client.health().await?;
//! println!("cluster is {}", health.status.as_str());
//!
//! // Drain a node before removing its pod
//! let ready = services::prepare_pod_for_delete(&client, "logs-data-2", true, 3).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! - **Error classes**: every failure maps onto not-found, transient, conflict,
//!   invalid, ownership or fatal
//! - **Optimistic concurrency**: ISM and snapshot policies carry `seq_no` and
//!   `primary_term`
//! - **Cluster services**: drain checks, allocation gating and exclude list
//!   maintenance in [`services`]
//! - **Mocking**: `MockOpenSearchClient` behind the `test-util` feature

pub mod client;
pub mod common;
pub mod error;
pub mod models;
#[path = "trait.rs"]
pub mod opensearch_trait;
pub mod services;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;

pub use client::OpenSearchClient;
pub use common::{Credentials, HttpClient};
pub use error::{ErrorClass, OpenSearchError};
pub use models::*;
pub use opensearch_trait::OpenSearchClientTrait;
pub use services::RestartDecision;
#[cfg(any(test, feature = "test-util"))]
pub use mock::{MockOpenSearchClient, Write as MockWrite};
