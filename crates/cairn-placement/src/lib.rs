//! Cairn Placement - data location resolution and backend routing
//!
//! - [`LocationResolver`] picks the controlling location for a write
//! - [`DataGateway`] routes put/get/delete/healthcheck to the client that
//!   owns a location
//!
//! # Example
//! ```ignore
//! use cairn_placement::{DataGateway, LocationResolver};
//!
//! let resolver = LocationResolver::from_config(&config.data);
//! let gateway = DataGateway::from_config(&config.data)?;
//! let backend_info = resolver.resolve(&headers, None, &bucket, "localhost")?;
//! let stored = gateway.put(body, size, &key_context, &backend_info, &request_id).await?;
//! ```

pub mod client;
pub mod error;
pub mod gateway;
pub mod location;

pub use client::{BackendHealth, ByteRange, DataAddress, DataClient, DataStream, KeyContext};
pub use error::BackendError;
pub use gateway::DataGateway;
pub use location::{
    BackendInfo, LocationResolver, OBJECT_LOCATION_CONSTRAINT_HEADER, endpoint_from_host,
};
