//! Prometheus exporter for Ceph clusters.
//!
//! Every scrape issues administrative commands against the cluster, decodes
//! the replies in the shape the running release produces and republishes
//! them as `ceph_*` series. Slow subsystems can run on their own schedule
//! and are re-exported from their last result.

pub mod background;
pub mod collectors;
pub mod config;
pub mod conn;
pub mod error;
pub mod exporter;
pub mod extract;
pub mod http;
pub mod metrics;
pub mod schema;
pub mod topology;
pub mod tracker;
pub mod version;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use config::ExporterConfig;
pub use conn::{CliConn, Conn};
pub use error::{ExporterError, Result};
pub use exporter::Exporter;
pub use version::Version;
