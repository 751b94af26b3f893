//! Client half of the extension boundary.
//!
//! The client owns the authoritative state (diagnostics, the active file
//! provider, the search registries) and serves the extension host over a
//! length-prefixed JSON channel: diagnostics snapshots flow in, searches
//! fan out over registered providers, and extension-side transformers and
//! providers are surfaced here through remote adapters.

pub mod config;
pub mod contributions;
pub mod fs_search;
pub mod graphql;
pub mod host;
pub mod preview;
pub mod registry;
pub mod search;
pub mod services;

pub use config::HostConfig;
pub use host::{ClientServices, ExtensionHostHandle};
pub use registry::{ProviderRegistry, Registration};
pub use search::{QueryTransformer, SearchError, SearchPipeline, TextSearchProvider};
pub use services::{DiagnosticsService, FileProvider, FileSystemError, FileSystemService};
