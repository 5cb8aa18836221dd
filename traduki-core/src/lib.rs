//! Traduki Core Library
//!
//! The content store and its query surface, consumed by the node
//! export/import engine:
//! - Node data model (nodes, variants, workspaces, sites)
//! - Content dimensions, presets and the dimension combinator
//! - Node type declarations and node type filters
//! - Store abstraction with in-memory and SQLite backends
//! - Workspace and dimension aware node data repository
//! - Content contexts with visibility flags
//! - Security context with scoped elevation
//! - Settings and fixture loading

pub mod context;
pub mod dimension;
pub mod fixture;
pub mod memory_store;
pub mod node;
pub mod node_type;
pub mod repository;
pub mod security;
pub mod settings;
pub mod sqlite_store;
pub mod store;

pub use context::{AdoptedNode, Adoption, ContentContext, ContextOptions};
pub use dimension::{
    DimensionCombinator, DimensionConfig, DimensionPreset, DimensionValues,
};
pub use fixture::{Fixture, FixtureNode, FixtureStats, load_fixture};
pub use memory_store::MemoryStore;
pub use node::{LIVE_WORKSPACE, NodeData, PropertyValue, Site, Workspace, paths};
pub use node_type::{NodeTypeDeclaration, NodeTypeFilter, NodeTypeManager, PropertyDeclaration};
pub use repository::NodeDataRepository;
pub use security::{AccessLevel, AccessPolicy, AllowAll, PathAccessPolicy, SecurityContext};
pub use settings::{
    DEFAULT_PRESET, ExportSettings, ImportSettings, SecuritySettings, Settings, SettingsError,
};
pub use sqlite_store::SqliteStore;
pub use store::{ContentStore, Result, StoreError};
