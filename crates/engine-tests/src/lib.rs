#![allow(dead_code)]

use connectors::fs::{FileSystem, LocalFileSystem};
use engine_runtime::{Engine, EngineConfig};
use std::{path::Path, sync::Arc};
use tempfile::TempDir;

pub mod engine;
pub mod utils;

/// Business date the fixtures are generated for.
const BUSINESS_DATE: &str = "2024-03-01";

/// A scratch area with an inbound drop folder, a work folder and an engine
/// whose execution store lives next to them.
pub struct Workspace {
    root: TempDir,
    pub inbound: Arc<dyn FileSystem>,
    pub work: Arc<dyn FileSystem>,
}

impl Workspace {
    pub fn new() -> Self {
        let root = tempfile::tempdir().expect("create temp dir");
        let inbound = Arc::new(LocalFileSystem::new("inbound", root.path().join("inbound")));
        let work = Arc::new(LocalFileSystem::new("work", root.path().join("work")));
        Self {
            root,
            inbound,
            work,
        }
    }

    pub fn path(&self) -> &Path {
        self.root.path()
    }

    pub fn config(&self) -> EngineConfig {
        EngineConfig::default().with_state_dir(self.root.path().join("state"))
    }

    /// Engine over the workspace's on-disk store.
    pub fn engine(&self) -> Engine {
        Engine::open(self.config()).expect("open engine")
    }
}
