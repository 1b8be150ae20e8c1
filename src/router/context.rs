use std::sync::Arc;

use crate::config::RouterConfig;
use crate::topology::{ShardDirectory, TopologyOracle};
use crate::transport::{CursorStore, InMemoryCursorStore, ShardExecutor};

/// Collaborators and settings every routed command sees.
///
/// Holds no per-command state; partition snapshots are borrowed from the
/// oracle for the length of one command.
pub struct RouterContext {
    pub topology: Arc<dyn TopologyOracle>,
    pub directory: Arc<dyn ShardDirectory>,
    pub executor: Arc<dyn ShardExecutor>,
    pub cursors: Arc<dyn CursorStore>,
    pub config: RouterConfig,
}

impl RouterContext {
    pub fn new(
        topology: Arc<dyn TopologyOracle>,
        directory: Arc<dyn ShardDirectory>,
        executor: Arc<dyn ShardExecutor>,
    ) -> Self {
        Self {
            topology,
            directory,
            executor,
            cursors: Arc::new(InMemoryCursorStore::new()),
            config: RouterConfig::default(),
        }
    }

    pub fn with_cursor_store(mut self, cursors: Arc<dyn CursorStore>) -> Self {
        self.cursors = cursors;
        self
    }

    pub fn with_config(mut self, config: RouterConfig) -> Self {
        self.config = config;
        self
    }
}
