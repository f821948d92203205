//! Service container for dependency injection
//!
//! Wires up all services with their dependencies.

use std::sync::Arc;

use crate::application::services::TreeService;
use crate::config::Settings;
use crate::domain::CancellationToken;
use crate::infrastructure::traits::{FileSystem, RealFileSystem};

/// Container holding all application services.
pub struct ServiceContainer {
    /// Application settings
    pub settings: Arc<Settings>,

    /// Filesystem abstraction
    pub fs: Arc<dyn FileSystem>,

    /// Cancellation shared by every build started from this container
    pub cancel: CancellationToken,
}

impl ServiceContainer {
    /// Create a new service container with real implementations.
    pub fn new(settings: Settings) -> Self {
        Self::with_deps(settings, Arc::new(RealFileSystem))
    }

    /// Create a service container with custom dependencies (for testing).
    pub fn with_deps(settings: Settings, fs: Arc<dyn FileSystem>) -> Self {
        Self {
            settings: Arc::new(settings),
            fs,
            cancel: CancellationToken::new(),
        }
    }

    /// Tree service configured from settings.
    pub fn tree_service(&self) -> TreeService {
        TreeService::new(Arc::clone(&self.fs), self.settings.build.options())
            .with_cancellation(self.cancel.clone())
    }
}
