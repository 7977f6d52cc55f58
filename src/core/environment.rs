//! Shared handles to the collaborators every sync operation needs.
//!
//! An `Environment` is created once per process and handed around as
//! `Arc<Environment>`. Replacing a collaborator (for example after a config
//! reload swaps the database connection) is visible to every holder at once.

use crate::core::collaborators::{PermissionHandler, WebApplicationClient};
use crate::core::config::Config;
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};

/// Identity of the running process, used in logs and for relative paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessContext {
    pub name: String,
    pub version: String,
    pub data_dir: PathBuf,
}

impl ProcessContext {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            data_dir: data_dir.into(),
        }
    }
}

pub struct Environment {
    configuration: RwLock<Arc<Config>>,
    permission_handler: RwLock<Arc<dyn PermissionHandler>>,
    web_application: RwLock<Arc<dyn WebApplicationClient>>,
    context: RwLock<Arc<ProcessContext>>,
}

impl Environment {
    pub fn new(
        configuration: Config,
        permission_handler: Arc<dyn PermissionHandler>,
        web_application: Arc<dyn WebApplicationClient>,
        context: ProcessContext,
    ) -> Arc<Self> {
        Arc::new(Self {
            configuration: RwLock::new(Arc::new(configuration)),
            permission_handler: RwLock::new(permission_handler),
            web_application: RwLock::new(web_application),
            context: RwLock::new(Arc::new(context)),
        })
    }

    pub fn configuration(&self) -> Arc<Config> {
        self.configuration
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn permission_handler(&self) -> Arc<dyn PermissionHandler> {
        self.permission_handler
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn web_application(&self) -> Arc<dyn WebApplicationClient> {
        self.web_application
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn context(&self) -> Arc<ProcessContext> {
        self.context
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_configuration(&self, configuration: Config) {
        *self.configuration.write().unwrap_or_else(PoisonError::into_inner) =
            Arc::new(configuration);
    }

    pub fn set_permission_handler(&self, handler: Arc<dyn PermissionHandler>) {
        *self.permission_handler.write().unwrap_or_else(PoisonError::into_inner) = handler;
    }

    pub fn set_web_application(&self, client: Arc<dyn WebApplicationClient>) {
        *self.web_application.write().unwrap_or_else(PoisonError::into_inner) = client;
    }

    pub fn set_context(&self, context: ProcessContext) {
        *self.context.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(context);
    }
}

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Environment")
            .field("context", &self.context())
            .field(
                "supports_primary_groups",
                &self.permission_handler().supports_primary_groups(),
            )
            .finish_non_exhaustive()
    }
}
