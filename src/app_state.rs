use std::sync::Arc;

use crate::kitchen::KitchenService;
use crate::services::local_store::LocalStore;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub kitchen: Arc<KitchenService>,
    pub store: Arc<dyn LocalStore>,
}

impl AppState {
    pub fn new(kitchen: KitchenService, store: Arc<dyn LocalStore>) -> Self {
        Self {
            kitchen: Arc::new(kitchen),
            store,
        }
    }
}
