use std::sync::Arc;

use crate::service::PortalService;

#[derive(Clone)]
pub struct ServeState {
    pub(crate) service: Arc<PortalService>,
    pub(crate) env: String,
}

impl ServeState {
    pub fn new(service: Arc<PortalService>, env: impl Into<String>) -> Self {
        Self {
            service,
            env: env.into(),
        }
    }
}
