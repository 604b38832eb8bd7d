use std::sync::Arc;

use log::Logger;

use crate::config::UploadPolicy;
use crate::store::Store;
use crate::yle::Resolve;

/// Everything a request handler needs, cheap to clone into each filter.
#[derive(Clone)]
pub struct Environment {
    pub logger: Arc<Logger>,
    pub store: Arc<dyn Store>,
    pub resolver: Arc<dyn Resolve>,
    pub upload_policy: UploadPolicy,
}

impl Environment {
    pub fn new(
        logger: Arc<Logger>,
        store: Arc<dyn Store>,
        resolver: Arc<dyn Resolve>,
        upload_policy: UploadPolicy,
    ) -> Self {
        Self {
            logger,
            store,
            resolver,
            upload_policy,
        }
    }
}
