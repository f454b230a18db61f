//! Analytics module: policy performance, usage, compliance and security
//! metrics plus compliance report export for the procurement ERP.
//!
//! # Resources
//!
//! - **Policy**: catalog entry referenced by evaluation logs
//! - **PolicyEvaluationLog**: one policy-engine decision and its duration
//! - **AccessRequest**: an access decision with its request attributes
//! - **AuditLog**: security and compliance events
//!
//! # Usage
//!
//! ```ignore
//! use analytics::{AnalyticsModule, service::AnalyticsConfig};
//!
//! let module = AnalyticsModule::new(sql, auth, AnalyticsConfig::default())?;
//! let router = module.routes(); // Mount under /api
//! ```

pub mod aggregate;
pub mod api;
pub mod csv;
pub mod model;
pub mod report;
pub mod service;

use std::sync::Arc;

use axum::Router;

use supplyerp_core::{Authenticator, Module, ServiceError};
use supplyerp_sql::SQLStore;

use crate::service::{AnalyticsConfig, AnalyticsService};

/// Analytics module implementing the Module trait.
pub struct AnalyticsModule {
    service: Arc<AnalyticsService>,
    auth: Arc<dyn Authenticator>,
}

impl AnalyticsModule {
    pub fn new(
        sql: Arc<dyn SQLStore>,
        auth: Arc<dyn Authenticator>,
        config: AnalyticsConfig,
    ) -> Result<Self, ServiceError> {
        let service = AnalyticsService::new(sql, config).map_err(ServiceError::from)?;
        Ok(Self { service, auth })
    }

    pub fn service(&self) -> &Arc<AnalyticsService> {
        &self.service
    }
}

impl Module for AnalyticsModule {
    fn name(&self) -> &str {
        "analytics"
    }

    fn routes(&self) -> Router {
        api::build_router(self.service.clone(), self.auth.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use supplyerp_core::AllowAll;
    use supplyerp_sql::SqliteStore;

    #[test]
    fn module_on_disk_store() {
        let dir = tempfile::tempdir().unwrap();
        let sql: Arc<dyn SQLStore> =
            Arc::new(SqliteStore::open(&dir.path().join("analytics.db")).unwrap());
        let module = AnalyticsModule::new(sql, Arc::new(AllowAll), AnalyticsConfig::default()).unwrap();
        assert_eq!(module.name(), "analytics");
        assert_eq!(module.service().config().top_n, 10);
        let _router = module.routes();
    }
}
