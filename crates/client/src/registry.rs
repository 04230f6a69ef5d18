//! Routes jobs to the service that owns their type.

use std::collections::HashMap;
use std::sync::Arc;

use realitycap_auth::TokenProvider;
use realitycap_core::{JobId, JobType, NewJob, ServiceKind};

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::jobs::{JobClient, JobService};
use crate::transport::Transport;

/// One [`JobService`] per [`ServiceKind`], looked up through
/// [`JobType::service`].
#[derive(Default, Clone)]
pub struct ServiceRegistry {
    services: HashMap<ServiceKind, Arc<dyn JobService>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A [`JobClient`] for every known service, sharing one connection pool.
    pub fn connect(config: &ClientConfig, tokens: Arc<dyn TokenProvider>) -> ClientResult<Self> {
        let http = reqwest::Client::new();
        let mut registry = Self::new();
        for kind in ServiceKind::ALL {
            let transport =
                Transport::with_http_client(http.clone(), config, kind, tokens.clone())?;
            registry.register(Arc::new(JobClient::with_transport(kind, transport)));
        }
        Ok(registry)
    }

    /// Register a service, replacing (and returning) any previous one for
    /// the same kind.
    pub fn register(&mut self, service: Arc<dyn JobService>) -> Option<Arc<dyn JobService>> {
        self.services.insert(service.service(), service)
    }

    pub fn get(&self, kind: ServiceKind) -> ClientResult<&Arc<dyn JobService>> {
        self.services.get(&kind).ok_or(ClientError::NoService(kind))
    }

    pub fn for_job_type(&self, job_type: JobType) -> ClientResult<&Arc<dyn JobService>> {
        self.get(job_type.service())
    }

    pub async fn submit(&self, job: &NewJob) -> ClientResult<JobId> {
        self.for_job_type(job.job_type)?.submit_job(job).await
    }
}

impl core::fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let mut kinds: Vec<_> = self.services.keys().collect();
        kinds.sort();
        f.debug_struct("ServiceRegistry").field("services", &kinds).finish()
    }
}
