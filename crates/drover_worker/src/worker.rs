//! Worker agent main loop.

use drover_protocol::{ClaimRequest, ClaimResponse, JobStatus, WorkerHeartbeatRequest, WorkerStatus};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::client::CoordinatorClient;
use crate::config::WorkerConfig;
use crate::error::ClientError;
use crate::handler::{JobContext, JobHandler, StopReason, StopSignal};

/// A registered execution agent: claims jobs matching its capabilities,
/// runs them through handlers, and reports progress until shut down.
pub struct Worker {
    config: WorkerConfig,
    client: CoordinatorClient,
    handlers: HashMap<String, Arc<dyn JobHandler>>,
    shutdown: StopSignal,
}

impl Worker {
    pub fn new(config: WorkerConfig) -> Result<Self, ClientError> {
        let client = CoordinatorClient::new(&config.coordinator_url)?;
        Ok(Self {
            config,
            client,
            handlers: HashMap::new(),
            shutdown: StopSignal::new(),
        })
    }

    /// Register a handler for one job type. The worker only claims job
    /// types it has a handler for.
    pub fn register_handler(&mut self, job_type: impl Into<String>, handler: Arc<dyn JobHandler>) {
        self.handlers.insert(job_type.into(), handler);
    }

    /// Signal that stops the claim loop; share it with a signal handler and
    /// flip it with [`StopReason::Shutdown`].
    pub fn shutdown_signal(&self) -> StopSignal {
        self.shutdown.clone()
    }

    pub fn client(&self) -> &CoordinatorClient {
        &self.client
    }

    /// Claim/execute loop. Runs until the shutdown token flips.
    ///
    /// Capabilities are the registered handler types: the worker never
    /// advertises a job type it cannot execute.
    pub async fn run(&self) -> anyhow::Result<()> {
        let mut capabilities: Vec<String> = self.handlers.keys().cloned().collect();
        capabilities.sort();
        if capabilities.is_empty() {
            anyhow::bail!("no handlers registered");
        }
        info!(
            "Worker {} starting (capabilities: {:?})",
            self.config.worker_id, capabilities
        );

        // Announce before the first claim so the registry row exists even
        // while idle.
        if let Err(err) = self.client.heartbeat(&self.heartbeat_request(&capabilities)).await {
            warn!("Initial heartbeat failed: {}", err);
        }

        while !self.shutdown.is_stopped() {
            match self.client.claim(&self.claim_request(&capabilities)).await {
                Ok(Some(job)) => {
                    self.execute(job).await;
                }
                Ok(None) => {
                    debug!("No work available");
                    self.idle_wait(&capabilities).await;
                }
                Err(err) => {
                    warn!("Claim request failed: {}", err);
                    self.idle_wait(&capabilities).await;
                }
            }
        }

        info!("Worker {} stopped", self.config.worker_id);
        Ok(())
    }

    /// Run one claimed job through its handler with a heartbeat ticker
    /// alongside. The ticker doubles as the cancellation observer.
    async fn execute(&self, job: ClaimResponse) {
        let job_id = job.job_id.as_str().to_string();
        let Some(handler) = self.handlers.get(&job.job_type).cloned() else {
            // Claimed a type we advertised but no longer handle; hand it back.
            error!("No handler for job type '{}', failing job {}", job.job_type, job_id);
            let _ = self
                .client
                .fail(&job_id, &self.config.worker_id, "worker has no handler for this job type")
                .await;
            return;
        };

        match self.client.start(&job_id, &self.config.worker_id).await {
            Ok(_) => {}
            Err(err) if err.is_precondition() => {
                info!("Job {} no longer ours before start, discarding", job_id);
                return;
            }
            Err(err) => {
                warn!("Could not start job {}: {}", job_id, err);
                return;
            }
        }

        let stop = StopSignal::new();
        let ctx = JobContext::new(
            self.client.clone(),
            self.config.worker_id.clone(),
            job_id.clone(),
            stop.clone(),
        );
        let ticker = self.spawn_heartbeat_ticker(job_id.clone(), stop.clone());

        info!("Executing job {} ({})", job_id, job.job_type);
        let result = handler.execute(job, &ctx).await;
        ticker.abort();

        if let Some(reason) = stop.reason() {
            // Cancelled or reassigned mid-flight; the result is not ours to
            // report.
            info!("Job {} stopped ({:?}), discarding local result", job_id, reason);
            return;
        }

        match result {
            Ok(()) => match self.client.complete(&job_id, &self.config.worker_id).await {
                Ok(_) => info!("Job {} completed", job_id),
                Err(err) if err.is_precondition() => {
                    info!("Job {} was reassigned, result discarded", job_id);
                }
                Err(err) => error!("Could not report completion of job {}: {}", job_id, err),
            },
            Err(handler_err) => {
                let message = handler_err.to_string();
                match self
                    .client
                    .fail(&job_id, &self.config.worker_id, &message)
                    .await
                {
                    Ok(JobStatus::Pending) => {
                        info!("Job {} failed, re-enqueued for retry: {}", job_id, message)
                    }
                    Ok(_) => warn!("Job {} failed terminally: {}", job_id, message),
                    Err(err) if err.is_precondition() => {
                        info!("Job {} was reassigned before failure report", job_id)
                    }
                    Err(err) => error!("Could not report failure of job {}: {}", job_id, err),
                }
            }
        }
    }

    fn spawn_heartbeat_ticker(
        &self,
        job_id: String,
        stop: StopSignal,
    ) -> tokio::task::JoinHandle<()> {
        let client = self.client.clone();
        let worker_id = self.config.worker_id.clone();
        let interval = self.config.heartbeat_interval;
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                match client.job_heartbeat(&job_id, &worker_id).await {
                    Ok(JobStatus::Cancelled) => {
                        info!("Job {} cancelled by coordinator", job_id);
                        stop.stop(StopReason::Cancelled);
                        return;
                    }
                    Ok(_) => {}
                    Err(err) if err.is_precondition() => {
                        info!("Job {} ownership lost: {}", job_id, err);
                        stop.stop(StopReason::OwnershipLost);
                        return;
                    }
                    Err(err) => {
                        // Transient; the coordinator's staleness model gives
                        // us until the threshold to recover.
                        warn!("Heartbeat for job {} failed: {}", job_id, err);
                    }
                }
            }
        })
    }

    async fn idle_wait(&self, capabilities: &[String]) {
        if let Err(err) = self
            .client
            .heartbeat(&self.idle_heartbeat_request(capabilities))
            .await
        {
            debug!("Idle heartbeat failed: {}", err);
        }
        tokio::time::sleep(self.config.poll_interval).await;
    }

    fn claim_request(&self, capabilities: &[String]) -> ClaimRequest {
        ClaimRequest {
            worker_id: self.config.worker_id.clone(),
            capabilities: capabilities.to_vec(),
            hostname: self.config.hostname.clone(),
            ip_address: self.config.ip_address.clone(),
            metadata: None,
        }
    }

    fn heartbeat_request(&self, capabilities: &[String]) -> WorkerHeartbeatRequest {
        WorkerHeartbeatRequest {
            worker_id: self.config.worker_id.clone(),
            hostname: self.config.hostname.clone(),
            ip_address: self.config.ip_address.clone(),
            capabilities: Some(capabilities.to_vec()),
            status: Some(WorkerStatus::Active),
            metadata: None,
        }
    }

    fn idle_heartbeat_request(&self, capabilities: &[String]) -> WorkerHeartbeatRequest {
        WorkerHeartbeatRequest {
            status: Some(WorkerStatus::Idle),
            ..self.heartbeat_request(capabilities)
        }
    }
}
