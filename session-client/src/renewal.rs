use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common_auth::PrincipalKind;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, timeout, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Renew one minute before the 15 minute access token lapses.
pub const DEFAULT_RENEWAL_PERIOD: Duration = Duration::from_secs(14 * 60);
pub const DEFAULT_RENEWAL_TIMEOUT: Duration = Duration::from_secs(10);

const REFRESH_PATH: &str = "/api/auth/refresh";

#[derive(Debug, Error)]
pub enum RenewalError {
    #[error("renewal endpoint answered {0}")]
    Rejected(StatusCode),
    #[error("renewal request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("renewal did not complete within {0:?}")]
    Timeout(Duration),
}

#[async_trait]
pub trait RenewalClient: Send + Sync {
    /// Ask the server for a fresh access token for `kind`. Returns the new
    /// access token on success.
    async fn renew(&self, kind: PrincipalKind) -> Result<String, RenewalError>;
}

#[derive(Serialize)]
struct RenewalRequest {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RenewalResponse {
    access_token: String,
}

/// Calls the renewal endpoint with a cookie-carrying client so the cookies
/// set by each response replace the ones sent with the next request.
#[derive(Clone)]
pub struct HttpRenewalClient {
    client: Client,
    endpoint: String,
}

impl HttpRenewalClient {
    pub fn new(base_url: &str) -> Result<Self, RenewalError> {
        let client = Client::builder().cookie_store(true).build()?;
        Ok(Self::with_client(client, base_url))
    }

    /// Use an existing client. It must have a cookie store for renewal
    /// cookies to reach the server.
    pub fn with_client(client: Client, base_url: &str) -> Self {
        Self {
            client,
            endpoint: format!("{}{REFRESH_PATH}", base_url.trim_end_matches('/')),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl RenewalClient for HttpRenewalClient {
    async fn renew(&self, kind: PrincipalKind) -> Result<String, RenewalError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&RenewalRequest {
                kind: kind.as_str(),
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(RenewalError::Rejected(status));
        }
        let body: RenewalResponse = response.json().await?;
        Ok(body.access_token)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenewalSchedule {
    pub period: Duration,
    /// Upper bound on a single renewal call.
    pub timeout: Duration,
}

impl Default for RenewalSchedule {
    fn default() -> Self {
        Self {
            period: DEFAULT_RENEWAL_PERIOD,
            timeout: DEFAULT_RENEWAL_TIMEOUT,
        }
    }
}

/// Keeps a signed-in client's access token fresh by calling the renewal
/// endpoint on a fixed period. One scheduler can start any number of
/// independent sessions.
#[derive(Clone)]
pub struct RenewalScheduler {
    client: Arc<dyn RenewalClient>,
    schedule: RenewalSchedule,
}

impl RenewalScheduler {
    pub fn new(client: Arc<dyn RenewalClient>) -> Self {
        Self {
            client,
            schedule: RenewalSchedule::default(),
        }
    }

    pub fn with_schedule(mut self, schedule: RenewalSchedule) -> Self {
        self.schedule = schedule;
        self
    }

    pub fn schedule(&self) -> RenewalSchedule {
        self.schedule
    }

    /// Spawn the renewal timer for `kind`. The first renewal happens one
    /// period from now. The timer stops on the first failed renewal; there
    /// is no retry.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self, kind: PrincipalKind) -> RenewalHandle {
        let client = self.client.clone();
        let schedule = self.schedule;
        info!(kind = %kind, period = ?schedule.period, "starting token renewal timer");

        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + schedule.period, schedule.period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let result = match timeout(schedule.timeout, client.renew(kind)).await {
                    Ok(result) => result,
                    Err(_) => Err(RenewalError::Timeout(schedule.timeout)),
                };
                match result {
                    Ok(_) => debug!(kind = %kind, "access token renewed"),
                    Err(err) => {
                        warn!(kind = %kind, error = %err, "token renewal failed; stopping timer");
                        return err;
                    }
                }
            }
        });

        RenewalHandle { task: Some(task) }
    }
}

/// Owns a running renewal timer. Dropping the handle cancels the timer.
#[derive(Debug)]
pub struct RenewalHandle {
    task: Option<JoinHandle<RenewalError>>,
}

impl RenewalHandle {
    pub fn cancel(mut self) {
        self.abort();
    }

    /// False once the timer has stopped after a failed renewal.
    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Wait for the timer to stop on its own and return the failure that
    /// stopped it.
    pub async fn stopped(mut self) -> Option<RenewalError> {
        let task = self.task.take()?;
        task.await.ok()
    }

    fn abort(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for RenewalHandle {
    fn drop(&mut self) {
        self.abort();
    }
}
