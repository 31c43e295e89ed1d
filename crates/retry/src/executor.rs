//! Read-modify-write under optimistic concurrency.
//!
//! Each attempt fetches the latest copy of the target, applies the caller's
//! mutation to it and submits the result carrying the fetched version token.
//! A stale token is rejected by the store as a conflict; the executor then
//! backs off and starts over from a fresh fetch, so a concurrent writer's
//! change is never overwritten. Every other failure ends the operation.

use core::future::Future;
use core::time::Duration;

use keel_client::{Resource, ResourceClient, Transport};
use tokio::time::{sleep, timeout_at, Instant};
use tracing::{debug, info, warn};

use crate::errors::UpdateError;
use crate::policy::RetryPolicy;

/// Conflict-retrying update of one named object.
#[derive(Debug)]
pub struct ConflictRetry<'a, T> {
    client: &'a ResourceClient<T>,
    name: &'a str,
    policy: RetryPolicy,
    deadline: Option<Instant>,
}

impl<'a, T: Transport> ConflictRetry<'a, T> {
    pub fn new(client: &'a ResourceClient<T>, name: &'a str) -> Self {
        Self {
            client,
            name,
            policy: RetryPolicy::default(),
            deadline: None,
        }
    }

    #[must_use]
    pub const fn policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Gives up with [`UpdateError::Timeout`] once `deadline` passes, at
    /// whichever network call or backoff wait is in progress.
    #[must_use]
    pub const fn deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    #[must_use]
    pub fn timeout(self, timeout: Duration) -> Self {
        self.deadline(Instant::now() + timeout)
    }

    /// Runs the update, returning the object as committed by the store.
    ///
    /// `mutate` receives the freshly fetched object and returns the desired
    /// one. It must not block, and it may be called once per attempt. The
    /// version token, name and namespace of its result are overwritten with
    /// those of the fetched object.
    pub async fn run<F>(&self, mut mutate: F) -> Result<Resource, UpdateError>
    where
        F: FnMut(Resource) -> Resource,
    {
        let kind = self.client.kind();
        let namespace = self.client.namespace();
        let mut attempts: u32 = 0;

        loop {
            let current = self
                .bounded(attempts, self.client.get(self.name))
                .await??;

            let candidate = prepare(current, &mut mutate);

            attempts += 1;
            debug!(
                %kind,
                %namespace,
                name = self.name,
                attempt = attempts,
                version = candidate.version().map(|v| v.as_str()),
                "attempting update"
            );

            let err = match self
                .bounded(attempts, self.client.update(&candidate))
                .await?
            {
                Ok(updated) => {
                    info!(
                        %kind,
                        %namespace,
                        name = self.name,
                        attempts,
                        "update committed"
                    );
                    return Ok(updated);
                }
                Err(err) if err.is_conflict() => err,
                Err(err) => return Err(UpdateError::Client(err)),
            };

            if attempts >= self.policy.max_attempts() {
                warn!(
                    %kind,
                    %namespace,
                    name = self.name,
                    attempts,
                    "giving up on conflicting update"
                );
                return Err(UpdateError::RetriesExhausted {
                    attempts,
                    last: err,
                });
            }

            let delay = self.policy.delay(attempts);
            warn!(
                %kind,
                %namespace,
                name = self.name,
                attempt = attempts,
                ?delay,
                "update conflicted, retrying from a fresh read"
            );

            self.bounded(attempts, sleep(delay)).await?;
        }
    }

    async fn bounded<Fut>(&self, attempts: u32, future: Fut) -> Result<Fut::Output, UpdateError>
    where
        Fut: Future,
    {
        let Some(deadline) = self.deadline else {
            return Ok(future.await);
        };

        if Instant::now() >= deadline {
            return Err(UpdateError::Timeout { attempts });
        }

        timeout_at(deadline, future)
            .await
            .map_err(|_| UpdateError::Timeout { attempts })
    }
}

/// Applies the mutation, pinning the identity and token of `current`.
fn prepare<F>(current: Resource, mutate: &mut F) -> Resource
where
    F: FnMut(Resource) -> Resource,
{
    let name = current.metadata.name.clone();
    let namespace = current.metadata.namespace.clone();
    let version = current.metadata.resource_version.clone();

    let mut candidate = mutate(current);
    candidate.metadata.name = name;
    candidate.metadata.namespace = namespace;
    candidate.metadata.resource_version = version;
    candidate
}

/// Updates `name` through `client`, retrying on conflict per `policy`.
pub async fn retry_on_conflict<T, F>(
    client: &ResourceClient<T>,
    name: &str,
    policy: RetryPolicy,
    mutate: F,
) -> Result<Resource, UpdateError>
where
    T: Transport,
    F: FnMut(Resource) -> Resource,
{
    ConflictRetry::new(client, name).policy(policy).run(mutate).await
}
