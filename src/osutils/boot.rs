//! Wait for sysprep generalization
//!
//! Polls `GeneralizationState` until it reaches [`GENERALIZATION_COMPLETE`].
//! A missing record means there is nothing to wait for. The wait is bounded
//! by the configured timeout and can be cancelled; dropping the returned
//! future stops polling.

use crate::OsError;
use crate::platform::{Registry, RegistryValue};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

pub const SYSPREP_STATUS_KEY: &str = "SYSTEM\\Setup\\Status\\SysprepStatus";
pub const GENERALIZATION_STATE: &str = "GeneralizationState";

/// Terminal generalization state
pub const GENERALIZATION_COMPLETE: u32 = 7;

/// Blocks first-boot work until sysprep has finished
#[derive(Clone)]
pub struct BootGate {
    registry: Arc<dyn Registry>,
    poll_interval: Duration,
    timeout: Option<Duration>,
}

impl BootGate {
    /// `timeout` of `None` waits indefinitely
    pub fn new(
        registry: Arc<dyn Registry>,
        poll_interval: Duration,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            registry,
            poll_interval,
            timeout,
        }
    }

    /// Wait until generalization completes or the timeout elapses
    pub async fn wait_for_completion(&self) -> Result<(), OsError> {
        self.wait_until(std::future::pending::<()>()).await
    }

    /// Like [`Self::wait_for_completion`], but gives up with
    /// [`OsError::Cancelled`] once `cancel` completes
    pub async fn wait_until(&self, cancel: impl Future<Output = ()>) -> Result<(), OsError> {
        let bounded = async {
            match self.timeout {
                Some(limit) => match tokio::time::timeout(limit, self.poll()).await {
                    Ok(result) => result,
                    Err(_) => Err(OsError::Timeout(format!(
                        "sysprep generalization after {:?}",
                        limit
                    ))),
                },
                None => self.poll().await,
            }
        };

        tokio::select! {
            biased;
            result = bounded => result,
            _ = cancel => Err(OsError::Cancelled("sysprep generalization".to_string())),
        }
    }

    async fn poll(&self) -> Result<(), OsError> {
        let mut attempts: u64 = 0;
        loop {
            match self.read_state()? {
                None => {
                    debug!("Sysprep status not found, nothing to wait for");
                    return Ok(());
                }
                Some(GENERALIZATION_COMPLETE) => {
                    if attempts > 0 {
                        info!("Sysprep generalization completed");
                    }
                    return Ok(());
                }
                Some(state) => {
                    attempts += 1;
                    debug!(
                        "Waiting for sysprep generalization (state {}, attempt {})",
                        state, attempts
                    );
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }
    }

    fn read_state(&self) -> Result<Option<u32>, OsError> {
        match self
            .registry
            .query_value(SYSPREP_STATUS_KEY, GENERALIZATION_STATE)?
        {
            Some(RegistryValue::Dword(state)) => Ok(Some(state)),
            Some(other) => Err(OsError::InvalidData(format!(
                "{} is not a DWORD: {}",
                GENERALIZATION_STATE, other
            ))),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::mock::MockSystem;

    const TICK: Duration = Duration::from_millis(1);

    fn gate(mock: &MockSystem, timeout: Option<Duration>) -> BootGate {
        BootGate::new(mock.platform().registry, TICK, timeout)
    }

    fn states(values: &[u32]) -> MockSystem {
        MockSystem::new().with_registry_sequence(
            SYSPREP_STATUS_KEY,
            GENERALIZATION_STATE,
            values.iter().map(|v| Some(RegistryValue::Dword(*v))),
        )
    }

    #[tokio::test]
    async fn test_absent_record_returns_immediately() {
        let mock = MockSystem::new();
        gate(&mock, None).wait_for_completion().await.unwrap();
        assert_eq!(mock.registry_reads(), 1);
    }

    #[tokio::test]
    async fn test_polls_until_complete() {
        let mock = states(&[3, 4, 7]);
        gate(&mock, None).wait_for_completion().await.unwrap();
        assert_eq!(mock.registry_reads(), 3);
    }

    #[tokio::test]
    async fn test_timeout() {
        let mock = states(&[3]);
        let err = gate(&mock, Some(Duration::from_millis(30)))
            .wait_for_completion()
            .await
            .unwrap_err();

        assert!(matches!(err, OsError::Timeout(_)));
        assert!(mock.registry_reads() > 1);
    }

    #[tokio::test]
    async fn test_cancel() {
        let mock = states(&[3]);
        let err = gate(&mock, None)
            .wait_until(tokio::time::sleep(Duration::from_millis(20)))
            .await
            .unwrap_err();

        assert!(matches!(err, OsError::Cancelled(_)));
    }

    #[tokio::test]
    async fn test_read_failure_propagates() {
        let mock = MockSystem::new().with_registry_failure(SYSPREP_STATUS_KEY, "access denied");
        let err = gate(&mock, None).wait_for_completion().await.unwrap_err();
        assert!(matches!(err, OsError::Registry { .. }));
    }
}
