//! Service stop and self-termination

use crate::OsError;
use crate::platform::{ServiceApi, ServiceState};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Stops services by name
#[derive(Clone)]
pub struct ServiceController {
    services: Arc<dyn ServiceApi>,
    service_name: String,
    grace: Duration,
}

impl ServiceController {
    /// `service_name` is the service [`Self::terminate`] stops
    pub fn new(
        services: Arc<dyn ServiceApi>,
        service_name: impl Into<String>,
        grace: Duration,
    ) -> Self {
        Self {
            services,
            service_name: service_name.into(),
            grace,
        }
    }

    /// Stop a service by exact name
    pub async fn stop(&self, name: &str) -> Result<(), OsError> {
        let service = self
            .services
            .find_service(name)
            .await?
            .ok_or_else(|| OsError::ServiceNotFound(name.to_string()))?;

        if service.state == ServiceState::Stopped {
            debug!("Service {} is reported as stopped", name);
        }

        info!("Stopping service {}", name);
        match self.services.stop_service(&service).await? {
            0 => Ok(()),
            code => Err(OsError::ServiceStop {
                service: name.to_string(),
                code,
            }),
        }
    }

    /// Stop the initializing service after the grace period
    ///
    /// The service manager reports the service as started before it can
    /// accept a stop request.
    pub async fn terminate(&self) -> Result<(), OsError> {
        tokio::time::sleep(self.grace).await;
        self.stop(&self.service_name).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::mock::MockSystem;

    fn controller(mock: &MockSystem) -> ServiceController {
        ServiceController::new(mock.platform().services, "cloudbase-init", Duration::ZERO)
    }

    #[tokio::test]
    async fn test_stop_running_service() {
        let mock = MockSystem::new().with_service("W32Time", ServiceState::Running);

        controller(&mock).stop("W32Time").await.unwrap();
        assert_eq!(mock.service_state("W32Time"), Some(ServiceState::Stopped));
    }

    #[tokio::test]
    async fn test_stop_missing_service() {
        let err = controller(&MockSystem::new()).stop("nope").await.unwrap_err();
        assert!(matches!(err, OsError::ServiceNotFound(_)));
    }

    #[tokio::test]
    async fn test_stop_failure_carries_code() {
        let mock = MockSystem::new()
            .with_service("W32Time", ServiceState::Running)
            .with_service_stop_code(3);

        let err = controller(&mock).stop("W32Time").await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Stopping service W32Time failed with return value: 3"
        );
    }

    /// A stopped service still gets the stop request and its code
    #[tokio::test]
    async fn test_stop_already_stopped_service_fails() {
        let mock = MockSystem::new().with_service("W32Time", ServiceState::Stopped);

        let err = controller(&mock).stop("W32Time").await.unwrap_err();
        assert!(matches!(err, OsError::ServiceStop { code: 5, .. }));
    }

    #[tokio::test]
    async fn test_stop_stopped_service_scripted_code() {
        let mock = MockSystem::new()
            .with_service("svc", ServiceState::Stopped)
            .with_service_stop_code(5);

        let err = controller(&mock).stop("svc").await.unwrap_err();
        assert!(matches!(err, OsError::ServiceStop { code: 5, .. }));
        assert_eq!(mock.service_state("svc"), Some(ServiceState::Stopped));
    }

    #[tokio::test]
    async fn test_terminate_stops_configured_service() {
        let mock = MockSystem::new().with_service("cloudbase-init", ServiceState::Running);

        controller(&mock).terminate().await.unwrap();
        assert_eq!(
            mock.service_state("cloudbase-init"),
            Some(ServiceState::Stopped)
        );
    }
}
