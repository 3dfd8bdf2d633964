use std::time::Duration;

use tracing::info;

use super::{DeploymentError, ProvisioningState};
use crate::resource_manager::{OperationHandle, ResourceManager};

pub const DEFAULT_DEPLOYMENT_SLEEP: Duration = Duration::from_secs(10);

/// Progress of one resource of a deployment that has not settled yet.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationProgress {
    pub resource_type: String,
    pub resource_name: String,
    pub state: ProvisioningState,
}

/// Receives the progress of the resources while a deployment is followed.
pub trait ProgressObserver {
    fn on_progress(&self, progress: &OperationProgress);
}

/// Reports progress through the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl ProgressObserver for LogObserver {
    fn on_progress(&self, progress: &OperationProgress) {
        info!(
            "Resource {} '{}' provisioning status is {}",
            progress.resource_type, progress.resource_name, progress.state
        );
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PollerState {
    Submitted,
    Polling,
    Finished(ProvisioningState),
}

/// Follows a submitted deployment until the provider reports an end state.
pub struct DeploymentPoller<'a, R: ?Sized, O = LogObserver, S = fn(Duration)> {
    resource_manager: &'a R,
    interval: Duration,
    observer: O,
    sleep: S,
    state: PollerState,
    ticks: u32,
}

impl<'a, R> DeploymentPoller<'a, R>
where
    R: ResourceManager + ?Sized,
{
    pub fn new(resource_manager: &'a R, interval: Duration) -> Self {
        Self {
            resource_manager,
            interval,
            observer: LogObserver,
            sleep: std::thread::sleep,
            state: PollerState::Submitted,
            ticks: 0,
        }
    }
}

impl<'a, R, O, S> DeploymentPoller<'a, R, O, S>
where
    R: ResourceManager + ?Sized,
    O: ProgressObserver,
    S: Fn(Duration),
{
    pub fn with_observer<O2: ProgressObserver>(self, observer: O2) -> DeploymentPoller<'a, R, O2, S> {
        DeploymentPoller {
            resource_manager: self.resource_manager,
            interval: self.interval,
            observer,
            sleep: self.sleep,
            state: self.state,
            ticks: self.ticks,
        }
    }

    pub fn with_sleep<S2: Fn(Duration)>(self, sleep: S2) -> DeploymentPoller<'a, R, O, S2> {
        DeploymentPoller {
            resource_manager: self.resource_manager,
            interval: self.interval,
            observer: self.observer,
            sleep,
            state: self.state,
            ticks: self.ticks,
        }
    }

    pub fn state(&self) -> &PollerState {
        &self.state
    }

    /// Number of status reads performed so far.
    pub fn ticks(&self) -> u32 {
        self.ticks
    }

    /// Polls until the deployment settles.
    ///
    /// Each tick reports the resources still in progress, waits for the interval and reads
    /// the deployment state. A `Failed` deployment is turned into an error carrying the status
    /// message of its first operation that did not answer `OK`.
    pub fn follow(&mut self, handle: OperationHandle) -> Result<ProvisioningState, DeploymentError> {
        let resource_group = handle.resource_group();
        let deployment_name = handle.deployment_name();
        self.state = PollerState::Polling;

        let end_state = loop {
            self.report_outstanding(resource_group, deployment_name)?;
            (self.sleep)(self.interval);

            let current = self
                .resource_manager
                .get_deployment_state(resource_group, deployment_name)?;
            self.ticks += 1;
            if current.is_terminal() {
                break current;
            }
        };

        info!("Resource Template deployment reached end state of '{end_state}'.");
        self.state = PollerState::Finished(end_state.clone());

        if end_state == ProvisioningState::Failed {
            return Err(self.failure(resource_group, deployment_name)?);
        }

        Ok(end_state)
    }

    fn report_outstanding(
        &self,
        resource_group: &str,
        deployment_name: &str,
    ) -> Result<(), DeploymentError> {
        let operations = self
            .resource_manager
            .list_deployment_operations(resource_group, deployment_name)?;

        operations
            .iter()
            .filter(|op| {
                !matches!(
                    op.state(),
                    ProvisioningState::Failed | ProvisioningState::Succeeded
                )
            })
            .for_each(|op| {
                self.observer.on_progress(&OperationProgress {
                    resource_type: op.resource_type().to_string(),
                    resource_name: op.resource_name().to_string(),
                    state: op.state().clone(),
                })
            });

        Ok(())
    }

    fn failure(
        &self,
        resource_group: &str,
        deployment_name: &str,
    ) -> Result<DeploymentError, DeploymentError> {
        let operations = self
            .resource_manager
            .list_deployment_operations(resource_group, deployment_name)?;

        Ok(match operations.iter().find(|op| !op.is_ok()) {
            Some(op) => DeploymentError::OperationFailed {
                deployment: deployment_name.to_string(),
                message: op.status_message(),
            },
            None => DeploymentError::Failed {
                deployment: deployment_name.to_string(),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;

    use assert_matches::assert_matches;

    use super::*;
    use crate::http_client::HttpClientError;
    use crate::resource_manager::ArmError;
    use crate::resource_manager::tests::{MockResourceManager, operation};

    const VM: &str = "Microsoft.Compute/virtualMachines";
    const NIC: &str = "Microsoft.Network/networkInterfaces";

    #[derive(Default)]
    struct RecordingObserver(RefCell<Vec<OperationProgress>>);

    impl ProgressObserver for &RecordingObserver {
        fn on_progress(&self, progress: &OperationProgress) {
            self.0.borrow_mut().push(progress.clone());
        }
    }

    fn states(sequence: &[&str]) -> RefCell<VecDeque<ProvisioningState>> {
        RefCell::new(sequence.iter().map(|s| ProvisioningState::from(*s)).collect())
    }

    fn handle() -> OperationHandle {
        OperationHandle::new("kitchen-rg", "deploy")
    }

    #[test]
    fn stops_at_the_first_terminal_state() {
        let sequence = states(&["Accepted", "Running", "Running", "Succeeded"]);
        let mut resource_manager = MockResourceManager::new();
        resource_manager
            .expect_list_deployment_operations()
            .times(4)
            .returning(|_, _| Ok(vec![operation(VM, "vm", "Running", "")]));
        resource_manager
            .expect_get_deployment_state()
            .times(4)
            .returning(move |_, _| Ok(sequence.borrow_mut().pop_front().unwrap()));

        let slept = Cell::new(0);
        let mut poller = DeploymentPoller::new(&resource_manager, Duration::from_secs(10))
            .with_sleep(|interval| {
                assert_eq!(interval, Duration::from_secs(10));
                slept.set(slept.get() + 1);
            });

        assert_eq!(poller.state(), &PollerState::Submitted);
        let end_state = poller.follow(handle()).unwrap();

        assert_eq!(end_state, ProvisioningState::Succeeded);
        assert_eq!(poller.ticks(), 4);
        assert_eq!(slept.get(), 4);
        assert_eq!(
            poller.state(),
            &PollerState::Finished(ProvisioningState::Succeeded)
        );
    }

    #[test]
    fn only_unsettled_operations_are_reported() {
        let mut resource_manager = MockResourceManager::new();
        resource_manager
            .expect_list_deployment_operations()
            .once()
            .returning(|_, _| {
                Ok(vec![
                    operation(NIC, "nic-vm", "Succeeded", "OK"),
                    operation(VM, "vm", "Running", ""),
                    operation(VM, "other", "Failed", "Conflict"),
                ])
            });
        resource_manager
            .expect_get_deployment_state()
            .once()
            .returning(|_, _| Ok(ProvisioningState::Succeeded));

        let observer = RecordingObserver::default();
        let mut poller = DeploymentPoller::new(&resource_manager, Duration::ZERO)
            .with_observer(&observer)
            .with_sleep(|_| {});
        poller.follow(handle()).unwrap();

        assert_eq!(
            observer.0.into_inner(),
            vec![OperationProgress {
                resource_type: VM.into(),
                resource_name: "vm".into(),
                state: ProvisioningState::Running,
            }]
        );
    }

    #[test]
    fn failed_deployment_reports_first_operation_not_ok() {
        let mut resource_manager = MockResourceManager::new();
        resource_manager
            .expect_list_deployment_operations()
            .times(2)
            .returning(|_, _| {
                Ok(vec![
                    operation(NIC, "nic-vm", "Succeeded", "OK"),
                    operation(VM, "vm", "Failed", "Conflict"),
                    operation(VM, "vm2", "Failed", "BadRequest"),
                ])
            });
        resource_manager
            .expect_get_deployment_state()
            .once()
            .returning(|_, _| Ok(ProvisioningState::Failed));

        let mut poller =
            DeploymentPoller::new(&resource_manager, Duration::ZERO).with_sleep(|_| {});
        let result = poller.follow(handle());

        assert_matches!(result, Err(DeploymentError::OperationFailed { deployment, message }) => {
            assert_eq!(deployment, "deploy");
            assert_eq!(message, "vm is Failed");
        });
        assert_eq!(
            poller.state(),
            &PollerState::Finished(ProvisioningState::Failed)
        );
    }

    #[test]
    fn failed_deployment_without_failing_operation() {
        let mut resource_manager = MockResourceManager::new();
        resource_manager
            .expect_list_deployment_operations()
            .times(2)
            .returning(|_, _| Ok(vec![operation(NIC, "nic-vm", "Succeeded", "OK")]));
        resource_manager
            .expect_get_deployment_state()
            .once()
            .returning(|_, _| Ok(ProvisioningState::Failed));

        let mut poller =
            DeploymentPoller::new(&resource_manager, Duration::ZERO).with_sleep(|_| {});

        assert_matches!(
            poller.follow(handle()),
            Err(DeploymentError::Failed { deployment }) if deployment == "deploy"
        );
    }

    #[test]
    fn canceled_is_an_end_state() {
        let mut resource_manager = MockResourceManager::new();
        resource_manager
            .expect_list_deployment_operations()
            .once()
            .returning(|_, _| Ok(Vec::new()));
        resource_manager
            .expect_get_deployment_state()
            .once()
            .returning(|_, _| Ok(ProvisioningState::Canceled));

        let mut poller =
            DeploymentPoller::new(&resource_manager, Duration::ZERO).with_sleep(|_| {});

        assert_eq!(
            poller.follow(handle()).unwrap(),
            ProvisioningState::Canceled
        );
        assert_eq!(poller.ticks(), 1);
    }

    #[test]
    fn resource_manager_errors_stop_polling() {
        let mut resource_manager = MockResourceManager::new();
        resource_manager
            .expect_list_deployment_operations()
            .once()
            .returning(|_, _| Ok(Vec::new()));
        resource_manager
            .expect_get_deployment_state()
            .once()
            .returning(|_, _| {
                Err(ArmError::Transport(HttpClientError::TransportError(
                    "broken".into(),
                )))
            });

        let mut poller =
            DeploymentPoller::new(&resource_manager, Duration::ZERO).with_sleep(|_| {});

        assert_matches!(poller.follow(handle()), Err(DeploymentError::Arm(_)));
        assert_eq!(poller.state(), &PollerState::Polling);
    }
}
