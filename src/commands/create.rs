use std::path::PathBuf;

use tracing::info;

use super::CommandError;
use crate::driver::{ClientFactory, Driver};
use crate::state::InstanceState;
use crate::template::TemplateRenderer;

pub struct CreateCommand<F, R> {
    driver: Driver<F, R>,
    state_path: PathBuf,
}

impl<F, R> CreateCommand<F, R>
where
    F: ClientFactory,
    R: TemplateRenderer,
{
    pub fn new(driver: Driver<F, R>, state_path: impl Into<PathBuf>) -> Self {
        Self {
            driver,
            state_path: state_path.into(),
        }
    }

    /// The prepared state is written before anything is sent to Azure, so a failed creation
    /// can still be destroyed.
    pub fn execute(&self) -> Result<InstanceState, CommandError> {
        let state = self.driver.prepare(InstanceState::load(&self.state_path)?);
        state.save(&self.state_path)?;

        let state = self.driver.create(state)?;
        state.save(&self.state_path)?;
        info!(
            "Instance created, reachable at {}",
            state.hostname.as_deref().unwrap_or_default()
        );
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use tempfile::TempDir;

    use super::*;
    use crate::driver::DriverError;
    use crate::driver::config::DriverConfig;
    use crate::driver::tests::MockClientFactory;
    use crate::template::tests::MockTemplateRenderer;
    use crate::transport::Transport;

    #[test]
    fn prepared_state_is_kept_when_creation_fails() {
        let dir = TempDir::new().unwrap();
        let state_path = dir.path().join("state.json");
        let config = DriverConfig {
            location: "westeurope".into(),
            machine_size: "Standard_B1s".into(),
            subscription_id: None,
            ..Default::default()
        }
        .for_instance("default-ubuntu");
        let driver = Driver::new(
            config,
            Transport::default(),
            MockClientFactory::new(),
            MockTemplateRenderer::new(),
        );

        let result = CreateCommand::new(driver, &state_path).execute();

        assert_matches!(
            result,
            Err(CommandError::Driver(DriverError::MissingSubscriptionId))
        );
        let saved = InstanceState::load(&state_path).unwrap();
        assert_eq!(saved.uuid.as_ref().map(String::len), Some(16));
        assert!(
            saved
                .azure_resource_group_name
                .unwrap()
                .starts_with("kitchen-default-ubuntu-")
        );
    }

    #[test]
    fn unreadable_state_is_reported() {
        let dir = TempDir::new().unwrap();
        let state_path = dir.path().join("state.json");
        std::fs::write(&state_path, "{ not json").unwrap();
        let driver = Driver::new(
            DriverConfig::default(),
            Transport::default(),
            MockClientFactory::new(),
            MockTemplateRenderer::new(),
        );

        assert_matches!(
            CreateCommand::new(driver, &state_path).execute(),
            Err(CommandError::State(_))
        );
    }
}
