use std::path::PathBuf;

use super::CommandError;
use crate::driver::{ClientFactory, Driver};
use crate::state::InstanceState;
use crate::template::TemplateRenderer;

pub struct DestroyCommand<F, R> {
    driver: Driver<F, R>,
    state_path: PathBuf,
}

impl<F, R> DestroyCommand<F, R>
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

    pub fn execute(&self) -> Result<InstanceState, CommandError> {
        let state = self.driver.destroy(InstanceState::load(&self.state_path)?)?;
        state.save(&self.state_path)?;
        Ok(state)
    }
}
