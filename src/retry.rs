use tracing::info;

use crate::resource_manager::ArmError;

pub const DEFAULT_API_RETRIES: u32 = 5;

/// Number of extra attempts granted to a Resource Manager call failing with a transient
/// transport error. A budget of `n` allows up to `n + 1` attempts in total.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_API_RETRIES)
    }
}

impl RetryPolicy {
    pub fn new(retries: u32) -> Self {
        Self { retries }
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// Runs `call` until it succeeds, fails with a non transient error or the budget is spent.
    ///
    /// `description` completes the retry message, e.g. `while creating resource group 'rg'`.
    pub fn run<T, F>(&self, description: &str, mut call: F) -> Result<T, ArmError>
    where
        F: FnMut() -> Result<T, ArmError>,
    {
        let mut retries_left = self.retries;
        let mut attempts: u32 = 0;

        loop {
            attempts += 1;
            match call() {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() => {
                    info!("{} {description}. {retries_left} retries left.", err.kind());
                    if retries_left == 0 {
                        return Err(ArmError::RetriesExhausted {
                            attempts,
                            source: Box::new(err),
                        });
                    }
                    retries_left -= 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use assert_matches::assert_matches;
    use rstest::rstest;

    use super::*;
    use crate::http_client::HttpClientError;

    fn timeout() -> ArmError {
        ArmError::Transport(HttpClientError::Timeout("operation timed out".into()))
    }

    #[rstest]
    #[case::no_failures(5, 0, 1)]
    #[case::some_failures(5, 3, 4)]
    #[case::one_less_than_budget(5, 4, 5)]
    #[case::exactly_budget(5, 5, 6)]
    #[case::zero_budget_success(0, 0, 1)]
    fn transient_failures_below_budget_eventually_succeed(
        #[case] retries: u32,
        #[case] failures: u32,
        #[case] expected_attempts: u32,
    ) {
        let attempts = Cell::new(0);
        let result = RetryPolicy::new(retries).run("while testing", || {
            attempts.set(attempts.get() + 1);
            if attempts.get() <= failures {
                Err(timeout())
            } else {
                Ok("done")
            }
        });

        assert_eq!(result.unwrap(), "done");
        assert_eq!(attempts.get(), expected_attempts);
    }

    #[rstest]
    #[case(0, 1)]
    #[case(2, 3)]
    #[case(5, 6)]
    fn persistent_transient_failures_exhaust_the_budget(
        #[case] retries: u32,
        #[case] expected_attempts: u32,
    ) {
        let attempts = Cell::new(0);
        let result: Result<(), _> = RetryPolicy::new(retries).run("while testing", || {
            attempts.set(attempts.get() + 1);
            Err(ArmError::Transport(HttpClientError::ConnectionError(
                "reset".into(),
            )))
        });

        assert_eq!(attempts.get(), expected_attempts);
        assert_matches!(result, Err(ArmError::RetriesExhausted { attempts, source }) => {
            assert_eq!(attempts, expected_attempts);
            assert!(source.is_transient());
        });
    }

    #[test]
    fn provider_errors_are_not_retried() {
        let attempts = Cell::new(0);
        let result: Result<(), _> = RetryPolicy::default().run("while testing", || {
            attempts.set(attempts.get() + 1);
            Err(ArmError::from_response(400, br#"{"error":{"code":"InvalidTemplate","message":"bad"}}"#))
        });

        assert_eq!(attempts.get(), 1);
        assert_matches!(result, Err(ArmError::Operation { code, .. }) if code == "InvalidTemplate");
    }

    #[test]
    fn default_budget() {
        assert_eq!(RetryPolicy::default().retries(), DEFAULT_API_RETRIES);
    }
}
