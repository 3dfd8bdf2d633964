use std::sync::Mutex;

use tracing::debug;

use crate::authenticator::{Authenticator, TokenRequest};
use crate::token::Token;
use crate::{TokenRetriever, TokenRetrieverError};

/// Retrieves Resource Manager tokens, reusing the last one until it expires.
#[derive(Debug)]
pub struct TokenRetrieverWithCache<A>
where
    A: Authenticator,
{
    request: TokenRequest,
    tokens: Mutex<Option<Token>>,
    authenticator: A,
    retries: u8,
}

impl<A> TokenRetriever for TokenRetrieverWithCache<A>
where
    A: Authenticator,
{
    fn retrieve(&self) -> Result<Token, TokenRetrieverError> {
        let mut cache = self
            .tokens
            .lock()
            .map_err(|_| TokenRetrieverError::PoisonError)?;

        match cache.as_ref() {
            Some(token) if !token.is_expired() => Ok(token.clone()),
            _ => {
                let token = self.authenticate_with_retries()?;
                debug!("authorization token refreshed");
                *cache = Some(token.clone());
                Ok(token)
            }
        }
    }
}

impl<A> TokenRetrieverWithCache<A>
where
    A: Authenticator,
{
    pub fn new(request: TokenRequest, authenticator: A) -> Self {
        Self {
            request,
            tokens: Mutex::new(None),
            authenticator,
            retries: 0,
        }
    }

    pub fn with_retries(self, retries: u8) -> Self {
        Self { retries, ..self }
    }

    /// One authentication plus up to `retries` more when it fails.
    fn authenticate_with_retries(&self) -> Result<Token, TokenRetrieverError> {
        let mut retries_left = self.retries;
        loop {
            match self.refresh_token() {
                Ok(token) => return Ok(token),
                Err(err) if retries_left > 0 => {
                    debug!("refreshing token failed, {retries_left} retries left: {err}");
                    retries_left -= 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn refresh_token(&self) -> Result<Token, TokenRetrieverError> {
        let response = self.authenticator.authenticate(self.request.clone())?;
        Token::try_from(response)
    }
}
