pub mod authenticator;
pub mod commands;
pub mod credentials;
pub mod deployment;
pub mod driver;
pub mod environment;
pub mod http;
pub mod http_client;
pub mod parameters;
pub mod resource_manager;
pub mod retry;
pub mod state;
pub mod template;
pub mod token;
pub mod token_retriever;
pub mod transport;

use crate::token::Token;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TokenRetrieverError {
    #[error("retrieving token: `{0}`")]
    TokenRetrieverError(String),
    #[error("fetching access token: `{0}`")]
    AuthenticatorError(#[from] authenticator::AuthenticateError),
    #[error("acquiring cache mutex lock")]
    PoisonError,
}

/// The TokenRetriever will be the responsible to retrieve an authorization token
pub trait TokenRetriever {
    fn retrieve(&self) -> Result<Token, TokenRetrieverError>;
}

impl<T: TokenRetriever + ?Sized> TokenRetriever for Box<T> {
    fn retrieve(&self) -> Result<Token, TokenRetrieverError> {
        (**self).retrieve()
    }
}
