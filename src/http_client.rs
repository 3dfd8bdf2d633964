use http::{Request, Response};

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum HttpClientError {
    /// The request did not complete before the configured timeout.
    #[error("request timed out: `{0}`")]
    Timeout(String),
    /// The connection could not be established or was reset by the peer.
    #[error("connection error: `{0}`")]
    ConnectionError(String),
    /// Any other failure of the http transport crate.
    #[error("HTTP Transport error: `{0}`")]
    TransportError(String),
    /// Represents a decode error.
    #[error("error decoding: `{0}`")]
    DecoderError(String),
    /// Represents an encode error.
    #[error("error encoding `{0}`")]
    EncoderError(String),
    /// Represents an unexpected response.
    #[error("invalid http response: `{0}`")]
    InvalidResponse(String),
}

impl HttpClientError {
    /// Transport failures that are worth repeating the same request for.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            HttpClientError::Timeout(_) | HttpClientError::ConnectionError(_)
        )
    }

    /// Short label used when reporting a retry.
    pub fn kind(&self) -> &'static str {
        match self {
            HttpClientError::Timeout(_) => "Timed out",
            HttpClientError::ConnectionError(_) => "Connection reset by peer",
            HttpClientError::TransportError(_) => "Transport error",
            HttpClientError::DecoderError(_) => "Decoding error",
            HttpClientError::EncoderError(_) => "Encoding error",
            HttpClientError::InvalidResponse(_) => "Invalid response",
        }
    }
}

/// A synchronous trait that defines the internal methods for HTTP clients.
pub trait HttpClient {
    /// A synchronous function sends a request. The method and url are defined inside the Request.
    fn send(&self, req: Request<Vec<u8>>) -> Result<Response<Vec<u8>>, HttpClientError>;
}

// Accept closures as HttpClient implementations
impl<F> HttpClient for F
where
    F: Fn(Request<Vec<u8>>) -> Result<Response<Vec<u8>>, HttpClientError>,
{
    fn send(&self, req: Request<Vec<u8>>) -> Result<Response<Vec<u8>>, HttpClientError> {
        self(req)
    }
}

#[cfg(test)]
pub(crate) mod tests {

    use super::*;

    use mockall::mock;
    use rstest::rstest;

    // Create a mock for the HttpClient trait using the mock! macro
    mock! {
        pub HttpClient {}

        impl HttpClient for HttpClient {
            fn send(&self, req: Request<Vec<u8>>) -> Result<Response<Vec<u8>>, HttpClientError>;
        }
    }

    /// Builds a response with the given status and json body.
    pub(crate) fn json_response(status: u16, body: serde_json::Value) -> Response<Vec<u8>> {
        Response::builder()
            .status(status)
            .body(serde_json::to_vec(&body).unwrap())
            .unwrap()
    }

    #[rstest]
    #[case(HttpClientError::Timeout("t".into()), true)]
    #[case(HttpClientError::ConnectionError("c".into()), true)]
    #[case(HttpClientError::TransportError("x".into()), false)]
    #[case(HttpClientError::DecoderError("d".into()), false)]
    #[case(HttpClientError::InvalidResponse("r".into()), false)]
    fn transient_classification(#[case] err: HttpClientError, #[case] expected: bool) {
        assert_eq!(err.is_transient(), expected);
    }

    #[test]
    fn closures_are_clients() {
        let client = |_req: Request<Vec<u8>>| Ok(json_response(204, serde_json::json!({})));
        let response = client
            .send(Request::builder().body(Vec::new()).unwrap())
            .unwrap();
        assert_eq!(response.status(), 204);
    }
}
