use crate::http::config::HttpConfig;
use crate::http_client::{HttpClient as AzureHttpClient, HttpClientError as AzureHttpClientError};
use http::Response as HttpResponse;
use http::{Request, Response};
use reqwest::{NoProxy, Proxy};
use reqwest::blocking::{Client, Response as BlockingResponse};

/// Blocking reqwest client used for every call to the Azure endpoints.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    pub fn new(config: HttpConfig) -> Result<Self, HttpBuildError> {
        let mut builder = Client::builder()
            .use_rustls_tls()
            .tls_built_in_native_certs(true)
            .timeout(config.timeout)
            .connect_timeout(config.conn_timeout);

        if let Some(url) = config.proxy.url() {
            let proxy = Proxy::all(url.as_str())
                .map_err(|err| HttpBuildError::InvalidProxy(err.to_string()))?
                .no_proxy(NoProxy::from_string(&config.proxy.no_proxy()));
            builder = builder.proxy(proxy);
        }

        let client = builder
            .build()
            .map_err(|err| HttpBuildError::ClientBuilder(err.to_string()))?;

        Ok(Self { client })
    }

    fn send(&self, request: Request<Vec<u8>>) -> Result<HttpResponse<Vec<u8>>, HttpResponseError> {
        let req = self
            .client
            .request(request.method().clone(), request.uri().to_string().as_str())
            .headers(request.headers().clone())
            .body(request.body().to_vec());

        let res = req.send().map_err(HttpResponseError::from)?;

        try_build_response(res)
    }
}

fn try_build_response(res: BlockingResponse) -> Result<HttpResponse<Vec<u8>>, HttpResponseError> {
    let status = res.status();
    let version = res.version();
    let headers = res.headers().clone();

    let body: Vec<u8> = res.bytes().map_err(body_read_error)?.into();

    let mut response_builder = http::Response::builder().status(status).version(version);
    if let Some(response_headers) = response_builder.headers_mut() {
        response_headers.extend(headers);
    }

    let response = response_builder
        .body(body)
        .map_err(|err| HttpResponseError::BuildingResponse(err.to_string()))?;

    Ok(response)
}

fn body_read_error(err: reqwest::Error) -> HttpResponseError {
    if err.is_timeout() {
        HttpResponseError::Timeout(err.to_string())
    } else {
        HttpResponseError::ReadingResponse(err.to_string())
    }
}

impl AzureHttpClient for HttpClient {
    fn send(&self, req: Request<Vec<u8>>) -> Result<Response<Vec<u8>>, AzureHttpClientError> {
        let response = self.send(req)?;

        Ok(response)
    }
}

impl From<reqwest::Error> for HttpResponseError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            HttpResponseError::Timeout(err.to_string())
        } else if err.is_connect() || err.is_request() {
            HttpResponseError::Connection(err.to_string())
        } else {
            HttpResponseError::TransportError(err.to_string())
        }
    }
}

impl From<HttpResponseError> for AzureHttpClientError {
    fn from(err: HttpResponseError) -> Self {
        match err {
            HttpResponseError::Timeout(msg) => AzureHttpClientError::Timeout(msg),
            HttpResponseError::Connection(msg) => AzureHttpClientError::ConnectionError(msg),
            HttpResponseError::TransportError(msg) => AzureHttpClientError::TransportError(msg),
            HttpResponseError::BuildingResponse(msg) | HttpResponseError::ReadingResponse(msg) => {
                AzureHttpClientError::InvalidResponse(msg)
            }
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum HttpBuildError {
    #[error("could not build the http client: {0}")]
    ClientBuilder(String),
    #[error("invalid proxy configuration: {0}")]
    InvalidProxy(String),
}

#[derive(thiserror::Error, Debug)]
enum HttpResponseError {
    #[error("could read response body: {0}")]
    ReadingResponse(String),
    #[error("could build response: {0}")]
    BuildingResponse(String),
    #[error("request timed out: `{0}`")]
    Timeout(String),
    #[error("connection failure: `{0}`")]
    Connection(String),
    #[error("http transport error: `{0}`")]
    TransportError(String),
}
