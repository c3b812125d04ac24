//! Error types for the HTTP layer.

/// Errors returned by [`HttpApi`](crate::HttpApi) requests.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The request never got a response (connection refused, DNS, TLS).
    #[error("request to {endpoint} failed: {source}")]
    Request {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    /// The server answered with a non-success status code.
    #[error("unexpected response code {status} from {endpoint}")]
    Status { endpoint: String, status: u16 },

    /// The response body wasn't the expected JSON.
    #[error("invalid response from {endpoint}: {source}")]
    Decode {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
}
