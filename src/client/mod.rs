use hyper::{Body, Client, Method, Request, StatusCode, Uri};
use hyper_tls::HttpsConnector;
use std::time::Instant;
use url::Url;

pub type HttpsClient = Client<HttpsConnector<hyper::client::HttpConnector>>;

pub fn build_client() -> HttpsClient {
    let https = HttpsConnector::new();
    Client::builder().build::<_, Body>(https)
}

/// Issue a single GET against the target and return the status plus the
/// elapsed milliseconds. Transport failures come back as a coarse
/// description; callers treat every error variant the same way.
pub async fn send_request(
    client: &HttpsClient,
    target: &str,
) -> Result<(StatusCode, u128), (String, u128)> {
    let url = Url::parse(target).map_err(|e| (e.to_string(), 0))?;

    let uri: Uri = url
        .as_str()
        .parse::<Uri>()
        .map_err(|e| (e.to_string(), 0))?;

    let request = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .map_err(|e| (e.to_string(), 0))?;

    let start = Instant::now();
    let response = client.request(request).await;
    let duration = start.elapsed().as_millis();

    match response {
        Ok(resp) => Ok((resp.status(), duration)),
        Err(e) => {
            let msg = if e.is_connect() {
                "Connection refused or host unreachable"
            } else if e.is_timeout() {
                "Timeout"
            } else if e.is_closed() {
                "Connection closed unexpectedly"
            } else {
                "Unknown network error"
            };
            Err((msg.to_string(), duration))
        }
    }
}
