use crate::ServiceError;
use reqwest::Response;
use url::Url;

/// Passes successful responses through; anything else becomes a
/// `BackendResponse` carrying the status and the body the service sent.
pub(crate) async fn ensure_success(
    response: Response,
    backend: &str,
) -> Result<Response, ServiceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(ServiceError::BackendResponse {
        backend: backend.to_string(),
        details: if body.trim().is_empty() {
            status.to_string()
        } else {
            format!("{status}: {}", body.trim())
        },
    })
}

/// Appends `path` to `base` without dropping any path prefix the base already has.
pub(crate) fn endpoint(base: &Url, path: &str) -> Result<Url, ServiceError> {
    let mut root = base.as_str().trim_end_matches('/').to_string();
    root.push('/');
    Ok(Url::parse(&root)?.join(path.trim_start_matches('/'))?)
}
