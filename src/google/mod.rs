//! Google Drive and Sheets clients over plain HTTPS.
//!
//! * [`auth`]  : access tokens from a stored refresh token, a service-account
//!   key, or a literal token
//! * [`drive`] : [`DriveClient`], the production [`crate::StorageService`]
//! * [`sheets`]: [`SheetsClient`], the production [`crate::SheetService`]
//!
//! All clients share one `reqwest::Client` and one [`TokenProvider`].

pub mod auth;
pub mod drive;
pub mod sheets;

pub use auth::{AuthorizedUserToken, ServiceAccountToken, StaticToken, TokenProvider, SCOPES};
pub use drive::DriveClient;
pub use sheets::SheetsClient;

use crate::error::RemoteError;
use reqwest::{Response, Url};
use serde::de::DeserializeOwned;

/// Build the shared HTTP client.
pub fn http_client() -> Result<reqwest::Client, crate::PipelineError> {
    reqwest::Client::builder()
        .user_agent(concat!("pdf2sheet/", env!("CARGO_PKG_VERSION")))
        .timeout(std::time::Duration::from_secs(120))
        .build()
        .map_err(|e| crate::PipelineError::Internal(format!("HTTP client: {e}")))
}

/// Append percent-encoded path segments to `base`.
pub(crate) fn endpoint(
    service: &'static str,
    base: &str,
    segments: &[&str],
) -> Result<Url, RemoteError> {
    let mut url = Url::parse(base).map_err(|e| RemoteError::Decode {
        service,
        detail: format!("invalid base URL {base}: {e}"),
    })?;
    url.path_segments_mut()
        .map_err(|_| RemoteError::Decode {
            service,
            detail: format!("base URL cannot take a path: {base}"),
        })?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// Pass a success response through; turn anything else into a [`RemoteError`].
pub(crate) async fn expect_success(
    service: &'static str,
    response: Response,
) -> Result<Response, RemoteError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(RemoteError::from_status(service, status.as_u16(), body))
}

/// Check the status, then decode the JSON body.
pub(crate) async fn json_body<T: DeserializeOwned>(
    service: &'static str,
    response: Response,
) -> Result<T, RemoteError> {
    expect_success(service, response)
        .await?
        .json::<T>()
        .await
        .map_err(|e| RemoteError::Decode {
            service,
            detail: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_encodes_segments() {
        let base = "https://sheets.googleapis.com/v4/spreadsheets/";
        let url = endpoint("sheets", base, &["abc", "values", "'my sheet'!A:A"]).unwrap();
        assert_eq!(
            url.as_str(),
            "https://sheets.googleapis.com/v4/spreadsheets/abc/values/'my%20sheet'!A:A"
        );
    }

    #[test]
    fn endpoint_rejects_opaque_base() {
        assert!(endpoint("drive", "mailto:someone@example.com", &["x"]).is_err());
        assert!(endpoint("drive", "not a url", &["x"]).is_err());
    }
}
