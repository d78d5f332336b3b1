//! Delegated credential issuance
//!
//! POST /auth/app-token returns a short-lived GitHub App assertion. The
//! endpoint is guarded by the API key (`x-api-key` header or `apiKey` query).

use bytes::Bytes;
use http_body_util::Full;
use hyper::{HeaderMap, Response, StatusCode};
use serde::Serialize;

use super::{error_response, json_response};
use crate::auth::app_token::AppCredential;
use crate::auth::{InboundRequest, API_KEY_LABEL};
use crate::server::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TokenResponse<'a> {
    success: bool,
    #[serde(flatten)]
    credential: AppCredential,
    request_id: &'a str,
}

/// Handle POST /auth/app-token
pub async fn issue_app_token(
    state: &AppState,
    headers: &HeaderMap,
    query: Option<&str>,
    request_id: &str,
) -> Response<Full<Bytes>> {
    let authenticator = state.ingress.authenticator();
    let request = InboundRequest {
        headers,
        query,
        body: &[],
    };

    if let Err(e) = authenticator
        .verify(API_KEY_LABEL, &state.api_key, &request)
        .await
    {
        return error_response(e.status_code(), &e.to_string(), request_id);
    }

    match authenticator.issue_app_credential().await {
        Ok(credential) => json_response(
            StatusCode::OK,
            &TokenResponse {
                success: true,
                credential,
                request_id,
            },
        ),
        // The caller only learns that the credential is unavailable
        Err(e) => error_response(e.status_code(), "Credential unavailable", request_id),
    }
}
