//! HTTP route handlers.

use std::sync::Arc;

use axum::{
    Router,
    body::Bytes,
    extract::{Path, RawQuery, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Json, Response},
    routing::get,
};

use crate::endpoint::EndpointId;
use crate::orchestrator::CallArgument;
use crate::service::{EndpointService, HealthSnapshot, SourceError, UploadError, UploadOutcome};

type FormValues = Vec<(String, String)>;

/// Form values the way Go's `Request.ParseForm` collects them: the
/// url-encoded body first, then the query string.
fn form_values(
    query: Option<&str>,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<FormValues, serde_urlencoded::de::Error> {
    let mut values: FormValues = Vec::new();

    let is_form = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/x-www-form-urlencoded"));
    if is_form && !body.is_empty() {
        values.extend(serde_urlencoded::from_bytes::<FormValues>(body)?);
    }
    if let Some(query) = query {
        values.extend(serde_urlencoded::from_str::<FormValues>(query)?);
    }
    Ok(values)
}

fn bad_request(message: impl std::fmt::Display) -> Response {
    (StatusCode::BAD_REQUEST, message.to_string()).into_response()
}

async fn health_check(State(service): State<Arc<EndpointService>>) -> Json<HealthSnapshot> {
    Json(service.health().await)
}

async fn invoke_endpoint(
    State(service): State<Arc<EndpointService>>,
    Path((owner, package, function)): Path<(String, String, String)>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let endpoint = match EndpointId::new(owner, package, function) {
        Ok(id) => id,
        Err(e) => return bad_request(e),
    };
    let values = match form_values(query.as_deref(), &headers, &body) {
        Ok(values) => values,
        Err(e) => return bad_request(format!("invalid form data: {e}")),
    };

    match service
        .invoke(endpoint.clone(), CallArgument::Form(values))
        .await
    {
        Ok(result) => (StatusCode::OK, result).into_response(),
        Err(e) => {
            tracing::info!(target: "iota::http", %endpoint, error = %e, "Invoke failed");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

async fn read_source(
    State(service): State<Arc<EndpointService>>,
    Path((owner, package, filename)): Path<(String, String, String)>,
) -> Response {
    match service.read_source(&owner, &package, &filename).await {
        Ok(src) => (StatusCode::OK, src).into_response(),
        Err(e @ SourceError::InvalidPath(_)) => bad_request(e),
        Err(e @ SourceError::NotFound(_)) => (StatusCode::NOT_FOUND, e.to_string()).into_response(),
        Err(e @ SourceError::Read(_)) => {
            tracing::error!(target: "iota::http", error = %e, "Failed to read source");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

async fn upload_source(
    State(service): State<Arc<EndpointService>>,
    Path((owner, package, filename)): Path<(String, String, String)>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let values = match form_values(query.as_deref(), &headers, &body) {
        Ok(values) => values,
        Err(e) => return bad_request(format!("invalid form data: {e}")),
    };
    let src = values
        .into_iter()
        .find(|(k, _)| k == "src")
        .map(|(_, v)| v)
        .unwrap_or_default();

    let outcome = match service
        .upload_source(&owner, &package, &filename, &src)
        .await
    {
        Ok(outcome) => outcome,
        Err(e @ (UploadError::EmptySource | UploadError::InvalidPath(_))) => {
            return bad_request(format!("Error: {e}"));
        }
        Err(e @ UploadError::Save(_)) => {
            tracing::error!(target: "iota::http", error = %e, "Failed to save source");
            return (StatusCode::INTERNAL_SERVER_ERROR, format!("Error: {e}")).into_response();
        }
    };

    let mut report = format!("Source file {filename} saved.\n\n");
    match outcome {
        UploadOutcome::BuildFailed(e) => {
            report.push_str(&format!("Build Errors:\n{e}\n\nSource:\n{src}"));
        }
        UploadOutcome::Started { endpoint, reload } => {
            report.push_str(&format!("Build Success!\n{src}\n"));
            report.push_str(&format!(
                "Service Started: {} on port {}.",
                endpoint.id, reload.port
            ));
        }
        UploadOutcome::StartFailed { endpoint, error } => {
            report.push_str(&format!("Build Success!\n{src}\n"));
            report.push_str(&format!("Service {} failed to start: {error}", endpoint.id));
        }
    }
    (StatusCode::OK, report).into_response()
}

pub fn routes(service: Arc<EndpointService>) -> Router {
    Router::new()
        .route("/health-check", get(health_check))
        .route(
            "/{owner}/{package}/f/{function}",
            get(invoke_endpoint).post(invoke_endpoint),
        )
        .route(
            "/{owner}/{package}/{filename}/src",
            get(read_source).post(upload_source),
        )
        .with_state(service)
}
