//! HTTP backend against a PostgREST-style API.
//!
//! Resource tables live under `/rest/v1/{resource}` with equality filters as
//! `column=eq.value` query parameters, authentication under
//! `/auth/v1/token` and `/auth/v1/logout`, profile rows in the `profiles`
//! table, and blob uploads under `/storage/v1/object`.
//!
//! Error mapping is by status and body: row-level policy rejections arrive
//! as 401/403 or a body mentioning row-level security and become
//! [`PermissionDenied`](crate::error::ErrorCode::PermissionDenied);
//! duplicate-key and foreign-key rejections become
//! [`ConstraintViolation`](crate::error::ErrorCode::ConstraintViolation).

use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::config::BackendConfig;
use crate::error::{ErrorCode, FieldgateError, Result};
use crate::gateway::query::render_filter_value;
use crate::gateway::{QueryOptions, Record};

use super::{FileStore, IdentityProvider, Profile, ProfileStore, ResourceStore, SubjectId};

/// Backend client over a PostgREST-style HTTP API.
pub struct RestBackend {
    http: reqwest::Client,
    base_url: String,
    anon_key: String,
    /// Bearer token of the signed-in subject; the anon key is used until
    /// sign-in succeeds.
    access_token: RwLock<Option<String>>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    user: TokenUser,
}

#[derive(Deserialize)]
struct TokenUser {
    id: String,
}

impl RestBackend {
    pub fn new(config: &BackendConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            http,
            base_url: config.url.trim_end_matches('/').to_string(),
            anon_key: config.anon_key.clone(),
            access_token: RwLock::new(None),
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let bearer = self
            .access_token
            .read()
            .clone()
            .unwrap_or_else(|| self.anon_key.clone());
        self.http
            .request(method, format!("{}{}", self.base_url, path))
            .header("apikey", &self.anon_key)
            .bearer_auth(bearer)
    }

    /// Pass a successful response through; turn anything else into a typed
    /// error from its status and body.
    async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(map_error_response(status, &body))
    }
}

/// Classify a non-success response.
fn map_error_response(status: StatusCode, body: &str) -> FieldgateError {
    if body.contains("row-level security") {
        return FieldgateError::permission_denied().into_internal(body);
    }
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            FieldgateError::permission_denied().into_internal(body)
        }
        StatusCode::CONFLICT => FieldgateError::constraint_violation(body),
        _ if body.contains("23505")
            || body.contains("23503")
            || body.contains("duplicate key")
            || body.contains("violates foreign key") =>
        {
            FieldgateError::constraint_violation(body)
        }
        StatusCode::NOT_FOUND => FieldgateError::with_internal(
            ErrorCode::RecordNotFound,
            "The requested record does not exist",
            body,
        ),
        _ => FieldgateError::with_internal(
            ErrorCode::BackendError,
            "The server reported an error",
            format!("{}: {}", status, body),
        ),
    }
}

impl FieldgateError {
    fn into_internal(self, body: &str) -> Self {
        if body.is_empty() {
            self
        } else {
            FieldgateError::with_internal(self.code(), self.user_message().to_string(), body)
        }
    }
}

fn query_pairs(options: &QueryOptions) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    pairs.push((
        "select".to_string(),
        options.select.clone().unwrap_or_else(|| "*".to_string()),
    ));
    for (column, value) in options.effective_filters() {
        pairs.push((
            column.to_string(),
            format!("eq.{}", render_filter_value(value)),
        ));
    }
    if let Some(order) = &options.order_by {
        pairs.push((
            "order".to_string(),
            format!(
                "{}.{}",
                order.column,
                if order.ascending { "asc" } else { "desc" }
            ),
        ));
    }
    if let Some(limit) = options.limit {
        pairs.push(("limit".to_string(), limit.to_string()));
    }
    pairs
}

#[async_trait]
impl ResourceStore for RestBackend {
    #[instrument(skip(self, options), fields(resource = resource))]
    async fn list(&self, resource: &str, options: &QueryOptions) -> Result<Vec<Record>> {
        let response = self
            .request(Method::GET, &format!("/rest/v1/{}", resource))
            .query(&query_pairs(options))
            .send()
            .await?;
        let rows: Vec<Record> = Self::check(response).await?.json().await?;
        debug!(rows = rows.len(), "Listed resource");
        Ok(rows)
    }

    #[instrument(skip(self, fields), fields(resource = resource))]
    async fn insert(&self, resource: &str, fields: Record) -> Result<Record> {
        let response = self
            .request(Method::POST, &format!("/rest/v1/{}", resource))
            .header("Prefer", "return=representation")
            .json(&[Value::Object(fields)])
            .send()
            .await?;
        let mut rows: Vec<Record> = Self::check(response).await?.json().await?;
        rows.pop().ok_or_else(|| {
            FieldgateError::with_internal(
                ErrorCode::BackendError,
                "The server reported an error",
                "insert returned no representation",
            )
        })
    }

    #[instrument(skip(self, fields), fields(resource = resource, id = id))]
    async fn update(&self, resource: &str, id: &str, fields: Record) -> Result<Record> {
        let response = self
            .request(Method::PATCH, &format!("/rest/v1/{}", resource))
            .query(&[("id", format!("eq.{}", id))])
            .header("Prefer", "return=representation")
            .json(&Value::Object(fields))
            .send()
            .await?;
        let mut rows: Vec<Record> = Self::check(response).await?.json().await?;
        rows.pop().ok_or_else(|| {
            FieldgateError::new(
                ErrorCode::RecordNotFound,
                "The requested record does not exist",
            )
        })
    }

    #[instrument(skip(self), fields(resource = resource, id = id))]
    async fn delete(&self, resource: &str, id: &str) -> Result<()> {
        let response = self
            .request(Method::DELETE, &format!("/rest/v1/{}", resource))
            .query(&[("id", format!("eq.{}", id))])
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }
}

#[async_trait]
impl IdentityProvider for RestBackend {
    #[instrument(skip(self, password), fields(email = email))]
    async fn sign_in(&self, email: &str, password: &str) -> Result<SubjectId> {
        let response = self
            .request(Method::POST, "/auth/v1/token")
            .query(&[("grant_type", "password")])
            .json(&serde_json::json!({ "email": email, "password": password }))
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::BAD_REQUEST || status == StatusCode::UNAUTHORIZED {
            let body = response.text().await.unwrap_or_default();
            return Err(FieldgateError::authentication(body));
        }
        let token: TokenResponse = Self::check(response).await?.json().await?;
        *self.access_token.write() = Some(token.access_token);
        Ok(SubjectId::new(token.user.id))
    }

    async fn sign_out(&self) -> Result<()> {
        // Drop the local token first so the client is signed out even if the
        // revocation call fails.
        let token = self.access_token.write().take();
        if token.is_none() {
            return Ok(());
        }
        let response = self.request(Method::POST, "/auth/v1/logout").send().await?;
        Self::check(response).await?;
        Ok(())
    }
}

#[async_trait]
impl ProfileStore for RestBackend {
    async fn get_by_id(&self, subject_id: &str) -> Result<Option<Profile>> {
        let response = self
            .request(Method::GET, "/rest/v1/profiles")
            .query(&[
                ("select", "*".to_string()),
                ("id", format!("eq.{}", subject_id)),
                ("limit", "1".to_string()),
            ])
            .send()
            .await?;
        let mut rows: Vec<Profile> = Self::check(response).await?.json().await?;
        Ok(rows.pop())
    }
}

#[async_trait]
impl FileStore for RestBackend {
    #[instrument(skip(self, bytes), fields(bucket = bucket, key = key, size = bytes.len()))]
    async fn upload(&self, bucket: &str, key: &str, bytes: &[u8]) -> Result<String> {
        let response = self
            .request(
                Method::POST,
                &format!("/storage/v1/object/{}/{}", bucket, key),
            )
            .header("Content-Type", "application/octet-stream")
            .body(bytes.to_vec())
            .send()
            .await?;
        Self::check(response).await?;
        Ok(format!(
            "{}/storage/v1/object/public/{}/{}",
            self.base_url, bucket, key
        ))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_error_mapping_by_status_and_body() {
        let rls = map_error_response(
            StatusCode::BAD_REQUEST,
            r#"{"message":"new row violates row-level security policy for table \"orders\""}"#,
        );
        assert_eq!(rls.code(), ErrorCode::PermissionDenied);
        assert_eq!(rls.user_message(), "Permission denied by security policy");

        assert_eq!(
            map_error_response(StatusCode::FORBIDDEN, "").code(),
            ErrorCode::PermissionDenied
        );
        assert_eq!(
            map_error_response(StatusCode::CONFLICT, "").code(),
            ErrorCode::ConstraintViolation
        );
        assert_eq!(
            map_error_response(
                StatusCode::BAD_REQUEST,
                r#"{"code":"23505","message":"duplicate key value"}"#
            )
            .code(),
            ErrorCode::ConstraintViolation
        );
        assert_eq!(
            map_error_response(StatusCode::INTERNAL_SERVER_ERROR, "boom").code(),
            ErrorCode::BackendError
        );
    }

    #[test]
    fn test_query_pairs_render_postgrest_syntax() {
        let opts = QueryOptions::new()
            .filter("status", json!("pending"))
            .filter("region", json!(""))
            .order_by("created_at", false)
            .limit(20);

        let pairs = query_pairs(&opts);
        assert!(pairs.contains(&("select".to_string(), "*".to_string())));
        assert!(pairs.contains(&("status".to_string(), "eq.pending".to_string())));
        assert!(pairs.contains(&("order".to_string(), "created_at.desc".to_string())));
        assert!(pairs.contains(&("limit".to_string(), "20".to_string())));
        assert!(
            !pairs.iter().any(|(k, _)| k == "region"),
            "empty filter values never reach the wire"
        );
    }
}
