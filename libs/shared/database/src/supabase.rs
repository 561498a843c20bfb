use reqwest::{
    Client,
    header::{HeaderMap, HeaderValue, CONTENT_TYPE, AUTHORIZATION},
    Method, StatusCode,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, error};

use shared_config::AppConfig;

use crate::error::DatabaseError;

/// SQLSTATE reported by PostgREST when a unique index rejects a write.
const UNIQUE_VIOLATION: &str = "23505";
/// SQLSTATE for a write referencing a row that does not exist.
const FOREIGN_KEY_VIOLATION: &str = "23503";

pub struct SupabaseClient {
    client: Client,
    base_url: String,
    anon_key: String,
}

impl SupabaseClient {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.supabase_url.trim_end_matches('/').to_string(),
            anon_key: config.supabase_anon_key.clone(),
        }
    }

    fn get_headers(&self, auth_token: Option<&str>) -> Result<HeaderMap, DatabaseError> {
        let mut headers = HeaderMap::new();

        headers.insert("apikey", header_value(&self.anon_key)?);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let bearer = auth_token.unwrap_or(&self.anon_key);
        headers.insert(AUTHORIZATION, header_value(&format!("Bearer {}", bearer))?);

        Ok(headers)
    }

    pub async fn request<T>(
        &self,
        method: Method,
        path: &str,
        auth_token: Option<&str>,
        body: Option<Value>,
    ) -> Result<T, DatabaseError>
    where
        T: DeserializeOwned,
    {
        self.request_with_headers(method, path, auth_token, body, None).await
    }

    pub async fn request_with_headers<T>(
        &self,
        method: Method,
        path: &str,
        auth_token: Option<&str>,
        body: Option<Value>,
        extra_headers: Option<HeaderMap>,
    ) -> Result<T, DatabaseError>
    where
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        debug!("Making {} request to {}", method, url);

        let mut headers = self.get_headers(auth_token)?;
        if let Some(extra) = extra_headers {
            headers.extend(extra);
        }

        let mut req = self.client.request(method, &url).headers(headers);

        if let Some(body_data) = body {
            req = req.json(&body_data);
        }

        let response = req.send().await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(classify_failure(status, error_text));
        }

        let bytes = response.bytes().await?;
        serde_json::from_slice::<T>(&bytes).map_err(|e| DatabaseError::Decode(e.to_string()))
    }

    /// Headers asking PostgREST to echo the written rows back.
    pub fn return_representation() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("Prefer", HeaderValue::from_static("return=representation"));
        headers
    }
}

fn header_value(raw: &str) -> Result<HeaderValue, DatabaseError> {
    HeaderValue::from_str(raw).map_err(|e| DatabaseError::Configuration(e.to_string()))
}

fn classify_failure(status: StatusCode, error_text: String) -> DatabaseError {
    let code = serde_json::from_str::<Value>(&error_text)
        .ok()
        .and_then(|v| v.get("code").and_then(Value::as_str).map(str::to_string));

    // PostgREST answers 409 for several constraint classes; the SQLSTATE decides.
    match code.as_deref() {
        Some(UNIQUE_VIOLATION) => {
            debug!("Unique constraint rejected write: {}", error_text);
            return DatabaseError::UniqueViolation(error_text);
        }
        Some(FOREIGN_KEY_VIOLATION) => {
            debug!("Foreign key constraint rejected write: {}", error_text);
            return DatabaseError::ForeignKeyViolation(error_text);
        }
        None if status == StatusCode::CONFLICT => {
            debug!("Conflict without SQLSTATE: {}", error_text);
            return DatabaseError::UniqueViolation(error_text);
        }
        _ => {}
    }

    error!("API error ({}): {}", status, error_text);

    match status.as_u16() {
        401 | 403 => DatabaseError::Auth(error_text),
        404 => DatabaseError::NotFound(error_text),
        _ => DatabaseError::Api {
            status: status.as_u16(),
            message: error_text,
        },
    }
}
