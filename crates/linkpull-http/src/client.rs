use std::collections::BTreeMap;
use std::time::Duration;

use linkpull_core::FetchError;
use serde_json::Value;
use tracing::debug;

use crate::retry::{AttemptError, RetryPolicy};

/// Path or query parameters.
pub type Params = BTreeMap<String, String>;

/// One authenticated GET against the API.
pub trait ApiClient {
    /// Returns the parsed body, `Value::Null` for an empty body.
    fn get(&self, path_template: &str, path_params: &Params, query: &Params)
        -> Result<Value, FetchError>;
}

impl<C: ApiClient + ?Sized> ApiClient for &C {
    fn get(
        &self,
        path_template: &str,
        path_params: &Params,
        query: &Params,
    ) -> Result<Value, FetchError> {
        (**self).get(path_template, path_params, query)
    }
}

/// Substitute `{name}` placeholders. Unresolved placeholders are rejected
/// before anything is sent.
pub fn resolve_path(template: &str, params: &Params) -> Result<String, FetchError> {
    let mut path = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        path.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let Some(end) = after.find('}') else {
            return Err(bad_template(template, "unterminated placeholder"));
        };
        let name = &after[..end];
        match params.get(name) {
            Some(value) if !value.is_empty() => path.push_str(value),
            _ => {
                return Err(bad_template(
                    template,
                    &format!("missing path parameter '{name}'"),
                ))
            }
        }
        rest = &after[end + 1..];
    }
    path.push_str(rest);
    Ok(path)
}

fn bad_template(template: &str, message: &str) -> FetchError {
    FetchError::Client {
        status: 400,
        endpoint: template.to_string(),
        body: message.to_string(),
    }
}

/// Connection settings for [`HttpClient`].
#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub base_url: String,
    pub token: String,
    pub timeout: Duration,
    pub accept_invalid_certs: bool,
    pub retry: RetryPolicy,
}

/// Blocking reqwest client for the REST API.
pub struct HttpClient {
    client: reqwest::blocking::Client,
    base_url: String,
    token: String,
    retry: RetryPolicy,
}

impl HttpClient {
    pub fn new(settings: HttpSettings) -> reqwest::Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(settings.timeout)
            .danger_accept_invalid_certs(settings.accept_invalid_certs)
            .build()?;

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            token: settings.token,
            retry: settings.retry,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn send_once(&self, url: &str, path: &str, query: &Params) -> Result<Value, AttemptError> {
        let response = self
            .client
            .get(url)
            .header("x-auth-token", &self.token)
            .header(reqwest::header::ACCEPT, "application/json")
            .query(query)
            .send()
            .map_err(classify_send_error)?;

        let status = response.status();
        // a body cut off mid-stream surfaces here
        let body = response
            .text()
            .map_err(|e| AttemptError::Transient(format!("failed to read body: {e}")))?;

        if !status.is_success() {
            return Err(AttemptError::Fatal(FetchError::from_status(
                status.as_u16(),
                path,
                &body,
            )));
        }

        if body.trim().is_empty() {
            return Ok(Value::Null);
        }

        serde_json::from_str(&body)
            .map_err(|e| AttemptError::Fatal(FetchError::malformed(path, e.to_string(), &body)))
    }
}

fn classify_send_error(err: reqwest::Error) -> AttemptError {
    if err.is_builder() {
        return AttemptError::Fatal(FetchError::Transient {
            message: err.to_string(),
            attempts: 1,
        });
    }
    AttemptError::Transient(err.to_string())
}

impl ApiClient for HttpClient {
    fn get(
        &self,
        path_template: &str,
        path_params: &Params,
        query: &Params,
    ) -> Result<Value, FetchError> {
        let path = resolve_path(path_template, path_params)?;
        let url = format!("{}{}", self.base_url, path);
        debug!(url = %url, query = ?query, "GET");

        self.retry
            .run(&path, |_attempt| self.send_once(&url, &path, query))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use linkpull_core::ErrorKind;

    fn params(pairs: &[(&str, &str)]) -> Params {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_resolve_path() {
        let path = resolve_path(
            "/courses/{courseId}/groups/{groupId}",
            &params(&[("courseId", "c1"), ("groupId", "g2")]),
        )
        .unwrap();
        assert_eq!(path, "/courses/c1/groups/g2");
        assert_eq!(resolve_path("/profile", &Params::new()).unwrap(), "/profile");
    }

    #[test]
    fn test_resolve_path_missing_param() {
        let err = resolve_path("/chats/channel/{chatId}/messages", &Params::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ClientError);
        assert!(err.to_string().contains("chatId"));
    }

    #[test]
    fn test_resolve_path_empty_param_rejected() {
        assert!(resolve_path("/x/{id}", &params(&[("id", "")])).is_err());
    }

    #[test]
    fn test_unreachable_host_is_transient() {
        let client = HttpClient::new(HttpSettings {
            base_url: "http://127.0.0.1:9".into(),
            token: "t".into(),
            timeout: Duration::from_millis(200),
            accept_invalid_certs: false,
            retry: RetryPolicy::immediate(2),
        })
        .unwrap();

        let err = client
            .get("/profile", &Params::new(), &Params::new())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TransientNetwork);
        assert!(matches!(err, FetchError::Transient { attempts: 2, .. }));
    }
}
