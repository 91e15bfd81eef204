//! Device gateway: the narrow interface the engine uses to read and patch
//! the firewall configuration, and its EdgeOS HTTP implementation.

use async_trait::async_trait;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::redirect::Policy;
use reqwest::{Client, RequestBuilder, StatusCode, Url};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

#[cfg(test)]
use mockall::automock;

use crate::address_set::AddressSet;
use crate::config::SecureString;
use crate::error::BouncerError;
use crate::planner::{Operation, UpdatePayload};

/// Location of the address groups inside the device's configuration document
pub const ADDRESS_GROUP_PATH: [&str; 4] = ["GET", "firewall", "group", "address-group"];

const CSRF_COOKIE: &str = "X-CSRF-TOKEN";
const CSRF_HEADER: &str = "X-CSRF-TOKEN";

/// Session cookies set by an accepted login (EdgeOS 1.x, then 2.x)
const SESSION_COOKIES: [&str; 2] = ["PHPSESSID", "beaker.session.id"];

/// Trait for the firewall device
#[cfg_attr(test, automock)]
#[async_trait]
pub trait DeviceGateway: Send + Sync {
    /// Establish an authenticated session
    async fn login(&self) -> Result<(), BouncerError>;

    /// Fetch the full configuration document
    async fn get(&self) -> Result<Value, BouncerError>;

    /// Add the payload's addresses to the group
    async fn set(&self, payload: &UpdatePayload) -> Result<(), BouncerError>;

    /// Remove the payload's addresses (or the whole field) from the group
    async fn delete(&self, payload: &UpdatePayload) -> Result<(), BouncerError>;
}

/// Submit one payload through the endpoint matching its operation.
pub async fn apply_payload<G>(gateway: &G, payload: &UpdatePayload) -> Result<(), BouncerError>
where
    G: DeviceGateway + ?Sized,
{
    match payload.operation {
        Operation::Set => gateway.set(payload).await,
        Operation::Delete => gateway.delete(payload).await,
    }
}

/// Extract the raw members of address group `name` from a configuration
/// document.
///
/// A missing path segment or group is a [`BouncerError::Configuration`].
/// A group without an `address` field is empty.
pub fn address_group(document: &Value, name: &str) -> Result<Vec<String>, BouncerError> {
    let mut node = document;
    for segment in ADDRESS_GROUP_PATH {
        node = node.get(segment).filter(|v| v.is_object()).ok_or_else(|| {
            BouncerError::Configuration(format!(
                "path {} not found in device configuration (missing '{}')",
                ADDRESS_GROUP_PATH.join("."),
                segment
            ))
        })?;
    }

    let group = node.get(name).ok_or_else(|| {
        BouncerError::Configuration(format!("address group '{}' not found on device", name))
    })?;

    match group.get("address") {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::String(single)) => Ok(vec![single.clone()]),
        Some(Value::Array(items)) => Ok(items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect()),
        Some(other) => Err(BouncerError::Configuration(format!(
            "address group '{}' has unexpected address field: {}",
            name, other
        ))),
    }
}

/// Fetch the device configuration and return group `name` as an
/// [`AddressSet`]. Entries that are not plain IPv4 addresses are skipped.
pub async fn fetch_group<G>(gateway: &G, name: &str) -> Result<AddressSet, BouncerError>
where
    G: DeviceGateway + ?Sized,
{
    let document = gateway.get().await?;
    let raw = address_group(&document, name)?;
    let (set, skipped) = AddressSet::parse_lossy(&raw);
    if !skipped.is_empty() {
        warn!(
            "Group {} holds {} non-IPv4 entries that will be left untouched: {:?}",
            name,
            skipped.len(),
            skipped
        );
    }
    Ok(set)
}

/// Treat `false`, `0` and `"0"` as a failure flag, as EdgeOS firmware
/// versions disagree on the encoding
fn is_false(v: &Value) -> bool {
    match v {
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_i64() == Some(0),
        Value::String(s) => s == "0" || s.eq_ignore_ascii_case("false"),
        _ => false,
    }
}

/// Check an API response body for a reported failure
pub fn check_response(section: &str, body: &Value) -> Result<(), BouncerError> {
    let describe = |node: &Value| -> String {
        node.get("error")
            .or_else(|| node.get("failure"))
            .map(|e| match e {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .unwrap_or_else(|| "no error detail".to_string())
    };

    if let Some(inner) = body.get(section) {
        if inner.get("success").map(is_false).unwrap_or(false) {
            return Err(BouncerError::Device(format!(
                "{} rejected: {}",
                section,
                describe(inner)
            )));
        }
    }

    if body.get("success").map(is_false).unwrap_or(false) {
        return Err(BouncerError::Device(format!(
            "{} rejected: {}",
            section,
            describe(body)
        )));
    }

    Ok(())
}

/// Find cookie `name` in a `Cookie` header value
fn parse_cookie(header: &str, name: &str) -> Option<String> {
    header.split(';').find_map(|pair| {
        let (k, v) = pair.trim().split_once('=')?;
        (k == name).then(|| v.to_string())
    })
}

/// HTTP client for the EdgeOS web API
pub struct EdgeOsClient {
    client: Client,
    jar: Arc<Jar>,
    base: Url,
    user: String,
    password: SecureString,
    csrf: Mutex<Option<String>>,
}

impl EdgeOsClient {
    pub fn new(
        url: &str,
        user: &str,
        password: SecureString,
        accept_invalid_certs: bool,
        timeout: Duration,
    ) -> Result<Self, BouncerError> {
        let base = Url::parse(url)
            .map_err(|e| BouncerError::Configuration(format!("invalid device URL {}: {}", url, e)))?;
        let jar = Arc::new(Jar::default());
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(format!("edgeos-bouncer/{}", env!("CARGO_PKG_VERSION")))
            .cookie_provider(jar.clone())
            // An accepted login answers with a redirect; the login page itself is a 200
            .redirect(Policy::none())
            .danger_accept_invalid_certs(accept_invalid_certs)
            .build()
            .map_err(|e| BouncerError::Configuration(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            jar,
            base,
            user: user.to_string(),
            password,
            csrf: Mutex::new(None),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, BouncerError> {
        self.base
            .join(path)
            .map_err(|e| BouncerError::Configuration(format!("invalid endpoint {}: {}", path, e)))
    }

    fn csrf_token(&self) -> Option<String> {
        self.csrf.lock().ok().and_then(|guard| guard.clone())
    }

    fn with_csrf(&self, request: RequestBuilder) -> RequestBuilder {
        match self.csrf_token() {
            Some(token) => request.header(CSRF_HEADER, token),
            None => request,
        }
    }

    /// Send an API request, logging in again once if the session expired
    async fn send_json<F>(&self, build: F) -> Result<Value, BouncerError>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut relogged = false;
        loop {
            let response = self.with_csrf(build()).send().await?;
            let status = response.status();

            let expired = matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN)
                || status.is_redirection();
            if expired && !relogged {
                debug!("Device session rejected ({}), logging in again", status);
                relogged = true;
                self.login().await?;
                continue;
            }

            if !status.is_success() {
                return Err(BouncerError::Network(format!("HTTP {}", status)));
            }

            return response
                .json::<Value>()
                .await
                .map_err(|e| BouncerError::Device(format!("invalid JSON response: {}", e)));
        }
    }

    async fn post_update(&self, payload: &UpdatePayload) -> Result<(), BouncerError> {
        let op = payload.operation.endpoint();
        let url = self.endpoint(&format!("api/edge/{}.json", op))?;
        let body = json!({ "data": payload.to_document() });

        debug!(
            "Submitting {} of {} addresses to group {}",
            op,
            payload.len(),
            payload.group
        );
        let response = self
            .send_json(|| self.client.post(url.clone()).json(&body))
            .await?;
        check_response(&op.to_ascii_uppercase(), &response)
    }
}

#[async_trait]
impl DeviceGateway for EdgeOsClient {
    async fn login(&self) -> Result<(), BouncerError> {
        let form = [
            ("username", self.user.as_str()),
            ("password", self.password.as_str()),
        ];
        let response = self
            .client
            .post(self.base.clone())
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_redirection() {
            if status.is_success() {
                // EdgeOS serves the login form again when it rejects the credentials
                return Err(BouncerError::Configuration(format!(
                    "login rejected for user {}: check device.user and device.password",
                    self.user
                )));
            }
            return Err(BouncerError::Network(format!("login failed: HTTP {}", status)));
        }

        let cookies = self
            .jar
            .cookies(&self.base)
            .and_then(|h| h.to_str().ok().map(str::to_string))
            .unwrap_or_default();

        if !SESSION_COOKIES
            .iter()
            .any(|name| parse_cookie(&cookies, name).is_some())
        {
            return Err(BouncerError::Device(
                "login accepted but no session cookie was set".to_string(),
            ));
        }

        let token = parse_cookie(&cookies, CSRF_COOKIE).ok_or_else(|| {
            BouncerError::Device("login accepted but no CSRF token was set".to_string())
        })?;

        if let Ok(mut guard) = self.csrf.lock() {
            *guard = Some(token);
        }
        info!("Logged in to {}", self.base);
        Ok(())
    }

    async fn get(&self) -> Result<Value, BouncerError> {
        let url = self.endpoint("api/edge/get.json")?;
        let response = self.send_json(|| self.client.get(url.clone())).await?;
        check_response("GET", &response)?;
        Ok(response)
    }

    async fn set(&self, payload: &UpdatePayload) -> Result<(), BouncerError> {
        self.post_update(payload).await
    }

    async fn delete(&self, payload: &UpdatePayload) -> Result<(), BouncerError> {
        self.post_update(payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn document(groups: Value) -> Value {
        json!({
            "GET": { "firewall": { "group": { "address-group": groups } } },
            "success": true
        })
    }

    #[test]
    fn test_address_group_list() {
        let doc = document(json!({
            "crowdsec": { "address": ["10.0.0.2", "10.0.0.1"] },
            "other": { "address": ["1.1.1.1"] }
        }));
        let members = address_group(&doc, "crowdsec").unwrap();
        assert_eq!(members, vec!["10.0.0.2", "10.0.0.1"]);
    }

    #[test]
    fn test_address_group_single_string() {
        let doc = document(json!({ "g": { "address": "10.0.0.1" } }));
        assert_eq!(address_group(&doc, "g").unwrap(), vec!["10.0.0.1"]);
    }

    #[test]
    fn test_address_group_without_address_is_empty() {
        let doc = document(json!({ "g": { "description": "bans" } }));
        assert!(address_group(&doc, "g").unwrap().is_empty());

        let doc = document(json!({ "g": { "address": null } }));
        assert!(address_group(&doc, "g").unwrap().is_empty());
    }

    #[test]
    fn test_address_group_missing_group_is_configuration_error() {
        let doc = document(json!({ "other": {} }));
        let err = address_group(&doc, "crowdsec").unwrap_err();
        assert!(matches!(err, BouncerError::Configuration(_)));
        assert!(err.to_string().contains("crowdsec"));
    }

    #[test]
    fn test_address_group_missing_path_is_configuration_error() {
        let doc = json!({ "GET": { "firewall": {} } });
        let err = address_group(&doc, "crowdsec").unwrap_err();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("'group'"));

        let doc = json!({ "GET": { "firewall": { "group": "oops" } } });
        assert!(address_group(&doc, "crowdsec").is_err());
    }

    #[test]
    fn test_address_group_unexpected_shape() {
        let doc = document(json!({ "g": { "address": 42 } }));
        assert!(matches!(
            address_group(&doc, "g"),
            Err(BouncerError::Configuration(_))
        ));
    }

    #[test]
    fn test_check_response() {
        assert!(check_response("SET", &json!({"SET": {"success": "1"}, "success": true})).is_ok());
        assert!(check_response("SET", &json!({"success": true})).is_ok());

        let err = check_response(
            "SET",
            &json!({"SET": {"success": "0", "error": {"firewall": "bad address"}}, "success": true}),
        )
        .unwrap_err();
        assert!(matches!(err, BouncerError::Device(_)));
        assert!(err.to_string().contains("bad address"));

        let err = check_response("DELETE", &json!({"success": false, "error": "busy"})).unwrap_err();
        assert!(err.to_string().contains("busy"));
    }

    #[test]
    fn test_parse_cookie() {
        let header = "PHPSESSID=abc123; X-CSRF-TOKEN=tok-456";
        assert_eq!(parse_cookie(header, "X-CSRF-TOKEN").as_deref(), Some("tok-456"));
        assert_eq!(parse_cookie(header, "PHPSESSID").as_deref(), Some("abc123"));
        assert_eq!(parse_cookie(header, "missing"), None);
        assert_eq!(parse_cookie("", "X-CSRF-TOKEN"), None);
    }

    #[test]
    fn test_client_rejects_bad_url() {
        let result = EdgeOsClient::new(
            "not a url",
            "ubnt",
            SecureString::from("pw"),
            false,
            Duration::from_secs(5),
        );
        assert!(matches!(result, Err(BouncerError::Configuration(_))));
    }

    #[test]
    fn test_client_builds() {
        let client = EdgeOsClient::new(
            "https://192.168.1.1",
            "ubnt",
            SecureString::from("pw"),
            true,
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(
            client.endpoint("api/edge/get.json").unwrap().as_str(),
            "https://192.168.1.1/api/edge/get.json"
        );
        assert!(client.csrf_token().is_none());
    }

    #[tokio::test]
    async fn test_fetch_group_with_mock() {
        let mut mock = MockDeviceGateway::new();
        mock.expect_get().times(1).returning(|| {
            Ok(document(json!({
                "crowdsec": { "address": ["10.0.0.2", "10.0.0.0/24", "10.0.0.1"] }
            })))
        });

        let set = fetch_group(&mock, "crowdsec").await.unwrap();
        assert_eq!(
            set.as_slice(),
            &[Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(10, 0, 0, 2)]
        );
    }

    #[tokio::test]
    async fn test_fetch_group_propagates_network_error() {
        let mut mock = MockDeviceGateway::new();
        mock.expect_get()
            .returning(|| Err(BouncerError::Network("timeout".into())));
        let err = fetch_group(&mock, "crowdsec").await.unwrap_err();
        assert!(matches!(err, BouncerError::Network(_)));
    }

    #[tokio::test]
    async fn test_apply_payload_dispatches_by_operation() {
        let mut mock = MockDeviceGateway::new();
        mock.expect_delete()
            .withf(|p| p.operation == Operation::Delete && p.addresses.is_none())
            .times(1)
            .returning(|_| Ok(()));
        mock.expect_set().times(0);

        let payload = UpdatePayload {
            group: "g".into(),
            operation: Operation::Delete,
            addresses: None,
        };
        apply_payload(&mock, &payload).await.unwrap();
    }
}
