use crate::panos::{self, QueryError};
use anyhow::{Context, Result};
use reqwest::blocking::Client;
use reqwest::Url;
use reqwest::header::HeaderValue;
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Client for the PAN-OS XML management API. One instance serves every
/// target in a batch; requests authenticate per-call with the `key`
/// query parameter.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
}

impl ApiClient {
    pub fn new(verify_tls: bool) -> Result<Self> {
        let http = Client::builder()
            .user_agent(HeaderValue::from_static("panwctl/0.1"))
            // Management interfaces ship self-signed certificates.
            .danger_accept_invalid_certs(!verify_tls)
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .context("building HTTP client")?;

        Ok(Self { http })
    }

    /// Exchange a username/password for an API key.
    pub fn keygen(&self, host: &str, user: &str, password: &str) -> Result<String, QueryError> {
        let xml = self.get(
            host,
            &[("type", "keygen"), ("user", user), ("password", password)],
        )?;
        panos::parse_api_key(&xml)
    }

    /// Run an operational command (`type=op`) and return the raw XML body.
    pub fn op(&self, host: &str, key: &str, cmd: &str) -> Result<String, QueryError> {
        self.get(host, &[("type", "op"), ("cmd", cmd), ("key", key)])
    }

    /// Show a configuration subtree by xpath (`type=config&action=show`).
    pub fn config_show(&self, host: &str, key: &str, xpath: &str) -> Result<String, QueryError> {
        self.get(
            host,
            &[
                ("type", "config"),
                ("action", "show"),
                ("xpath", xpath),
                ("key", key),
            ],
        )
    }

    fn get(&self, host: &str, params: &[(&str, &str)]) -> Result<String, QueryError> {
        let url = endpoint(host)?;
        let response = self
            .http
            .get(url)
            .query(params)
            .send()
            .map_err(|e| QueryError::Network(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .map_err(|e| QueryError::Network(e.to_string()))?;

        // The API reports failures inside a well-formed body, with HTTP 200
        // or 403. A body that is not a <response> envelope (a proxy error
        // page, say) is only meaningful together with the HTTP status.
        match panos::ensure_success(&body) {
            Ok(()) => Ok(body),
            Err(QueryError::Parse(_)) if !status.is_success() => {
                Err(QueryError::Network(format!("HTTP {status}")))
            }
            Err(err) => Err(err),
        }
    }
}

// Targets are bare hostnames or management IPs; a scheme prefix (useful for
// nonstandard ports or plain-HTTP lab setups) is honored as-is.
fn endpoint(host: &str) -> Result<Url, QueryError> {
    let base = if host.contains("://") {
        host.to_string()
    } else {
        format!("https://{host}")
    };
    let url = Url::parse(&base).map_err(|e| QueryError::Network(format!("invalid host: {e}")))?;
    url.join("/api/")
        .map_err(|e| QueryError::Network(format!("invalid host: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    #[test]
    fn keygen_sends_credentials_and_parses_the_key() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/api/")
                .query_param("type", "keygen")
                .query_param("user", "svc-api")
                .query_param("password", "secret");
            then.status(200).body(
                r#"<response status="success"><result><key>LUFRPT14MW5x</key></result></response>"#,
            );
        });

        let client = ApiClient::new(true).unwrap();
        let key = client.keygen(&server.base_url(), "svc-api", "secret").unwrap();

        mock.assert();
        assert_eq!(key, "LUFRPT14MW5x");
    }

    #[test]
    fn op_passes_the_command_and_key() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/api/")
                .query_param("type", "op")
                .query_param("cmd", "<show><interface>all</interface></show>")
                .query_param("key", "abc");
            then.status(200)
                .body(r#"<response status="success"><result/></response>"#);
        });

        let client = ApiClient::new(true).unwrap();
        let body = client
            .op(
                &server.base_url(),
                "abc",
                "<show><interface>all</interface></show>",
            )
            .unwrap();

        mock.assert();
        assert!(body.contains("success"));
    }

    #[test]
    fn api_error_body_is_surfaced_not_the_http_status() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/api/");
            then.status(403).body(
                r#"<response status="error" code="403"><result><msg>Invalid credentials.</msg></result></response>"#,
            );
        });

        let client = ApiClient::new(true).unwrap();
        let err = client.keygen(&server.base_url(), "u", "p").unwrap_err();
        assert!(matches!(err, QueryError::Auth(_)));
        assert!(err.to_string().contains("Invalid credentials"));
    }

    #[test]
    fn non_xml_error_page_reports_the_http_status() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/api/");
            then.status(502).body("<html><body>Bad Gateway</body></html>");
        });

        let client = ApiClient::new(true).unwrap();
        let err = client.op(&server.base_url(), "abc", "<show/>").unwrap_err();
        assert!(matches!(err, QueryError::Network(_)));
        assert!(err.to_string().contains("502"));
    }

    #[test]
    fn bare_hostnames_default_to_https() {
        let url = endpoint("fw01.example.net").unwrap();
        assert_eq!(url.as_str(), "https://fw01.example.net/api/");

        let url = endpoint("http://127.0.0.1:8080").unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:8080/api/");
    }
}
