//! Signed HTTP transport shared by the service and storage clients.

use coldcast_core::{Error, Result};
use regex::Regex;
use reqwest::{Client, Method, Response, Url};
use tracing::debug;

use crate::sigv4::{self, Credentials, SignableRequest};

pub(crate) struct SignedClient {
    http: Client,
    credentials: Credentials,
    region: String,
    service: &'static str,
}

impl SignedClient {
    pub(crate) fn new(credentials: Credentials, region: &str, service: &'static str) -> Self {
        Self {
            http: Client::new(),
            credentials,
            region: region.to_string(),
            service,
        }
    }

    pub(crate) async fn send(
        &self,
        method: Method,
        url: Url,
        headers: Vec<(String, String)>,
        body: Vec<u8>,
    ) -> Result<Response> {
        let host = match (url.host_str(), url.port()) {
            (Some(h), Some(p)) => format!("{}:{}", h, p),
            (Some(h), None) => h.to_string(),
            (None, _) => return Err(Error::Config(format!("endpoint has no host: {}", url))),
        };
        let query: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        let signed = sigv4::sign(
            &self.credentials,
            &self.region,
            self.service,
            &SignableRequest {
                method: method.as_str(),
                host: &host,
                path: url.path(),
                query: &query,
                headers: &headers,
                payload: &body,
            },
            chrono::Utc::now(),
        )?;

        debug!("{} {}", method, url);
        let mut request = self.http.request(method, url);
        for (name, value) in headers.iter().chain(signed.iter()) {
            request = request.header(name.as_str(), value.as_str());
        }
        request
            .body(body)
            .send()
            .await
            .map_err(|e| Error::Http(format!("Request failed: {}", e)))
    }
}

/// Parse an endpoint URL from configuration.
pub(crate) fn parse_endpoint(endpoint: &str) -> Result<Url> {
    Url::parse(endpoint).map_err(|e| Error::Config(format!("invalid endpoint {}: {}", endpoint, e)))
}

/// Map a JSON-protocol error body (`__type`, `message`) to an `Error`.
pub(crate) fn json_error(status: u16, body: &str) -> Error {
    let parsed: serde_json::Value = serde_json::from_str(body).unwrap_or_default();
    let code = parsed["__type"]
        .as_str()
        .map(|t| t.rsplit('#').next().unwrap_or(t).to_string())
        .unwrap_or_else(|| format!("HTTP{}", status));
    let message = parsed["message"]
        .as_str()
        .or_else(|| parsed["Message"].as_str())
        .unwrap_or(body)
        .to_string();
    service_error(code, message)
}

/// Map an S3 XML error body (`<Code>`, `<Message>`) to an `Error`.
pub(crate) fn xml_error(status: u16, body: &str) -> Error {
    let code = xml_tag(body, "Code").unwrap_or_else(|| format!("HTTP{}", status));
    let message = xml_tag(body, "Message").unwrap_or_else(|| body.to_string());
    if status == 404 && !code.starts_with("NoSuch") {
        return Error::NotFound(message);
    }
    service_error(code, message)
}

fn service_error(code: String, message: String) -> Error {
    match code.as_str() {
        "ResourceNotFoundException" | "NoSuchKey" | "NoSuchBucket" => Error::NotFound(message),
        _ => Error::Api { code, message },
    }
}

/// First `<tag>` text in an XML document, entity-decoded.
pub(crate) fn xml_tag(body: &str, tag: &str) -> Option<String> {
    xml_tags(body, tag).into_iter().next()
}

/// All `<tag>` texts in document order, entity-decoded.
pub(crate) fn xml_tags(body: &str, tag: &str) -> Vec<String> {
    let pattern = format!("<{0}>([^<]*)</{0}>", regex::escape(tag));
    let Ok(re) = Regex::new(&pattern) else {
        return Vec::new();
    };
    re.captures_iter(body)
        .map(|c| xml_unescape(&c[1]))
        .collect()
}

fn xml_unescape(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_error_mapping() {
        let err = json_error(
            400,
            r#"{"__type":"com.amazonaws.forecast#ResourceInUseException","message":"in use"}"#,
        );
        assert_eq!(err.api_code(), Some("ResourceInUseException"));
        assert!(err.to_string().contains("in use"));

        let err = json_error(400, r#"{"__type":"ResourceNotFoundException","Message":"gone"}"#);
        assert!(err.is_not_found());

        let err = json_error(502, "bad gateway");
        assert_eq!(err.api_code(), Some("HTTP502"));
    }

    #[test]
    fn test_xml_error_mapping() {
        let body = "<Error><Code>NoSuchKey</Code><Message>The key does not exist</Message></Error>";
        assert!(xml_error(404, body).is_not_found());

        let body = "<Error><Code>AccessDenied</Code><Message>Access Denied</Message></Error>";
        assert_eq!(xml_error(403, body).api_code(), Some("AccessDenied"));
    }

    #[test]
    fn test_xml_tags() {
        let body = "<R><Key>a&amp;b.csv</Key><Key>c.csv</Key><IsTruncated>false</IsTruncated></R>";
        assert_eq!(xml_tags(body, "Key"), vec!["a&b.csv", "c.csv"]);
        assert_eq!(xml_tag(body, "IsTruncated").as_deref(), Some("false"));
        assert_eq!(xml_tag(body, "Missing"), None);
    }
}
