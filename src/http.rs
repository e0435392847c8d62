use std::io::Read;
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

const BODY_SNIPPET_CHARS: usize = 240;

#[derive(Debug, Error)]
pub(crate) enum HttpError {
    #[error("HTTP status {status}{}", snippet_suffix(.body))]
    Status { status: u16, body: String },
    #[error("transport error: {0}")]
    Transport(Box<ureq::Transport>),
    #[error("failed to read response body: {0}")]
    Io(#[from] std::io::Error),
    #[error("response is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl HttpError {
    pub(crate) fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// True when the remote end could not be reached at all.
    pub(crate) fn is_unreachable(&self) -> bool {
        match self {
            Self::Transport(transport) => matches!(
                transport.kind(),
                ureq::ErrorKind::ConnectionFailed | ureq::ErrorKind::Dns
            ),
            _ => false,
        }
    }
}

fn snippet_suffix(body: &str) -> String {
    let body = body.trim();
    if body.is_empty() {
        String::new()
    } else {
        let truncated = body.chars().take(BODY_SNIPPET_CHARS).collect::<String>();
        format!(" ({truncated})")
    }
}

impl From<ureq::Error> for HttpError {
    fn from(err: ureq::Error) -> Self {
        match err {
            ureq::Error::Status(status, response) => {
                let body = response.into_string().ok().unwrap_or_default();
                Self::Status { status, body }
            }
            ureq::Error::Transport(transport) => Self::Transport(Box::new(transport)),
        }
    }
}

pub(crate) fn build_agent(timeout: Duration) -> ureq::Agent {
    ureq::AgentBuilder::new()
        .timeout_connect(timeout.min(Duration::from_secs(10)))
        .timeout_read(timeout)
        .timeout_write(timeout)
        .build()
}

pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

fn with_query(mut request: ureq::Request, query: &[(String, String)]) -> ureq::Request {
    for (key, value) in query {
        request = request.query(key, value);
    }
    request
}

pub(crate) fn get_text(
    agent: &ureq::Agent,
    url: &str,
    query: &[(String, String)],
) -> Result<String, HttpError> {
    let response = with_query(agent.get(url), query).call()?;
    Ok(response.into_string()?)
}

pub(crate) fn get_json(
    agent: &ureq::Agent,
    url: &str,
    query: &[(String, String)],
) -> Result<Value, HttpError> {
    let body = get_text(agent, url, query)?;
    Ok(serde_json::from_str(&body)?)
}

pub(crate) fn post_form_json(
    agent: &ureq::Agent,
    url: &str,
    query: &[(String, String)],
    form: &[(&str, &str)],
) -> Result<Value, HttpError> {
    let response = with_query(agent.post(url), query).send_form(form)?;
    let body = response.into_string()?;
    Ok(serde_json::from_str(&body)?)
}

pub(crate) fn get_bytes(agent: &ureq::Agent, url: &str) -> Result<Vec<u8>, HttpError> {
    let response = agent.get(url).call()?;
    let mut bytes = Vec::new();
    response.into_reader().read_to_end(&mut bytes)?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Behavior, TestServer, closed_port_url};

    fn agent() -> ureq::Agent {
        build_agent(Duration::from_millis(500))
    }

    #[test]
    fn join_url_normalizes_slashes() {
        assert_eq!(join_url("http://a/api/", "/Timeslot/x"), "http://a/api/Timeslot/x");
        assert_eq!(join_url("http://a/api", "make"), "http://a/api/make");
    }

    #[test]
    fn get_json_sends_query_and_parses_body() {
        let server = TestServer::spawn(vec![Behavior::json(200, r#"{"status":"OK"}"#)]);
        let query = vec![("time".to_string(), "42".to_string())];

        let value = get_json(&agent(), &server.url("/Thing"), &query).expect("json body");

        assert_eq!(value["status"], "OK");
        let requests = server.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, "GET");
        assert_eq!(requests[0].target, "/Thing?time=42");
    }

    #[test]
    fn status_errors_keep_truncated_body() {
        let long_body = "x".repeat(600);
        let server = TestServer::spawn(vec![Behavior::text(403, &long_body)]);

        let err = get_text(&agent(), &server.url("/"), &[]).expect_err("403 is an error");

        assert_eq!(err.status(), Some(403));
        let message = err.to_string();
        assert!(message.starts_with("HTTP status 403 ("), "unexpected: {message}");
        assert!(message.len() < 300, "body should be truncated: {message}");
    }

    #[test]
    fn non_json_body_is_reported_as_json_error() {
        let server = TestServer::spawn(vec![Behavior::text(200, "<html>oops</html>")]);

        let err = get_json(&agent(), &server.url("/"), &[]).expect_err("not json");

        assert!(matches!(err, HttpError::Json(_)));
        assert!(!err.is_unreachable());
    }

    #[test]
    fn refused_connection_is_unreachable() {
        let err = get_text(&agent(), &closed_port_url(), &[]).expect_err("nothing listens");

        assert!(err.is_unreachable(), "unexpected error: {err}");
        assert_eq!(err.status(), None);
    }

    #[test]
    fn post_form_sends_urlencoded_body() {
        let server = TestServer::spawn(vec![Behavior::json(200, r#"{"status":"OK"}"#)]);

        post_form_json(
            &agent(),
            &server.url("/Timeslot/7/setMeta"),
            &[],
            &[("string_key", "upload_state"), ("value", "Force Upload")],
        )
        .expect("form post");

        let requests = server.requests();
        assert_eq!(requests[0].method, "POST");
        assert_eq!(
            requests[0].body_text(),
            "string_key=upload_state&value=Force+Upload"
        );
    }

    #[test]
    fn get_bytes_returns_binary_body() {
        let server = TestServer::spawn(vec![Behavior::bytes(200, vec![0, 159, 146, 150], "image/png")]);

        let bytes = get_bytes(&agent(), &server.url("/img.png")).expect("bytes");

        assert_eq!(bytes, vec![0, 159, 146, 150]);
    }
}
