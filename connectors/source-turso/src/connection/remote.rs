//! Remote database access over the Hrana HTTP protocol.
//!
//! Each query is one `POST {base}/v2/pipeline` carrying an `execute`
//! request followed by a `close`, so no server-side stream outlives the
//! call.

use std::time::Duration;

use async_trait::async_trait;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use tursotap_types::error::ExtractError;

use super::{QueryRows, SourceConnection, SqlValue};
use crate::config::http_base_url;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Hrana encodes blobs as unpadded standard base64; accept padded input too.
const HRANA_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum HranaValue {
    Null,
    Integer { value: String },
    Float { value: f64 },
    Text { value: String },
    Blob { base64: String },
}

impl From<&SqlValue> for HranaValue {
    fn from(value: &SqlValue) -> Self {
        match value {
            SqlValue::Null => Self::Null,
            SqlValue::Integer(v) => Self::Integer {
                value: v.to_string(),
            },
            SqlValue::Real(v) => Self::Float { value: *v },
            SqlValue::Text(v) => Self::Text { value: v.clone() },
            SqlValue::MalformedText(v) | SqlValue::Blob(v) => Self::Blob {
                base64: HRANA_BASE64.encode(v),
            },
        }
    }
}

impl TryFrom<HranaValue> for SqlValue {
    type Error = String;

    fn try_from(value: HranaValue) -> Result<Self, Self::Error> {
        Ok(match value {
            HranaValue::Null => Self::Null,
            HranaValue::Integer { value } => Self::Integer(
                value
                    .parse()
                    .map_err(|e| format!("invalid integer '{value}': {e}"))?,
            ),
            HranaValue::Float { value } => Self::Real(value),
            HranaValue::Text { value } => Self::Text(value),
            HranaValue::Blob { base64 } => Self::Blob(
                HRANA_BASE64
                    .decode(base64.as_bytes())
                    .map_err(|e| format!("invalid blob encoding: {e}"))?,
            ),
        })
    }
}

#[derive(Debug, Serialize)]
struct PipelineRequest<'a> {
    baton: Option<String>,
    requests: Vec<StreamRequest<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum StreamRequest<'a> {
    Execute { stmt: Stmt<'a> },
    Close,
}

#[derive(Debug, Serialize)]
struct Stmt<'a> {
    sql: &'a str,
    args: Vec<HranaValue>,
    want_rows: bool,
}

#[derive(Debug, Deserialize)]
struct PipelineResponse {
    #[serde(default)]
    results: Vec<StreamResult>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum StreamResult {
    Ok { response: StreamResponse },
    Error { error: HranaError },
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum StreamResponse {
    Execute { result: StmtResult },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct StmtResult {
    #[serde(default)]
    cols: Vec<Col>,
    #[serde(default)]
    rows: Vec<Vec<HranaValue>>,
}

#[derive(Debug, Deserialize)]
struct Col {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HranaError {
    message: String,
    #[serde(default)]
    code: Option<String>,
}

/// Build the JSON body for a single-statement pipeline.
pub(crate) fn pipeline_request(sql: &str, params: &[SqlValue]) -> serde_json::Value {
    let request = PipelineRequest {
        baton: None,
        requests: vec![
            StreamRequest::Execute {
                stmt: Stmt {
                    sql,
                    args: params.iter().map(HranaValue::from).collect(),
                    want_rows: true,
                },
            },
            StreamRequest::Close,
        ],
    };
    // Serializing plain data structs into a Value cannot fail.
    serde_json::to_value(request).unwrap_or(serde_json::Value::Null)
}

/// Decode a pipeline response body into rows.
pub(crate) fn parse_pipeline_response(body: &str) -> Result<QueryRows, ExtractError> {
    let response: PipelineResponse = serde_json::from_str(body)
        .map_err(|e| ExtractError::Query(format!("malformed pipeline response: {e}")))?;
    let first = response
        .results
        .into_iter()
        .next()
        .ok_or_else(|| ExtractError::Query("pipeline response has no results".to_string()))?;

    let result = match first {
        StreamResult::Error { error } => {
            return Err(ExtractError::Query(match error.code {
                Some(code) => format!("{} ({code})", error.message),
                None => error.message,
            }))
        }
        StreamResult::Ok {
            response: StreamResponse::Execute { result },
        } => result,
        StreamResult::Ok {
            response: StreamResponse::Other,
        } => {
            return Err(ExtractError::Query(
                "pipeline response is not an execute result".to_string(),
            ))
        }
    };

    let columns = result
        .cols
        .into_iter()
        .enumerate()
        .map(|(i, c)| c.name.unwrap_or_else(|| format!("column{i}")))
        .collect();
    let rows = result
        .rows
        .into_iter()
        .map(|row| {
            row.into_iter()
                .map(SqlValue::try_from)
                .collect::<Result<Vec<_>, _>>()
        })
        .collect::<Result<Vec<_>, _>>()
        .map_err(ExtractError::Query)?;
    Ok(QueryRows { columns, rows })
}

/// Stateless HTTP connection to a remote database.
pub struct RemoteConnection {
    client: reqwest::Client,
    base_url: String,
    auth_token: String,
}

impl RemoteConnection {
    /// Create a client for `url`; no request is sent until the first query.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractError::Connection`] if the HTTP client can't be built.
    pub fn new(url: &str, auth_token: &str) -> Result<Self, ExtractError> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ExtractError::Connection(format!("cannot build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: http_base_url(url),
            auth_token: auth_token.to_string(),
        })
    }
}

#[async_trait]
impl SourceConnection for RemoteConnection {
    async fn query(&mut self, sql: &str, params: &[SqlValue]) -> Result<QueryRows, ExtractError> {
        let url = format!("{}/v2/pipeline", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.auth_token)
            .json(&pipeline_request(sql, params))
            .send()
            .await
            .map_err(|e| ExtractError::Connection(format!("request to {url} failed: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ExtractError::Connection(format!("reading response failed: {e}")))?;

        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(ExtractError::Connection(format!(
                "authentication rejected ({status})"
            )));
        }
        if status.is_server_error() {
            return Err(ExtractError::Connection(format!("server error {status}: {body}")));
        }
        if !status.is_success() {
            // Statement errors may come back as 400 with a Hrana error body.
            return match parse_pipeline_response(&body) {
                Err(e) => Err(e),
                Ok(_) => Err(ExtractError::Query(format!("HTTP {status}: {body}"))),
            };
        }
        parse_pipeline_response(&body)
    }

    fn describe(&self) -> String {
        format!("remote:{}", self.base_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_encodes_typed_arguments() {
        let body = pipeline_request(
            "SELECT * FROM t WHERE a > ? AND b = ?",
            &[
                SqlValue::Integer(42),
                SqlValue::Text("x".into()),
                SqlValue::Real(1.5),
                SqlValue::Blob(vec![0xff]),
                SqlValue::Null,
            ],
        );
        assert_eq!(body["requests"][0]["type"], "execute");
        assert_eq!(
            body["requests"][0]["stmt"]["args"],
            json!([
                {"type": "integer", "value": "42"},
                {"type": "text", "value": "x"},
                {"type": "float", "value": 1.5},
                {"type": "blob", "base64": "/w"},
                {"type": "null"}
            ])
        );
        assert_eq!(body["requests"][1]["type"], "close");
    }

    #[test]
    fn execute_result_decodes_rows() {
        let body = json!({
            "baton": null,
            "results": [
                {"type": "ok", "response": {"type": "execute", "result": {
                    "cols": [{"name": "id", "decltype": "INTEGER"}, {"name": "data", "decltype": "BLOB"}],
                    "rows": [
                        [{"type": "integer", "value": "7"}, {"type": "blob", "base64": "AQI="}],
                        [{"type": "integer", "value": "8"}, {"type": "null"}]
                    ],
                    "affected_row_count": 0
                }}},
                {"type": "ok", "response": {"type": "close"}}
            ]
        })
        .to_string();
        let rows = parse_pipeline_response(&body).unwrap();
        assert_eq!(rows.columns, ["id", "data"]);
        assert_eq!(
            rows.rows,
            vec![
                vec![SqlValue::Integer(7), SqlValue::Blob(vec![1, 2])],
                vec![SqlValue::Integer(8), SqlValue::Null],
            ]
        );
    }

    #[test]
    fn error_result_is_query_error() {
        let body = json!({
            "results": [{"type": "error", "error": {"message": "no such table: t", "code": "SQLITE_ERROR"}}]
        })
        .to_string();
        let err = parse_pipeline_response(&body).unwrap_err();
        assert_eq!(
            err,
            ExtractError::Query("no such table: t (SQLITE_ERROR)".into())
        );
    }

    #[test]
    fn malformed_body_is_query_error() {
        assert!(matches!(
            parse_pipeline_response("<html>"),
            Err(ExtractError::Query(_))
        ));
    }

    #[test]
    fn libsql_url_targets_https_pipeline() {
        let conn = RemoteConnection::new("libsql://db-org.turso.io", "tok").unwrap();
        assert_eq!(conn.describe(), "remote:https://db-org.turso.io");
    }
}
