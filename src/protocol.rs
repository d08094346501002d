//! JSON command protocol: request/response shapes and the command
//! processor.
//!
//! A decoded frame is one JSON object `{"command": ..., "params": [...]}`.
//! `process` maps it onto a file-store operation and renders the result as
//! the response object. Malformed shapes, unknown commands, missing params,
//! and storage failures all come back as `status: ERROR` responses; nothing
//! escapes this boundary as a Rust error.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::store::FileStore;

/// Fallback response body if serialization itself ever fails.
const SERIALIZE_FALLBACK: &str = r#"{"status":"ERROR","data":"response serialization failed"}"#;

/// Wire request shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub command: String,
    pub params: Vec<String>,
}

impl Request {
    /// Build a request body (no delimiter).
    pub fn new(command: impl Into<String>, params: Vec<String>) -> Self {
        Request {
            command: command.into(),
            params,
        }
    }

    /// Serialize to compact JSON.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| SERIALIZE_FALLBACK.to_string())
    }
}

/// Response status tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "ERROR")]
    Error,
}

/// Wire response shape.
///
/// Optional fields are emitted only when the command calls for them. The
/// serialized names (`data`, `data_namafile`, `data_file`) are the wire
/// contract and must not change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub status: Status,
    /// LIST results, DELETE confirmation text, or an error message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Echoed filename for GET and UPLOAD.
    #[serde(rename = "data_namafile", default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    /// Base64 file content for GET.
    #[serde(rename = "data_file", default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl Response {
    /// Successful LIST response.
    pub fn ok_list(names: Vec<String>) -> Self {
        Response {
            status: Status::Ok,
            data: Some(Value::from(names)),
            filename: None,
            content: None,
        }
    }

    /// Successful GET response carrying the encoded content.
    pub fn ok_file(filename: impl Into<String>, content_b64: impl Into<String>) -> Self {
        Response {
            status: Status::Ok,
            data: None,
            filename: Some(filename.into()),
            content: Some(content_b64.into()),
        }
    }

    /// Successful UPLOAD response echoing the stored name.
    pub fn ok_uploaded(filename: impl Into<String>) -> Self {
        Response {
            status: Status::Ok,
            data: None,
            filename: Some(filename.into()),
            content: None,
        }
    }

    /// Successful response carrying a human-readable message.
    pub fn ok_message(message: impl Into<String>) -> Self {
        Response {
            status: Status::Ok,
            data: Some(Value::String(message.into())),
            filename: None,
            content: None,
        }
    }

    /// Error response; `message` becomes the `data` field.
    pub fn error(message: impl std::fmt::Display) -> Self {
        Response {
            status: Status::Error,
            data: Some(Value::String(message.to_string())),
            filename: None,
            content: None,
        }
    }

    /// The `data` field viewed as a string, when it is one.
    pub fn data_text(&self) -> Option<&str> {
        self.data.as_ref().and_then(Value::as_str)
    }

    /// Serialize to compact JSON, the exact bytes that go on the wire.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| SERIALIZE_FALLBACK.to_string())
    }
}

/// A validated command ready to run against the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    List,
    Get { filename: String },
    Upload { filename: String, payload_b64: String },
    Delete { filename: String },
}

/// Request validation errors. The `Display` text becomes the ERROR `data`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    /// Frame was not a well-formed request object.
    Malformed(String),
    /// `command` value names no known operation.
    UnknownCommand(String),
    /// `params` lacks a required positional value.
    MissingParam {
        command: &'static str,
        param: &'static str,
    },
}

impl std::fmt::Display for RequestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestError::Malformed(msg) => write!(f, "Malformed request: {msg}"),
            RequestError::UnknownCommand(cmd) => write!(f, "Unknown command: {cmd}"),
            RequestError::MissingParam { command, param } => {
                write!(f, "{command} requires a {param} parameter")
            }
        }
    }
}

impl std::error::Error for RequestError {}

impl Command {
    /// Validate a decoded request into a runnable command.
    ///
    /// Command names match case-insensitively. Positional params beyond the
    /// required arity are ignored, as the original service did.
    pub fn from_request(request: &Request) -> Result<Command, RequestError> {
        let mut params = request.params.iter();
        match request.command.to_ascii_uppercase().as_str() {
            "LIST" => Ok(Command::List),
            "GET" => {
                let filename = params.next().cloned().ok_or(RequestError::MissingParam {
                    command: "GET",
                    param: "filename",
                })?;
                Ok(Command::Get { filename })
            }
            "UPLOAD" => {
                let filename = params.next().cloned().ok_or(RequestError::MissingParam {
                    command: "UPLOAD",
                    param: "filename",
                })?;
                let payload_b64 = params.next().cloned().ok_or(RequestError::MissingParam {
                    command: "UPLOAD",
                    param: "base64 payload",
                })?;
                Ok(Command::Upload {
                    filename,
                    payload_b64,
                })
            }
            "DELETE" => {
                let filename = params.next().cloned().ok_or(RequestError::MissingParam {
                    command: "DELETE",
                    param: "filename",
                })?;
                Ok(Command::Delete { filename })
            }
            _ => Err(RequestError::UnknownCommand(request.command.clone())),
        }
    }
}

/// Execute one raw frame against the store and produce the response.
pub fn process(frame: &str, store: &FileStore) -> Response {
    let request: Request = match serde_json::from_str(frame) {
        Ok(request) => request,
        Err(e) => return Response::error(RequestError::Malformed(e.to_string())),
    };
    match Command::from_request(&request) {
        Ok(command) => execute(&command, store),
        Err(e) => Response::error(e),
    }
}

/// Run a validated command against the store.
fn execute(command: &Command, store: &FileStore) -> Response {
    match command {
        Command::List => match store.list() {
            Ok(names) => Response::ok_list(names),
            Err(e) => Response::error(e),
        },
        Command::Get { filename } => match store.get(filename) {
            Ok(content) => Response::ok_file(filename.clone(), content),
            Err(e) => Response::error(e),
        },
        Command::Upload {
            filename,
            payload_b64,
        } => match store.upload(filename, payload_b64) {
            Ok(()) => Response::ok_uploaded(filename.clone()),
            Err(e) => Response::error(e),
        },
        Command::Delete { filename } => match store.delete(filename) {
            Ok(()) => Response::ok_message(format!("File {filename} deleted successfully")),
            Err(e) => Response::error(e),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn store_in(dir: &tempfile::TempDir) -> Arc<FileStore> {
        FileStore::new(dir.path().join("files")).unwrap()
    }

    #[test]
    fn test_upload_then_get_exact_wire_shape() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir);

        let response = process(r#"{"command": "UPLOAD", "params": ["a.txt", "aGVsbG8="]}"#, &store);
        assert_eq!(response.to_json(), r#"{"status":"OK","data_namafile":"a.txt"}"#);

        let response = process(r#"{"command": "GET", "params": ["a.txt"]}"#, &store);
        assert_eq!(
            response.to_json(),
            r#"{"status":"OK","data_namafile":"a.txt","data_file":"aGVsbG8="}"#
        );
    }

    #[test]
    fn test_list_returns_sorted_names() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir);
        store.upload("b.txt", "aGVsbG8=").unwrap();
        store.upload("a.txt", "aGVsbG8=").unwrap();

        let response = process(r#"{"command": "LIST", "params": []}"#, &store);
        assert_eq!(response.status, Status::Ok);
        assert_eq!(response.data, Some(serde_json::json!(["a.txt", "b.txt"])));
    }

    #[test]
    fn test_delete_success_message() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir);
        store.upload("a.txt", "aGVsbG8=").unwrap();

        let response = process(r#"{"command": "DELETE", "params": ["a.txt"]}"#, &store);
        assert_eq!(response.status, Status::Ok);
        assert_eq!(response.data_text(), Some("File a.txt deleted successfully"));
    }

    #[test]
    fn test_get_missing_file_is_error_response() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir);

        let response = process(r#"{"command": "GET", "params": ["ghost.txt"]}"#, &store);
        assert_eq!(response.status, Status::Error);
        assert_eq!(response.data_text(), Some("File ghost.txt not found"));
    }

    #[test]
    fn test_unknown_command() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir);

        let response = process(r#"{"command": "RENAME", "params": ["a", "b"]}"#, &store);
        assert_eq!(response.status, Status::Error);
        assert_eq!(response.data_text(), Some("Unknown command: RENAME"));
    }

    #[test]
    fn test_command_names_are_case_insensitive() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir);

        let response = process(r#"{"command": "upload", "params": ["a.txt", "aGVsbG8="]}"#, &store);
        assert_eq!(response.status, Status::Ok);
        let response = process(r#"{"command": "List", "params": []}"#, &store);
        assert_eq!(response.status, Status::Ok);
    }

    #[test]
    fn test_missing_params() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir);

        let response = process(r#"{"command": "GET", "params": []}"#, &store);
        assert_eq!(response.data_text(), Some("GET requires a filename parameter"));

        let response = process(r#"{"command": "UPLOAD", "params": ["only-name.txt"]}"#, &store);
        assert_eq!(
            response.data_text(),
            Some("UPLOAD requires a base64 payload parameter")
        );
    }

    #[test]
    fn test_extra_params_are_ignored() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir);

        let response = process(
            r#"{"command": "UPLOAD", "params": ["a.txt", "aGVsbG8=", "extra", "ignored"]}"#,
            &store,
        );
        assert_eq!(response.status, Status::Ok);
    }

    #[test]
    fn test_wrong_shape_is_malformed() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir);

        // Valid JSON, wrong shape: params must be an array of strings.
        let response = process(r#"{"command": "LIST", "params": "nope"}"#, &store);
        assert_eq!(response.status, Status::Error);
        match response.data_text() {
            Some(msg) => assert!(msg.starts_with("Malformed request:"), "{msg}"),
            None => panic!("expected an error message"),
        }

        let response = process(r#"{"params": []}"#, &store);
        assert_eq!(response.status, Status::Error);
    }

    #[test]
    fn test_empty_filename_wire_messages() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir);

        let response = process(r#"{"command": "DELETE", "params": [""]}"#, &store);
        assert_eq!(response.data_text(), Some("Filename is empty"));

        let response = process(r#"{"command": "GET", "params": [""]}"#, &store);
        assert_eq!(response.data_text(), Some("Filename or file data is empty"));
    }

    #[test]
    fn test_response_roundtrips_through_serde() {
        let response = Response::ok_file("a.txt", "aGVsbG8=");
        let parsed: Response = serde_json::from_str(&response.to_json()).unwrap();
        assert_eq!(parsed, response);

        let response = Response::error("File x not found");
        let parsed: Response = serde_json::from_str(&response.to_json()).unwrap();
        assert_eq!(parsed.status, Status::Error);
        assert_eq!(parsed.data_text(), Some("File x not found"));
    }
}
