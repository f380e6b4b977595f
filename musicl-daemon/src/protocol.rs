use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::thread::sleep;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{io_err, DaemonError};
use crate::paths::socket_path;

/// JSON newline-delimited request: `{"cmd": "status" | "sync" | "stop", "playlist": ...}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonRequest {
    pub cmd: String,
    /// Restricts `sync` to one playlist; all enabled feeds otherwise.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub playlist: Option<String>,
}

impl DaemonRequest {
    pub fn new(cmd: &str, playlist: Option<String>) -> Self {
        Self {
            cmd: cmd.to_string(),
            playlist,
        }
    }
}

/// JSON newline-delimited response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DaemonResponse {
    pub fn ok(data: Value) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Attempts `request_status` makes while a just-started daemon binds its socket.
const STATUS_ATTEMPTS: u32 = 5;

fn connect(socket: &Path) -> Result<UnixStream, DaemonError> {
    if !socket.exists() {
        return Err(DaemonError::DaemonNotRunning {
            socket: socket.to_path_buf(),
        });
    }
    UnixStream::connect(socket).map_err(|err| match err.kind() {
        ErrorKind::NotFound | ErrorKind::ConnectionRefused | ErrorKind::ConnectionReset => {
            DaemonError::DaemonNotRunning {
                socket: socket.to_path_buf(),
            }
        }
        _ => io_err(socket, err),
    })
}

/// One request line out, one response line back.
pub fn send_request(home: &Path, request: &DaemonRequest) -> Result<DaemonResponse, DaemonError> {
    let socket = socket_path(home);
    let mut stream = connect(&socket)?;

    let mut line = serde_json::to_vec(request)?;
    line.push(b'\n');
    stream
        .write_all(&line)
        .and_then(|()| stream.flush())
        .map_err(|e| io_err(&socket, e))?;

    let mut reply = String::new();
    let read = BufReader::new(stream)
        .read_line(&mut reply)
        .map_err(|e| io_err(&socket, e))?;
    if read == 0 {
        return Err(DaemonError::Protocol(
            "daemon closed connection before responding".to_string(),
        ));
    }
    Ok(serde_json::from_str(reply.trim_end())?)
}

/// Runtime status, retrying briefly while the socket is not there yet.
pub fn request_status(home: &Path) -> Result<Value, DaemonError> {
    let request = DaemonRequest::new("status", None);
    let mut attempt = 1;
    loop {
        match send_request(home, &request) {
            Ok(response) => return response_into_data(response),
            Err(DaemonError::DaemonNotRunning { .. }) if attempt < STATUS_ATTEMPTS => {
                attempt += 1;
                sleep(Duration::from_millis(100));
            }
            Err(err) => return Err(err),
        }
    }
}

pub fn request_stop(home: &Path) -> Result<(), DaemonError> {
    let response = send_request(home, &DaemonRequest::new("stop", None))?;
    response_into_data(response).map(|_| ())
}

/// Ask the daemon to check `playlist` (or every scheduled feed) now.
pub fn request_sync(home: &Path, playlist: Option<String>) -> Result<Value, DaemonError> {
    let response = send_request(home, &DaemonRequest::new("sync", playlist))?;
    response_into_data(response)
}

fn response_into_data(response: DaemonResponse) -> Result<Value, DaemonError> {
    match response {
        DaemonResponse { ok: true, data, .. } => Ok(data.unwrap_or(Value::Null)),
        DaemonResponse { error, .. } => Err(DaemonError::Protocol(
            error.unwrap_or_else(|| "unknown daemon error".to_string()),
        )),
    }
}
