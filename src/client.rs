//! Wire client over one persistent connection.
//!
//! Used by the command-line client, the bench harness, and the integration
//! tests. The helpers here keep exactly one request outstanding, so the
//! completion-order wire contract degenerates to request order and each
//! response can be paired with its request.

use bytes::BytesMut;
use tokio::io::AsyncReadExt;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpStream, ToSocketAddrs};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use crate::framing;
use crate::protocol::{Request, Response, Status};

/// Client for a fileshelf server.
pub struct Client {
    stream: TcpStream,
    buffer: BytesMut,
}

impl Client {
    /// Connect to a server.
    pub async fn connect<A: ToSocketAddrs>(addr: A) -> crate::Result<Client> {
        let stream = TcpStream::connect(addr).await?;
        Ok(Client {
            stream,
            buffer: BytesMut::with_capacity(4 * 1024),
        })
    }

    /// Send one request frame and wait for one response frame.
    pub async fn request(&mut self, request: &Request) -> crate::Result<Response> {
        let frame = framing::encode_frame(&request.to_json());
        self.stream.write_all(&frame).await?;
        let frame = self.read_frame().await?;
        Ok(serde_json::from_slice(&frame)?)
    }

    /// Filenames the server currently lists.
    pub async fn list(&mut self) -> crate::Result<Vec<String>> {
        let response = self.request(&Request::new("LIST", Vec::new())).await?;
        let response = ok_or_server_error(response)?;
        match response.data {
            Some(value) => Ok(serde_json::from_value(value)?),
            None => Ok(Vec::new()),
        }
    }

    /// Download and decode one file.
    pub async fn get(&mut self, filename: &str) -> crate::Result<Vec<u8>> {
        let response = self
            .request(&Request::new("GET", vec![filename.to_string()]))
            .await?;
        let response = ok_or_server_error(response)?;
        let content = response.content.ok_or("response missing data_file")?;
        Ok(BASE64.decode(content.as_bytes())?)
    }

    /// Encode and upload one file, replacing any remote entry of that name.
    pub async fn upload(&mut self, filename: &str, data: &[u8]) -> crate::Result<()> {
        let payload = BASE64.encode(data);
        let response = self
            .request(&Request::new("UPLOAD", vec![filename.to_string(), payload]))
            .await?;
        ok_or_server_error(response)?;
        Ok(())
    }

    /// Delete one remote file, returning the server's confirmation text.
    pub async fn delete(&mut self, filename: &str) -> crate::Result<String> {
        let response = self
            .request(&Request::new("DELETE", vec![filename.to_string()]))
            .await?;
        let response = ok_or_server_error(response)?;
        Ok(response.data_text().unwrap_or_default().to_string())
    }

    /// Read one delimited frame, buffering across reads as needed.
    async fn read_frame(&mut self) -> crate::Result<BytesMut> {
        loop {
            if let Some(frame) = framing::extract_frame(&mut self.buffer) {
                return Ok(frame);
            }
            if self.stream.read_buf(&mut self.buffer).await? == 0 {
                return Err("connection closed before a full response arrived".into());
            }
        }
    }
}

/// Convert a `status: ERROR` response into a client-side error.
fn ok_or_server_error(response: Response) -> crate::Result<Response> {
    match response.status {
        Status::Ok => Ok(response),
        Status::Error => Err(response
            .data_text()
            .unwrap_or("unspecified server error")
            .to_string()
            .into()),
    }
}
