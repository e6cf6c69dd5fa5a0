//! Framing and message classification for stdio backends.
//!
//! Frames are `Content-Length: N\r\n\r\n` followed by exactly `N` bytes of
//! JSON. Any other header lines are skipped.

use std::io;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Classification of an incoming JSON-RPC message.
///
/// - `Response` → oneshot correlation for pending requests
/// - `IncomingRequest` → answered by the reader loop (`ping` and friends)
/// - `Notification` → routed to the mount's observer
#[derive(Debug, PartialEq, Eq)]
pub enum MessageKind {
    /// A response to a request we sent (has `id`, no `method`).
    Response,
    /// A request from the backend (has `id` + `method`).
    IncomingRequest { id: u64 },
    /// A notification (has `method`, no `id`).
    Notification,
}

/// Classify a JSON-RPC message by inspecting `id` and `method` fields.
pub fn classify_message(json: &serde_json::Value) -> MessageKind {
    let has_id = json.get("id").and_then(|v| v.as_u64());
    let has_method = json.get("method").and_then(|v| v.as_str());

    match (has_id, has_method) {
        (Some(id), Some(_)) => MessageKind::IncomingRequest { id },
        (Some(_), None) => MessageKind::Response,
        _ => MessageKind::Notification,
    }
}

/// Reads one frame body.
///
/// Returns `Ok(None)` on a clean end of stream before a header starts.
pub async fn read_frame<R>(reader: &mut R, line: &mut String) -> io::Result<Option<Vec<u8>>>
where
    R: AsyncBufRead + Unpin,
{
    let content_length = match read_content_length(reader, line).await? {
        Some(len) => len,
        None => return Ok(None),
    };

    // Skip remaining headers up to the blank line
    loop {
        line.clear();
        if reader.read_line(line).await? == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "stream closed inside frame headers",
            ));
        }
        if line.trim().is_empty() {
            break;
        }
    }

    let mut body = vec![0u8; content_length];
    reader.read_exact(&mut body).await?;
    Ok(Some(body))
}

async fn read_content_length<R>(reader: &mut R, line: &mut String) -> io::Result<Option<usize>>
where
    R: AsyncBufRead + Unpin,
{
    loop {
        line.clear();
        let bytes_read = reader.read_line(line).await?;
        if bytes_read == 0 {
            return Ok(None);
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        if let Some(len_str) = trimmed.strip_prefix("Content-Length:")
            && let Ok(len) = len_str.trim().parse::<usize>()
        {
            return Ok(Some(len));
        }
    }
}

/// Writes one frame and flushes.
pub async fn write_frame<W>(writer: &mut W, body: &str) -> io::Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let header = format!("Content-Length: {}\r\n\r\n", body.len());
    writer.write_all(header.as_bytes()).await?;
    writer.write_all(body.as_bytes()).await?;
    writer.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::BufReader;

    #[test]
    fn classify_response() {
        let json = serde_json::json!({"id": 1, "result": {}});
        assert_eq!(classify_message(&json), MessageKind::Response);
    }

    #[test]
    fn classify_incoming_request() {
        let json = serde_json::json!({"id": 7, "method": "ping"});
        assert_eq!(
            classify_message(&json),
            MessageKind::IncomingRequest { id: 7 }
        );
    }

    #[test]
    fn classify_notification() {
        let json = serde_json::json!({"method": "notifications/tools/list_changed"});
        assert_eq!(classify_message(&json), MessageKind::Notification);
    }

    #[tokio::test]
    async fn frame_round_trip_over_duplex() {
        let (mut client, server) = tokio::io::duplex(1024);
        write_frame(&mut client, r#"{"id":1,"result":{}}"#).await.unwrap();
        write_frame(&mut client, r#"{"method":"x"}"#).await.unwrap();
        drop(client);

        let mut reader = BufReader::new(server);
        let mut line = String::new();
        let first = read_frame(&mut reader, &mut line).await.unwrap().unwrap();
        assert_eq!(first, br#"{"id":1,"result":{}}"#);
        let second = read_frame(&mut reader, &mut line).await.unwrap().unwrap();
        assert_eq!(second, br#"{"method":"x"}"#);
        assert!(read_frame(&mut reader, &mut line).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn extra_headers_are_skipped() {
        let raw = b"Content-Length: 2\r\nContent-Type: application/json\r\n\r\n{}";
        let mut reader = BufReader::new(&raw[..]);
        let mut line = String::new();
        let body = read_frame(&mut reader, &mut line).await.unwrap().unwrap();
        assert_eq!(body, b"{}");
    }

    #[tokio::test]
    async fn truncated_body_is_an_error() {
        let raw = b"Content-Length: 10\r\n\r\n{}";
        let mut reader = BufReader::new(&raw[..]);
        let mut line = String::new();
        assert!(read_frame(&mut reader, &mut line).await.is_err());
    }
}
