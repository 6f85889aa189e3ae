//! Stdio binding: one request per record, answered strictly in arrival order.
//!
//! Records are newline-delimited JSON. A record may instead be preceded by a
//! `Content-Length: N` header block, in which case exactly `N` body bytes are read and the
//! reply uses the same framing. Records over 8 MiB and lines that are not valid UTF-8 get an
//! `invalid_request` reply and the loop keeps reading.

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use super::ServerError;
use super::dispatch::{ToolDispatch, ToolResponse};
use crate::tools::ToolError;

/// Hard limit for a single record, framed or newline-delimited (8 MiB).
const MAX_RECORD_BYTES: usize = 8 * 1024 * 1024;

/// Serve requests read from `reader` until EOF, writing replies to `writer`.
pub async fn serve_stdio<D, R, W>(dispatch: &D, reader: R, writer: W) -> Result<(), ServerError>
where
    D: ToolDispatch + ?Sized,
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    serve_records(dispatch, reader, writer, MAX_RECORD_BYTES).await
}

async fn serve_records<D, R, W>(
    dispatch: &D,
    reader: R,
    mut writer: W,
    max_record_bytes: usize,
) -> Result<(), ServerError>
where
    D: ToolDispatch + ?Sized,
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    let mut content_length: Option<usize> = None;

    tracing::info!("Stdio transport started");

    loop {
        match read_record_line(&mut reader, &mut buf, max_record_bytes).await? {
            LineRead::Eof => {
                tracing::info!("EOF on stdin, shutting down");
                break;
            }
            LineRead::Oversized => {
                tracing::warn!("Record exceeds {max_record_bytes} bytes");
                let error =
                    ToolError::InvalidRequest(format!("record exceeds {max_record_bytes} bytes"));
                let framed = content_length.take().is_some();
                write_response(&mut writer, &ToolResponse::failure(None, &error), framed).await?;
                continue;
            }
            LineRead::Line => {}
        }
        // Invalid UTF-8 becomes replacement characters and fails JSON parsing downstream.
        let line = String::from_utf8_lossy(&buf);
        let trimmed = line.trim_end_matches(['\r', '\n']);

        if let Some((name, value)) = trimmed.split_once(':') {
            if name.trim().eq_ignore_ascii_case("content-length") {
                match value.trim().parse::<usize>() {
                    Ok(length) => content_length = Some(length),
                    Err(_) => {
                        tracing::warn!(header = trimmed, "Invalid Content-Length header");
                        let error = ToolError::InvalidRequest("invalid Content-Length header".into());
                        write_response(&mut writer, &ToolResponse::failure(None, &error), true)
                            .await?;
                    }
                }
                continue;
            }
        }

        if let Some(length) = content_length {
            // Remaining header lines are ignored until the blank separator.
            if !trimmed.is_empty() {
                continue;
            }
            content_length = None;

            if length > max_record_bytes {
                tracing::warn!(length, "Framed record exceeds {max_record_bytes} bytes");
                tokio::io::copy(&mut (&mut reader).take(length as u64), &mut tokio::io::sink())
                    .await?;
                let error =
                    ToolError::InvalidRequest(format!("record exceeds {max_record_bytes} bytes"));
                write_response(&mut writer, &ToolResponse::failure(None, &error), true).await?;
                continue;
            }

            let mut body = vec![0u8; length];
            reader.read_exact(&mut body).await?;
            let payload = String::from_utf8_lossy(&body);
            let response = dispatch.dispatch_raw(payload.trim()).await;
            write_response(&mut writer, &response, true).await?;
            continue;
        }

        if trimmed.trim().is_empty() {
            continue;
        }
        let response = dispatch.dispatch_raw(trimmed.trim()).await;
        write_response(&mut writer, &response, false).await?;
    }

    writer.flush().await?;
    Ok(())
}

enum LineRead {
    Eof,
    Line,
    Oversized,
}

/// Read one line into `buf`, never buffering more than `max` bytes plus the newline.
///
/// An oversized line is consumed up to and including its newline (or EOF) and discarded.
async fn read_record_line<R>(
    reader: &mut BufReader<R>,
    buf: &mut Vec<u8>,
    max: usize,
) -> std::io::Result<LineRead>
where
    R: AsyncRead + Unpin,
{
    let limit = max as u64 + 1;
    buf.clear();
    if (&mut *reader).take(limit).read_until(b'\n', buf).await? == 0 {
        return Ok(LineRead::Eof);
    }
    if buf.len() <= max || buf.ends_with(b"\n") {
        return Ok(LineRead::Line);
    }
    loop {
        buf.clear();
        let read = (&mut *reader).take(limit).read_until(b'\n', buf).await?;
        if read == 0 || buf.ends_with(b"\n") {
            break;
        }
    }
    buf.clear();
    Ok(LineRead::Oversized)
}

async fn write_response<W>(writer: &mut W, response: &ToolResponse, framed: bool) -> Result<(), ServerError>
where
    W: AsyncWrite + Unpin,
{
    let json = serde_json::to_string(response).map_err(|err| ServerError::Io(err.into()))?;
    if framed {
        let header = format!("Content-Length: {}\r\n\r\n", json.len());
        writer.write_all(header.as_bytes()).await?;
        writer.write_all(json.as_bytes()).await?;
    } else {
        writer.write_all(json.as_bytes()).await?;
        writer.write_all(b"\n").await?;
    }
    writer.flush().await?;
    Ok(())
}
