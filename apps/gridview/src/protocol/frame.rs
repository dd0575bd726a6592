use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Upper bound for a single frame; larger lengths indicate a corrupt stream.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("frame too large: {0} bytes")]
    TooLarge(usize),
}

/// Writes `msg` as a 4-byte big-endian length followed by its JSON encoding.
pub async fn write_frame<W, T>(writer: &mut W, msg: &T) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let json = serde_json::to_vec(msg)?;
    if json.len() > MAX_FRAME_LEN {
        return Err(FrameError::TooLarge(json.len()));
    }
    let len = json.len() as u32;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(&json).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads one frame. Returns `Ok(None)` on a clean EOF before the length prefix.
pub async fn read_frame<R, T>(reader: &mut R) -> Result<Option<T>, FrameError>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(err) => return Err(err.into()),
    }
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_LEN {
        return Err(FrameError::TooLarge(len));
    }
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await?;
    Ok(Some(serde_json::from_slice(&buf)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{DaemonMessage, Event};

    #[tokio::test]
    async fn frames_survive_a_duplex_pipe() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        let sent = DaemonMessage::Event(Event::Output {
            session_id: "s1".into(),
        });
        write_frame(&mut client, &sent).await.expect("write");
        write_frame(&mut client, &DaemonMessage::Response(crate::protocol::Response::Ok))
            .await
            .expect("write");
        drop(client);

        let first: Option<DaemonMessage> = read_frame(&mut server).await.expect("read");
        assert!(matches!(
            first,
            Some(DaemonMessage::Event(Event::Output { ref session_id })) if session_id == "s1"
        ));
        let second: Option<DaemonMessage> = read_frame(&mut server).await.expect("read");
        assert!(matches!(
            second,
            Some(DaemonMessage::Response(crate::protocol::Response::Ok))
        ));
        let end: Option<DaemonMessage> = read_frame(&mut server).await.expect("read");
        assert!(end.is_none());
    }

    #[tokio::test]
    async fn oversized_length_is_rejected() {
        let (mut client, mut server) = tokio::io::duplex(64);
        let bogus = ((MAX_FRAME_LEN + 1) as u32).to_be_bytes();
        client.write_all(&bogus).await.expect("write prefix");
        let result: Result<Option<DaemonMessage>, _> = read_frame(&mut server).await;
        assert!(matches!(result, Err(FrameError::TooLarge(_))));
    }

    #[tokio::test]
    async fn truncated_body_is_an_io_error() {
        let (mut client, mut server) = tokio::io::duplex(64);
        client.write_all(&10u32.to_be_bytes()).await.expect("write prefix");
        client.write_all(b"{\"ki").await.expect("write partial body");
        drop(client);
        let result: Result<Option<DaemonMessage>, _> = read_frame(&mut server).await;
        assert!(matches!(result, Err(FrameError::Io(_))));
    }
}
