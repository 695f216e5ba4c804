use std::net::SocketAddr;
use std::time::Duration;
use log::debug;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use super::cipher::Cipher;
use super::messages::ControlMessage;
use crate::{Error, Result};

pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

pub const CHUNK_SIZE: usize = 32 * 1024;

// room for the nonce and tag around a sealed chunk
const CHUNK_SLACK: usize = 1024;

async fn write_frame<W>(writer: &mut W, frame: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    if frame.len() > MAX_FRAME_LEN {
        return Err(Error::FrameTooLarge(frame.len()));
    }

    writer.write_u32(frame.len() as u32).await?;
    writer.write_all(frame).await?;
    writer.flush().await?;
    Ok(())
}

async fn read_frame<R>(reader: &mut R, limit: usize) -> Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let len = reader.read_u32().await? as usize;
    if len > limit {
        return Err(Error::FrameTooLarge(len));
    }

    let mut frame = vec![0u8; len];
    reader.read_exact(&mut frame).await?;
    Ok(frame)
}

pub async fn write_message<W>(writer: &mut W, cipher: &dyn Cipher, message: &ControlMessage) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let json = serde_json::to_vec(message)?;
    write_frame(writer, &cipher.encrypt(&json)?).await
}

/// Reads exactly one frame. Nothing past the frame is consumed, so attachment
/// chunks that follow stay in the stream.
pub async fn read_message<R>(reader: &mut R, cipher: &dyn Cipher) -> Result<ControlMessage>
where
    R: AsyncRead + Unpin,
{
    let frame = read_frame(reader, MAX_FRAME_LEN).await?;
    let json = cipher.decrypt(&frame)?;
    Ok(serde_json::from_slice(&json)?)
}

// an empty chunk marks the end of an attachment
pub async fn write_chunk<W>(writer: &mut W, cipher: &dyn Cipher, chunk: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    if chunk.len() > CHUNK_SIZE {
        return Err(Error::FrameTooLarge(chunk.len()));
    }
    write_frame(writer, &cipher.encrypt(chunk)?).await
}

pub async fn read_chunk<R>(reader: &mut R, cipher: &dyn Cipher) -> Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let frame = read_frame(reader, CHUNK_SIZE + CHUNK_SLACK).await?;
    let chunk = cipher.decrypt(&frame)?;
    if chunk.len() > CHUNK_SIZE {
        return Err(Error::FrameTooLarge(chunk.len()));
    }
    Ok(chunk)
}

pub async fn connect(addr: SocketAddr, limit: Duration) -> Result<TcpStream> {
    match timeout(limit, TcpStream::connect(addr)).await {
        Ok(stream) => Ok(stream?),
        Err(_) => Err(Error::Transport(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            format!("connecting to {} timed out", addr),
        ))),
    }
}

pub async fn send_to(addr: SocketAddr, cipher: &dyn Cipher, message: &ControlMessage, limit: Duration) -> Result<()> {
    let mut stream = connect(addr, limit).await?;
    write_message(&mut stream, cipher, message).await?;
    stream.shutdown().await?;
    debug!("Sent {} to {}", message.kind(), addr);
    Ok(())
}

/// One-shot exchange: connect, send, wait for a single reply. `limit` bounds
/// the whole exchange.
pub async fn request(
    addr: SocketAddr,
    cipher: &dyn Cipher,
    message: &ControlMessage,
    limit: Duration,
) -> Result<ControlMessage> {
    match timeout(limit, exchange(addr, cipher, message)).await {
        Ok(reply) => reply,
        Err(_) => Err(Error::Transport(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            format!("no reply from {} to {}", addr, message.kind()),
        ))),
    }
}

async fn exchange(addr: SocketAddr, cipher: &dyn Cipher, message: &ControlMessage) -> Result<ControlMessage> {
    let mut stream = TcpStream::connect(addr).await?;
    write_message(&mut stream, cipher, message).await?;
    read_message(&mut stream, cipher).await
}

pub async fn send_chunks<R, W>(source: &mut R, downstream: &mut W, cipher: &dyn Cipher) -> Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut chunk = vec![0u8; CHUNK_SIZE];
    let mut total = 0u64;

    loop {
        let n = source.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        write_chunk(downstream, cipher, &chunk[..n]).await?;
        total += n as u64;
    }

    write_chunk(downstream, cipher, &[]).await?;
    downstream.shutdown().await?;
    Ok(total)
}

// each chunk is opened and resealed; closing before the end marker is an error
pub async fn relay_chunks<R, W>(upstream: &mut R, downstream: &mut W, cipher: &dyn Cipher) -> Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut total = 0u64;

    loop {
        let chunk = read_chunk(upstream, cipher).await?;
        write_chunk(downstream, cipher, &chunk).await?;
        if chunk.is_empty() {
            break;
        }
        total += chunk.len() as u64;
    }

    downstream.shutdown().await?;
    Ok(total)
}

pub async fn receive_chunks<R, W>(upstream: &mut R, sink: &mut W, cipher: &dyn Cipher) -> Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut total = 0u64;

    loop {
        let chunk = read_chunk(upstream, cipher).await?;
        if chunk.is_empty() {
            break;
        }
        sink.write_all(&chunk).await?;
        total += chunk.len() as u64;
    }

    sink.flush().await?;
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::cipher::SharedKeyCipher;
    use crate::protocol::messages::DataMessage;
    use std::time::Instant;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn frame_leaves_following_chunks_untouched() {
        let cipher = SharedKeyCipher::from_passphrase("k");
        let (mut a, mut b) = tokio::io::duplex(1024);

        let message = ControlMessage::Data(DataMessage::attachment(1, "node1", 2, "node2"));
        write_message(&mut a, &cipher, &message).await.unwrap();
        write_chunk(&mut a, &cipher, b"raw-bytes").await.unwrap();
        drop(a);

        assert_eq!(read_message(&mut b, &cipher).await.unwrap(), message);
        assert_eq!(read_chunk(&mut b, &cipher).await.unwrap(), b"raw-bytes");
    }

    #[tokio::test]
    async fn oversized_length_is_rejected() {
        let cipher = SharedKeyCipher::from_passphrase("k");
        let (mut a, mut b) = tokio::io::duplex(64);
        a.write_u32((MAX_FRAME_LEN + 1) as u32).await.unwrap();

        assert!(matches!(
            read_message(&mut b, &cipher).await,
            Err(Error::FrameTooLarge(_))
        ));
    }

    #[tokio::test]
    async fn oversized_chunk_is_rejected() {
        let cipher = SharedKeyCipher::from_passphrase("k");
        let (mut a, mut b) = tokio::io::duplex(64);
        a.write_u32((CHUNK_SIZE + CHUNK_SLACK + 1) as u32).await.unwrap();

        assert!(matches!(read_chunk(&mut b, &cipher).await, Err(Error::FrameTooLarge(_))));
    }

    #[tokio::test]
    async fn wrong_key_is_rejected() {
        let (mut a, mut b) = tokio::io::duplex(1024);
        write_message(&mut a, &SharedKeyCipher::from_passphrase("a"), &ControlMessage::Probe)
            .await
            .unwrap();

        let result = read_message(&mut b, &SharedKeyCipher::from_passphrase("b")).await;
        assert!(matches!(result, Err(Error::Decrypt)));
    }

    #[tokio::test]
    async fn attachment_bytes_are_sealed_on_the_wire() {
        let cipher = SharedKeyCipher::from_passphrase("k");
        let secret = b"TOP-SECRET-AUDIO-PAYLOAD".to_vec();
        let mut wire = Vec::new();

        let sent = send_chunks(&mut secret.as_slice(), &mut wire, &cipher).await.unwrap();
        assert_eq!(sent, secret.len() as u64);
        assert!(!wire.windows(secret.len()).any(|w| w == secret.as_slice()));

        let mut received = Vec::new();
        receive_chunks(&mut wire.as_slice(), &mut received, &cipher).await.unwrap();
        assert_eq!(received, secret);
    }

    #[tokio::test]
    async fn tampered_chunk_fails_closed() {
        let cipher = SharedKeyCipher::from_passphrase("k");
        let mut wire = Vec::new();
        send_chunks(&mut &b"payload"[..], &mut wire, &cipher).await.unwrap();
        wire[10] ^= 0x01;

        let mut received = Vec::new();
        let result = receive_chunks(&mut wire.as_slice(), &mut received, &cipher).await;
        assert!(matches!(result, Err(Error::Decrypt)));
        assert!(received.is_empty());
    }

    #[tokio::test]
    async fn truncated_attachment_is_an_error() {
        let cipher = SharedKeyCipher::from_passphrase("k");
        let mut wire = Vec::new();
        write_chunk(&mut wire, &cipher, b"first half").await.unwrap();

        let mut received = Vec::new();
        let result = receive_chunks(&mut wire.as_slice(), &mut received, &cipher).await;
        assert!(matches!(result, Err(Error::Transport(_))));
    }

    #[tokio::test]
    async fn relays_large_payload_in_chunks() {
        let cipher = SharedKeyCipher::from_passphrase("k");
        let payload: Vec<u8> = (0..(CHUNK_SIZE * 3 + 17)).map(|i| (i % 251) as u8).collect();
        let (mut up_w, mut up_r) = tokio::io::duplex(CHUNK_SIZE);
        let (mut down_w, mut down_r) = tokio::io::duplex(CHUNK_SIZE);

        let expected = payload.clone();
        let writer = tokio::spawn(async move {
            let cipher = SharedKeyCipher::from_passphrase("k");
            send_chunks(&mut payload.as_slice(), &mut up_w, &cipher).await.unwrap();
        });
        let reader = tokio::spawn(async move {
            let cipher = SharedKeyCipher::from_passphrase("k");
            let mut received = Vec::new();
            receive_chunks(&mut down_r, &mut received, &cipher).await.unwrap();
            received
        });

        let total = relay_chunks(&mut up_r, &mut down_w, &cipher).await.unwrap();
        writer.await.unwrap();
        assert_eq!(total as usize, expected.len());
        assert_eq!(reader.await.unwrap(), expected);
    }

    #[tokio::test]
    async fn request_limit_covers_the_whole_exchange() {
        let cipher = SharedKeyCipher::from_passphrase("k");
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (_stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let limit = Duration::from_millis(300);
        let started = Instant::now();
        let result = request(addr, &cipher, &ControlMessage::Probe, limit).await;
        assert!(matches!(result, Err(Error::Transport(_))));
        assert!(started.elapsed() < limit * 2);
    }
}
