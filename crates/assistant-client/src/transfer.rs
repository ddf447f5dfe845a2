//! Request/response transfer over an established connection.
//!
//! The server enforces no timeout of its own; the inactivity bound here is
//! a purely local safeguard. Aborting on it does not release the server's
//! slot or notify the server.

use std::io;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;

use assistant_protocol::{BUSY_MARKER, END_MARKER, Greeting, find_marker};

/// Attempted read size per poll.
const READ_CHUNK: usize = 5;

/// Consecutive empty reads tolerated before reporting a local timeout.
const MAX_BLANK_READS: u32 = 12;

/// Inactivity bound for a single read attempt.
const READ_WAIT: Duration = Duration::from_secs(6);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveOutcome {
    /// Response terminator seen; the full answer was delivered.
    Complete,
    /// Server reported the slot busy.
    Busy,
    /// Nothing arrived within the local inactivity bound.
    TimedOut,
}

/// Read the admission reply sent right after connect.
///
/// `None` means the connection closed or went silent before a recognizable
/// greeting arrived.
pub async fn read_greeting<R>(reader: &mut R) -> io::Result<Option<Greeting>>
where
    R: AsyncRead + Unpin,
{
    let mut received = Vec::new();
    let mut buf = [0u8; READ_CHUNK];
    loop {
        let n = match timeout(READ_WAIT, reader.read(&mut buf)).await {
            Ok(result) => result?,
            Err(_) => return Ok(None),
        };
        if n == 0 {
            return Ok(None);
        }
        received.extend_from_slice(&buf[..n]);
        if let Some(greeting) = Greeting::from_bytes(&received) {
            return Ok(Some(greeting));
        }
    }
}

/// Send one request: the prompt text followed by the request terminator.
pub async fn send_prompt<W>(writer: &mut W, prompt: &str) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(prompt.as_bytes()).await?;
    writer.write_all(END_MARKER).await?;
    Ok(())
}

/// Stream the reply, handing displayable text to `on_chunk` as it arrives.
///
/// Marker bytes never reach `on_chunk`: printing trails the buffer by one
/// marker length so a terminator split across reads is held back, and the
/// newline belonging to the response terminator is stripped.
pub async fn receive_reply<R, F>(reader: &mut R, mut on_chunk: F) -> io::Result<ReceiveOutcome>
where
    R: AsyncRead + Unpin,
    F: FnMut(&str),
{
    let mut response: Vec<u8> = Vec::new();
    let mut printed = 0usize;
    let mut blanks = 0u32;
    let mut buf = [0u8; READ_CHUNK];

    loop {
        let n = match timeout(READ_WAIT, reader.read(&mut buf)).await {
            Ok(result) => result?,
            // An idle wait counts like an empty read.
            Err(_) => 0,
        };
        if n == 0 {
            blanks += 1;
            if blanks > MAX_BLANK_READS {
                return Ok(ReceiveOutcome::TimedOut);
            }
            continue;
        }
        blanks = 0;
        response.extend_from_slice(&buf[..n]);

        if find_marker(&response, BUSY_MARKER).is_some() {
            return Ok(ReceiveOutcome::Busy);
        }

        if let Some(at) = find_marker(&response, END_MARKER) {
            let mut end = at;
            if response[..end].ends_with(b"\n") {
                end -= 1;
            }
            if end > printed {
                on_chunk(&String::from_utf8_lossy(&response[printed..end]));
            }
            return Ok(ReceiveOutcome::Complete);
        }

        // Hold back a potential marker prefix at the tail of the buffer.
        let safe = response.len().saturating_sub(END_MARKER.len() - 1);
        if safe > printed {
            on_chunk(&String::from_utf8_lossy(&response[printed..safe]));
            printed = safe;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    async fn collect_reply(payload: &[u8]) -> (ReceiveOutcome, String) {
        let (mut client, mut server) = tokio::io::duplex(1024);
        server.write_all(payload).await.unwrap();
        drop(server);

        let mut shown = String::new();
        let outcome = receive_reply(&mut client, |chunk| shown.push_str(chunk))
            .await
            .unwrap();
        (outcome, shown)
    }

    #[tokio::test]
    async fn complete_reply_strips_the_terminator() {
        let (outcome, shown) = collect_reply(b"Hello world\n<END>").await;
        assert_eq!(outcome, ReceiveOutcome::Complete);
        assert_eq!(shown, "Hello world");
    }

    #[tokio::test]
    async fn terminator_split_across_reads_is_never_shown() {
        let (mut client, mut server) = tokio::io::duplex(1024);

        let mut shown = String::new();
        let receive = tokio::spawn(async move {
            let outcome = receive_reply(&mut client, |chunk| shown.push_str(chunk))
                .await
                .unwrap();
            (outcome, shown)
        });

        server.write_all(b"answer\n<E").await.unwrap();
        tokio::task::yield_now().await;
        server.write_all(b"ND>").await.unwrap();
        drop(server);

        let (outcome, shown) = receive.await.unwrap();
        assert_eq!(outcome, ReceiveOutcome::Complete);
        assert_eq!(shown, "answer");
    }

    #[tokio::test]
    async fn busy_signal_is_reported() {
        let (outcome, shown) = collect_reply(b"<BSY>").await;
        assert_eq!(outcome, ReceiveOutcome::Busy);
        assert_eq!(shown, "");
    }

    #[tokio::test]
    async fn silent_close_times_out_locally() {
        let (outcome, shown) = collect_reply(b"partial answer").await;
        assert_eq!(outcome, ReceiveOutcome::TimedOut);
        // Everything safely printable before the stall was still shown.
        assert_eq!(shown, "partial an");
    }

    #[tokio::test]
    async fn greeting_granted_and_busy() {
        let (mut client, mut server) = tokio::io::duplex(64);
        server.write_all(b"<OK_>").await.unwrap();
        assert_eq!(
            read_greeting(&mut client).await.unwrap(),
            Some(Greeting::Granted)
        );

        let (mut client, mut server) = tokio::io::duplex(64);
        server.write_all(b"<BSY>").await.unwrap();
        assert_eq!(
            read_greeting(&mut client).await.unwrap(),
            Some(Greeting::Busy)
        );

        let (mut client, server) = tokio::io::duplex(64);
        drop(server);
        assert_eq!(read_greeting(&mut client).await.unwrap(), None);
    }

    #[tokio::test]
    async fn send_prompt_appends_the_request_terminator() {
        let (mut client, mut server) = tokio::io::duplex(64);
        send_prompt(&mut client, "Ping").await.unwrap();
        drop(client);

        let mut sent = Vec::new();
        tokio::io::AsyncReadExt::read_to_end(&mut server, &mut sent)
            .await
            .unwrap();
        assert_eq!(sent, b"Ping<END>");
    }
}
