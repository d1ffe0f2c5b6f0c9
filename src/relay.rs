//! Console relay: lines from an input stream become text messages on a channel.

use std::future::Future;

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{error, info, warn};

use crate::channel::DataChannel;
use crate::Result;

pub const EXIT_COMMAND: &str = "exit";
pub const PROMPT: &str = "Enter message to send (type 'exit' to quit): ";

/// Where relayed lines go.
#[async_trait]
pub trait Outbound: Send + Sync {
    fn is_open(&self) -> bool;
    async fn send_text(&self, text: &str) -> Result<()>;
}

#[async_trait]
impl Outbound for DataChannel {
    fn is_open(&self) -> bool {
        DataChannel::is_open(self)
    }

    async fn send_text(&self, text: &str) -> Result<()> {
        DataChannel::send_text(self, text).await
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    Exit,
    EndOfInput,
    Signal(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayReport {
    pub reason: StopReason,
    pub sent: usize,
    /// Lines read while the channel was not open.
    pub dropped: usize,
    pub failed: usize,
}

/// Reads `input` line by line until `exit`, end of input or `stop` resolves.
/// Send failures and a closed channel are logged and never end the loop.
/// Bytes that are not UTF-8 are replaced, never rejected.
pub async fn run<R, W, O, S>(
    mut input: R,
    mut prompt: W,
    channel: &O,
    stop: S,
) -> Result<RelayReport>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
    O: Outbound + ?Sized,
    S: Future<Output = String>,
{
    let mut buf = Vec::new();
    tokio::pin!(stop);

    let mut report = RelayReport {
        reason: StopReason::EndOfInput,
        sent: 0,
        dropped: 0,
        failed: 0,
    };

    loop {
        prompt.write_all(PROMPT.as_bytes()).await?;
        prompt.flush().await?;

        buf.clear();
        let n = tokio::select! {
            n = input.read_until(b'\n', &mut buf) => n?,
            signal = &mut stop => {
                info!("Received {}, stopping relay", signal);
                report.reason = StopReason::Signal(signal);
                break;
            }
        };

        if n == 0 {
            info!("Input closed, stopping relay");
            break;
        }
        let line = String::from_utf8_lossy(&buf);
        let message = line.trim();
        if message == EXIT_COMMAND {
            info!("Exiting...");
            report.reason = StopReason::Exit;
            break;
        }

        if !channel.is_open() {
            warn!("Data channel is not open, message dropped: {}", message);
            report.dropped += 1;
            continue;
        }
        match channel.send_text(message).await {
            Ok(()) => report.sent += 1,
            Err(e) => {
                error!("Error sending message: {}", e);
                report.failed += 1;
            }
        }
    }

    Ok(report)
}

/// Resolves on Ctrl-C, or SIGTERM on unix, with the signal's name.
pub async fn stop_signal() -> String {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => "SIGINT".to_string(),
                    _ = terminate.recv() => "SIGTERM".to_string(),
                }
            }
            Err(e) => {
                warn!("SIGTERM handler unavailable: {}", e);
                ctrl_c().await
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c().await
    }
}

async fn ctrl_c() -> String {
    match tokio::signal::ctrl_c().await {
        Ok(()) => "SIGINT".to_string(),
        Err(e) => {
            warn!("Ctrl-C handler unavailable: {}", e);
            std::future::pending().await
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    use tokio::io::BufReader;

    use super::*;
    use crate::Error;

    #[derive(Default)]
    struct Recorder {
        closed: AtomicBool,
        fail: AtomicBool,
        sent: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Outbound for Recorder {
        fn is_open(&self) -> bool {
            !self.closed.load(Ordering::SeqCst)
        }

        async fn send_text(&self, text: &str) -> Result<()> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(Error::ChannelNotOpen("recorder".to_string()));
            }
            self.sent.lock().unwrap().push(text.to_string());
            Ok(())
        }
    }

    fn never() -> impl Future<Output = String> {
        std::future::pending()
    }

    #[tokio::test]
    async fn test_relays_until_exit() {
        let channel = Recorder::default();
        let input = BufReader::new(&b"hello\n  spaced  \nexit\nafter\n"[..]);
        let mut prompt = Vec::new();

        let report = run(input, &mut prompt, &channel, never()).await.unwrap();

        assert_eq!(report.reason, StopReason::Exit);
        assert_eq!(report.sent, 2);
        assert_eq!(*channel.sent.lock().unwrap(), vec!["hello", "spaced"]);
        assert_eq!(String::from_utf8(prompt).unwrap(), PROMPT.repeat(3));
    }

    #[tokio::test]
    async fn test_end_of_input() {
        let channel = Recorder::default();
        let input = BufReader::new(&b"one"[..]);
        let report = run(input, tokio::io::sink(), &channel, never())
            .await
            .unwrap();
        assert_eq!(report.reason, StopReason::EndOfInput);
        assert_eq!(*channel.sent.lock().unwrap(), vec!["one"]);
    }

    #[tokio::test]
    async fn test_closed_channel_drops_and_continues() {
        let channel = Recorder::default();
        channel.closed.store(true, Ordering::SeqCst);
        let input = BufReader::new(&b"a\nb\nexit\n"[..]);
        let report = run(input, tokio::io::sink(), &channel, never())
            .await
            .unwrap();
        assert_eq!(report.dropped, 2);
        assert_eq!(report.sent, 0);
        assert_eq!(report.reason, StopReason::Exit);
    }

    #[tokio::test]
    async fn test_send_failure_is_not_fatal() {
        let channel = Recorder::default();
        channel.fail.store(true, Ordering::SeqCst);
        let input = BufReader::new(&b"a\nb\n"[..]);
        let report = run(input, tokio::io::sink(), &channel, never())
            .await
            .unwrap();
        assert_eq!(report.failed, 2);
        assert_eq!(report.reason, StopReason::EndOfInput);
    }

    #[tokio::test]
    async fn test_invalid_utf8_line_is_relayed() {
        let channel = Recorder::default();
        let input = BufReader::new(&b"caf\xe9\nhello\nexit\n"[..]);
        let report = run(input, tokio::io::sink(), &channel, never())
            .await
            .unwrap();
        assert_eq!(report.reason, StopReason::Exit);
        assert_eq!(report.sent, 2);
        assert_eq!(
            *channel.sent.lock().unwrap(),
            vec!["caf\u{FFFD}", "hello"]
        );
    }

    #[tokio::test]
    async fn test_stop_future_interrupts_blocked_read() {
        let channel = Recorder::default();
        let (_writer, reader) = tokio::io::duplex(64);
        let report = run(
            BufReader::new(reader),
            tokio::io::sink(),
            &channel,
            async { "SIGTERM".to_string() },
        )
        .await
        .unwrap();
        assert_eq!(report.reason, StopReason::Signal("SIGTERM".to_string()));
    }
}
