//! WebSocket connector built on tokio-tungstenite
//!
//! Each link runs in its own task: connect, report `Opened`, then pump
//! frames both ways until either side closes. Failures to connect are
//! reported the way a browser WebSocket reports them, an `Error` event
//! followed by `Closed`.

use super::{Connector, LinkCommand, LinkEnd, TransportEvent, TransportLink};
use crate::error::TransportError;
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const CLOSE_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Close code reported when the connection ended without a close frame
const ABNORMAL_CLOSURE: u16 = 1006;

/// Production [`Connector`] speaking WebSocket text frames
#[derive(Debug, Clone)]
pub struct WsConnector {
    connect_timeout: Duration,
}

impl Default for WsConnector {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

impl WsConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override how long the TCP + TLS + upgrade handshake may take
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }
}

impl Connector for WsConnector {
    fn open(&self, url: &str) -> TransportLink {
        let (link, end) = TransportLink::pair();
        tokio::spawn(run_link(url.to_string(), self.connect_timeout, end));
        link
    }
}

/// Report a failed connection attempt: error first, then close
fn report_connect_failure(end: &LinkEnd, error: TransportError) {
    let reason = error.to_string();
    let detail = match std::error::Error::source(&error) {
        Some(source) => format!("{reason}: {source}"),
        None => reason.clone(),
    };
    end.emit(TransportEvent::Error(detail));
    end.emit(TransportEvent::Closed {
        code: Some(ABNORMAL_CLOSURE),
        reason,
    });
}

/// Decode a binary frame as UTF-8 text when possible
fn decode_binary(data: &[u8]) -> Result<String, TransportError> {
    std::str::from_utf8(data)
        .map(str::to_owned)
        .map_err(|_| TransportError::UnsupportedFrame("binary frame is not UTF-8".to_string()))
}

async fn run_link(url: String, connect_timeout: Duration, mut end: LinkEnd) {
    debug!(url = %url, "Opening WebSocket connection");

    let connected =
        tokio::time::timeout(connect_timeout, tokio_tungstenite::connect_async(url.as_str())).await;

    let stream = match connected {
        Ok(Ok((stream, _response))) => stream,
        Ok(Err(e)) => {
            report_connect_failure(
                &end,
                TransportError::ConnectFailed {
                    url,
                    source: Box::new(e),
                },
            );
            return;
        }
        Err(_) => {
            report_connect_failure(
                &end,
                TransportError::ConnectFailed {
                    url,
                    source: format!("handshake timed out after {connect_timeout:?}").into(),
                },
            );
            return;
        }
    };

    if !end.emit(TransportEvent::Opened) {
        // Manager dropped the link while we were connecting
        return;
    }

    let (mut write, mut read) = stream.split();
    let mut accepting_commands = true;
    let mut close_deadline: Option<Instant> = None;
    let mut close_frame: Option<(u16, String)> = None;

    loop {
        tokio::select! {
            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    end.emit(TransportEvent::Message(text.as_str().to_owned()));
                }
                Some(Ok(Message::Binary(data))) => match decode_binary(&data) {
                    Ok(text) => {
                        end.emit(TransportEvent::Message(text));
                    }
                    Err(e) => {
                        end.emit(TransportEvent::Error(e.to_string()));
                    }
                },
                Some(Ok(Message::Close(frame))) => {
                    close_frame = Some(match frame {
                        Some(frame) => (u16::from(frame.code), frame.reason.as_str().to_owned()),
                        None => (1005, String::new()),
                    });
                    // Keep reading so tungstenite can finish the handshake
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    let error = TransportError::ReceiveFailed(Box::new(e));
                    end.emit(TransportEvent::Error(format!(
                        "{error}: {}",
                        std::error::Error::source(&error)
                            .map(|s| s.to_string())
                            .unwrap_or_default()
                    )));
                    break;
                }
                None => break,
            },

            command = end.commands.recv(), if accepting_commands => match command {
                Some(LinkCommand::Send(text)) => {
                    if let Err(e) = write.send(Message::text(text)).await {
                        let error = TransportError::SendFailed(Box::new(e));
                        warn!(url = %url, "WebSocket write failed: {}", error);
                        end.emit(TransportEvent::Error(error.to_string()));
                    }
                }
                Some(LinkCommand::Close) => {
                    debug!(url = %url, "Closing WebSocket connection");
                    accepting_commands = false;
                    close_deadline = Some(Instant::now() + CLOSE_HANDSHAKE_TIMEOUT);
                    if let Err(e) = write.close().await {
                        debug!("Close frame could not be written: {}", e);
                    }
                }
                None => {
                    // Manager side is gone; nobody is listening for events
                    let _ = write.close().await;
                    return;
                }
            },

            _ = tokio::time::sleep_until(close_deadline.unwrap_or_else(Instant::now)), if close_deadline.is_some() => {
                warn!(url = %url, "Server did not complete the close handshake in time");
                break;
            }
        }
    }

    let (code, reason) = close_frame.unwrap_or((ABNORMAL_CLOSURE, String::new()));
    end.emit(TransportEvent::Closed {
        code: Some(code),
        reason,
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_connect_timeout() {
        let connector = WsConnector::new();
        assert_eq!(connector.connect_timeout(), DEFAULT_CONNECT_TIMEOUT);

        let connector = WsConnector::new().with_connect_timeout(Duration::from_millis(250));
        assert_eq!(connector.connect_timeout(), Duration::from_millis(250));
    }

    #[test]
    fn test_decode_binary() {
        assert_eq!(decode_binary(b"{\"type\":\"x\"}").unwrap(), "{\"type\":\"x\"}");
        assert!(matches!(
            decode_binary(&[0xff, 0xfe]),
            Err(TransportError::UnsupportedFrame(_))
        ));
    }

    #[tokio::test]
    async fn test_refused_connection_reports_error_then_close() {
        // Port 1 on loopback is reserved and not listening
        let connector = WsConnector::new().with_connect_timeout(Duration::from_secs(5));
        let mut link = connector.open("ws://127.0.0.1:1/");

        let first = link.events.recv().await;
        assert!(matches!(first, Some(TransportEvent::Error(_))));

        let second = link.events.recv().await;
        assert!(matches!(
            second,
            Some(TransportEvent::Closed {
                code: Some(ABNORMAL_CLOSURE),
                ..
            })
        ));
    }
}
