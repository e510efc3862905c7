//! Basic usage example for conduit sessions.
//!
//! Connects to a line-based server, optionally over TLS, sends one message
//! and prints whatever the server replies for a second:
//!
//! ```text
//! cargo run --example echo_client -- <host> <port> [ca.pem client.pem client.key]
//! ```

use bytes::Bytes;
use conduit_session::{Framing, Session, SessionConfig, SessionEvent, TlsCredentials};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut args = std::env::args().skip(1);
    let host = args.next().unwrap_or_else(|| "localhost".to_string());
    let port: u32 = args.next().unwrap_or_else(|| "8081".to_string()).parse()?;
    let credentials = match (args.next(), args.next(), args.next()) {
        (Some(ca), Some(cert), Some(key)) => Some(TlsCredentials::new(ca, cert, key)),
        _ => None,
    };

    let (events_tx, mut events_rx) = mpsc::channel(16);
    let session = Session::new(SessionConfig {
        framing: Framing::Fragmented {
            delimiter: b'\n',
            max_len: 16 * 1024,
            handler: Arc::new(|msg: Bytes| {
                println!("message from server: {}", String::from_utf8_lossy(&msg));
            }),
        },
        events: Some(events_tx),
    });

    session.start(&host, port, credentials).await?;
    println!("client started");

    session.send_msg(b"Hello server!").await?;

    // Print replies for a second, then stop.
    let _ = tokio::time::timeout(Duration::from_secs(1), async {
        while let Some(event) = events_rx.recv().await {
            if event == SessionEvent::Disconnected {
                println!("server closed the connection");
                break;
            }
        }
    })
    .await;

    session.stop().await;
    println!("client stopped");
    Ok(())
}
