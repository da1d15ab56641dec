//! Message injection utility
//!
//! Connects to an endpoint, sends one typed JSON message and optionally
//! prints whatever comes back for a while.
//!
//! ## Usage
//!
//! ```bash
//! # Simple message
//! inject-message --url ws://localhost:9001 --type chat-message --data '{"text": "hi"}'
//!
//! # Send and print replies for five seconds
//! inject-message --url ws://localhost:9001 --type ping --listen-secs 5
//! ```

use clap::Parser;
use serde_json::{json, Map, Value};
use std::process;
use std::time::Duration;
use wsrelay::manager::{ConnectionManager, Handler, TYPE_FIELD, WILDCARD};
use wsrelay::observability::init_default_logging;
use wsrelay::transport::WsConnector;

#[derive(Parser)]
#[command(
    name = "inject-message",
    about = "Send one typed JSON message over a WebSocket connection"
)]
struct Args {
    /// Endpoint URL
    #[arg(long, env = "WSRELAY_URL")]
    url: String,

    /// Value of the `type` field
    #[arg(long = "type")]
    message_type: String,

    /// Extra fields as a JSON object
    #[arg(long)]
    data: Option<String>,

    /// Seconds to wait for the connection to open
    #[arg(long, default_value = "10")]
    connect_timeout_secs: u64,

    /// Seconds to print inbound messages after sending
    #[arg(long, default_value = "0")]
    listen_secs: u64,
}

/// Merge `type` into the extra fields; `type` always wins
fn build_payload(message_type: &str, data: Option<&str>) -> Result<Value, String> {
    let mut fields = match data {
        None => Map::new(),
        Some(raw) => match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(fields)) => fields,
            Ok(other) => return Err(format!("--data must be a JSON object, got {other}")),
            Err(e) => return Err(format!("--data is not valid JSON: {e}")),
        },
    };
    fields.insert(TYPE_FIELD.to_string(), json!(message_type));
    Ok(Value::Object(fields))
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    init_default_logging();

    let payload = match build_payload(&args.message_type, args.data.as_deref()) {
        Ok(payload) => payload,
        Err(e) => {
            eprintln!("❌ {e}");
            process::exit(2);
        }
    };

    let manager = ConnectionManager::new(WsConnector::new());
    if args.listen_secs > 0 {
        manager.on(
            WILDCARD,
            Handler::infallible(|message| println!("📨 {}", message.payload())),
        );
    }

    println!("Connecting to {}...", args.url);
    manager.connect(&args.url);

    if let Err(e) = manager
        .wait_until_open(Duration::from_secs(args.connect_timeout_secs))
        .await
    {
        eprintln!("❌ Could not connect: {e}");
        manager.disconnect();
        process::exit(1);
    }

    manager.send(&payload);
    println!("✅ Sent: {payload}");

    if args.listen_secs > 0 {
        println!("Listening for {}s...", args.listen_secs);
        tokio::time::sleep(Duration::from_secs(args.listen_secs)).await;
    } else {
        // Give the writer a moment to flush before closing
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    manager.disconnect();
}
