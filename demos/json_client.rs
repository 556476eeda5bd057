//! JSON client - structured messages.
//!
//! This demo demonstrates:
//! - Connecting with a typed JSON codec
//! - Handling decode errors in a subscriber
//! - Polling the most recent message with `last`
//!
//! # Running
//!
//! ```sh
//! cargo run --example json_client -- localhost 4000
//! ```

use std::time::Duration;

use linewire::{JsonCodec, LinewireError, Stream, Subscriber};
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

/// Command sent to the server.
#[derive(Serialize, Deserialize, Debug)]
struct Command {
    name: String,
    speed: f64,
}

/// Prints commands and counts malformed lines.
struct Printer;

impl Subscriber<Command> for Printer {
    fn on_message(&self, message: &Command) {
        println!("<< {} at {:.2}", message.name, message.speed);
    }

    fn on_decode_error(&self, error: &LinewireError) {
        eprintln!("malformed message: {error}");
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .init();

    let mut args = std::env::args().skip(1);
    let host = args.next().unwrap_or_else(|| "localhost".to_string());
    let port: u16 = args.next().as_deref().unwrap_or("4000").parse()?;

    let (stream, driver) = Stream::builder(JsonCodec::<Command>::new())
        .span(tracing::info_span!("json_client", %host, port))
        .connect(host.clone(), port)?;
    let driver = tokio::spawn(driver.run());

    stream.subscribe(Printer);

    for i in 0..10 {
        stream.publish(&Command {
            name: format!("move-{i}"),
            speed: 0.1 * f64::from(i),
        })?;
        tokio::time::sleep(Duration::from_millis(200)).await;

        match stream.last() {
            Ok(Some(latest)) => println!("latest: {latest:?}"),
            Ok(None) => println!("nothing received yet"),
            Err(e) => println!("latest is malformed: {e}"),
        }
    }

    stream.close_when_done()?;
    driver.await??;
    Ok(())
}
