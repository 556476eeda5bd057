//! Echo client - raw text lines.
//!
//! This demo demonstrates:
//! - Connecting with the raw codec
//! - Printing every received line from a subscriber
//! - Publishing lines read from stdin
//! - Blocking `get` from a consumer thread
//!
//! # Running against a line echo server
//!
//! ```sh
//! ncat -l -k 1234 --exec /bin/cat &
//! RUST_LOG=linewire=debug cargo run --example echo_client -- localhost 1234
//! ```

use std::time::Duration;

use linewire::{RawCodec, Stream, DEFAULT_HOST, DEFAULT_PORT};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let mut args = std::env::args().skip(1);
    let host = args.next().unwrap_or_else(|| DEFAULT_HOST.to_string());
    let port = match args.next() {
        Some(port) => port.parse()?,
        None => DEFAULT_PORT,
    };

    let (stream, driver) = Stream::builder(RawCodec).capacity(10).connect(host, port)?;
    let driver = tokio::spawn(driver.run());

    stream.subscribe(|line: &String| println!("<< {line}"));

    // A consumer thread waiting on the history instead of subscribing.
    let watcher = {
        let stream = stream.clone();
        std::thread::spawn(move || loop {
            match stream.get(Some(Duration::from_secs(5))) {
                Ok(Some(line)) => eprintln!("watcher saw: {line}"),
                Ok(None) => eprintln!("watcher: nothing in the last 5s"),
                Err(_) => break,
            }
        })
    };

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = stdin.next_line().await? {
        if let Err(e) = stream.publish(&line) {
            eprintln!("Failed to publish: {e}");
            break;
        }
    }

    stream.close_when_done().ok();
    driver.await??;
    watcher.join().ok();
    Ok(())
}
