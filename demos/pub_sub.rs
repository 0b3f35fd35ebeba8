//! Publisher and subscriber in one process.
//!
//! Run with `cargo run --example pub_sub`; set `RUST_LOG=zmqservice=debug`
//! to watch the pipeline.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use tracing_subscriber::EnvFilter;
use zmqservice::{Context, EndpointConfig, Publisher, Service};

const ADDRESS: &str = "tcp://127.0.0.1:5554";
const TICKS: u64 = 5;

fn main() -> zmqservice::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let ctx = Context::new();
    let publisher = Publisher::new(&ctx, ADDRESS)?;

    let mut subscriber = EndpointConfig::new(ADDRESS).subscriber(&ctx)?;
    subscriber.subscribe("log_line", |_: &str, line: String| {
        println!("line is: {line}");
        Ok(())
    })?;
    subscriber.subscribe("cap_line", |_: &str, line: String| {
        println!("line capitalized is: {}", line.to_uppercase());
        Ok(())
    })?;
    subscriber.subscribe("counter", |_: &str, n: u64| {
        println!("counter: {n}");
        Ok(())
    })?;

    let stop = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&stop);
    let worker = thread::spawn(move || subscriber.run(&flag));

    // subscribers that connect late miss earlier messages
    thread::sleep(Duration::from_millis(500));
    for counter in 0..TICKS {
        publisher.publish("log_line", "hello world")?;
        publisher.publish("cap_line", &format!("this is uppercase: tick {counter}"))?;
        publisher.publish("counter", &counter)?;
        thread::sleep(Duration::from_millis(200));
    }

    stop.store(true, Ordering::Release);
    match worker.join() {
        Ok(result) => result,
        Err(_) => {
            eprintln!("subscriber thread panicked");
            Ok(())
        }
    }
}
