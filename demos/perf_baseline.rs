//! Call and broadcast throughput smoke benchmarks.
//!
//! Run with `cargo run --example perf_baseline --release` (optionally set
//! `ZMQSERVICE_BENCH_ITERS` to control the iteration count).

use std::env;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use zmqservice::{Authenticator, Context, EndpointConfig, Service};

const DEFAULT_ITERATIONS: usize = 10_000;
const SECRET: &str = "secret";

fn main() -> zmqservice::Result<()> {
    let iterations = iterations_from_env();
    println!("zmqservice perf baseline: iterations: {iterations}");
    println!("-----------------------------------------------------------------");

    let ctx = Context::new();
    bench_calls(&ctx, "req_rep_raw", None, iterations)?;
    bench_calls(&ctx, "req_rep_auth", Some(SECRET), iterations)?;
    bench_broadcast(&ctx, "pub_sub_auth", Some(SECRET), iterations)?;
    Ok(())
}

fn iterations_from_env() -> usize {
    env::var("ZMQSERVICE_BENCH_ITERS")
        .ok()
        .and_then(|raw| raw.parse::<usize>().ok())
        .filter(|iters| *iters > 0)
        .unwrap_or(DEFAULT_ITERATIONS)
}

fn config(address: &str, secret: Option<&str>) -> EndpointConfig {
    let config = EndpointConfig::new(address);
    match secret {
        Some(secret) => config.authenticator(Authenticator::new(secret)),
        None => config,
    }
}

fn bench_calls(
    ctx: &Context,
    label: &str,
    secret: Option<&str>,
    iterations: usize,
) -> zmqservice::Result<()> {
    let address = format!("inproc://{label}");
    let mut responder = config(&address, secret).responder(ctx)?;
    responder.register("add", |(x, y): (u64, u64)| Ok(x + y));
    let stop = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&stop);
    let server = thread::spawn(move || responder.run(&flag));

    let requester = config(&address, secret).requester(ctx)?;
    let start = Instant::now();
    for x in 0..iterations as u64 {
        let (sum, error) = requester.call::<_, u64>("add", (x, x + 1));
        debug_assert_eq!((sum, error), (Some(2 * x + 1), None));
    }
    report(label, iterations, start.elapsed());

    stop.store(true, Ordering::Release);
    server.join().unwrap_or(Ok(()))
}

fn bench_broadcast(
    ctx: &Context,
    label: &str,
    secret: Option<&str>,
    iterations: usize,
) -> zmqservice::Result<()> {
    let address = format!("inproc://{label}");
    let publisher = config(&address, secret).publisher(ctx)?;
    let mut subscriber = config(&address, secret).subscriber(ctx)?;
    subscriber.subscribe("test", |_: &str, _: u64| Ok(()))?;

    // wait until the subscription has reached the publisher
    loop {
        publisher.publish("test", &0u64)?;
        if subscriber.endpoint().poll_readable(Duration::from_millis(10))? {
            subscriber.process();
            break;
        }
    }
    while subscriber.endpoint().poll_readable(Duration::from_millis(10))? {
        subscriber.process();
    }

    let start = Instant::now();
    for n in 0..iterations as u64 {
        publisher.publish("test", &n)?;
        subscriber.process();
    }
    report(label, iterations, start.elapsed());
    Ok(())
}

fn report(label: &str, iterations: usize, elapsed: Duration) {
    let secs = elapsed.as_secs_f64().max(f64::MIN_POSITIVE);
    let us_per_op = elapsed.as_micros() as f64 / iterations as f64;
    let throughput = iterations as f64 / secs;
    println!("{label:<24} total={elapsed:?} | {us_per_op:>8.1} us/op | {throughput:>10.0} ops/s");
}
