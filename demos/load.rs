use std::error::Error;
use std::sync::Arc;
use std::time::Instant;

use fanlog::null_sink::MemorySink;
use fanlog::{Level, Logger, Settings};

fn main() -> Result<(), Box<dyn Error>> {
    let settings = Settings::default().with_overrides([
        ("console_logging", "false"),
        ("log_file", ""),
        ("dispatch.workers", "4"),
        ("dispatch.queue_capacity", "4096"),
    ])?;
    let sink = Arc::new(MemorySink::new());
    let logger = Logger::builder(settings).sink(sink.clone()).build()?;

    let n: u64 = 100_000;
    let start = Instant::now();

    for i in 0..n {
        let message = format!("load test error {i}");
        logger.error(&message);
    }

    let report = logger.shutdown();
    let elapsed = start.elapsed();
    let stats = logger.stats();
    println!(
        "sent {} records in {:?} (~{:.0} rec/s), written {}, dropped {}, drained {}",
        n,
        elapsed,
        n as f64 / elapsed.as_secs_f64(),
        sink.len(),
        stats.dropped,
        report.drained
    );
    println!("ERROR count: {}", logger.counters().get(Level::Error));
    Ok(())
}
