#![cfg(feature = "webhook")]

use std::error::Error;
use std::fmt;
use std::time::Duration;

use mockito::Matcher;

use fanlog::{LogContext, Logger, Settings};

#[derive(Debug)]
struct ValueError(&'static str);

impl fmt::Display for ValueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

impl Error for ValueError {}

fn logger(url: &str) -> Logger {
    let settings = Settings::default()
        .with_overrides([
            ("console_logging", "false"),
            ("log_file", ""),
            ("notifications.webhook_url", url),
            ("dispatch.notification_timeout_ms", "2000"),
        ])
        .unwrap();
    Logger::new(settings).unwrap()
}

#[test]
fn exception_posts_summary_to_webhook() {
    let mut server = mockito::Server::new();
    let mock = server
        .mock("POST", "/alerts")
        .match_header("content-type", "text/plain; charset=utf-8")
        .match_body(Matcher::Regex(
            "ValueError: Invalid credentials".to_string(),
        ))
        .with_status(200)
        .expect(1)
        .create();

    let logger = logger(&format!("{}/alerts", server.url()));
    LogContext::with([("request_id", "12345")], || {
        logger.log_exception(&ValueError("Invalid credentials"), "Login failed");
    });

    assert!(logger.flush(Duration::from_secs(5)));
    mock.assert();
    assert_eq!(logger.stats().notification_failures, 0);
}

#[test]
fn rejected_notification_is_counted_not_raised() {
    let mut server = mockito::Server::new();
    let mock = server
        .mock("POST", "/alerts")
        .with_status(500)
        .with_body("upstream down")
        .expect(1)
        .create();

    let logger = logger(&format!("{}/alerts", server.url()));
    logger.log_exception(&ValueError("boom"), "job failed");

    assert!(logger.flush(Duration::from_secs(5)));
    mock.assert();
    assert_eq!(logger.stats().notification_failures, 1);
    assert_eq!(logger.counters().total(), 1);
}

#[test]
fn unreachable_webhook_is_counted() {
    // Port 9 (discard) is closed on test machines, so the connect fails.
    let logger = logger("http://127.0.0.1:9/alerts");
    logger.log_exception(&ValueError("boom"), "");

    assert!(logger.flush(Duration::from_secs(5)));
    assert_eq!(logger.stats().notification_failures, 1);
}
