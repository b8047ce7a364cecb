use std::error::Error;
use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde_json::json;

use fanlog::env::{env_or, FANLOG_CONFIG_ENV};
use fanlog::{Fields, LogContext, Logger, Settings};

#[derive(Debug)]
struct ValueError(&'static str);

impl fmt::Display for ValueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

impl Error for ValueError {}

fn login() -> Result<(), ValueError> {
    Err(ValueError("Invalid credentials"))
}

fn fields(value: serde_json::Value) -> Fields {
    match value {
        serde_json::Value::Object(map) => map,
        _ => Fields::new(),
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    // FANLOG_CONFIG points at a YAML file; without one the defaults apply.
    let path = env_or(FANLOG_CONFIG_ENV, "fanlog_config.yml");
    let settings = if Path::new(&path).exists() {
        Settings::from_file(&path)?
    } else {
        Settings::default()
    };
    let logger = Logger::new(settings.with_env_overrides()?)?;

    logger.debug("This is a debug message");
    logger.info("This is an info message");
    logger.warning("This is a warning message");
    logger.error("This is an error message");
    logger.critical("This is a critical message");

    let additional = fields(json!({
        "User": {"id": 12345, "name": "John Doe"},
        "Operation": "Data Processing",
    }));
    logger.info(("Data processing completed", &additional));

    LogContext::with([("request_id", "12345"), ("user_id", "john_doe")], || {
        logger.info("User login attempt");
        if let Err(e) = login() {
            logger.log_exception(&e, "Login failed");
        }
    });

    let sensitive = fields(json!({
        "password": "secret_password",
        "credit_card_number": "1234-5678-9876-5432",
    }));
    logger.info(("User payment processing", &sensitive));

    logger.flush(Duration::from_secs(5));
    if let Some(text) = logger.metrics() {
        print!("{text}");
    }
    Ok(())
}
