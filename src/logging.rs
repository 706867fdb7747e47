use std::fs;
use std::path::Path;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const LOG_DIR: &str = "logs";

/// Initializes logging: human-readable console output plus a daily-rotated
/// JSON file under `logs/`. Safe to call once at process start.
pub fn init_logging() {
    init_logging_to(Path::new(LOG_DIR));
}

pub fn init_logging_to(dir: &Path) {
    let _ = fs::create_dir_all(dir);

    let file_appender = tracing_appender::rolling::daily(dir, "pipeline.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::from_default_env()
        .add_directive("order_pipeline=info".parse().expect("static directive"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().with_writer(file_writer))
        .with(fmt::layer().with_writer(std::io::stdout))
        .init();

    // The appender flushes on drop; the guard must outlive the process.
    std::mem::forget(guard);
}
