use slog::{o, Drain, Logger};
use slog_async::Async;
use slog_term::{FullFormat, PlainSyncDecorator, TermDecorator};

/// Configuration for setting up the logger
#[derive(Debug, Clone)]
pub struct LoggerConfig {
    pub async_buffer_size: usize,
    pub use_color: bool,
    pub session_id: String,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            async_buffer_size: 1024,
            use_color: true,
            session_id: "default".to_string(),
        }
    }
}

/// Terminal logger handed to the session-scoped stores.
pub fn setup_logger(config: LoggerConfig) -> Logger {
    let decorator = {
        let builder = TermDecorator::new().stderr();
        let builder = if config.use_color {
            builder.force_color()
        } else {
            builder
        };
        builder.build()
    };

    let drain = FullFormat::new(decorator).build().fuse();

    let drain = Async::new(drain)
        .chan_size(config.async_buffer_size)
        .build()
        .fuse();

    Logger::root(
        drain,
        o!("version" => env!("CARGO_PKG_VERSION"), "session" => config.session_id),
    )
}

/// Synchronous plain-text logger writing to any sink; used where output must be captured.
pub fn plain_logger<W>(sink: W) -> Logger
where
    W: std::io::Write + Send + 'static,
{
    let decorator = PlainSyncDecorator::new(sink);
    let drain = FullFormat::new(decorator).build().fuse();
    Logger::root(drain, o!("version" => env!("CARGO_PKG_VERSION")))
}
