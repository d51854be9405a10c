use chrono::Utc;
use log::{info, LevelFilter};
use std::io::Write;
use std::str::FromStr;

/// Installs the `env_logger` backend with the inbox line format.
///
/// `RUST_LOG` wins when set; otherwise `level` (e.g. "info", "debug") is used.
/// Calling it twice is harmless: the second call is ignored.
pub fn init_logger(level: &str) {
    let fallback = LevelFilter::from_str(level).unwrap_or(LevelFilter::Info);
    let mut builder = env_logger::Builder::new();
    builder.filter_level(fallback);
    if let Ok(filters) = std::env::var("RUST_LOG") {
        builder.parse_filters(&filters);
    }
    let res = builder
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}] [{}] [{}:{}] {}",
                Utc::now().format("%Y-%m-%d %H:%M:%S UTC"),
                record.level(),
                record.file().unwrap_or("unknown"),
                record.line().unwrap_or(0),
                record.args()
            )
        })
        .try_init();

    if res.is_ok() {
        info!("RYD inbox logger initialized (level={})", fallback);
    }
}
