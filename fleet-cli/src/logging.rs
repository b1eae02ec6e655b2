//! Logging init for the fleet daemon (grounded in the teacher's
//! `graphweave-cli::logging::init`, adapted for a long-running process: logs
//! go to stderr by default rather than a sink, since there is no single reply
//! whose stdout must stay clean.
//!
//! Reads `RUST_LOG` (default `"info"`) and, when `LOG_FILE` is set, also
//! appends plain-text logs (ANSI stripped) to that file.

use std::fs::OpenOptions;
use std::io::{self, Write};

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;

use crate::log_format::TextWithSpanIds;

/// Strips ANSI CSI escape sequences byte-by-byte so a `LOG_FILE` stays plain
/// text even though the console layer renders color.
struct StripAnsiWriter<W: Write> {
    inner: W,
    in_escape: bool,
}

impl<W: Write> StripAnsiWriter<W> {
    fn new(inner: W) -> Self {
        Self {
            inner,
            in_escape: false,
        }
    }
}

impl<W: Write> Write for StripAnsiWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut plain = Vec::with_capacity(buf.len());
        for &byte in buf {
            if self.in_escape {
                // CSI sequences end at a byte in the 0x40..=0x7E range.
                if (0x40..=0x7e).contains(&byte) {
                    self.in_escape = false;
                }
                continue;
            }
            if byte == 0x1b {
                self.in_escape = true;
                continue;
            }
            plain.push(byte);
        }
        self.inner.write_all(&plain)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Initializes the global tracing subscriber: a console layer (stderr) plus,
/// when `LOG_FILE` is set, a second plain-text file layer.
pub fn init() -> Result<(), Box<dyn std::error::Error>> {
    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stderr)
        .with_filter(env_filter());

    let file_layer = match std::env::var("LOG_FILE") {
        Ok(path) => {
            let file = OpenOptions::new().create(true).append(true).open(&path)?;
            Some(
                tracing_subscriber::fmt::layer()
                    .event_format(TextWithSpanIds::new())
                    .with_writer(move || StripAnsiWriter::new(file.try_clone().expect("clone log file handle")))
                    .with_filter(env_filter()),
            )
        }
        Err(_) => None,
    };

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .try_init()?;
    Ok(())
}
