//! editorlog-parse-worker - Subprocess for parsing a whole Unity Editor log.
//!
//! Runs in its own process so a huge log never holds memory in the caller.
//!
//! Usage: editorlog-parse-worker <file_path> [events_out]
//!
//! Output: JSON to stdout with event counts, log metadata and the byte
//! position live tailing should resume from. With `events_out`, every event
//! is also written there as JSON lines.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::time::Instant;

use editorlog_core::state::ParseWorkerOutput;
use editorlog_core::{EngineConfigExt, EventSink, JsonLinesSink, MemorySink, ParsingSession};
use editorlog_types::EngineConfig;
use memmap2::Mmap;
use tracing_subscriber::filter::EnvFilter;

/// Initialize logging, writing to EDITORLOG_LOG_PATH if set, otherwise stderr.
fn init_logging() {
    let filter = EnvFilter::builder()
        .with_default_directive(tracing::Level::INFO.into())
        .from_env_lossy();

    if let Ok(path) = std::env::var("EDITORLOG_LOG_PATH")
        && let Ok(file) = std::fs::OpenOptions::new().create(true).append(true).open(&path)
    {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_ansi(false)
            .with_writer(file)
            .init();
        return;
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    init_logging();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        tracing::error!(
            args = args.len(),
            "Usage: editorlog-parse-worker <file_path> [events_out]"
        );
        std::process::exit(1);
    }
    let file_path = PathBuf::from(&args[1]);
    let events_out = args.get(2).map(PathBuf::from);
    let config = EngineConfig::load();
    let timer = Instant::now();

    match parse_file(&file_path, events_out.as_deref(), &config, timer) {
        Ok(output) => match serde_json::to_string(&output) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize output");
                std::process::exit(1);
            }
        },
        Err(e) => {
            tracing::error!(error = %e, path = %file_path.display(), "Parse error");
            std::process::exit(1);
        }
    }
}

fn parse_file(
    file_path: &Path,
    events_out: Option<&Path>,
    config: &EngineConfig,
    timer: Instant,
) -> Result<ParseWorkerOutput, String> {
    let file = File::open(file_path).map_err(|e| format!("Failed to open file: {e}"))?;
    let len = file.metadata().map_err(|e| format!("Failed to stat file: {e}"))?.len();

    // Mapping a zero-length file fails on some platforms.
    let mmap = if len == 0 {
        None
    } else {
        Some(unsafe { Mmap::map(&file).map_err(|e| format!("Failed to mmap: {e}"))? })
    };
    let bytes: &[u8] = mmap.as_deref().unwrap_or(&[]);

    let mut sink = MemorySink::new();
    let mut session = ParsingSession::with_config(&config.parser);
    let chunk_size = config.parser.chunk_size.max(1);
    let mut offset = 0u64;
    for chunk in bytes.chunks(chunk_size) {
        session.feed(chunk, offset, &mut sink).map_err(|e| e.to_string())?;
        offset += chunk.len() as u64;
    }
    let summary = session.finish(&mut sink).map_err(|e| e.to_string())?;

    if let Some(path) = events_out {
        write_events(&sink, path)?;
    }

    tracing::debug!(
        events = sink.len(),
        lines = summary.lines_processed,
        "Parsed log file"
    );
    Ok(ParseWorkerOutput::from_sink(&sink, &summary, timer.elapsed().as_millis()))
}

fn write_events(sink: &MemorySink, path: &Path) -> Result<(), String> {
    let file = File::create(path).map_err(|e| format!("Failed to create events file: {e}"))?;
    let mut out = JsonLinesSink::new(BufWriter::new(file));
    for event in &sink.events {
        out.record(event.clone());
    }
    out.update_metadata(sink.metadata.clone());
    if out.failed() > 0 {
        return Err(format!(
            "Failed to write {} of {} event records to {}",
            out.failed(),
            out.failed() + out.written(),
            path.display()
        ));
    }
    tracing::debug!(written = out.written(), path = %path.display(), "Wrote events");
    Ok(())
}
