use std::convert::Infallible;

use chrono::TimeDelta;
use editorlog_core::events::{AssetImport, LogEvent, ProcessKind};
use editorlog_core::timestamp::synthetic_epoch;
use editorlog_core::{MemorySink, ParsingSession, StreamSplitter, parse_bytes};
use editorlog_types::ParserConfig;

fn no_normalize() -> ParserConfig {
    ParserConfig {
        normalize_timeline: false,
        ..ParserConfig::default()
    }
}

fn imports(sink: &MemorySink) -> Vec<AssetImport> {
    sink.asset_imports().cloned().collect()
}

#[test]
fn test_splitter_offsets_are_exact_for_every_chunk_size() {
    let text = "first line\r\nsecond\n\nthird with ünïcode\r\n\r\nlast without newline";
    let bytes = text.as_bytes();

    for size in 1..=bytes.len() {
        let mut splitter = StreamSplitter::new();
        let mut lines: Vec<(String, u64)> = Vec::new();
        let mut offset = 0u64;
        for chunk in bytes.chunks(size) {
            splitter
                .process_chunk::<Infallible>(chunk, offset, |line, at| {
                    lines.push((line.to_string(), at));
                    Ok(())
                })
                .unwrap();
            offset += chunk.len() as u64;
        }
        splitter
            .flush::<Infallible>(|line, at| {
                lines.push((line.to_string(), at));
                Ok(())
            })
            .unwrap();

        // Every offset points at the line's own bytes, and the gap to the
        // next line is exactly its terminator.
        let mut rebuilt = Vec::new();
        for (i, (line, at)) in lines.iter().enumerate() {
            let at = *at as usize;
            assert_eq!(&bytes[at..at + line.len()], line.as_bytes(), "chunk size {size}");
            let next = lines.get(i + 1).map_or(bytes.len(), |(_, n)| *n as usize);
            rebuilt.extend_from_slice(line.as_bytes());
            rebuilt.extend_from_slice(&bytes[at + line.len()..next]);
        }
        assert_eq!(rebuilt, bytes, "chunk size {size}");
        assert_eq!(lines.len(), 6);
    }
}

const MIXED_LOG: &str = "\
Unity Editor version:    2022.3.10f1 (ff3792e53c62)
Windows version:         10.0.19045
Architecture:            x86_64
Initialize engine version: 2022.3.10f1
Start importing Assets/Textures/Hero.png using Guid(a1)
(TextureImporter)
-> (artifact id: 'aa') in 0.500 seconds
[Worker0] Start importing Assets/Models/Ship.fbx using Guid(b1)
[Worker0] -> (artifact id: 'bb') in 2.0 seconds
Main thread resumes
Reloading assemblies took 250 ms
Start importing Assets/Prefabs/Ship.prefab using Guid(c1) (PrefabImporter) -> (artifact id: 'cc') in 1.0 seconds
";

#[test]
fn test_overlapping_reads_do_not_duplicate_events() {
    let bytes = MIXED_LOG.as_bytes();
    let mut reference = MemorySink::new();
    parse_bytes(bytes, &mut reference, &no_normalize()).unwrap();

    let mut sink = MemorySink::new();
    let mut session = ParsingSession::with_config(&no_normalize());
    let mut start = 0usize;
    while start < bytes.len() {
        let end = (start + 17).min(bytes.len());
        session.feed(&bytes[start..end], start as u64, &mut sink).unwrap();
        // Retry the same range, then step back a few bytes for the next read.
        session.feed(&bytes[start..end], start as u64, &mut sink).unwrap();
        start = if end == bytes.len() { end } else { end - 3 };
    }
    session.finish(&mut sink).unwrap();

    assert_eq!(sink.events, reference.events);
    assert_eq!(imports(&sink).len(), 3);
}

#[test]
fn test_interleaved_imports_all_correlate() {
    let log = "\
2024-03-01T09:00:00Z|0x1|Initialize engine version: 2022.3.10f1
2024-03-01T09:00:01Z|0x1|Start importing Assets/a.png using Guid(a1)
2024-03-01T09:00:10Z|0x1|Start importing Assets/b.png using Guid(b1)
2024-03-01T09:00:13Z|0x1|-> (artifact id: 'aa') in 12.0 seconds
2024-03-01T09:00:20Z|0x2|[Worker1] Start importing Assets/c.png using Guid(c1)
2024-03-01T09:00:21Z|0x3|[Worker2] Start importing Assets/d.png using Guid(d1)
2024-03-01T09:00:23Z|0x2|[Worker1] -> (artifact id: 'cc') in 3.0 seconds
2024-03-01T09:00:25Z|0x3|[Worker2] -> (artifact id: 'dd') in 4.0 seconds
2024-03-01T09:00:40Z|0x1|-> (artifact id: 'bb') in 30.0 seconds
";
    let mut sink = MemorySink::new();
    let mut session = ParsingSession::new();
    session.feed(log.as_bytes(), 0, &mut sink).unwrap();
    session.finish(&mut sink).unwrap();

    let mut pairs: Vec<(String, Option<String>)> = imports(&sink)
        .into_iter()
        .map(|i| (i.guid, i.artifact_id))
        .collect();
    pairs.sort();
    assert_eq!(
        pairs,
        vec![
            ("a1".to_string(), Some("aa".to_string())),
            ("b1".to_string(), Some("bb".to_string())),
            ("c1".to_string(), Some("cc".to_string())),
            ("d1".to_string(), Some("dd".to_string())),
        ]
    );
    assert!(session.state().pending_imports.is_empty());
    assert!(session.state().worker_imports.is_empty());
    assert!(!session.state().has_unmatched());
}

#[test]
fn test_sequential_operations_advance_the_clock_by_their_durations() {
    let durations = [1.5, 0.25, 3.0, 0.0, 12.0];
    let mut log = String::from("Initialize engine version: 2022.3.10f1\n");
    for (i, secs) in durations.iter().enumerate() {
        log.push_str(&format!("Step{i} took {secs} seconds\n"));
    }

    let mut sink = MemorySink::new();
    let mut session = ParsingSession::with_config(&no_normalize());
    let mut clock = session.state().logical_clock;
    for line in log.split_inclusive('\n') {
        let offset = session.resume_offset();
        session.feed(line.as_bytes(), offset, &mut sink).unwrap();
        assert!(session.state().logical_clock >= clock);
        clock = session.state().logical_clock;
    }

    let ops: Vec<_> = sink.processes().filter(|p| p.kind == ProcessKind::Operation).collect();
    assert_eq!(ops.len(), durations.len());
    for (op, secs) in ops.iter().zip(durations) {
        let expected = TimeDelta::milliseconds((secs * 1000.0) as i64);
        assert_eq!(op.end_timestamp - op.start_timestamp, expected);
    }
    for pair in ops.windows(2) {
        assert_eq!(pair[1].start_timestamp, pair[0].end_timestamp);
    }
}

#[test]
fn test_normalization_keeps_relative_timing() {
    let log = "\
Asset Pipeline Refresh (id=r1): Total: 12.500 seconds - Initiated by RefreshV2(NoUpdateAssetOptions)

Start importing Assets/a.png using Guid(a1) (TextureImporter) -> (artifact id: 'aa') in 2.0 seconds
Compile step took 1.5 seconds
";
    let mut raw = MemorySink::new();
    parse_bytes(log.as_bytes(), &mut raw, &no_normalize()).unwrap();
    let mut normalized = MemorySink::new();
    let summary = parse_bytes(log.as_bytes(), &mut normalized, &ParserConfig::default()).unwrap();

    assert_eq!(summary.timeline_shift_ms, Some(12_500));
    assert_eq!(raw.events.len(), normalized.events.len());

    let earliest = normalized.events.iter().map(LogEvent::start_timestamp).min().unwrap();
    assert_eq!(earliest, synthetic_epoch());
    assert_eq!(normalized.metadata.start_timestamp, Some(synthetic_epoch()));

    let shift = TimeDelta::milliseconds(12_500);
    for (before, after) in raw.events.iter().zip(&normalized.events) {
        assert_eq!(after.start_timestamp(), before.start_timestamp() + shift);
        assert_eq!(after.end_timestamp(), before.end_timestamp() + shift);
    }
}

#[test]
fn test_three_line_import_end_to_end() {
    let log = "Start importing Assets/A.png using Guid(abc123)\n(TextureImporter)\n-> (artifact id: 'def456') in 0.500 seconds";
    let mut sink = MemorySink::new();
    parse_bytes(log.as_bytes(), &mut sink, &ParserConfig::default()).unwrap();

    let found = imports(&sink);
    assert_eq!(found.len(), 1);
    let import = &found[0];
    assert_eq!(import.asset_path, "Assets/A.png");
    assert_eq!(import.importer_type.as_deref(), Some("TextureImporter"));
    assert_eq!(import.artifact_id.as_deref(), Some("def456"));
    assert_eq!(import.duration_ms, 500.0);
    assert_eq!(import.line_number, 1);
    assert_eq!(import.byte_offset, 0);
}

#[test]
fn test_worker_barrier_end_to_end() {
    let log = "\
2024-03-01T09:00:00Z|0x2|[Worker0] Start importing Assets/X.png using Guid(g1)
2024-03-01T09:00:02Z|0x2|[Worker0] -> (artifact id: 'a1') in 2.0 seconds
2024-03-01T09:00:03Z|0x1|Main thread line
";
    let mut sink = MemorySink::new();
    parse_bytes(log.as_bytes(), &mut sink, &ParserConfig::default()).unwrap();

    let barriers: Vec<_> = sink.worker_barriers().collect();
    assert_eq!(barriers.len(), 1);
    let barrier = barriers[0];
    assert_eq!(barrier.thread_id, 0);
    assert_eq!(barrier.import_count, 1);
    assert_eq!(barrier.line_number, 1);
    assert_eq!(barrier.start_timestamp.format("%H:%M:%S").to_string(), "09:00:00");
    assert_eq!(barrier.end_timestamp.format("%H:%M:%S").to_string(), "09:00:03");

    let import = imports(&sink).pop().unwrap();
    assert_eq!(import.thread_id, Some(0));
}

#[test]
fn test_every_event_has_a_non_negative_span() {
    let mut sink = MemorySink::new();
    parse_bytes(MIXED_LOG.as_bytes(), &mut sink, &ParserConfig::default()).unwrap();
    assert!(!sink.is_empty());
    for event in &sink.events {
        assert!(event.end_timestamp() >= event.start_timestamp(), "{event:?}");
    }
    let meta = &sink.metadata;
    assert_eq!(meta.platform.as_deref(), Some("Windows"));
    assert_eq!(meta.architecture.as_deref(), Some("x86_64"));
    assert!(meta.start_timestamp <= meta.end_timestamp);
    assert_eq!(meta.total_lines, Some(12));
}

#[test]
fn test_absurd_durations_are_skipped_not_fatal() {
    let log = "\
Initialize engine version: 1
Step A took 99999999999999999999 seconds
Start importing Assets/a.png using Guid(a1) (TextureImporter) -> (artifact id: 'aa') in 99999999999999999999 seconds
[Worker0] Start importing Assets/b.png using Guid(b1) (TextureImporter) -> (artifact id: 'bb') in 99999999999999999999 seconds
Domain Reload Profiling: 99999999999999999999999ms
Finished script compilation in 99999999999999999999 seconds
##utp:{\"type\":\"Action\",\"duration\":1e300}
Step B took 2 seconds
";
    let mut sink = MemorySink::new();
    let summary = parse_bytes(log.as_bytes(), &mut sink, &ParserConfig::default()).unwrap();
    assert_eq!(summary.lines_processed, 8);
    assert!(imports(&sink).is_empty());

    let ops: Vec<_> = sink.processes().filter(|p| p.kind == ProcessKind::Operation).collect();
    assert_eq!(ops.len(), 1);
    assert_eq!(ops[0].name, "Step B");
    for event in &sink.events {
        assert!(event.end_timestamp() >= event.start_timestamp(), "{event:?}");
    }
}
