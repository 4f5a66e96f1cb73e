//! Line patterns shared by more than one handler.

use std::sync::LazyLock;

use regex::Regex;

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|e| panic!("invalid built-in pattern {pattern:?}: {e}"))
}

/// A complete import on one line, duration included.
pub static IMPORT_COMPLETE: LazyLock<Regex> = LazyLock::new(|| {
    compile(
        r"Start importing (?P<path>.+?) using Guid\((?P<guid>[0-9A-Za-z]+)\)(?:\s+(?P<importer>[^\s>][^>]*?))?(?:\s*->\s*\(artifact id: '(?P<artifact>[0-9A-Za-z]+)'\))?\s+in\s+(?P<secs>[\d.]+)\s+seconds",
    )
});

/// The start of a multi-line import; the rest arrives on later lines.
pub static IMPORT_START: LazyLock<Regex> = LazyLock::new(|| {
    compile(r"Start importing (?P<path>.+?) using Guid\((?P<guid>[0-9A-Za-z]+)\)(?:\s+(?P<importer>.*?))?\s*$")
});

/// `(TextureImporter)` on its own line.
pub static IMPORTER_LINE: LazyLock<Regex> =
    LazyLock::new(|| compile(r"^\s*\((?P<importer>[A-Za-z0-9\-]+)\)\s*$"));

/// `-> (artifact id: '…') in N seconds`, ending an import or atlas pack.
pub static ARTIFACT_COMPLETION: LazyLock<Regex> = LazyLock::new(|| {
    compile(r"->\s*\(artifact id: '(?P<artifact>[0-9A-Za-z]+)'\)\s+in\s+(?P<secs>[\d.]+)\s+seconds")
});

/// `Kind : " ## Name ## " took N sec (current mem: M MB)`
pub static OPERATION: LazyLock<Regex> = LazyLock::new(|| {
    compile(
        r#"^(?P<kind>[^:"]+?)\s*:\s*"\s*##\s*(?P<name>.+?)\s*##\s*"\s+took\s+(?P<secs>[\d.]+)\s+sec(?:.*?current mem:\s*(?P<mem>\d+)\s*MB)?"#,
    )
});

pub static WORKER_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| compile(r"^\[Worker(?P<thread>\d+)\]\s?(?P<body>.*)$"));

/// Split `[WorkerN] body` into the thread id and the body.
pub fn split_worker(text: &str) -> Option<(u32, &str)> {
    let caps = WORKER_PREFIX.captures(text)?;
    let thread = caps.name("thread")?.as_str().parse().ok()?;
    let body = caps.name("body").map_or("", |m| m.as_str());
    Some((thread, body))
}
