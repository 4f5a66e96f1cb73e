use std::sync::LazyLock;

use chrono::NaiveDateTime;
use regex::Regex;

use super::{LineHandler, LogLine, ParseContext};
use crate::events::{LogEvent, ProcessEvent, ProcessKind, asset};
use crate::state::{CompiledAssembly, ScriptCompilationBuffer};
use crate::timestamp::{add_delta, delta_from_ms, parse_millis, parse_seconds};

static REQUESTED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)Requested script compilation(?:\s+because:?\s*(?P<reason>.*))?").expect("compile request pattern")
});
static BUILD_INVOCATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^Starting:\s+\S*(?:bee_backend|BeeDriver|csc|dotnet)").expect("build invocation pattern")
});
static PROCESSING_ASSEMBLY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Processing assembly (?P<path>.+?), with (?P<defines>\d+) defines and (?P<refs>\d+) references")
        .expect("assembly pattern")
});
static STARTING_COMPILE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^-\s*Starting compile (?P<path>\S+)").expect("compile start pattern"));
static FINISHED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:Finished script compilation in|compilation time:?)\s*(?P<num>\d+(?:\.\d+)?)\s*(?P<unit>ms|s|sec|secs|seconds)?\b")
        .expect("compile finish pattern")
});

/// Script compilation: request or build start, assemblies, finish line.
pub struct ScriptCompilationHandler;

impl LineHandler for ScriptCompilationHandler {
    fn name(&self) -> &'static str {
        "script_compilation"
    }

    fn handle(&self, line: &LogLine<'_>, ctx: &mut ParseContext<'_>) -> bool {
        let text = line.text.trim();

        if let Some(caps) = REQUESTED.captures(text) {
            let reason = caps
                .name("reason")
                .map(|m| m.as_str().trim().to_string())
                .filter(|r| !r.is_empty());
            let block = open_block(line, ctx);
            if reason.is_some() {
                block.reason = reason;
            }
            return true;
        }
        if BUILD_INVOCATION.is_match(text) {
            open_block(line, ctx);
            return true;
        }

        let assembly = if let Some(caps) = PROCESSING_ASSEMBLY.captures(text) {
            Some(CompiledAssembly {
                path: caps["path"].to_string(),
                defines: caps["defines"].parse().ok(),
                references: caps["refs"].parse().ok(),
            })
        } else {
            STARTING_COMPILE.captures(text).map(|caps| CompiledAssembly {
                path: caps["path"].to_string(),
                defines: None,
                references: None,
            })
        };
        if let Some(assembly) = assembly {
            let block = open_block(line, ctx);
            if !block.assemblies.iter().any(|a| a.path == assembly.path) {
                block.assemblies.push(assembly);
            }
            return true;
        }

        if let Some(caps) = FINISHED.captures(text) {
            let duration_ms = match caps.name("unit").map(|u| u.as_str().to_ascii_lowercase()) {
                Some(unit) if unit == "ms" => parse_millis(&caps["num"]),
                _ => parse_seconds(&caps["num"]).map(|s| s * 1000.0),
            };
            let Some(duration_ms) = duration_ms else {
                tracing::debug!(line = line.line_number, "Malformed compilation time");
                return true;
            };
            open_block(line, ctx);
            finalize(ctx, line.timestamp, duration_ms);
            return true;
        }

        false
    }

    fn finish(&self, ctx: &mut ParseContext<'_>) {
        if let Some(block) = &ctx.state.script_compilation {
            tracing::warn!(line = block.line_number, "Script compilation never reported its time");
        }
        ctx.state.script_compilation = None;
    }
}

/// The open block, opening one at this line if needed.
fn open_block<'s>(line: &LogLine<'_>, ctx: &'s mut ParseContext<'_>) -> &'s mut ScriptCompilationBuffer {
    let start = ctx.state.now(line.timestamp);
    ctx.state.script_compilation.get_or_insert_with(|| ScriptCompilationBuffer {
        line_number: line.line_number,
        byte_offset: line.byte_offset,
        start_timestamp: start,
        reason: None,
        assemblies: Vec::new(),
    })
}

fn finalize(ctx: &mut ParseContext<'_>, line_ts: Option<NaiveDateTime>, duration_ms: f64) {
    let Some(block) = ctx.state.script_compilation.take() else {
        return;
    };
    let (start, end) = if ctx.state.is_timestamped() {
        let end = ctx.state.now(line_ts);
        (block.start_timestamp.min(end), end)
    } else {
        let start = block.start_timestamp;
        let end = add_delta(start, delta_from_ms(duration_ms));
        ctx.state.advance_to(end);
        (start, end)
    };

    if block.assemblies.is_empty() {
        ctx.emit(LogEvent::Process(ProcessEvent {
            kind: ProcessKind::ScriptCompilation,
            name: "Script Compilation".to_string(),
            line_number: block.line_number,
            byte_offset: block.byte_offset,
            duration_ms,
            memory_mb: None,
            detail: block.reason,
            start_timestamp: start,
            end_timestamp: end,
        }));
        return;
    }

    for assembly in block.assemblies {
        let detail = match (assembly.defines, assembly.references) {
            (Some(d), Some(r)) => format!("{} ({d} defines, {r} references)", assembly.path),
            _ => assembly.path.clone(),
        };
        ctx.emit(LogEvent::Process(ProcessEvent {
            kind: ProcessKind::ScriptCompilation,
            name: asset::asset_name(&assembly.path).to_string(),
            line_number: block.line_number,
            byte_offset: block.byte_offset,
            duration_ms,
            memory_mb: None,
            detail: Some(detail),
            start_timestamp: start,
            end_timestamp: end,
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::Harness;
    use crate::events::{LogEvent, ProcessEvent, ProcessKind};
    use crate::timestamp::synthetic_epoch;
    use chrono::TimeDelta;

    fn compilations(h: &Harness) -> Vec<ProcessEvent> {
        h.events
            .iter()
            .filter_map(|e| match e {
                LogEvent::Process(p) if p.kind == ProcessKind::ScriptCompilation => Some(p.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_one_process_per_assembly() {
        let mut h = Harness::new();
        h.feed(concat!(
            "Requested script compilation because: Assembly Definition File(s) changed\n",
            "Processing assembly Library/ScriptAssemblies/Game.Core.dll, with 120 defines and 45 references\n",
            "Processing assembly Library/ScriptAssemblies/Assembly-CSharp.dll, with 118 defines and 60 references\n",
            "Finished script compilation in 4.5 seconds\n",
        ));
        let found = compilations(&h);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].name, "Game.Core.dll");
        assert_eq!(
            found[0].detail.as_deref(),
            Some("Library/ScriptAssemblies/Game.Core.dll (120 defines, 45 references)")
        );
        assert_eq!(found[1].name, "Assembly-CSharp.dll");
        for p in &found {
            assert_eq!(p.duration_ms, 4500.0);
            assert_eq!(p.line_number, 1);
            assert_eq!(p.start_timestamp, synthetic_epoch());
            assert_eq!(p.end_timestamp, synthetic_epoch() + TimeDelta::milliseconds(4500));
        }
        assert_eq!(h.state.logical_clock, synthetic_epoch() + TimeDelta::milliseconds(4500));
    }

    #[test]
    fn test_compilation_without_assemblies() {
        let mut h = Harness::new();
        h.feed("Initialize engine version: 1\nRequested script compilation because: recompile\nTotal compilation time 850 ms\n");
        let found = compilations(&h);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "Script Compilation");
        assert_eq!(found[0].detail.as_deref(), Some("recompile"));
        assert_eq!(found[0].duration_ms, 850.0);
    }

    #[test]
    fn test_implicit_block_from_assembly_line() {
        let mut h = Harness::new();
        h.feed("Initialize engine version: 1\n- Starting compile Library/Bee/artifacts/Game.dll\n- Finished script compilation in 1.0 seconds\n");
        let found = compilations(&h);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "Game.dll");
        assert_eq!(found[0].line_number, 2);
    }
}
