pub mod context;
pub mod error;
pub mod events;
pub mod handlers;
pub mod live;
pub mod normalizer;
pub mod sink;
pub mod splitter;
pub mod state;
pub mod timestamp;

// Re-exports for convenience
pub use context::{
    CancelToken, EngineConfigExt, ParseSummary, ParsingSession, Progress, default_editor_log_path,
    parse_bytes, parse_file, project_name_from_log_path,
};
pub use error::{EngineError, Result};
pub use events::{AssetCategory, LogEvent, MetadataPatch, ProcessKind};
pub use live::{LiveSession, LiveStatus, PollOutcome};
pub use normalizer::TimelineNormalizer;
pub use sink::{EventSink, JsonLinesSink, MemorySink};
pub use splitter::StreamSplitter;
pub use state::{Checkpoint, CheckpointStore, JsonCheckpointStore, MemoryCheckpointStore, ParserState};
