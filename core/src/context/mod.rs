mod app_config;
mod parsing_session;

pub use app_config::{EngineConfigExt, default_editor_log_path, project_name_from_log_path};
pub use parsing_session::{
    CancelToken, ParseSummary, ParsingSession, Progress, parse_bytes, parse_file,
};
