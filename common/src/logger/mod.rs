mod init;
mod spans;
mod trace_id;

pub use init::{LogFormat, init_logger};
pub use spans::{child_span, root_span, warn_if_slow};
pub use trace_id::TraceId;
