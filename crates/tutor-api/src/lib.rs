pub mod app;
pub mod telemetry;
pub mod types;

pub use app::{AppState, Providers};
pub use telemetry::init_tracing;
pub use types::{
    AssessmentRequest, AttemptAck, AttemptRequest, InstructionDto, ProgressReport, SelectedQuestionDto,
    SessionClosed, SessionStarted,
};
