pub mod config;
pub mod duration;
pub mod history;
pub mod scheduler;
pub mod state;
pub mod template;
pub mod term;
pub mod tracer;
pub mod updates;

#[cfg(any(test, feature = "test-support"))]
pub mod test_helpers;

pub use config::{ConfigError, TraceConfig, parse_fold_status};
pub use history::{
    EventAttributes, FileHistorySource, HistoryEvent, HistoryEventIterator, HistorySource, SourceError,
    WorkflowExecution,
};
pub use scheduler::SharedState;
pub use state::{
    ActivityExecutionState, ActivityExecutionStatus, ChildState, ExecutionState, StateError, TimerExecutionState,
    TimerExecutionStatus, WorkflowExecutionState, WorkflowExecutionStatus,
};
pub use template::ExecutionTemplate;
pub use term::{CrosstermSize, RenderError, TermWriter, TerminalSize};
pub use tracer::{TracerError, WorkflowTracer, exit_code, progress_string};
pub use updates::{
    TraceError, UpdateOptions, WorkflowExecutionUpdate, WorkflowExecutionUpdateIterator,
    get_workflow_execution_updates,
};
