use std::future::Future;

use lode_core::ChangeRecord;

/// Error type returned by application handlers.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Trait for application hooks consuming decoded change records.
///
/// The handler runs on the stream loop task, one invocation per WAL
/// message in commit order. The record's position is acknowledged to
/// the server only after the handler returns Ok, so a failing handler
/// sees the same record again on the next session.
pub trait ChangeHandler: Send + Sync {
    /// Process one decoded change record.
    fn handle(&self, record: &ChangeRecord)
        -> impl Future<Output = Result<(), HandlerError>> + Send;
}

/// A handler that wraps a synchronous function.
pub struct FnHandler<F>
where
    F: Fn(&ChangeRecord) -> Result<(), HandlerError> + Send + Sync,
{
    func: F,
}

impl<F> FnHandler<F>
where
    F: Fn(&ChangeRecord) -> Result<(), HandlerError> + Send + Sync,
{
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

impl<F> ChangeHandler for FnHandler<F>
where
    F: Fn(&ChangeRecord) -> Result<(), HandlerError> + Send + Sync,
{
    fn handle(
        &self,
        record: &ChangeRecord,
    ) -> impl Future<Output = Result<(), HandlerError>> + Send {
        let result = (self.func)(record);
        async move { result }
    }
}

/// Placeholder handler for sessions created without an on_message hook.
/// Messages are still acknowledged when no handler is configured.
pub struct NoopHandler;

impl ChangeHandler for NoopHandler {
    fn handle(
        &self,
        _record: &ChangeRecord,
    ) -> impl Future<Output = Result<(), HandlerError>> + Send {
        async move { Ok(()) }
    }
}
