//! Output sinks the repair engine reports through.
//!
//! The engine never renders anything itself. It emits progress, info and
//! warning calls and leaves presentation to the sink.

/// Receiver for repair progress and messages.
pub trait OutputSink: Send {
    /// Start progress reporting with an approximate total.
    fn start_progress(&mut self, total: u64);

    /// Advance progress by `step` units with a description of what was done.
    fn advance(&mut self, step: u64, message: &str);

    /// Informational message.
    fn info(&mut self, message: &str);

    /// Warning that the operator should look at.
    fn warning(&mut self, message: &str);

    /// Stop progress reporting.
    fn finish_progress(&mut self);
}

/// Sink that forwards everything to `tracing`.
#[derive(Debug, Default)]
pub struct TracingOutput {
    total: u64,
    done: u64,
}

impl TracingOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Units of progress reported so far.
    pub fn done(&self) -> u64 {
        self.done
    }
}

impl OutputSink for TracingOutput {
    fn start_progress(&mut self, total: u64) {
        self.total = total;
        self.done = 0;
        tracing::info!(total = total, "Repair started");
    }

    fn advance(&mut self, step: u64, message: &str) {
        self.done += step;
        tracing::info!(done = self.done, total = self.total, "{message}");
    }

    fn info(&mut self, message: &str) {
        tracing::info!("{message}");
    }

    fn warning(&mut self, message: &str) {
        tracing::warn!("{message}");
    }

    fn finish_progress(&mut self) {
        tracing::info!(done = self.done, "Repair finished");
    }
}

/// A sink call, as recorded by [`CollectingOutput`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputEvent {
    StartProgress(u64),
    Advance(u64, String),
    Info(String),
    Warning(String),
    FinishProgress,
}

/// Sink that keeps every call in memory, in order.
#[derive(Debug, Default)]
pub struct CollectingOutput {
    pub events: Vec<OutputEvent>,
}

impl CollectingOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages of all `advance` calls.
    pub fn advances(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter_map(|e| match e {
                OutputEvent::Advance(_, msg) => Some(msg.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn infos(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter_map(|e| match e {
                OutputEvent::Info(msg) => Some(msg.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn warnings(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter_map(|e| match e {
                OutputEvent::Warning(msg) => Some(msg.as_str()),
                _ => None,
            })
            .collect()
    }
}

impl OutputSink for CollectingOutput {
    fn start_progress(&mut self, total: u64) {
        self.events.push(OutputEvent::StartProgress(total));
    }

    fn advance(&mut self, step: u64, message: &str) {
        self.events.push(OutputEvent::Advance(step, message.to_string()));
    }

    fn info(&mut self, message: &str) {
        self.events.push(OutputEvent::Info(message.to_string()));
    }

    fn warning(&mut self, message: &str) {
        self.events.push(OutputEvent::Warning(message.to_string()));
    }

    fn finish_progress(&mut self) {
        self.events.push(OutputEvent::FinishProgress);
    }
}
