//! Per-step hooks for derived runs.

use super::SignalRequest;
use crate::error::Result;
use crate::fields::FieldStore;
use crate::time::ModelTime;

/// A closure run at the start or end of every step.
///
/// It may edit fields (imposed forcing, for example) and may ask the
/// run to save or stop.
pub type StepHook = Box<dyn FnMut(&mut FieldStore, &ModelTime) -> Result<Option<SignalRequest>> + Send>;

/// Hooks run around each step.
#[derive(Default)]
pub struct Hooks {
    at_start: Vec<StepHook>,
    at_end: Vec<StepHook>,
}

impl Hooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_at_start(&mut self, hook: StepHook) {
        self.at_start.push(hook);
    }

    pub fn add_at_end(&mut self, hook: StepHook) {
        self.at_end.push(hook);
    }

    pub fn is_empty(&self) -> bool {
        self.at_start.is_empty() && self.at_end.is_empty()
    }

    pub(crate) fn run_at_start(&mut self, store: &mut FieldStore, time: &ModelTime) -> Result<Option<SignalRequest>> {
        run_all(&mut self.at_start, store, time)
    }

    pub(crate) fn run_at_end(&mut self, store: &mut FieldStore, time: &ModelTime) -> Result<Option<SignalRequest>> {
        run_all(&mut self.at_end, store, time)
    }
}

impl std::fmt::Debug for Hooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hooks")
            .field("at_start", &self.at_start.len())
            .field("at_end", &self.at_end.len())
            .finish()
    }
}

/// Run every hook; the strongest request wins.
fn run_all(hooks: &mut [StepHook], store: &mut FieldStore, time: &ModelTime) -> Result<Option<SignalRequest>> {
    let mut request = None;
    for hook in hooks.iter_mut() {
        match hook(store, time)? {
            Some(SignalRequest::Stop) => request = Some(SignalRequest::Stop),
            Some(SignalRequest::Save) if request.is_none() => request = Some(SignalRequest::Save),
            _ => {}
        }
    }
    Ok(request)
}
