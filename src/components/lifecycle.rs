//! Component lifecycle tracking.

use std::fmt;

use super::{Component, InitContext};
use crate::error::{IceError, Result};
use crate::fields::FieldStore;

/// Tolerance for recognizing a repeated `(t, dt)`, seconds.
const REPEAT_EPSILON: f64 = 1e-12;

/// `Uninitialized → Initialized → Running`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Lifecycle {
    Uninitialized,
    Initialized,
    Running,
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Uninitialized => "uninitialized",
            Self::Initialized => "initialized",
            Self::Running => "running",
        })
    }
}

/// A component together with its lifecycle state.
pub struct Managed<T: ?Sized> {
    inner: Box<T>,
    state: Lifecycle,
    last_update: Option<(f64, f64)>,
}

impl<T: Component + ?Sized> Managed<T> {
    pub fn new(inner: Box<T>) -> Self {
        Self {
            inner,
            state: Lifecycle::Uninitialized,
            last_update: None,
        }
    }

    pub fn state(&self) -> Lifecycle {
        self.state
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    pub fn init(&mut self, ctx: &InitContext<'_>, store: &mut FieldStore) -> Result<()> {
        if self.state != Lifecycle::Uninitialized {
            return Err(self.lifecycle_error());
        }
        self.inner.init(ctx, store)?;
        self.state = Lifecycle::Initialized;
        Ok(())
    }

    /// Enter the running state.
    pub fn start(&mut self) -> Result<()> {
        match self.state {
            Lifecycle::Initialized | Lifecycle::Running => {
                self.state = Lifecycle::Running;
                Ok(())
            }
            Lifecycle::Uninitialized => Err(self.lifecycle_error()),
        }
    }

    /// Gate an update on `(t, dt)`.
    ///
    /// Returns `Ok(false)` if the component already advanced over this
    /// interval, so callers skip the repeated work.
    pub fn begin_update(&mut self, t: f64, dt: f64) -> Result<bool> {
        if self.state != Lifecycle::Running {
            return Err(self.lifecycle_error());
        }
        if let Some((t0, dt0)) = self.last_update
            && (t - t0).abs() < REPEAT_EPSILON
            && (dt - dt0).abs() < REPEAT_EPSILON
        {
            return Ok(false);
        }
        self.last_update = Some((t, dt));
        Ok(true)
    }

    /// Forget the last update so the next call runs.
    pub fn invalidate(&mut self) {
        self.last_update = None;
    }

    pub fn get(&self) -> &T {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    fn lifecycle_error(&self) -> IceError {
        IceError::Lifecycle {
            component: self.inner.name().to_string(),
            state: self.state.to_string(),
        }
    }
}

impl<T: ?Sized> fmt::Debug for Managed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Managed")
            .field("state", &self.state)
            .field("last_update", &self.last_update)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Stub;

    impl Component for Stub {
        fn name(&self) -> &str {
            "stub"
        }

        fn init(&mut self, _ctx: &InitContext<'_>, _store: &mut FieldStore) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_update_requires_running() {
        let mut m = Managed::new(Box::new(Stub));
        assert!(matches!(m.begin_update(0.0, 1.0), Err(IceError::Lifecycle { .. })));
        assert!(m.start().is_err());
    }

    #[test]
    fn test_repeated_interval_is_skipped() {
        let mut m = Managed::new(Box::new(Stub));
        m.state = Lifecycle::Initialized;
        m.start().unwrap();
        assert!(m.begin_update(0.0, 10.0).unwrap());
        assert!(!m.begin_update(0.0, 10.0).unwrap());
        assert!(m.begin_update(10.0, 10.0).unwrap());
        m.invalidate();
        assert!(m.begin_update(10.0, 10.0).unwrap());
    }
}
