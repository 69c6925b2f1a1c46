//! Injected logging capability
//!
//! Components never install a global subscriber. The binary builds one
//! [`Telemetry`] handle and passes clones to each component, which runs its
//! work through [`Telemetry::scope`]: the handle's dispatcher becomes the
//! thread-local default for the duration of the call, inside a span naming
//! the component.

use tracing::{dispatcher, Dispatch, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Cloneable logging handle passed to pipeline components
#[derive(Clone)]
pub struct Telemetry {
    dispatch: Dispatch,
    component: &'static str,
}

impl std::fmt::Debug for Telemetry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Telemetry")
            .field("component", &self.component)
            .finish()
    }
}

impl Telemetry {
    /// Formatted stdout logging; `RUST_LOG` overrides `level` when set
    pub fn stdout(level: Level) -> Self {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase()));

        let subscriber = FmtSubscriber::builder()
            .with_env_filter(filter)
            .with_target(false)
            .finish();

        Self::from_dispatch(Dispatch::new(subscriber))
    }

    /// Wrap an existing dispatcher
    pub fn from_dispatch(dispatch: Dispatch) -> Self {
        Self {
            dispatch,
            component: "pipeline",
        }
    }

    /// Discard all events
    pub fn silent() -> Self {
        Self::from_dispatch(Dispatch::none())
    }

    /// Same sink, tagged with another component name
    pub fn for_component(&self, component: &'static str) -> Self {
        Self {
            dispatch: self.dispatch.clone(),
            component,
        }
    }

    pub fn component(&self) -> &'static str {
        self.component
    }

    /// Run `f` with this handle's dispatcher inside the component span
    pub fn scope<T>(&self, f: impl FnOnce() -> T) -> T {
        dispatcher::with_default(&self.dispatch, || {
            let span = tracing::info_span!("component", name = self.component);
            let _guard = span.enter();
            f()
        })
    }
}

impl Default for Telemetry {
    fn default() -> Self {
        Self::silent()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_returns_closure_value() {
        let telemetry = Telemetry::silent().for_component("ingestion");
        assert_eq!(telemetry.component(), "ingestion");
        let value = telemetry.scope(|| {
            tracing::info!("ignored");
            41 + 1
        });
        assert_eq!(value, 42);
    }
}
