//! Driver factories.
//!
//! Each driver module exposes a unit struct implementing [`DriverFactory`]. The
//! factory knows the instrument's line settings and property table; the
//! application supplies only an address (serial path or host name) or a full
//! [`SessionConfig`] override.
//!
//! # Lifetime
//!
//! Factories are plain values with no state, listed once in [`crate::DRIVERS`].
//! They must be `Send + Sync + 'static` because they may be used from any task.

use anyhow::{Context, Result};
use futures::future::BoxFuture;
use labwire_core::{Instrument, PropertyTable, Session, SessionConfig};

/// Describes one instrument model and builds handles for it.
pub trait DriverFactory: Send + Sync + 'static {
    /// Driver type name used in configuration files (`driver = "lakeshore_425"`).
    fn driver_type(&self) -> &'static str;

    /// Human-readable model name for listings and error messages.
    fn name(&self) -> &'static str;

    /// Session configuration for the instrument at `address`, using the line
    /// settings and pacing the model requires.
    fn default_session(&self, address: &str) -> SessionConfig;

    /// Property table for this model.
    fn properties(&self) -> PropertyTable;

    /// Check a configuration before opening anything.
    fn validate(&self, config: &SessionConfig) -> Result<()> {
        config
            .validate()
            .with_context(|| format!("invalid {} configuration", self.name()))
    }

    /// Open a session and attach the property table.
    fn build(&self, name: String, config: SessionConfig) -> BoxFuture<'static, Result<Instrument>> {
        let table = self.properties();
        let model = self.name();
        let validated = self.validate(&config);

        Box::pin(async move {
            validated?;
            let endpoint = config.endpoint.to_string();
            let session = Session::open(config)
                .await
                .with_context(|| format!("failed to open {model} '{name}' on {endpoint}"))?;
            tracing::info!(instrument = %name, model, %endpoint, "instrument ready");
            Ok(Instrument::new(name, session, table))
        })
    }
}
