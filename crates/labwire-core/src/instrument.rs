//! Generic instrument handle.
//!
//! An [`Instrument`] pairs a [`SharedSession`] with the driver's
//! [`PropertyTable`]. Drivers wrap it and add typed accessors; tools that only
//! know property names (the CLI, the session worker) use it directly.

use crate::binding::{Binding, Field};
use crate::error::Result;
use crate::framer::Response;
use crate::session::{Session, SharedSession};
use crate::table::{Action, PropertyTable};
use crate::value::Value;
use std::sync::Arc;
use tracing::instrument;

/// One open instrument.
#[derive(Debug, Clone)]
pub struct Instrument {
    name: String,
    session: SharedSession,
    table: Arc<PropertyTable>,
}

impl Instrument {
    /// Take ownership of `session` and attach `table`.
    pub fn new(name: impl Into<String>, session: Session, table: PropertyTable) -> Self {
        Self::from_shared(name, session.into_shared(), Arc::new(table))
    }

    /// Attach `table` to an already shared session.
    pub fn from_shared(
        name: impl Into<String>,
        session: SharedSession,
        table: Arc<PropertyTable>,
    ) -> Self {
        Self {
            name: name.into(),
            session,
            table,
        }
    }

    /// Instrument name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Shared session handle.
    pub fn session(&self) -> &SharedSession {
        &self.session
    }

    /// Property table.
    pub fn table(&self) -> &Arc<PropertyTable> {
        &self.table
    }

    /// Read a typed property.
    pub async fn get<T: Send + 'static>(&self, binding: &Binding<T>) -> Result<T> {
        let mut session = self.session.lock().await;
        binding.get(&mut session).await
    }

    /// Write a typed property.
    pub async fn set<T: Send + 'static>(&self, binding: &Binding<T>, value: &T) -> Result<()> {
        let mut session = self.session.lock().await;
        binding.set(&mut session, value).await
    }

    /// Read one member of a composite property.
    pub async fn get_field<T, F>(&self, field: &Field<T, F>) -> Result<F>
    where
        T: Send + 'static,
        F: Send + 'static,
    {
        let mut session = self.session.lock().await;
        field.get(&mut session).await
    }

    /// Write one member of a composite property.
    ///
    /// The lock is held across the read and the write.
    pub async fn set_field<T, F>(&self, field: &Field<T, F>, value: F) -> Result<()>
    where
        T: Send + 'static,
        F: Send + 'static,
    {
        let mut session = self.session.lock().await;
        field.set(&mut session, value).await
    }

    /// Read a property by name.
    #[instrument(skip(self), fields(instrument = %self.name), err)]
    pub async fn get_by_name(&self, property: &str) -> Result<Value> {
        let property = self.table.property(property)?;
        let mut session = self.session.lock().await;
        property.read_value(&mut session).await
    }

    /// Parse `value` and write it to a property by name.
    #[instrument(skip(self), fields(instrument = %self.name), err)]
    pub async fn set_by_name(&self, property: &str, value: &str) -> Result<()> {
        let property = self.table.property(property)?;
        let mut session = self.session.lock().await;
        property.write_text(&mut session, value).await
    }

    /// Run a named action.
    #[instrument(skip(self), fields(instrument = %self.name), err)]
    pub async fn run_action(&self, action: &str) -> Result<()> {
        let Action { command, .. } = self.table.action(action)?.clone();
        self.send(&command).await
    }

    /// Send a raw command.
    pub async fn send(&self, command: &str) -> Result<()> {
        self.session.lock().await.send(command).await
    }

    /// Send a raw command and read the response.
    pub async fn query(&self, command: &str) -> Result<Response> {
        self.session.lock().await.query(command).await
    }

    /// Drop a timed-out response and any stale input.
    pub async fn discard_input(&self) -> Result<usize> {
        self.session.lock().await.discard_input().await
    }

    /// Reopen the session after a transport failure.
    pub async fn reopen(&self) -> Result<()> {
        self.session.lock().await.reopen().await
    }

    /// Close the session.
    pub async fn close(&self) -> Result<()> {
        self.session.lock().await.close().await
    }
}
