//! Typed property bindings.
//!
//! A [`Binding<T>`] maps a property name to the command that reads it, the parser
//! that turns the response into a `T`, and optionally the command template that
//! writes it. Bindings are built once when a driver constructs its property table
//! and never change afterwards.
//!
//! # Composite properties
//!
//! Some instruments read and write several settings in one command:
//!
//! ```text
//!   RDGMODE?            -> "1,0,2"        (mode, dc filter, ac bandwidth)
//!   RDGMODE 2, 0, 2                       (all three written together)
//! ```
//!
//! Such a command is ONE binding over the whole tuple. Individual settings are
//! [`Field`] projections. Setting a field reads the tuple, replaces one member and
//! writes the tuple back, all under the same `&mut Session`, so no other command
//! can land between the read and the write.
//!
//! # Templates
//!
//! Set commands are [`strfmt`] templates. Scalar bindings use `{value}`; composite
//! encoders return one argument per placeholder.

use crate::error::{LinkError, Result};
use crate::framer::Response;
use crate::session::Session;
use crate::value::{PropertyType, Value};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use strfmt::strfmt;

/// Template arguments produced by an encoder.
pub type Args = HashMap<String, String>;

type ParseFn<T> = Arc<dyn Fn(&Response) -> std::result::Result<T, String> + Send + Sync>;
type EncodeFn<T> = Arc<dyn Fn(&T) -> std::result::Result<Args, String> + Send + Sync>;
type ValidateFn<T> = Arc<dyn Fn(&T) -> std::result::Result<(), String> + Send + Sync>;

/// Build [`Args`] from name/value pairs.
pub fn args<const N: usize>(pairs: [(&str, String); N]) -> Args {
    pairs
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect()
}

struct Setter<T> {
    template: String,
    encode: EncodeFn<T>,
}

/// Declarative mapping between one instrument property and a Rust type.
pub struct Binding<T> {
    name: String,
    query: String,
    parse: ParseFn<T>,
    setter: Option<Setter<T>>,
    validate: Option<ValidateFn<T>>,
}

impl<T> fmt::Debug for Binding<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("name", &self.name)
            .field("query", &self.query)
            .field("set_template", &self.setter.as_ref().map(|s| s.template.as_str()))
            .finish()
    }
}

impl<T: Send + 'static> Binding<T> {
    /// Read-only binding with a custom parser.
    pub fn new<P>(name: impl Into<String>, query: impl Into<String>, parse: P) -> Self
    where
        P: Fn(&Response) -> std::result::Result<T, String> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            query: query.into(),
            parse: Arc::new(parse),
            setter: None,
            validate: None,
        }
    }

    /// Make the binding writable with a template and a custom encoder.
    pub fn settable_with<E>(mut self, template: impl Into<String>, encode: E) -> Self
    where
        E: Fn(&T) -> std::result::Result<Args, String> + Send + Sync + 'static,
    {
        self.setter = Some(Setter {
            template: template.into(),
            encode: Arc::new(encode),
        });
        self
    }

    /// Reject values before they are encoded.
    pub fn validated<V>(mut self, validate: V) -> Self
    where
        V: Fn(&T) -> std::result::Result<(), String> + Send + Sync + 'static,
    {
        self.validate = Some(Arc::new(validate));
        self
    }

    /// Property name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Command that reads the property.
    pub fn query_command(&self) -> &str {
        &self.query
    }

    /// Template that writes the property, if it is writable.
    pub fn set_template(&self) -> Option<&str> {
        self.setter.as_ref().map(|s| s.template.as_str())
    }

    /// Whether the property has no set command.
    pub fn is_read_only(&self) -> bool {
        self.setter.is_none()
    }

    /// Parse a response into the property type.
    pub fn decode(&self, response: &Response) -> Result<T> {
        (self.parse)(response).map_err(|reason| LinkError::Parse {
            property: self.name.clone(),
            raw: response.text().into_owned(),
            reason,
        })
    }

    /// Render the set command for `value` without sending it.
    pub fn encode(&self, value: &T) -> Result<String> {
        let setter = self
            .setter
            .as_ref()
            .ok_or_else(|| LinkError::ReadOnly(self.name.clone()))?;

        if let Some(validate) = &self.validate {
            validate(value).map_err(|reason| self.invalid(reason))?;
        }
        let vars = (setter.encode)(value).map_err(|reason| self.invalid(reason))?;

        strfmt(&setter.template, &vars).map_err(|e| {
            LinkError::Configuration(format!(
                "set template {:?} for '{}' could not be rendered: {}",
                setter.template, self.name, e
            ))
        })
    }

    /// Query and parse the property.
    pub async fn get(&self, session: &mut Session) -> Result<T> {
        let response = session.query(&self.query).await?;
        self.decode(&response)
    }

    /// Encode and send the set command.
    ///
    /// Fails with `ReadOnly` or `InvalidValue` before anything is written.
    pub async fn set(&self, session: &mut Session, value: &T) -> Result<()> {
        let command = self.encode(value)?;
        session.send(&command).await
    }

    /// Read, modify and write the property as one unit.
    ///
    /// Exclusive access to the session guarantees nothing else is sent between
    /// the read and the write. Returns the value that was written.
    pub async fn update<F>(&self, session: &mut Session, modify: F) -> Result<T>
    where
        F: FnOnce(&mut T) + Send,
    {
        if self.is_read_only() {
            return Err(LinkError::ReadOnly(self.name.clone()));
        }
        let mut current = self.get(session).await?;
        modify(&mut current);
        self.set(session, &current).await?;
        Ok(current)
    }

    fn invalid(&self, reason: String) -> LinkError {
        LinkError::InvalidValue {
            property: self.name.clone(),
            reason,
        }
    }
}

impl<T: PropertyType> Binding<T> {
    /// Read-only binding parsed with the type's wire syntax.
    pub fn read_only(name: impl Into<String>, query: impl Into<String>) -> Self {
        Self::new(name, query, |response: &Response| T::parse_wire(&response.text()))
    }

    /// Read/write binding; `template` receives the value as `{value}`.
    pub fn read_write(
        name: impl Into<String>,
        query: impl Into<String>,
        template: impl Into<String>,
    ) -> Self {
        Self::read_only(name, query).settable(template)
    }

    /// Make the binding writable with `{value}` rendered by the type's wire syntax.
    pub fn settable(self, template: impl Into<String>) -> Self {
        self.settable_with(template, |value: &T| Ok(args([("value", value.format_wire())])))
    }
}

// =============================================================================
// Field projections
// =============================================================================

/// One member of a composite binding.
pub struct Field<T, F> {
    name: String,
    whole: Arc<Binding<T>>,
    project: fn(&T) -> F,
    inject: fn(&mut T, F),
}

impl<T, F> fmt::Debug for Field<T, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field")
            .field("name", &self.name)
            .field("of", &self.whole.name)
            .finish()
    }
}

impl<T: Send + 'static, F: Send + 'static> Field<T, F> {
    /// Project `whole` through a getter/setter pair.
    pub fn new(
        name: impl Into<String>,
        whole: Arc<Binding<T>>,
        project: fn(&T) -> F,
        inject: fn(&mut T, F),
    ) -> Self {
        Self {
            name: name.into(),
            whole,
            project,
            inject,
        }
    }

    /// Field name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Composite binding this field belongs to.
    pub fn whole(&self) -> &Arc<Binding<T>> {
        &self.whole
    }

    /// Read the composite and project this field.
    pub async fn get(&self, session: &mut Session) -> Result<F> {
        let whole = self.whole.get(session).await?;
        Ok((self.project)(&whole))
    }

    /// Replace this field, keeping the other members as the device reports them.
    pub async fn set(&self, session: &mut Session, value: F) -> Result<()> {
        let inject = self.inject;
        self.whole
            .update(session, move |whole| inject(whole, value))
            .await
            .map(|_| ())
    }
}

// =============================================================================
// Type-erased access
// =============================================================================

/// Property accessed by name, with values erased to [`Value`] and text.
#[async_trait]
pub trait Property: Send + Sync {
    /// Property name.
    fn name(&self) -> &str;

    /// Command that reads the property.
    fn query_command(&self) -> &str;

    /// Template that writes the property, if any.
    fn set_template(&self) -> Option<&str>;

    /// Whether the property cannot be set.
    fn is_read_only(&self) -> bool {
        self.set_template().is_none()
    }

    /// Read the current value.
    async fn read_value(&self, session: &mut Session) -> Result<Value>;

    /// Parse `text` as user input and write it.
    async fn write_text(&self, session: &mut Session, text: &str) -> Result<()>;
}

#[async_trait]
impl<T: PropertyType> Property for Binding<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn query_command(&self) -> &str {
        &self.query
    }

    fn set_template(&self) -> Option<&str> {
        Binding::set_template(self)
    }

    async fn read_value(&self, session: &mut Session) -> Result<Value> {
        Ok(self.get(session).await?.to_value())
    }

    async fn write_text(&self, session: &mut Session, text: &str) -> Result<()> {
        if Binding::is_read_only(self) {
            return Err(LinkError::ReadOnly(self.name.clone()));
        }
        let value = T::parse_input(text).map_err(|reason| self.invalid(reason))?;
        self.set(session, &value).await
    }
}

#[async_trait]
impl<T, F> Property for Field<T, F>
where
    T: Send + Sync + 'static,
    F: PropertyType,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn query_command(&self) -> &str {
        self.whole.query_command()
    }

    fn set_template(&self) -> Option<&str> {
        self.whole.set_template()
    }

    async fn read_value(&self, session: &mut Session) -> Result<Value> {
        Ok(self.get(session).await?.to_value())
    }

    async fn write_text(&self, session: &mut Session, text: &str) -> Result<()> {
        if self.whole.is_read_only() {
            return Err(LinkError::ReadOnly(self.name.clone()));
        }
        let value = F::parse_input(text).map_err(|reason| LinkError::InvalidValue {
            property: self.name.clone(),
            reason,
        })?;
        self.set(session, value).await
    }
}
