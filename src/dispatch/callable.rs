//! Callable definitions stored in the dispatch registry

use std::fmt;
use std::future::Future;
use std::sync::{Arc, LazyLock};

use futures::future::BoxFuture;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::{Error, Result};

/// Valid callable names
static NAME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("static pattern"));

/// Future returned by a handler
pub type HandlerFuture = BoxFuture<'static, Result<Value>>;

/// Type-erased async handler: invocation in, JSON out
pub type Handler = Arc<dyn Fn(Invocation) -> HandlerFuture + Send + Sync>;

/// Wrap an async closure as a [`Handler`]
pub fn handler<F, Fut>(f: F) -> Handler
where
    F: Fn(Invocation) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    Arc::new(move |invocation| Box::pin(f(invocation)))
}

/// Check that `name` is a non-empty identifier
///
/// # Errors
///
/// Returns `Error::InvalidName` if the name does not match `^[A-Za-z_][A-Za-z0-9_]*$`
pub fn validate_name(name: &str) -> Result<()> {
    if NAME_PATTERN.is_match(name) {
        Ok(())
    } else {
        Err(Error::InvalidName(name.to_string()))
    }
}

/// Context handed to a handler for one call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Invocation {
    /// Caller-supplied input object
    pub input: Value,
    pub execution_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl Invocation {
    /// Create an invocation with a fresh execution ID
    #[must_use]
    pub fn new(input: Value) -> Self {
        Self {
            input,
            execution_id: format!("exec_{}", Uuid::new_v4().simple()),
            workflow_id: None,
            session_id: None,
        }
    }

    #[must_use]
    pub fn with_workflow(mut self, workflow_id: impl Into<String>) -> Self {
        self.workflow_id = Some(workflow_id.into());
        self
    }

    #[must_use]
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }
}

/// Registration options shared by bots and skills
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CallableOptions {
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<Value>,
    /// Report progress and lineage to the control plane's workflow tracker
    #[serde(default)]
    pub track_workflow: bool,
}

impl CallableOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn input_schema(mut self, schema: Value) -> Self {
        self.input_schema = Some(schema);
        self
    }

    #[must_use]
    pub fn output_schema(mut self, schema: Value) -> Self {
        self.output_schema = Some(schema);
        self
    }

    #[must_use]
    pub const fn track_workflow(mut self, track: bool) -> Self {
        self.track_workflow = track;
        self
    }
}

/// Name, handler and options of one registered unit
#[derive(Clone)]
pub struct CallableDefinition {
    pub name: String,
    pub handler: Handler,
    pub options: CallableOptions,
}

impl fmt::Debug for CallableDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallableDefinition")
            .field("name", &self.name)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// Which kind of unit a callable is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallableKind {
    Bot,
    Skill,
}

impl fmt::Display for CallableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bot => f.write_str("bot"),
            Self::Skill => f.write_str("skill"),
        }
    }
}

/// A registered bot or skill
#[derive(Debug, Clone)]
pub enum Callable {
    /// Workflow-tracked, longer-running operation
    Bot(CallableDefinition),
    /// Lightweight operation, the usual target of tool bridging
    Skill(CallableDefinition),
}

impl Callable {
    /// Build a bot, validating its name
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidName` for empty or malformed names
    pub fn bot(
        name: impl Into<String>,
        handler: Handler,
        options: CallableOptions,
    ) -> Result<Self> {
        let name = name.into();
        validate_name(&name)?;
        Ok(Self::Bot(CallableDefinition {
            name,
            handler,
            options: CallableOptions {
                track_workflow: true,
                ..options
            },
        }))
    }

    /// Build a skill, validating its name
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidName` for empty or malformed names
    pub fn skill(
        name: impl Into<String>,
        handler: Handler,
        options: CallableOptions,
    ) -> Result<Self> {
        let name = name.into();
        validate_name(&name)?;
        Ok(Self::Skill(CallableDefinition {
            name,
            handler,
            options,
        }))
    }

    #[must_use]
    pub const fn definition(&self) -> &CallableDefinition {
        match self {
            Self::Bot(def) | Self::Skill(def) => def,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.definition().name
    }

    #[must_use]
    pub const fn kind(&self) -> CallableKind {
        match self {
            Self::Bot(_) => CallableKind::Bot,
            Self::Skill(_) => CallableKind::Skill,
        }
    }

    #[must_use]
    pub const fn options(&self) -> &CallableOptions {
        &self.definition().options
    }

    /// Run the handler
    ///
    /// # Errors
    ///
    /// Propagates whatever the handler returns
    pub async fn call(&self, invocation: Invocation) -> Result<Value> {
        (self.definition().handler)(invocation).await
    }

    /// Serializable description for discovery
    #[must_use]
    pub fn info(&self) -> CallableInfo {
        CallableInfo {
            name: self.name().to_string(),
            kind: self.kind(),
            options: self.options().clone(),
        }
    }
}

/// Introspection view of a callable, without its handler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallableInfo {
    pub name: String,
    pub kind: CallableKind,
    #[serde(flatten)]
    pub options: CallableOptions,
}
