//! Name → callable dispatch table

use indexmap::IndexMap;
use parking_lot::RwLock;
use serde_json::Value;

use super::callable::{Callable, CallableInfo, CallableKind, CallableOptions, Handler, Invocation};
use super::router::RouterGroup;
use crate::{Error, Result};

/// Dispatch table for every bot and skill the node exposes
///
/// Names are unique. A second registration under an existing name replaces the
/// earlier entry (keeping its position) and logs a warning; the replaced entry
/// is returned to the caller. Bridged tools use [`Self::register_if_absent`]
/// and never replace anything.
#[derive(Debug, Default)]
pub struct DispatchRegistry {
    entries: RwLock<IndexMap<String, Callable>>,
}

impl DispatchRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a callable, replacing any entry with the same name
    ///
    /// Names are validated when the [`Callable`] is built, so this cannot fail;
    /// it returns the entry that was replaced, if any.
    pub fn register(&self, callable: Callable) -> Option<Callable> {
        let name = callable.name().to_string();
        let previous = self.entries.write().insert(name.clone(), callable);
        if let Some(prev) = &previous {
            tracing::warn!(
                name = %name,
                previous_kind = %prev.kind(),
                "callable registered twice, replacing earlier entry"
            );
        }
        previous
    }

    /// Register a bot
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidName` for empty or malformed names
    pub fn register_bot(
        &self,
        name: &str,
        handler: Handler,
        options: CallableOptions,
    ) -> Result<Option<Callable>> {
        Ok(self.register(Callable::bot(name, handler, options)?))
    }

    /// Register a skill
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidName` for empty or malformed names
    pub fn register_skill(
        &self,
        name: &str,
        handler: Handler,
        options: CallableOptions,
    ) -> Result<Option<Callable>> {
        Ok(self.register(Callable::skill(name, handler, options)?))
    }

    /// Store a callable only if its name is free
    ///
    /// Returns `true` if it was inserted.
    pub fn register_if_absent(&self, callable: Callable) -> bool {
        let mut entries = self.entries.write();
        if entries.contains_key(callable.name()) {
            return false;
        }
        entries.insert(callable.name().to_string(), callable);
        true
    }

    /// Merge every callable of a router, in router order
    ///
    /// Collisions follow the same replace-with-warning policy as [`Self::register`].
    /// Returns the number of callables merged.
    pub fn include_router(&self, router: RouterGroup) -> usize {
        let prefix = router.prefix().map(ToString::to_string);
        let callables = router.into_callables();
        let count = callables.len();
        for callable in callables {
            self.register(callable);
        }
        tracing::debug!(prefix = ?prefix, count, "router merged");
        count
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Callable> {
        self.entries.read().get(name).cloned()
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.read().contains_key(name)
    }

    /// Every callable in registration order
    #[must_use]
    pub fn all(&self) -> Vec<Callable> {
        self.entries.read().values().cloned().collect()
    }

    /// Discovery view of every callable
    #[must_use]
    pub fn describe(&self) -> Vec<CallableInfo> {
        self.entries.read().values().map(Callable::info).collect()
    }

    #[must_use]
    pub fn bot_names(&self) -> Vec<String> {
        self.names_of(CallableKind::Bot)
    }

    #[must_use]
    pub fn skill_names(&self) -> Vec<String> {
        self.names_of(CallableKind::Skill)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Look up and run a callable
    ///
    /// The table lock is released before the handler runs.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` for unknown names, otherwise whatever the handler returns
    pub async fn invoke(&self, name: &str, invocation: Invocation) -> Result<Value> {
        let callable = self
            .get(name)
            .ok_or_else(|| Error::NotFound(format!("callable '{name}'")))?;
        callable.call(invocation).await
    }

    fn names_of(&self, kind: CallableKind) -> Vec<String> {
        self.entries
            .read()
            .values()
            .filter(|c| c.kind() == kind)
            .map(|c| c.name().to_string())
            .collect()
    }
}
