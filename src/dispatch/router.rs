//! Router groups: batches of callables registered under a shared name prefix

use super::callable::{Callable, CallableOptions, Handler, validate_name};
use crate::Result;

/// Callables collected under an optional prefix before being merged into a
/// [`super::DispatchRegistry`] with `include_router`
///
/// A callable `name` added to a router with prefix `p` is stored as `p_name`.
#[derive(Debug, Clone, Default)]
pub struct RouterGroup {
    prefix: Option<String>,
    tags: Vec<String>,
    pending: Vec<Callable>,
}

impl RouterGroup {
    /// Create a router; the prefix is reduced to `[A-Za-z0-9_]`
    #[must_use]
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: sanitize_prefix(prefix),
            tags: Vec::new(),
            pending: Vec::new(),
        }
    }

    /// Tags applied to every callable in this router, ahead of per-callable tags
    #[must_use]
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    /// Full name a callable will be registered under
    #[must_use]
    pub fn qualified_name(&self, name: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{prefix}_{name}"),
            None => name.to_string(),
        }
    }

    /// Add a bot
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidName` if the local or qualified name is not a valid identifier
    pub fn bot(
        &mut self,
        name: &str,
        handler: Handler,
        options: CallableOptions,
    ) -> Result<&mut Self> {
        validate_name(name)?;
        let callable = Callable::bot(self.qualified_name(name), handler, self.merge_tags(options))?;
        self.pending.push(callable);
        Ok(self)
    }

    /// Add a skill
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidName` if the local or qualified name is not a valid identifier
    pub fn skill(
        &mut self,
        name: &str,
        handler: Handler,
        options: CallableOptions,
    ) -> Result<&mut Self> {
        validate_name(name)?;
        let callable =
            Callable::skill(self.qualified_name(name), handler, self.merge_tags(options))?;
        self.pending.push(callable);
        Ok(self)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Pending callables in the order they were added
    #[must_use]
    pub fn into_callables(self) -> Vec<Callable> {
        self.pending
    }

    fn merge_tags(&self, mut options: CallableOptions) -> CallableOptions {
        let mut tags = self.tags.clone();
        tags.append(&mut options.tags);
        options.tags = tags;
        options
    }
}

/// Reduce a prefix to `[A-Za-z0-9_]`, collapsing and trimming underscores
///
/// `"/api/v1"` becomes `"api_v1"`. Returns `None` when nothing is left.
fn sanitize_prefix(prefix: &str) -> Option<String> {
    let mut out = String::with_capacity(prefix.len());
    for c in prefix.chars() {
        let c = if c.is_ascii_alphanumeric() { c } else { '_' };
        if c == '_' && out.ends_with('_') {
            continue;
        }
        out.push(c);
    }
    let trimmed = out.trim_matches('_');
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
