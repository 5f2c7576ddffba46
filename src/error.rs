//! Common error types.
//!
//! See [`PatchError`] and [`PatchErrorKind`] for details.
use std::fmt::Display;

/// Main error type for this crate.
#[derive(Debug, thiserror::Error)]
pub struct PatchError {
    kind: PatchErrorKind,
    context: String,
    source: Option<Box<dyn std::error::Error + 'static + Send + Sync>>,
}

impl PatchError {
    /// Creates a new error with the given error kind.
    pub fn new(kind: PatchErrorKind) -> Self {
        Self {
            kind,
            context: String::new(),
            source: None,
        }
    }

    /// Adds a source error.
    pub fn with_source<S>(mut self, source: S) -> Self
    where
        S: std::error::Error + 'static + Send + Sync,
    {
        self.source = Some(Box::new(source));
        self
    }

    /// Adds a string with a contextual description of the error.
    pub fn with_context<C>(mut self, value: C) -> Self
    where
        C: AsRef<str>,
    {
        if !self.context.is_empty() {
            self.context.push_str(": ");
        }
        self.context.push_str(value.as_ref());
        self
    }

    /// Returns the error kind.
    pub fn kind(&self) -> &PatchErrorKind {
        &self.kind
    }

    /// Returns the contextual description.
    pub fn context(&self) -> &str {
        &self.context
    }

    /// Returns whether the error kind is [`PatchErrorKind::PermissionDenied`].
    ///
    /// Front-ends use this to show OS specific remedies (close the client,
    /// grant disk access, or run elevated).
    pub fn is_permission_denied(&self) -> bool {
        matches!(self.kind, PatchErrorKind::PermissionDenied)
    }

    /// Returns a reference to the source error if it is of type `E`.
    pub fn downcast_source<E>(&self) -> Option<&E>
    where
        E: std::error::Error + 'static,
    {
        self.source
            .as_ref()
            .and_then(|source| source.downcast_ref::<E>())
    }

    /// Returns a reference to the IO error if the source is one.
    pub fn as_io(&self) -> Option<&std::io::Error> {
        self.downcast_source()
    }
}

impl Display for PatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if !self.context.is_empty() {
            f.write_str(&self.context)?;
            f.write_str(": ")?;
        }

        self.kind.fmt(f)?;

        Ok(())
    }
}

impl From<PatchErrorKind> for PatchError {
    fn from(value: PatchErrorKind) -> Self {
        Self::new(value)
    }
}

impl From<std::io::Error> for PatchError {
    fn from(value: std::io::Error) -> Self {
        let kind = match value.kind() {
            std::io::ErrorKind::PermissionDenied => PatchErrorKind::PermissionDenied,
            _ => PatchErrorKind::Io,
        };
        Self::new(kind).with_source(value)
    }
}

impl From<AdditionalContext> for PatchError {
    fn from(value: AdditionalContext) -> Self {
        Self::new(PatchErrorKind::Other).with_source(value)
    }
}

/// Error category for [`PatchError`].
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum PatchErrorKind {
    /// Input/Output error usually from [`std::io::Error`].
    #[error("input/output error")]
    Io,

    /// No installation matches the given selector.
    #[error("no matching Discord installation found")]
    NotFound,

    /// The OS refused access to a file or directory.
    #[error("permission denied")]
    PermissionDenied,

    /// The client's files are locked by a running process.
    #[error(
        "Discord's files are used by a different process. \
         Make sure you fully close Discord before trying again"
    )]
    ResourceBusy,

    /// A directory slated for deletion contains files this crate did not write.
    #[error("refusing to delete a directory containing unknown files")]
    UnsafeDeletion,

    /// A multi-step rename/write sequence failed.
    ///
    /// Completed steps were reverted when possible.
    #[error("patch transaction failed")]
    TransactionFailure,

    /// Fetching release metadata or downloading an asset failed.
    #[error("network request failed")]
    Network,

    /// The original archive backup is missing.
    #[error("no original app.asar backup found, reinstall Discord")]
    MissingBackup,

    /// The requested change is already in place.
    #[error("already applied")]
    AlreadyApplied,

    /// The requested change was never applied.
    #[error("not applied")]
    NotApplied,

    /// The installation was relocated by a broken installer run.
    #[error("the Discord installation is broken, reinstall Discord before proceeding")]
    MovedInstall,

    /// Running as superuser without a known invoking user.
    #[error(
        "running as root but neither SUDO_USER nor DOAS_USER are set, \
         rerun as a normal user or through sudo/doas"
    )]
    UnsafeInvocation,

    /// Environment variable was missing or malformed.
    #[error("invalid environment variable")]
    InvalidEnvironmentVariable,

    /// Unsupported OS family.
    #[error("unsupported OS family")]
    UnsupportedOsFamily,

    /// Invalid data or value provided to a function.
    #[error("invalid data or value")]
    InvalidData,

    /// Internal console/terminal library returned an error.
    #[error("console/terminal error")]
    Terminal,

    /// Indicates a guided interactive session was aborted by the user.
    #[error("interrupted by user")]
    InterruptedByUser,

    /// Any other error.
    #[error("other")]
    Other,
}

/// Modify `Result<T, PatchError>` with context.
pub trait AddPatchContext<T> {
    /// Add context using the given string when Err.
    fn patch_context<C>(self, context: C) -> Result<T, PatchError>
    where
        C: AsRef<str>;

    /// Add context using the evaluated function when Err.
    fn patch_contextc<C, CT>(self, context: C) -> Result<T, PatchError>
    where
        C: FnOnce() -> CT,
        CT: AsRef<str>;
}

impl<T> AddPatchContext<T> for Result<T, PatchError> {
    fn patch_context<C>(self, context: C) -> Result<T, PatchError>
    where
        C: AsRef<str>,
    {
        self.map_err(|error| error.with_context(context.as_ref()))
    }

    fn patch_contextc<C, CT>(self, context: C) -> Result<T, PatchError>
    where
        C: FnOnce() -> CT,
        CT: AsRef<str>,
    {
        self.map_err(|error| error.with_context(context().as_ref()))
    }
}

/// Contains a contextual description of an error.
///
/// This isn't a real error, but allows injecting context in the error stack.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct AdditionalContext {
    message: String,
    #[source]
    source: Box<dyn std::error::Error + Sync + Send + 'static>,
}

impl AdditionalContext {
    /// Creates a new context error with the given message and source error.
    pub fn new<E>(message: String, source: E) -> Self
    where
        E: std::error::Error + Sync + Send + 'static,
    {
        Self {
            message,
            source: Box::new(source),
        }
    }
}

/// Trait for wrapping errors in Result with descriptive context strings.
pub trait AddContext<T, E, A> {
    /// Map the error with an error containing the context string.
    fn with_context<C>(self, context: C) -> Result<T, A>
    where
        C: Into<String>;

    /// Map the error with an error containing the context string evaluated from a function.
    fn with_contextc<C, CT>(self, context: C) -> Result<T, A>
    where
        C: FnOnce(&E) -> CT,
        CT: Into<String>;
}

impl<T, E> AddContext<T, E, AdditionalContext> for Result<T, E>
where
    E: std::error::Error + Sync + Send + 'static,
{
    fn with_context<C>(self, context: C) -> Result<T, AdditionalContext>
    where
        C: Into<String>,
    {
        self.map_err(|error| AdditionalContext::new(context.into(), error))
    }

    fn with_contextc<C, CT>(self, context: C) -> Result<T, AdditionalContext>
    where
        C: FnOnce(&E) -> CT,
        CT: Into<String>,
    {
        self.map_err(|error| AdditionalContext::new(context(&error).into(), error))
    }
}

/// Renders the error and its chain of sources, one per line.
pub fn format_error<E>(error: E) -> String
where
    E: std::error::Error,
{
    let mut buf = error.to_string();

    let mut error: Box<&dyn std::error::Error> = Box::new(&error);

    while let Some(source) = error.source() {
        error = Box::new(source);
        buf.push_str("\n↳");
        buf.push_str(&error.to_string());
    }

    buf
}
