use std::fmt;

/// Declaration error found while checking a feature diagram or linking a
/// constraint or configuration against one. Accumulated, never raised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeclError {
    DuplicateName { name: String, first: String, second: String },
    Unresolved { name: String, location: String },
    Ambiguous { name: String, candidates: Vec<String> },
    DomainMismatch { constraint: String, left: String, right: String },
    ReservedTag { name: String },
    EmptyEnum { attribute: String },
    ConfigShape { name: String, detail: String },
}

impl fmt::Display for DeclError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateName { name, first, second } => {
                write!(f, "name '{}' declared at both {} and {}", name, first, second)
            }
            Self::Unresolved { name, location } => {
                write!(f, "unresolved reference '{}' at {}", name, location)
            }
            Self::Ambiguous { name, candidates } => {
                write!(f, "ambiguous reference '{}': {}", name, candidates.join(", "))
            }
            Self::DomainMismatch { constraint, left, right } => {
                write!(f, "comparison {} mixes domains {} and {}", constraint, left, right)
            }
            Self::ReservedTag { name } => {
                write!(f, "tag '{}' collides with a reserved feature slot", name)
            }
            Self::EmptyEnum { attribute } => {
                write!(f, "enum attribute '{}' has an empty domain", attribute)
            }
            Self::ConfigShape { name, detail } => {
                write!(f, "configuration entry '{}': {}", name, detail)
            }
        }
    }
}

/// Accumulator for declaration errors, returned from `check()` and the
/// linking operations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeclErrors {
    errors: Vec<DeclError>,
}

impl DeclErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, error: DeclError) {
        self.errors.push(error);
    }

    pub fn merge(&mut self, other: DeclErrors) {
        self.errors.extend(other.errors);
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn errors(&self) -> &[DeclError] {
        &self.errors
    }

    pub fn into_errors(self) -> Vec<DeclError> {
        self.errors
    }
}

impl fmt::Display for DeclErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.errors.is_empty() {
            return write!(f, "no declaration errors");
        }
        for (i, error) in self.errors.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", error)?;
        }
        Ok(())
    }
}

/// Misuse of a feature model as a whole: operating on an ill-defined
/// model, or exporting something DIMACS cannot express.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    IllDefined { errors: usize },
    AttributesUnsupported,
    UnsupportedConstraint { constraint: String },
}

impl fmt::Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IllDefined { errors } => {
                write!(f, "ill-defined feature model ({} declaration errors); fix check() errors first", errors)
            }
            Self::AttributesUnsupported => {
                write!(f, "DIMACS export is not available for feature models with attributes")
            }
            Self::UnsupportedConstraint { constraint } => {
                write!(f, "constraint {} cannot be translated to CNF", constraint)
            }
        }
    }
}

impl std::error::Error for ModelError {}

/// Precondition violation raised synchronously by a delta operation, or a
/// failure while executing an artifact function body.
#[derive(Debug, Clone, PartialEq)]
pub enum DeltaError {
    AlreadyExists { kind: &'static str, owner: String, member: String },
    Missing { kind: &'static str, owner: String, member: String },
    NotAClass { owner: String, op: &'static str },
    NotABase { class: String, bases: Vec<String> },
    DuplicateRoot { name: String },
    PathUnresolved { path: String },
    Parse { message: String },
    Arity { function: String, expected: usize, found: usize },
    UnknownName { name: String },
    Unsupported { what: String },
}

impl fmt::Display for DeltaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyExists { kind, owner, member } => {
                write!(f, "{} {} already has an element named {}", kind, owner, member)
            }
            Self::Missing { kind, owner, member } => {
                write!(f, "{} {} has no element named {}", kind, owner, member)
            }
            Self::NotAClass { owner, op } => {
                write!(f, "delta operation {} can only be applied to classes ({} found)", op, owner)
            }
            Self::NotABase { class, bases } => {
                write!(f, "cannot remove non-superclasses of {}: {}", class, bases.join(", "))
            }
            Self::DuplicateRoot { name } => {
                write!(f, "module {} already declared", name)
            }
            Self::PathUnresolved { path } => {
                write!(f, "no artifact at path {}", path)
            }
            Self::Parse { message } => {
                write!(f, "parse error: {}", message)
            }
            Self::Arity { function, expected, found } => {
                write!(f, "{}() takes {} arguments ({} given)", function, expected, found)
            }
            Self::UnknownName { name } => {
                write!(f, "name '{}' is not defined", name)
            }
            Self::Unsupported { what } => {
                write!(f, "unsupported construct: {}", what)
            }
        }
    }
}

impl std::error::Error for DeltaError {}

/// Raised when no overload option matches a call. The message renders
/// every registered signature together with the per-option failure.
#[derive(Debug, Clone)]
pub struct OverloadError {
    pub name: String,
    pub arguments: String,
    pub options: Vec<String>,
    pub failures: Vec<String>,
}

impl fmt::Display for OverloadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Failed all `{}` definitions. Given arguments:", self.name)?;
        writeln!(f, "    {}", self.arguments)?;
        if !self.failures.is_empty() {
            writeln!(f, "Failed calls:")?;
            for failure in &self.failures {
                writeln!(f, "    {}", failure)?;
            }
        }
        writeln!(f, "Options are:")?;
        for option in &self.options {
            writeln!(f, "    {}", option)?;
        }
        Ok(())
    }
}

impl std::error::Error for OverloadError {}

/// Result of calling one overload option body.
#[derive(Debug, Clone, PartialEq)]
pub enum CallError {
    /// Control signal: pretend the option did not match and resume
    /// dispatch with the next one. Never surfaces past the dispatcher.
    Undispatch,
    Failure(String),
}

impl fmt::Display for CallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undispatch => write!(f, "undispatched"),
            Self::Failure(msg) => write!(f, "{}", msg),
        }
    }
}

/// Failure of a full `ProductLine::derive` run.
#[derive(Debug)]
pub enum DeriveError {
    Decl(DeclErrors),
    Model(ModelError),
    /// The closed configuration does not satisfy the feature model; the
    /// reason tree is carried as JSON-renderable data.
    Invalid(crate::fm::ReasonTree),
    Delta { delta: String, error: DeltaError },
}

impl fmt::Display for DeriveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Decl(errors) => write!(f, "configuration does not link: {}", errors),
            Self::Model(e) => write!(f, "{}", e),
            Self::Invalid(reason) => write!(f, "configuration rejected: {}", reason),
            Self::Delta { delta, error } => write!(f, "delta '{}' failed: {}", delta, error),
        }
    }
}

impl std::error::Error for DeriveError {}
