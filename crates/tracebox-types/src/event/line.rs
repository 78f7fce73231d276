use serde::Serialize;
use std::fmt;
use uuid::Uuid;

/// Identity of one parsed trace line.
///
/// Assigned when the line is parsed, so parsing the same text twice yields
/// two distinct lines. Navigation caches key their entries by this id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LineId(Uuid);

impl LineId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for LineId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for LineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a trace line asks of a symbol index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SymbolQuery {
    /// Look a type up by its fully-qualified name (exception lines).
    ByName { qualified_name: String },
    /// Look up the type enclosing a frame's method, then anchor at a line.
    EnclosingType {
        qualified_name: String,
        line_number: Option<u32>,
    },
}

impl SymbolQuery {
    pub fn qualified_name(&self) -> &str {
        match self {
            SymbolQuery::ByName { qualified_name }
            | SymbolQuery::EnclosingType { qualified_name, .. } => qualified_name,
        }
    }

    pub fn line_number(&self) -> Option<u32> {
        match self {
            SymbolQuery::ByName { .. } => None,
            SymbolQuery::EnclosingType { line_number, .. } => *line_number,
        }
    }
}

/// A parsed line that can be resolved to a source location.
pub trait Navigable {
    fn line_id(&self) -> LineId;
    fn text(&self) -> &str;
    fn symbol_query(&self) -> Option<SymbolQuery>;
}

/// First line of a trace: `[prefix] a.b.SomeException[: message]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExceptionHeader {
    #[serde(skip)]
    pub id: LineId,
    pub text: String,
    pub qualified_name: String,
    pub message: Option<String>,
}

impl ExceptionHeader {
    pub fn new(
        text: impl Into<String>,
        qualified_name: impl Into<String>,
        message: Option<String>,
    ) -> Self {
        Self {
            id: LineId::new(),
            text: text.into(),
            qualified_name: qualified_name.into(),
            message,
        }
    }
}

/// `Caused by: a.b.OtherException[: message]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CausedBy {
    #[serde(skip)]
    pub id: LineId,
    pub text: String,
    pub qualified_name: String,
    pub message: Option<String>,
}

impl CausedBy {
    pub fn new(
        text: impl Into<String>,
        qualified_name: impl Into<String>,
        message: Option<String>,
    ) -> Self {
        Self {
            id: LineId::new(),
            text: text.into(),
            qualified_name: qualified_name.into(),
            message,
        }
    }
}

/// `at a.b.C$Inner.method(C.java:42)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Frame {
    #[serde(skip)]
    pub id: LineId,
    pub text: String,
    /// Method reference exactly as printed, e.g. `a.b.C$Inner.method`.
    pub raw_method_ref: String,
    /// Type used for symbol lookup, with inner-class and method parts cut off.
    pub enclosing_type: Option<String>,
    pub file_simple_name: Option<String>,
    /// 1-based source line.
    pub line_number: Option<u32>,
}

impl Frame {
    pub fn new(
        text: impl Into<String>,
        raw_method_ref: impl Into<String>,
        enclosing_type: Option<String>,
        file_simple_name: Option<String>,
        line_number: Option<u32>,
    ) -> Self {
        Self {
            id: LineId::new(),
            text: text.into(),
            raw_method_ref: raw_method_ref.into(),
            enclosing_type,
            file_simple_name,
            line_number,
        }
    }

    pub fn method_name(&self) -> &str {
        self.raw_method_ref
            .rsplit_once('.')
            .map(|(_, method)| method)
            .unwrap_or(&self.raw_method_ref)
    }
}

/// One classified line of a stack trace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TraceLine {
    ExceptionHeader(ExceptionHeader),
    CausedBy(CausedBy),
    Frame(Frame),
}

impl TraceLine {
    pub fn is_header(&self) -> bool {
        matches!(self, TraceLine::ExceptionHeader(_))
    }

    /// Lines that may follow a header inside one trace.
    pub fn is_continuation(&self) -> bool {
        !self.is_header()
    }
}

impl Navigable for ExceptionHeader {
    fn line_id(&self) -> LineId {
        self.id
    }

    fn text(&self) -> &str {
        &self.text
    }

    fn symbol_query(&self) -> Option<SymbolQuery> {
        Some(SymbolQuery::ByName {
            qualified_name: self.qualified_name.clone(),
        })
    }
}

impl Navigable for CausedBy {
    fn line_id(&self) -> LineId {
        self.id
    }

    fn text(&self) -> &str {
        &self.text
    }

    fn symbol_query(&self) -> Option<SymbolQuery> {
        Some(SymbolQuery::ByName {
            qualified_name: self.qualified_name.clone(),
        })
    }
}

impl Navigable for Frame {
    fn line_id(&self) -> LineId {
        self.id
    }

    fn text(&self) -> &str {
        &self.text
    }

    fn symbol_query(&self) -> Option<SymbolQuery> {
        self.enclosing_type
            .as_ref()
            .map(|qualified_name| SymbolQuery::EnclosingType {
                qualified_name: qualified_name.clone(),
                line_number: self.line_number,
            })
    }
}

impl Navigable for TraceLine {
    fn line_id(&self) -> LineId {
        match self {
            TraceLine::ExceptionHeader(line) => line.line_id(),
            TraceLine::CausedBy(line) => line.line_id(),
            TraceLine::Frame(line) => line.line_id(),
        }
    }

    fn text(&self) -> &str {
        match self {
            TraceLine::ExceptionHeader(line) => &line.text,
            TraceLine::CausedBy(line) => &line.text,
            TraceLine::Frame(line) => &line.text,
        }
    }

    fn symbol_query(&self) -> Option<SymbolQuery> {
        match self {
            TraceLine::ExceptionHeader(line) => line.symbol_query(),
            TraceLine::CausedBy(line) => line.symbol_query(),
            TraceLine::Frame(line) => line.symbol_query(),
        }
    }
}
