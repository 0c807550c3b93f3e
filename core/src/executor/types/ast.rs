//! Abstract Syntax Tree node types

use serde::{Deserialize, Serialize};

/// Source location span for error reporting and diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Span {
    /// Start byte offset
    pub start: usize,
    /// End byte offset
    pub end: usize,
    /// Start line (0-indexed)
    pub start_line: usize,
    /// Start column (0-indexed)
    pub start_col: usize,
    /// End line (0-indexed)
    pub end_line: usize,
    /// End column (0-indexed)
    pub end_col: usize,
}

impl Span {
    pub fn new(
        start: usize,
        end: usize,
        start_line: usize,
        start_col: usize,
        end_line: usize,
        end_col: usize,
    ) -> Self {
        Self {
            start,
            end,
            start_line,
            start_col,
            end_line,
            end_col,
        }
    }

    /// Create a span that covers both self and other
    pub fn merge(&self, other: &Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
            start_line: if self.start <= other.start {
                self.start_line
            } else {
                other.start_line
            },
            start_col: if self.start <= other.start {
                self.start_col
            } else {
                other.start_col
            },
            end_line: if self.end >= other.end {
                self.end_line
            } else {
                other.end_line
            },
            end_col: if self.end >= other.end {
                self.end_col
            } else {
                other.end_col
            },
        }
    }
}

/* ===================== Program Structure ===================== */

/// A linked program: every feature set from every source file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Program {
    pub feature_sets: Vec<FeatureSet>,
}

impl Program {
    /// Total number of top-level statements across all feature sets
    pub fn statement_count(&self) -> usize {
        self.feature_sets.iter().map(|fs| fs.body.len()).sum()
    }

    pub fn find(&self, name: &str) -> Option<&FeatureSet> {
        self.feature_sets.iter().find(|fs| fs.name == name)
    }
}

/// Named block of statements triggered by events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureSet {
    pub name: String,
    /// Free text used to derive the trigger pattern
    pub activity: String,
    pub body: Vec<Stmt>,
    /// Source file the feature set was linked from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    #[serde(default, skip_serializing_if = "is_default_span")]
    pub span: Span,
}

/* ===================== Descriptors ===================== */

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Article {
    A,
    An,
    The,
}

impl Article {
    pub fn as_str(&self) -> &'static str {
        match self {
            Article::A => "a",
            Article::An => "an",
            Article::The => "the",
        }
    }

    pub fn from_word(word: &str) -> Option<Article> {
        match word {
            "a" => Some(Article::A),
            "an" => Some(Article::An),
            "the" => Some(Article::The),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Preposition {
    From,
    For,
    With,
    To,
    Into,
    On,
    At,
    By,
    In,
    Via,
    Against,
    As,
}

impl Preposition {
    pub const ALL: [Preposition; 12] = [
        Preposition::From,
        Preposition::For,
        Preposition::With,
        Preposition::To,
        Preposition::Into,
        Preposition::On,
        Preposition::At,
        Preposition::By,
        Preposition::In,
        Preposition::Via,
        Preposition::Against,
        Preposition::As,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Preposition::From => "from",
            Preposition::For => "for",
            Preposition::With => "with",
            Preposition::To => "to",
            Preposition::Into => "into",
            Preposition::On => "on",
            Preposition::At => "at",
            Preposition::By => "by",
            Preposition::In => "in",
            Preposition::Via => "via",
            Preposition::Against => "against",
            Preposition::As => "as",
        }
    }

    pub fn from_word(word: &str) -> Option<Preposition> {
        Preposition::ALL.iter().copied().find(|p| p.as_str() == word)
    }
}

/// Where an object descriptor gets its value from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceKind {
    Variable,
    Literal,
    /// A computed expression such as `<x> + <y>`
    Expression,
    Repository,
    Service,
    Event,
    Request,
    File,
}

/// Names that always denote a service rather than a binding
const SERVICE_NAMES: &[&str] = &[
    "console",
    "application",
    "events",
    "http-server",
    "http-client",
    "socket-server",
    "file-monitor",
    "contract",
];

impl SourceKind {
    /// Classify an object name
    pub fn classify(base: &str) -> SourceKind {
        if base.ends_with("-repository") {
            SourceKind::Repository
        } else if base.ends_with("-service") || SERVICE_NAMES.contains(&base) {
            SourceKind::Service
        } else if base == "event" {
            SourceKind::Event
        } else if matches!(
            base,
            "request" | "pathParameters" | "queryParameters" | "headers" | "body"
        ) {
            SourceKind::Request
        } else if base == "file" || base.ends_with("-file") {
            SourceKind::File
        } else {
            SourceKind::Variable
        }
    }
}

/// Output binding of an action statement: `the <name: qualifier>`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultDescriptor {
    pub base: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qualifier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub article: Option<Article>,
    #[serde(default, skip_serializing_if = "is_default_span")]
    pub span: Span,
}

/// Input source of an action statement: `from the <name: qualifier>`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectDescriptor {
    pub preposition: Preposition,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub article: Option<Article>,
    pub kind: SourceKind,
    /// Empty for literal and expression sources
    pub base: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qualifier: Option<String>,
    /// Source expression for literal and expression kinds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Expr>,
    /// `where` clause
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Expr>,
    /// `with` clause
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub argument: Option<Expr>,
    #[serde(default, skip_serializing_if = "is_default_span")]
    pub span: Span,
}

impl ObjectDescriptor {
    /// Qualifier split into a member path (`address.city` -> `["address", "city"]`)
    pub fn path(&self) -> Vec<String> {
        self.qualifier
            .as_deref()
            .map(|q| q.split('.').map(str::to_string).collect())
            .unwrap_or_default()
    }
}

/// `<Verb> the <result> prep the <object> [where ..] [with ..] [when ..].`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionStmt {
    pub verb: String,
    pub result: ResultDescriptor,
    pub object: ObjectDescriptor,
    /// Statement-level guard; the statement is skipped when unsatisfied
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<Expr>,
    #[serde(default, skip_serializing_if = "is_default_span")]
    pub span: Span,
}

/* ===================== Statements ===================== */

/// Statement AST node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t")]
pub enum Stmt {
    Action(ActionStmt),
    Publish {
        alias: String,
        variable: String,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    Transition {
        /// Variable holding the entity
        target: String,
        field: String,
        from: String,
        to: String,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    If {
        test: Expr,
        then_s: Vec<Stmt>,
        else_s: Option<Vec<Stmt>>,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    /// `when cond { .. }` - runs the body then leaves the feature set
    When {
        test: Expr,
        body: Vec<Stmt>,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    Match {
        subject: VarRef,
        cases: Vec<MatchCase>,
        otherwise: Option<Vec<Stmt>>,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    ForEach {
        binding: String,
        index: Option<String>,
        collection: VarRef,
        filter: Option<Expr>,
        parallel: bool,
        body: Vec<Stmt>,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    ForRange {
        binding: String,
        from: Expr,
        to: Expr,
        body: Vec<Stmt>,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
}

impl Stmt {
    /// Get the span of this statement
    pub fn span(&self) -> Span {
        match self {
            Stmt::Action(action) => action.span,
            Stmt::Publish { span, .. } => *span,
            Stmt::Transition { span, .. } => *span,
            Stmt::If { span, .. } => *span,
            Stmt::When { span, .. } => *span,
            Stmt::Match { span, .. } => *span,
            Stmt::ForEach { span, .. } => *span,
            Stmt::ForRange { span, .. } => *span,
        }
    }

    /// Short name of the statement kind
    pub fn kind_name(&self) -> &'static str {
        match self {
            Stmt::Action(_) => "action",
            Stmt::Publish { .. } => "publish",
            Stmt::Transition { .. } => "transition",
            Stmt::If { .. } => "if",
            Stmt::When { .. } => "when",
            Stmt::Match { .. } => "match",
            Stmt::ForEach { .. } => "for-each",
            Stmt::ForRange { .. } => "for-range",
        }
    }

    /// True for `Return`/`Throw` actions, which always leave the feature set
    pub fn is_terminator(&self) -> bool {
        match self {
            Stmt::Action(action) if action.when.is_none() => {
                let verb = action.verb.to_ascii_lowercase();
                matches!(verb.as_str(), "return" | "respond" | "throw" | "fail")
            }
            _ => false,
        }
    }
}

/// Reference to a binding, optionally drilling into members: `<order: items.first>`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VarRef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub path: Vec<String>,
    #[serde(default, skip_serializing_if = "is_default_span")]
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchCase {
    pub pattern: Pattern,
    pub guard: Option<Expr>,
    pub body: Vec<Stmt>,
    #[serde(default, skip_serializing_if = "is_default_span")]
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t")]
pub enum Pattern {
    Literal { v: Literal },
    Variable { var: VarRef },
    Regex { pattern: String, flags: String },
    Wildcard,
}

/* ===================== Expressions ===================== */

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", content = "v")]
pub enum Literal {
    Null,
    Bool(bool),
    Num(f64),
    Str(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    And,
    Or,
    Eq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    Contains,
    Matches,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

impl BinaryOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
            BinaryOp::Eq => "==",
            BinaryOp::NotEq => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Contains => "contains",
            BinaryOp::Matches => "matches",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
        }
    }

    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOp::Eq
                | BinaryOp::NotEq
                | BinaryOp::Lt
                | BinaryOp::Le
                | BinaryOp::Gt
                | BinaryOp::Ge
                | BinaryOp::Contains
                | BinaryOp::Matches
        )
    }
}

/// Expression AST node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t")]
pub enum Expr {
    Lit {
        v: Literal,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    /// The `empty` keyword, only meaningful on the right of `is` / `is not`
    Empty {
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    /// `<name>` or `<name: member.path>`
    Var {
        name: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        path: Vec<String>,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    /// Bare identifier; a member of the current collection element
    Field {
        name: String,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    Regex {
        pattern: String,
        flags: String,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    List {
        elements: Vec<Expr>,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    Object {
        properties: Vec<(String, Expr)>,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    Call {
        function: String,
        args: Vec<Expr>,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
}

impl Expr {
    /// Get the span of this expression
    pub fn span(&self) -> Span {
        match self {
            Expr::Lit { span, .. } => *span,
            Expr::Empty { span } => *span,
            Expr::Var { span, .. } => *span,
            Expr::Field { span, .. } => *span,
            Expr::Regex { span, .. } => *span,
            Expr::List { span, .. } => *span,
            Expr::Object { span, .. } => *span,
            Expr::Unary { span, .. } => *span,
            Expr::Binary { span, .. } => *span,
            Expr::Call { span, .. } => *span,
        }
    }

    /// Collect the names of all `<variable>` references in this expression
    pub fn variables(&self, out: &mut Vec<(String, Span)>) {
        match self {
            Expr::Var { name, span, .. } => out.push((name.clone(), *span)),
            Expr::List { elements, .. } => elements.iter().for_each(|e| e.variables(out)),
            Expr::Object { properties, .. } => {
                properties.iter().for_each(|(_, e)| e.variables(out))
            }
            Expr::Unary { operand, .. } => operand.variables(out),
            Expr::Binary { left, right, .. } => {
                left.variables(out);
                right.variables(out);
            }
            Expr::Call { args, .. } => args.iter().for_each(|e| e.variables(out)),
            Expr::Lit { .. } | Expr::Empty { .. } | Expr::Field { .. } | Expr::Regex { .. } => {}
        }
    }
}

/// Helper function for serde to skip serializing default spans
fn is_default_span(span: &Span) -> bool {
    *span == Span::default()
}
