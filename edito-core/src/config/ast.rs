//! Syntax tree for configuration scripts.
//!
//! Only as much structure is kept as directive extraction needs. Types,
//! patterns and attribute bodies are stored as their source text.

#[derive(Debug, Clone, PartialEq)]
pub struct SourceFile {
    pub items: Vec<Item>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    /// `#[...]` or `#![...]`
    Attribute { inner: bool, text: String },
    /// `use a::b::{c, d};` with the tree as written
    Use { tree: String },
    /// `mod name;` or `mod name { ... }`
    Mod {
        name: String,
        items: Option<Vec<Item>>,
    },
    ExternCrate {
        name: String,
        alias: Option<String>,
    },
    /// `const` or `static` item
    Const {
        name: String,
        ty: String,
        value: Expr,
        is_static: bool,
    },
    Fn(FnItem),
    /// Any other item, e.g. `struct`, `impl` or `macro_rules!`, as written
    Opaque { kind: String, text: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct FnItem {
    pub name: String,
    pub params: Vec<Param>,
    pub body: Block,
    pub line: u32,
}

impl FnItem {
    /// Binding name of the first parameter, without `mut`
    pub fn first_param_name(&self) -> Option<&str> {
        let pattern = self.params.first()?.pattern.as_str();
        Some(pattern.strip_prefix("mut ").unwrap_or(pattern).trim())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub pattern: String,
    pub ty: String,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Block {
    pub stmts: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Let {
        line: u32,
        pattern: String,
        ty: Option<String>,
        init: Option<Expr>,
        else_block: Option<Block>,
    },
    /// `target = value`, `target += value`, ...
    Assign {
        line: u32,
        target: Expr,
        op: String,
        value: Expr,
    },
    /// An expression statement. `semi` is false for tail expressions and
    /// block-like expressions written without `;`.
    Expr { line: u32, expr: Expr, semi: bool },
    Item(Item),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Lit {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Char(char),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
    Deref,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Mul,
    Div,
    Rem,
    Add,
    Sub,
    Shl,
    Shr,
    BitAnd,
    BitXor,
    BitOr,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Range,
    RangeInclusive,
}

impl BinOp {
    /// Binding strength, higher binds tighter
    pub fn precedence(self) -> u8 {
        match self {
            BinOp::Mul | BinOp::Div | BinOp::Rem => 10,
            BinOp::Add | BinOp::Sub => 9,
            BinOp::Shl | BinOp::Shr => 8,
            BinOp::BitAnd => 7,
            BinOp::BitXor => 6,
            BinOp::BitOr => 5,
            BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => 4,
            BinOp::And => 3,
            BinOp::Or => 2,
            BinOp::Range | BinOp::RangeInclusive => 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchArm {
    pub pattern: String,
    pub guard: Option<Expr>,
    pub body: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Lit(Lit),
    /// `a::b::c`, generic arguments dropped
    Path(Vec<String>),
    MethodCall {
        receiver: Box<Expr>,
        method: String,
        args: Vec<Expr>,
    },
    Call {
        func: Box<Expr>,
        args: Vec<Expr>,
    },
    /// `name!(...)` with the delimited body as written
    Macro {
        path: Vec<String>,
        tokens: String,
    },
    Closure {
        params: Vec<String>,
        body: Box<Expr>,
    },
    Field {
        base: Box<Expr>,
        name: String,
    },
    Index {
        base: Box<Expr>,
        index: Box<Expr>,
    },
    Ref {
        mutable: bool,
        expr: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Cast {
        expr: Box<Expr>,
        ty: String,
    },
    Array(Vec<Expr>),
    Repeat {
        value: Box<Expr>,
        count: Box<Expr>,
    },
    Tuple(Vec<Expr>),
    Paren(Box<Expr>),
    Try(Box<Expr>),
    Block(Block),
    If {
        /// `if let` pattern
        pattern: Option<String>,
        cond: Box<Expr>,
        then: Block,
        otherwise: Option<Box<Expr>>,
    },
    While {
        pattern: Option<String>,
        cond: Box<Expr>,
        body: Block,
    },
    For {
        pattern: String,
        iter: Box<Expr>,
        body: Block,
    },
    Loop(Block),
    Match {
        scrutinee: Box<Expr>,
        arms: Vec<MatchArm>,
    },
    Return(Option<Box<Expr>>),
    Break(Option<Box<Expr>>),
    Continue,
}

impl Expr {
    /// Expressions that end in a block and may stand as statements without `;`
    pub fn is_block_like(&self) -> bool {
        matches!(
            self,
            Expr::Block(_)
                | Expr::If { .. }
                | Expr::While { .. }
                | Expr::For { .. }
                | Expr::Loop(_)
                | Expr::Match { .. }
        )
    }
}
