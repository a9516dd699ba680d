//! Blocks and ports
//!
//! A block is a typed node of a visual program. Its kind is drawn from a
//! closed set and fully determines which ports it exposes:
//!
//! - **Statement blocks** (`Action`, `Assign`, `Evaluate`, `Return`) sit on
//!   the control-flow path and emit one line each.
//! - **Structured blocks** (`Branch`, `Loop`) open a nested construct.
//! - **Expression blocks** (`Literal`, `Variable`, `Binary`, `Unary`, `Call`)
//!   only produce values and are inlined into the statements consuming them.
//! - **`Source`** is the unique entry point of a graph.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::StructuralError;
use crate::graph::NodeId;

/// Handle of a block inside a [`crate::BlockGraph`].
pub type BlockId = NodeId;

/// Maximum number of `arg` ports a block may declare.
pub const MAX_ARITY: u8 = 16;

// ============================================================================
// Ports
// ============================================================================

/// Direction and flavour of a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortKind {
    /// Control enters the block here.
    FlowIn,
    /// Control leaves the block here.
    FlowOut,
    /// A value is consumed here.
    DataIn,
    /// A value is produced here.
    DataOut,
}

impl PortKind {
    /// Returns `true` for ports that may carry outgoing edges.
    #[must_use]
    pub const fn is_output(self) -> bool {
        matches!(self, Self::FlowOut | Self::DataOut)
    }

    /// Returns `true` for control-flow ports.
    #[must_use]
    pub const fn is_flow(self) -> bool {
        matches!(self, Self::FlowIn | Self::FlowOut)
    }
}

/// Named attachment point on a block.
///
/// Serialized as a short string: `flow_in`, `next`, `then`, `else`, `body`,
/// `condition`, `out`, or `argN`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Port {
    /// Incoming control flow
    FlowIn,
    /// Sequential successor (for `Branch` and `Loop`: what follows the construct)
    Next,
    /// `Branch` path taken when the condition holds
    Then,
    /// `Branch` path taken otherwise
    Else,
    /// `Loop` body
    Body,
    /// Boolean input of `Branch` and `Loop`
    Condition,
    /// Positional data input
    Arg(u8),
    /// Value produced by an expression block
    Out,
}

impl Port {
    /// Returns the kind of this port.
    #[must_use]
    pub const fn kind(self) -> PortKind {
        match self {
            Self::FlowIn => PortKind::FlowIn,
            Self::Next | Self::Then | Self::Else | Self::Body => PortKind::FlowOut,
            Self::Condition | Self::Arg(_) => PortKind::DataIn,
            Self::Out => PortKind::DataOut,
        }
    }
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FlowIn => f.write_str("flow_in"),
            Self::Next => f.write_str("next"),
            Self::Then => f.write_str("then"),
            Self::Else => f.write_str("else"),
            Self::Body => f.write_str("body"),
            Self::Condition => f.write_str("condition"),
            Self::Arg(i) => write!(f, "arg{i}"),
            Self::Out => f.write_str("out"),
        }
    }
}

impl FromStr for Port {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "flow_in" => Ok(Self::FlowIn),
            "next" => Ok(Self::Next),
            "then" => Ok(Self::Then),
            "else" => Ok(Self::Else),
            "body" => Ok(Self::Body),
            "condition" => Ok(Self::Condition),
            "out" => Ok(Self::Out),
            other => other
                .strip_prefix("arg")
                .and_then(|n| n.parse::<u8>().ok())
                .filter(|n| *n < MAX_ARITY)
                .map(Self::Arg)
                .ok_or_else(|| format!("unknown port '{other}'")),
        }
    }
}

impl TryFrom<String> for Port {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Port> for String {
    fn from(port: Port) -> Self {
        port.to_string()
    }
}

// ============================================================================
// Operators and literals
// ============================================================================

/// Binary operator of a `Binary` expression block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinaryOp {
    /// Script spelling of the operator.
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Mod => "%",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::And => "&&",
            Self::Or => "||",
        }
    }
}

/// Unary operator of a `Unary` expression block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnaryOp {
    Not,
    Neg,
}

impl UnaryOp {
    /// Script spelling of the operator.
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Not => "!",
            Self::Neg => "-",
        }
    }
}

/// Constant carried by a `Literal` block.
///
/// Equality treats every NaN as equal to every other NaN, so a graph holding
/// one still equals its reloaded copy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Literal {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl PartialEq for Literal {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Self::Str(a), Self::Str(b)) => a == b,
            _ => false,
        }
    }
}

impl Literal {
    /// Renders the literal as script source.
    ///
    /// Strings use single quotes so that `$` is never interpolated.
    #[must_use]
    pub fn render(&self) -> String {
        match self {
            Self::Null => "null".to_string(),
            Self::Bool(b) => b.to_string(),
            Self::Int(i) => i.to_string(),
            Self::Float(x) if x.is_nan() => "Double.NaN".to_string(),
            Self::Float(x) if x.is_infinite() && *x > 0.0 => "Double.POSITIVE_INFINITY".to_string(),
            Self::Float(x) if x.is_infinite() => "Double.NEGATIVE_INFINITY".to_string(),
            Self::Float(x) => format!("{x:?}"),
            Self::Str(s) => {
                let mut out = String::with_capacity(s.len() + 2);
                out.push('\'');
                for c in s.chars() {
                    match c {
                        '\\' => out.push_str("\\\\"),
                        '\'' => out.push_str("\\'"),
                        '\n' => out.push_str("\\n"),
                        '\r' => out.push_str("\\r"),
                        '\t' => out.push_str("\\t"),
                        c => out.push(c),
                    }
                }
                out.push('\'');
                out
            }
        }
    }
}

// ============================================================================
// Block kinds
// ============================================================================

/// Closed set of block kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BlockKind {
    /// Entry point of a graph.
    Source,
    /// Calls `name(arg0, ..)` for its effect.
    Action { name: String, arity: u8 },
    /// Stores `arg0` into `variable`.
    Assign { variable: String },
    /// Evaluates `arg0` as a statement.
    Evaluate,
    /// Ends the script with `arg0` as its result.
    Return,
    /// `if (condition) { then } else { else }`, continuing at `next`.
    Branch,
    /// `while (condition) { body }`, continuing at `next`.
    Loop,
    /// Constant value.
    Literal { value: Literal },
    /// Reads a script variable.
    Variable { name: String },
    /// `(arg0 op arg1)`
    Binary { op: BinaryOp },
    /// `op(arg0)`
    Unary { op: UnaryOp },
    /// Pure call `function(arg0, ..)` producing a value.
    Call { function: String, arity: u8 },
}

impl BlockKind {
    /// Short name used in diagnostics.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Source => "source",
            Self::Action { .. } => "action",
            Self::Assign { .. } => "assign",
            Self::Evaluate => "evaluate",
            Self::Return => "return",
            Self::Branch => "branch",
            Self::Loop => "loop",
            Self::Literal { .. } => "literal",
            Self::Variable { .. } => "variable",
            Self::Binary { .. } => "binary",
            Self::Unary { .. } => "unary",
            Self::Call { .. } => "call",
        }
    }

    /// Every port this kind exposes, in a fixed order.
    #[must_use]
    pub fn ports(&self) -> Vec<Port> {
        let args = |n: u8| (0..n).map(Port::Arg);
        match self {
            Self::Source => vec![Port::Next],
            Self::Action { arity, .. } => std::iter::once(Port::FlowIn)
                .chain(args(*arity))
                .chain(std::iter::once(Port::Next))
                .collect(),
            Self::Assign { .. } | Self::Evaluate => vec![Port::FlowIn, Port::Arg(0), Port::Next],
            Self::Return => vec![Port::FlowIn, Port::Arg(0)],
            Self::Branch => vec![
                Port::FlowIn,
                Port::Condition,
                Port::Then,
                Port::Else,
                Port::Next,
            ],
            Self::Loop => vec![Port::FlowIn, Port::Condition, Port::Body, Port::Next],
            Self::Literal { .. } | Self::Variable { .. } => vec![Port::Out],
            Self::Binary { .. } => vec![Port::Arg(0), Port::Arg(1), Port::Out],
            Self::Unary { .. } => vec![Port::Arg(0), Port::Out],
            Self::Call { arity, .. } => args(*arity).chain(std::iter::once(Port::Out)).collect(),
        }
    }

    /// Returns `true` if this kind exposes `port`.
    #[must_use]
    pub fn has_port(&self, port: Port) -> bool {
        self.ports().contains(&port)
    }

    /// Data inputs that must be bound before the block can be compiled.
    #[must_use]
    pub fn required_inputs(&self) -> Vec<Port> {
        self.ports()
            .into_iter()
            .filter(|p| p.kind() == PortKind::DataIn)
            .collect()
    }

    /// Returns `true` for value-producing kinds.
    #[must_use]
    pub const fn is_expression(&self) -> bool {
        matches!(
            self,
            Self::Literal { .. }
                | Self::Variable { .. }
                | Self::Binary { .. }
                | Self::Unary { .. }
                | Self::Call { .. }
        )
    }

    /// Checks the kind-specific data (identifiers, arities).
    ///
    /// # Errors
    ///
    /// Returns [`StructuralError::InvalidBlock`] when an identifier is not a
    /// valid script name or an arity exceeds [`MAX_ARITY`].
    pub fn check(&self) -> Result<(), StructuralError> {
        let ident = |field: &str, value: &str| {
            if is_identifier(value) {
                Ok(())
            } else {
                Err(StructuralError::InvalidBlock {
                    kind: self.name(),
                    reason: format!("{field} '{value}' is not a valid identifier"),
                })
            }
        };
        let arity = |n: u8| {
            if n <= MAX_ARITY {
                Ok(())
            } else {
                Err(StructuralError::InvalidBlock {
                    kind: self.name(),
                    reason: format!("arity {n} exceeds the maximum of {MAX_ARITY}"),
                })
            }
        };
        match self {
            Self::Action { name, arity: n } => {
                ident("name", name)?;
                arity(*n)
            }
            Self::Call { function, arity: n } => {
                ident("function", function)?;
                arity(*n)
            }
            Self::Assign { variable } => ident("variable", variable),
            Self::Variable { name } => ident("name", name),
            _ => Ok(()),
        }
    }
}

/// Words the script language reserves; none may name a variable, action or
/// function, nor any segment of a dotted path.
pub const RESERVED_WORDS: &[&str] = &[
    "abstract", "as", "assert", "boolean", "break", "byte", "case", "catch", "char", "class",
    "const", "continue", "def", "default", "do", "double", "else", "enum", "extends", "false",
    "final", "finally", "float", "for", "goto", "if", "implements", "import", "in",
    "instanceof", "int", "interface", "long", "native", "new", "null", "package", "private",
    "protected", "public", "return", "short", "static", "super", "switch", "synchronized",
    "this", "throw", "throws", "trait", "transient", "true", "try", "var", "void", "volatile",
    "while",
];

/// Script identifiers: a letter, `_` or `$` followed by letters, digits,
/// `_`, `$`; dotted member paths such as `game.players` are accepted.
fn is_identifier(s: &str) -> bool {
    !s.is_empty()
        && s.split('.').all(|segment| {
            let mut chars = segment.chars();
            chars
                .next()
                .is_some_and(|c| c.is_ascii_alphabetic() || c == '_' || c == '$')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
                && !RESERVED_WORDS.contains(&segment)
        })
}

// ============================================================================
// Block
// ============================================================================

/// A node of a block graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    /// What the block is and what data it carries
    #[serde(flatten)]
    pub kind: BlockKind,

    /// Free-form caption shown by the editor
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl Block {
    /// Creates an unlabelled block.
    #[must_use]
    pub const fn new(kind: BlockKind) -> Self {
        Self { kind, label: None }
    }

    /// Attaches an editor caption.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn action(name: impl Into<String>, arity: u8) -> Self {
        Self::new(BlockKind::Action {
            name: name.into(),
            arity,
        })
    }

    pub fn assign(variable: impl Into<String>) -> Self {
        Self::new(BlockKind::Assign {
            variable: variable.into(),
        })
    }

    pub fn literal(value: Literal) -> Self {
        Self::new(BlockKind::Literal { value })
    }

    pub fn variable(name: impl Into<String>) -> Self {
        Self::new(BlockKind::Variable { name: name.into() })
    }

    pub const fn binary(op: BinaryOp) -> Self {
        Self::new(BlockKind::Binary { op })
    }

    pub const fn unary(op: UnaryOp) -> Self {
        Self::new(BlockKind::Unary { op })
    }

    pub fn call(function: impl Into<String>, arity: u8) -> Self {
        Self::new(BlockKind::Call {
            function: function.into(),
            arity,
        })
    }

    pub const fn branch() -> Self {
        Self::new(BlockKind::Branch)
    }

    pub const fn looping() -> Self {
        Self::new(BlockKind::Loop)
    }

    pub const fn ret() -> Self {
        Self::new(BlockKind::Return)
    }

    pub const fn evaluate() -> Self {
        Self::new(BlockKind::Evaluate)
    }
}

impl From<BlockKind> for Block {
    fn from(kind: BlockKind) -> Self {
        Self::new(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_kinds() {
        assert_eq!(Port::FlowIn.kind(), PortKind::FlowIn);
        assert_eq!(Port::Then.kind(), PortKind::FlowOut);
        assert_eq!(Port::Arg(3).kind(), PortKind::DataIn);
        assert_eq!(Port::Out.kind(), PortKind::DataOut);
        assert!(Port::Body.kind().is_output());
        assert!(!Port::Condition.kind().is_output());
    }

    #[test]
    fn test_port_string_form() {
        for port in [
            Port::FlowIn,
            Port::Next,
            Port::Then,
            Port::Else,
            Port::Body,
            Port::Condition,
            Port::Arg(0),
            Port::Arg(15),
            Port::Out,
        ] {
            assert_eq!(port.to_string().parse::<Port>(), Ok(port));
        }
        assert!("arg16".parse::<Port>().is_err());
        assert!("sideways".parse::<Port>().is_err());
    }

    #[test]
    fn test_action_ports_follow_arity() {
        let kind = BlockKind::Action {
            name: "move".into(),
            arity: 2,
        };
        assert_eq!(
            kind.ports(),
            vec![Port::FlowIn, Port::Arg(0), Port::Arg(1), Port::Next]
        );
        assert_eq!(kind.required_inputs(), vec![Port::Arg(0), Port::Arg(1)]);
    }

    #[test]
    fn test_expression_kinds_have_no_flow_ports() {
        let kind = BlockKind::Binary { op: BinaryOp::Add };
        assert!(kind.is_expression());
        assert!(kind.ports().iter().all(|p| !p.kind().is_flow()));
    }

    #[test]
    fn test_literal_rendering() {
        assert_eq!(Literal::Null.render(), "null");
        assert_eq!(Literal::Bool(true).render(), "true");
        assert_eq!(Literal::Int(-4).render(), "-4");
        assert_eq!(Literal::Float(2.0).render(), "2.0");
        assert_eq!(Literal::Str("it's $x".into()).render(), r"'it\'s $x'");
        assert_eq!(Literal::Str("a\nb".into()).render(), r"'a\nb'");
    }

    #[test]
    fn test_identifier_check() {
        assert!(Block::action("game.endTurn", 0).kind.check().is_ok());
        assert!(Block::variable("$score").kind.check().is_ok());
        assert!(Block::variable("1abc").kind.check().is_err());
        assert!(Block::assign("a b").kind.check().is_err());
        assert!(Block::call("f", MAX_ARITY + 1).kind.check().is_err());
    }

    #[test]
    fn test_reserved_words_are_not_identifiers() {
        assert!(Block::assign("if").kind.check().is_err());
        assert!(Block::action("while", 0).kind.check().is_err());
        assert!(Block::variable("game.class").kind.check().is_err());
        assert!(Block::call("return", 1).kind.check().is_err());
        assert!(Block::variable("iffy").kind.check().is_ok());
        assert!(Block::action("game.whileIdle", 0).kind.check().is_ok());
    }

    #[test]
    fn test_nan_literals_compare_equal() {
        assert_eq!(Literal::Float(f64::NAN), Literal::Float(f64::NAN));
        assert_ne!(Literal::Float(f64::NAN), Literal::Float(0.0));
        assert_ne!(Literal::Float(1.0), Literal::Int(1));
        assert_eq!(Literal::Float(f64::NAN).render(), "Double.NaN");
    }

    #[test]
    fn test_block_yaml_shape() {
        let block: Block = serde_yaml::from_str("kind: action\nname: draw\narity: 1\n").unwrap();
        assert_eq!(block, Block::action("draw", 1));

        let lit: Block = serde_yaml::from_str("kind: literal\nvalue: 3\n").unwrap();
        assert_eq!(lit.kind, BlockKind::Literal { value: Literal::Int(3) });
    }
}
