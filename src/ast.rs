use crate::error::Result;
use crate::ic::Opcode;
use crate::symbol_table::{EntryId, FunctionId, SymbolTable};
use crate::types::Type;
use crate::{bail_at, ice};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Negate,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mult,
    Div,
    Mod,
    Less,
    Greater,
    Equal,
    NotEqual,
    LessEqual,
    GreaterEqual,
}

impl BinaryOp {
    pub fn opcode(&self) -> Opcode {
        match self {
            BinaryOp::Add => Opcode::Add,
            BinaryOp::Sub => Opcode::Sub,
            BinaryOp::Mult => Opcode::Mult,
            BinaryOp::Div => Opcode::Div,
            BinaryOp::Mod => Opcode::Mod,
            BinaryOp::Less => Opcode::TestLess,
            BinaryOp::Greater => Opcode::TestGtr,
            BinaryOp::Equal => Opcode::TestEqu,
            BinaryOp::NotEqual => Opcode::TestNequ,
            BinaryOp::LessEqual => Opcode::TestLte,
            BinaryOp::GreaterEqual => Opcode::TestGte,
        }
    }

    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOp::Less
                | BinaryOp::Greater
                | BinaryOp::Equal
                | BinaryOp::NotEqual
                | BinaryOp::LessEqual
                | BinaryOp::GreaterEqual
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoolOp {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrayMethod {
    Size,
    Resize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i32),
    Char(char),
    String(String),
    IntArray(Vec<i32>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub kind: NodeKind,
    pub ty: Type,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Block(Vec<Node>),
    Literal(Literal),
    Variable(EntryId),
    Assign {
        lhs: Box<Node>,
        rhs: Box<Node>,
    },
    MathAssign {
        op: BinaryOp,
        lhs: Box<Node>,
        rhs: Box<Node>,
    },
    UnaryMath {
        op: UnaryOp,
        operand: Box<Node>,
    },
    BinaryMath {
        op: BinaryOp,
        lhs: Box<Node>,
        rhs: Box<Node>,
    },
    BinaryBool {
        op: BoolOp,
        lhs: Box<Node>,
        rhs: Box<Node>,
    },
    Conditional {
        cond: Box<Node>,
        then_value: Box<Node>,
        else_value: Box<Node>,
    },
    If {
        cond: Box<Node>,
        then_branch: Box<Node>,
        else_branch: Option<Box<Node>>,
    },
    While {
        cond: Box<Node>,
        body: Box<Node>,
    },
    For {
        init: Option<Box<Node>>,
        cond: Box<Node>,
        step: Option<Box<Node>>,
        body: Box<Node>,
    },
    Break,
    Print(Vec<Node>),
    Random(Box<Node>),
    ArrayAccess {
        array: Box<Node>,
        index: Box<Node>,
    },
    MethodCall {
        method: ArrayMethod,
        array: Box<Node>,
        args: Vec<Node>,
    },
    FunctionCall {
        function: FunctionId,
        args: Vec<Node>,
    },
    Return {
        function: FunctionId,
        value: Option<Box<Node>>,
    },
}

// Constructors check the node against its children and fix its type. Every semantic
// error except `break` outside a loop is raised here.
impl Node {
    fn new(kind: NodeKind, ty: Type, line: usize) -> Node {
        Node { kind, ty, line }
    }

    pub fn block(children: Vec<Node>, line: usize) -> Node {
        Node::new(NodeKind::Block(children), Type::Void, line)
    }

    pub fn int_literal(value: i32, line: usize) -> Node {
        Node::new(NodeKind::Literal(Literal::Int(value)), Type::Int, line)
    }

    /// A quoted char lexeme such as `'a'` or `'\n'`.
    pub fn char_literal(lexeme: &str, line: usize) -> Result<Node> {
        match parse_char_literal(lexeme) {
            Some(c) => Ok(Node::new(NodeKind::Literal(Literal::Char(c)), Type::Char, line)),
            None => bail_at!(line, "invalid char literal {}", lexeme),
        }
    }

    /// A double-quoted string lexeme, which becomes an `array(char)`.
    pub fn string_literal(lexeme: &str, line: usize) -> Result<Node> {
        let text = lexeme
            .strip_prefix('"')
            .and_then(|rest| rest.strip_suffix('"'))
            .and_then(unescape);

        match text {
            Some(text) => Ok(Node::new(
                NodeKind::Literal(Literal::String(text)),
                Type::CharArray,
                line,
            )),
            None => bail_at!(line, "invalid string literal {}", lexeme),
        }
    }

    pub fn int_array_literal(values: Vec<i32>, line: usize) -> Node {
        Node::new(NodeKind::Literal(Literal::IntArray(values)), Type::IntArray, line)
    }

    pub fn variable(name: &str, table: &SymbolTable, line: usize) -> Result<Node> {
        let Some(id) = table.lookup(name) else {
            bail_at!(line, "unknown variable '{}'", name);
        };
        Ok(Node::new(NodeKind::Variable(id), table.entry(id).ty, line))
    }

    pub fn assign(lhs: Node, rhs: Node, line: usize) -> Result<Node> {
        if !lhs.is_lvalue() {
            bail_at!(line, "left side of assignment must be a variable or array element");
        }
        if lhs.ty != rhs.ty {
            bail_at!(
                line,
                "types do not match for assignment (lhs='{}', rhs='{}')",
                lhs.ty,
                rhs.ty
            );
        }

        let ty = lhs.ty;
        Ok(Node::new(
            NodeKind::Assign {
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
            ty,
            line,
        ))
    }

    /// `lhs op= rhs` for the arithmetic operators.
    pub fn math_assign(op: BinaryOp, lhs: Node, rhs: Node, line: usize) -> Result<Node> {
        if op.is_comparison() {
            ice!("'{:?}' is not a compound assignment operator", op);
        }
        if !lhs.is_lvalue() {
            bail_at!(line, "left side of assignment must be a variable or array element");
        }
        check_math_operand(&lhs, line)?;
        check_math_operand(&rhs, line)?;

        Ok(Node::new(
            NodeKind::MathAssign {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
            Type::Int,
            line,
        ))
    }

    pub fn unary(op: UnaryOp, operand: Node, line: usize) -> Result<Node> {
        check_math_operand(&operand, line)?;
        Ok(Node::new(
            NodeKind::UnaryMath {
                op,
                operand: Box::new(operand),
            },
            Type::Int,
            line,
        ))
    }

    pub fn binary(op: BinaryOp, lhs: Node, rhs: Node, line: usize) -> Result<Node> {
        if op.is_comparison() {
            if lhs.ty != rhs.ty {
                bail_at!(
                    line,
                    "types do not match for relationship operator (lhs='{}', rhs='{}')",
                    lhs.ty,
                    rhs.ty
                );
            }
            if !lhs.ty.is_scalar() {
                bail_at!(line, "cannot use type '{}' in relationship operator", lhs.ty);
            }
        } else {
            check_math_operand(&lhs, line)?;
            check_math_operand(&rhs, line)?;
        }

        Ok(Node::new(
            NodeKind::BinaryMath {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
            Type::Int,
            line,
        ))
    }

    /// Short-circuiting `&&` / `||`.
    pub fn binary_bool(op: BoolOp, lhs: Node, rhs: Node, line: usize) -> Result<Node> {
        check_math_operand(&lhs, line)?;
        check_math_operand(&rhs, line)?;

        Ok(Node::new(
            NodeKind::BinaryBool {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
            Type::Int,
            line,
        ))
    }

    /// `cond ? then_value : else_value`
    pub fn conditional(cond: Node, then_value: Node, else_value: Node, line: usize) -> Result<Node> {
        if cond.ty != Type::Int {
            bail_at!(line, "condition for ?: operator must evaluate to type int");
        }
        if then_value.ty != else_value.ty || then_value.ty == Type::Void {
            bail_at!(
                line,
                "types do not match for ?: operator (true='{}', false='{}')",
                then_value.ty,
                else_value.ty
            );
        }

        let ty = then_value.ty;
        Ok(Node::new(
            NodeKind::Conditional {
                cond: Box::new(cond),
                then_value: Box::new(then_value),
                else_value: Box::new(else_value),
            },
            ty,
            line,
        ))
    }

    pub fn if_stmt(
        cond: Node,
        then_branch: Node,
        else_branch: Option<Node>,
        line: usize,
    ) -> Result<Node> {
        if cond.ty != Type::Int {
            bail_at!(line, "condition for if statements must evaluate to type int");
        }

        Ok(Node::new(
            NodeKind::If {
                cond: Box::new(cond),
                then_branch: Box::new(then_branch),
                else_branch: else_branch.map(Box::new),
            },
            Type::Void,
            line,
        ))
    }

    pub fn while_stmt(cond: Node, body: Node, line: usize) -> Result<Node> {
        if cond.ty != Type::Int {
            bail_at!(line, "condition for while statements must evaluate to type int");
        }

        Ok(Node::new(
            NodeKind::While {
                cond: Box::new(cond),
                body: Box::new(body),
            },
            Type::Void,
            line,
        ))
    }

    pub fn for_stmt(
        init: Option<Node>,
        cond: Node,
        step: Option<Node>,
        body: Node,
        line: usize,
    ) -> Result<Node> {
        if cond.ty != Type::Int {
            bail_at!(line, "condition for for statements must evaluate to type int");
        }

        Ok(Node::new(
            NodeKind::For {
                init: init.map(Box::new),
                cond: Box::new(cond),
                step: step.map(Box::new),
                body: Box::new(body),
            },
            Type::Void,
            line,
        ))
    }

    /// Whether a loop encloses this is only known while compiling.
    pub fn break_stmt(line: usize) -> Node {
        Node::new(NodeKind::Break, Type::Void, line)
    }

    pub fn print(args: Vec<Node>, line: usize) -> Result<Node> {
        if let Some(arg) = args.iter().find(|arg| arg.ty == Type::Void) {
            bail_at!(arg.line, "cannot print a value of type '{}'", arg.ty);
        }
        Ok(Node::new(NodeKind::Print(args), Type::Void, line))
    }

    pub fn random(arg: Node, line: usize) -> Result<Node> {
        if arg.ty != Type::Int {
            bail_at!(line, "cannot use type '{}' as an argument to random", arg.ty);
        }
        Ok(Node::new(NodeKind::Random(Box::new(arg)), Type::Int, line))
    }

    pub fn array_access(array: Node, index: Node, line: usize) -> Result<Node> {
        if !array.ty.is_array() {
            bail_at!(line, "cannot index into a non-array type '{}'.", array.ty);
        }
        if index.ty != Type::Int {
            bail_at!(line, "array indices must be of type int");
        }

        let ty = array.ty.inner_type();
        Ok(Node::new(
            NodeKind::ArrayAccess {
                array: Box::new(array),
                index: Box::new(index),
            },
            ty,
            line,
        ))
    }

    pub fn method_call(array: Node, name: &str, args: Vec<Node>, line: usize) -> Result<Node> {
        let (method, ty) = match name {
            "size" => (ArrayMethod::Size, Type::Int),
            "resize" => (ArrayMethod::Resize, Type::Void),
            _ => bail_at!(line, "unknown method '{}'", name),
        };

        if !array.ty.is_array() {
            bail_at!(line, "array methods cannot be run on type '{}'", array.ty);
        }

        match method {
            ArrayMethod::Size if !args.is_empty() => {
                bail_at!(line, "array size() method does not take any arguments.")
            }
            ArrayMethod::Resize if args.len() != 1 => {
                bail_at!(line, "array resize() method takes exactly one (int) argument.")
            }
            ArrayMethod::Resize if args[0].ty != Type::Int => {
                bail_at!(line, "array resize() method argument must be of type int.")
            }
            _ => {}
        }

        Ok(Node::new(
            NodeKind::MethodCall {
                method,
                array: Box::new(array),
                args,
            },
            ty,
            line,
        ))
    }

    pub fn function_call(
        name: &str,
        args: Vec<Node>,
        table: &SymbolTable,
        line: usize,
    ) -> Result<Node> {
        let Some(function) = table.lookup_function(name) else {
            bail_at!(line, "unknown function '{}'", name);
        };
        let entry = table.function(function);

        if entry.params.len() != args.len() {
            bail_at!(
                line,
                "function '{}' expects {} arguments, got {}",
                name,
                entry.params.len(),
                args.len()
            );
        }

        for (pos, (arg, param)) in args.iter().zip(&entry.params).enumerate() {
            let expected = table.entry(*param).ty;
            if arg.ty != expected {
                bail_at!(
                    line,
                    "argument {} to function '{}' must be of type '{}'",
                    pos + 1,
                    name,
                    expected
                );
            }
        }

        Ok(Node::new(
            NodeKind::FunctionCall { function, args },
            entry.return_type,
            line,
        ))
    }

    /// `return` inside the function currently being declared in `table`.
    pub fn return_stmt(value: Option<Node>, table: &SymbolTable, line: usize) -> Result<Node> {
        let Some(function) = table.current_function() else {
            bail_at!(line, "'return' used outside of any function");
        };

        let expected = table.function(function).return_type;
        let found = value.as_ref().map_or(Type::Void, |v| v.ty);
        if expected != found {
            bail_at!(
                line,
                "return type mismatch (expected '{}', found '{}')",
                expected,
                found
            );
        }

        Ok(Node::new(
            NodeKind::Return {
                function,
                value: value.map(Box::new),
            },
            Type::Void,
            line,
        ))
    }

    pub fn is_lvalue(&self) -> bool {
        matches!(self.kind, NodeKind::Variable(_) | NodeKind::ArrayAccess { .. })
    }
}

fn check_math_operand(node: &Node, line: usize) -> Result<()> {
    if node.ty != Type::Int {
        bail_at!(line, "cannot use type '{}' in mathematical expressions", node.ty);
    }
    Ok(())
}

fn unescape_char(c: char) -> Option<char> {
    match c {
        '\\' => Some('\\'),
        '"' => Some('"'),
        '\'' => Some('\''),
        't' => Some('\t'),
        'n' => Some('\n'),
        _ => None,
    }
}

fn unescape(text: &str) -> Option<String> {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();

    while let Some(c) = chars.next() {
        if c == '\\' {
            out.push(unescape_char(chars.next()?)?);
        } else {
            out.push(c);
        }
    }

    Some(out)
}

/// Decode a quoted char lexeme: `'a'`, `'\n'`, `'\t'`, `'\\'`, `'\''` or `'\"'`.
pub fn parse_char_literal(lexeme: &str) -> Option<char> {
    let body = lexeme.strip_prefix('\'')?.strip_suffix('\'')?;
    let mut chars = body.chars();

    let c = match chars.next()? {
        '\\' => unescape_char(chars.next()?)?,
        c => c,
    };

    match chars.next() {
        None => Some(c),
        Some(_) => None,
    }
}

/// The canonical IC spelling of a char value.
pub fn char_lexeme(c: char) -> String {
    match c {
        '\\' => "'\\\\'".to_owned(),
        '\t' => "'\\t'".to_owned(),
        '\n' => "'\\n'".to_owned(),
        '\'' => "'\\''".to_owned(),
        c => format!("'{}'", c),
    }
}
