use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::io::Write;

use crate::cfg;
use crate::error::Result;
use crate::ice;
use crate::optimizer::constant_folding::constant_folding;
use crate::optimizer::constant_propagation::constant_propagation;
use crate::optimizer::copy_propagation::copy_propagation;
use crate::optimizer::dead_store_elimination::dead_store_elimination;
use crate::optimizer::tracker::{apply_rewrites, Analysis};
use crate::optimizer::unreachable_code_elimination::unreachable_code_elimination;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Opcode {
    ValCopy,
    Add,
    Sub,
    Mult,
    Div,
    Mod,
    TestLess,
    TestGtr,
    TestEqu,
    TestNequ,
    TestLte,
    TestGte,
    Jump,
    JumpIf0,
    JumpIfN0,
    Random,
    OutInt,
    OutChar,
    Nop,
    Push,
    Pop,
    ArGetIdx,
    ArSetIdx,
    ArGetSize,
    ArSetSize,
    ArCopy,
    ArPush,
    ArPop,
}

/// What an operand slot will accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    None,
    Value,
    Scalar,
    Array,
}

/// How an instruction touches the operand in a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    None,
    Read,
    Write,
    Update,
}

lazy_static::lazy_static! {
    static ref OPCODES_BY_NAME: HashMap<&'static str, Opcode> =
        Opcode::ALL.iter().map(|op| (op.name(), *op)).collect();
}

impl Opcode {
    pub const ALL: [Opcode; 28] = [
        Opcode::ValCopy,
        Opcode::Add,
        Opcode::Sub,
        Opcode::Mult,
        Opcode::Div,
        Opcode::Mod,
        Opcode::TestLess,
        Opcode::TestGtr,
        Opcode::TestEqu,
        Opcode::TestNequ,
        Opcode::TestLte,
        Opcode::TestGte,
        Opcode::Jump,
        Opcode::JumpIf0,
        Opcode::JumpIfN0,
        Opcode::Random,
        Opcode::OutInt,
        Opcode::OutChar,
        Opcode::Nop,
        Opcode::Push,
        Opcode::Pop,
        Opcode::ArGetIdx,
        Opcode::ArSetIdx,
        Opcode::ArGetSize,
        Opcode::ArSetSize,
        Opcode::ArCopy,
        Opcode::ArPush,
        Opcode::ArPop,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Opcode::ValCopy => "val_copy",
            Opcode::Add => "add",
            Opcode::Sub => "sub",
            Opcode::Mult => "mult",
            Opcode::Div => "div",
            Opcode::Mod => "mod",
            Opcode::TestLess => "test_less",
            Opcode::TestGtr => "test_gtr",
            Opcode::TestEqu => "test_equ",
            Opcode::TestNequ => "test_nequ",
            Opcode::TestLte => "test_lte",
            Opcode::TestGte => "test_gte",
            Opcode::Jump => "jump",
            Opcode::JumpIf0 => "jump_if_0",
            Opcode::JumpIfN0 => "jump_if_n0",
            Opcode::Random => "random",
            Opcode::OutInt => "out_int",
            Opcode::OutChar => "out_char",
            Opcode::Nop => "nop",
            Opcode::Push => "push",
            Opcode::Pop => "pop",
            Opcode::ArGetIdx => "ar_get_idx",
            Opcode::ArSetIdx => "ar_set_idx",
            Opcode::ArGetSize => "ar_get_size",
            Opcode::ArSetSize => "ar_set_size",
            Opcode::ArCopy => "ar_copy",
            Opcode::ArPush => "ar_push",
            Opcode::ArPop => "ar_pop",
        }
    }

    pub fn from_name(name: &str) -> Option<Opcode> {
        OPCODES_BY_NAME.get(name).copied()
    }

    pub fn schema(&self) -> [ArgKind; 3] {
        use ArgKind::*;

        match self {
            Opcode::ValCopy | Opcode::Random => [Value, Scalar, None],
            Opcode::Add
            | Opcode::Sub
            | Opcode::Mult
            | Opcode::Div
            | Opcode::Mod
            | Opcode::TestLess
            | Opcode::TestGtr
            | Opcode::TestEqu
            | Opcode::TestNequ
            | Opcode::TestLte
            | Opcode::TestGte => [Value, Value, Scalar],
            Opcode::Jump | Opcode::OutInt | Opcode::OutChar | Opcode::Push => [Value, None, None],
            Opcode::JumpIf0 | Opcode::JumpIfN0 => [Value, Value, None],
            Opcode::Nop => [None, None, None],
            Opcode::Pop => [Scalar, None, None],
            Opcode::ArGetIdx => [Array, Value, Scalar],
            Opcode::ArSetIdx => [Array, Value, Value],
            Opcode::ArGetSize => [Array, Scalar, None],
            Opcode::ArSetSize => [Array, Value, None],
            Opcode::ArCopy => [Array, Array, None],
            Opcode::ArPush | Opcode::ArPop => [Array, None, None],
        }
    }

    pub fn arity(&self) -> usize {
        self.schema()
            .iter()
            .filter(|kind| **kind != ArgKind::None)
            .count()
    }

    pub fn access(&self) -> [Access; 3] {
        use Access::*;

        match self {
            Opcode::ValCopy | Opcode::Random | Opcode::ArGetSize | Opcode::ArCopy => {
                [Read, Write, None]
            }
            Opcode::Add
            | Opcode::Sub
            | Opcode::Mult
            | Opcode::Div
            | Opcode::Mod
            | Opcode::TestLess
            | Opcode::TestGtr
            | Opcode::TestEqu
            | Opcode::TestNequ
            | Opcode::TestLte
            | Opcode::TestGte => [Read, Read, Write],
            Opcode::Jump | Opcode::OutInt | Opcode::OutChar | Opcode::Push | Opcode::ArPush => {
                [Read, None, None]
            }
            Opcode::JumpIf0 | Opcode::JumpIfN0 => [Read, Read, None],
            Opcode::Nop => [None, None, None],
            Opcode::Pop => [Write, None, None],
            Opcode::ArGetIdx => [Read, Read, Write],
            Opcode::ArSetIdx => [Update, Read, Read],
            Opcode::ArSetSize => [Update, Read, None],
            Opcode::ArPop => [Update, None, None],
        }
    }

    pub fn is_binary(&self) -> bool {
        matches!(
            self,
            Opcode::Add
                | Opcode::Sub
                | Opcode::Mult
                | Opcode::Div
                | Opcode::Mod
                | Opcode::TestLess
                | Opcode::TestGtr
                | Opcode::TestEqu
                | Opcode::TestNequ
                | Opcode::TestLte
                | Opcode::TestGte
        )
    }

    pub fn is_jump(&self) -> bool {
        matches!(self, Opcode::Jump | Opcode::JumpIf0 | Opcode::JumpIfN0)
    }

    pub fn is_conditional_jump(&self) -> bool {
        matches!(self, Opcode::JumpIf0 | Opcode::JumpIfN0)
    }

    /// Slot holding the branch target of a jump.
    pub fn target_slot(&self) -> Option<usize> {
        match self {
            Opcode::Jump => Some(0),
            Opcode::JumpIf0 | Opcode::JumpIfN0 => Some(1),
            _ => None,
        }
    }

    /// Instructions whose only effect is the value they write, so they may be dropped
    /// when nobody reads it.
    pub fn is_pure(&self) -> bool {
        self.is_binary()
            || matches!(self, Opcode::ValCopy | Opcode::ArGetIdx | Opcode::ArGetSize)
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ICArg {
    Scalar(usize),
    Array(usize),
    Const(String),
}

impl ICArg {
    pub fn constant(text: impl Into<String>) -> Self {
        ICArg::Const(text.into())
    }

    pub fn scalar_id(&self) -> Option<usize> {
        match self {
            ICArg::Scalar(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_const(&self) -> Option<&str> {
        match self {
            ICArg::Const(text) => Some(text),
            _ => None,
        }
    }

    pub fn fits(&self, kind: ArgKind) -> bool {
        matches!(
            (kind, self),
            (ArgKind::Value, ICArg::Scalar(_) | ICArg::Const(_))
                | (ArgKind::Scalar, ICArg::Scalar(_))
                | (ArgKind::Array, ICArg::Array(_))
        )
    }
}

impl fmt::Display for ICArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ICArg::Scalar(id) => write!(f, "s{}", id),
            ICArg::Array(id) => write!(f, "a{}", id),
            ICArg::Const(text) => f.write_str(text),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ICEntry {
    pub opcode: Option<Opcode>,
    pub args: Vec<ICArg>,
    pub label: Option<String>,
    pub comment: Option<String>,
    pub block_id: Option<usize>,
}

impl ICEntry {
    pub fn label_only(label: impl Into<String>) -> Self {
        ICEntry {
            label: Some(label.into()),
            ..Default::default()
        }
    }

    pub fn is_label_only(&self) -> bool {
        self.opcode.is_none()
    }

    /// Scalar variables read by this instruction, with the slot they occupy.
    pub fn scalar_reads(&self) -> Vec<(usize, usize)> {
        self.scalars_with(|access| matches!(access, Access::Read | Access::Update))
    }

    /// Scalar variables written by this instruction, with the slot they occupy.
    pub fn scalar_writes(&self) -> Vec<(usize, usize)> {
        self.scalars_with(|access| matches!(access, Access::Write | Access::Update))
    }

    /// The label a direct jump goes to, `None` for computed jumps and non-jumps.
    pub fn jump_target(&self) -> Option<&str> {
        let slot = self.opcode?.target_slot()?;
        self.args.get(slot)?.as_const()
    }

    pub fn is_computed_jump(&self) -> bool {
        match self.opcode.and_then(|op| op.target_slot()) {
            Some(slot) => matches!(self.args.get(slot), Some(ICArg::Scalar(_))),
            None => false,
        }
    }

    fn scalars_with(&self, pred: impl Fn(Access) -> bool) -> Vec<(usize, usize)> {
        let Some(opcode) = self.opcode else {
            return vec![];
        };
        let access = opcode.access();

        self.args
            .iter()
            .enumerate()
            .filter(|(slot, _)| pred(access[*slot]))
            .filter_map(|(slot, arg)| arg.scalar_id().map(|id| (slot, id)))
            .collect()
    }
}

impl fmt::Display for ICEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut line = match &self.label {
            Some(label) => format!("{}: ", label),
            None => "  ".to_owned(),
        };

        if let Some(opcode) = self.opcode {
            line.push_str(opcode.name());
            for arg in &self.args {
                line.push(' ');
                line.push_str(&arg.to_string());
            }
        }

        let line = line.trim_end();
        match &self.comment {
            Some(comment) => write!(f, "{:<39} # {}", line, comment),
            None => f.write_str(line),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ICProgram {
    pub entries: Vec<ICEntry>,
    /// Variable ids whose final value is observable, so their last write must survive.
    pub pinned: BTreeSet<usize>,
}

impl ICProgram {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, opcode: Opcode, args: Vec<ICArg>) -> Result<&ICEntry> {
        self.push(opcode, args, None)
    }

    pub fn add_with_comment(
        &mut self,
        opcode: Opcode,
        args: Vec<ICArg>,
        comment: &str,
    ) -> Result<&ICEntry> {
        self.push(opcode, args, Some(comment.to_owned()))
    }

    pub fn add_label(&mut self, label: impl Into<String>) -> &ICEntry {
        self.entries.push(ICEntry::label_only(label));
        &self.entries[self.entries.len() - 1]
    }

    pub fn add_label_with_comment(&mut self, label: impl Into<String>, comment: &str) -> &ICEntry {
        let mut entry = ICEntry::label_only(label);
        entry.comment = Some(comment.to_owned());
        self.entries.push(entry);
        &self.entries[self.entries.len() - 1]
    }

    pub fn pin(&mut self, var_id: usize) {
        self.pinned.insert(var_id);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries that carry an instruction, skipping label-only lines.
    pub fn instructions(&self) -> impl Iterator<Item = &ICEntry> {
        self.entries.iter().filter(|entry| !entry.is_label_only())
    }

    pub fn print_ic(&self, out: &mut impl Write) -> std::io::Result<()> {
        for entry in &self.entries {
            writeln!(out, "{}", entry)?;
        }
        Ok(())
    }

    /// Like `print_ic`, with every line prefixed by its basic-block id.
    pub fn print_blocks(&self, out: &mut impl Write) -> std::io::Result<()> {
        for entry in &self.entries {
            match entry.block_id {
                Some(id) => writeln!(out, "[{:>3}] {}", id, entry)?,
                None => writeln!(out, "[  ?] {}", entry)?,
            }
        }
        Ok(())
    }

    fn push(&mut self, opcode: Opcode, args: Vec<ICArg>, comment: Option<String>) -> Result<&ICEntry> {
        validate(opcode, &args)?;
        tracing::trace!(
            "emit {} {}",
            opcode,
            args.iter().map(ToString::to_string).collect::<Vec<_>>().join(" ")
        );

        self.entries.push(ICEntry {
            opcode: Some(opcode),
            args,
            label: None,
            comment,
            block_id: None,
        });
        Ok(&self.entries[self.entries.len() - 1])
    }
}

impl fmt::Display for ICProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in &self.entries {
            writeln!(f, "{}", entry)?;
        }
        Ok(())
    }
}

/// Check `args` against the operand schema of `opcode`.
pub fn validate(opcode: Opcode, args: &[ICArg]) -> Result<()> {
    if args.len() != opcode.arity() {
        ice!(
            "instruction '{}' takes {} argument(s), got {}",
            opcode,
            opcode.arity(),
            args.len()
        );
    }

    for (slot, (arg, kind)) in args.iter().zip(opcode.schema()).enumerate() {
        if !arg.fits(kind) {
            ice!(
                "argument {} of '{}' must be {:?}, got '{}'",
                slot + 1,
                opcode,
                kind,
                arg
            );
        }
    }

    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Optimization {
    ConstantFolding,
    ConstantPropagation,
    CopyPropagation,
    DeadStoreElimination,
    UnreachableCodeElimination,
}

impl Optimization {
    pub const ALL: [Optimization; 5] = [
        Optimization::ConstantFolding,
        Optimization::ConstantPropagation,
        Optimization::CopyPropagation,
        Optimization::DeadStoreElimination,
        Optimization::UnreachableCodeElimination,
    ];
}

pub trait Optimize {
    fn optimize(&self, enabled_optimizations: &[Optimization]) -> Result<Self>
    where
        Self: Sized;
}

impl Optimize for ICProgram {
    /// Rewrite to a fixpoint: every scan proposes rewrites against a fresh analysis, the
    /// non-overlapping ones are applied, and the loop ends on the first scan with nothing to do.
    fn optimize(&self, enabled_optimizations: &[Optimization]) -> Result<Self> {
        let mut entries = self.entries.clone();
        let enabled = |opt| enabled_optimizations.contains(&opt);
        let mut scans = 0;

        loop {
            scans += 1;
            cfg::assign_block_ids(&mut entries);

            let analysis = Analysis::new(&entries, &self.pinned);
            let mut proposals = vec![];

            if enabled(Optimization::ConstantFolding) {
                proposals.extend(constant_folding(&analysis));
            }
            if enabled(Optimization::ConstantPropagation) {
                proposals.extend(constant_propagation(&analysis));
            }
            if enabled(Optimization::CopyPropagation) {
                proposals.extend(copy_propagation(&analysis));
            }
            if enabled(Optimization::DeadStoreElimination) {
                proposals.extend(dead_store_elimination(&analysis));
            }
            if enabled(Optimization::UnreachableCodeElimination) {
                proposals.extend(unreachable_code_elimination(&analysis)?);
            }

            let applied = apply_rewrites(&mut entries, proposals);
            tracing::debug!("scan {}: applied {} rewrite(s)", scans, applied);

            if applied == 0 {
                break;
            }
        }

        Ok(ICProgram {
            entries,
            pinned: self.pinned.clone(),
        })
    }
}
