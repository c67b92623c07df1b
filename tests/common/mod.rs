#![allow(dead_code)]

use std::collections::HashMap;

use tubec::ast::Node;
use tubec::ic::{ICArg, ICProgram, Opcode};
use tubec::optimizer::constant_folding::literal_value;
use tubec::symbol_table::SymbolTable;
use tubec::{compile, Optimization, Optimize};

const STEP_LIMIT: usize = 200_000;

/// Runs IC directly. Unwritten memory reads as 0 and arithmetic wraps at 32 bits.
pub struct Machine<'a> {
    program: &'a ICProgram,
    labels: HashMap<&'a str, usize>,
    scalars: HashMap<usize, i32>,
    arrays: HashMap<usize, Vec<i32>>,
    stack: Vec<i32>,
    seed: u32,
    output: String,
}

impl<'a> Machine<'a> {
    pub fn new(program: &'a ICProgram) -> Self {
        let labels = program
            .entries
            .iter()
            .enumerate()
            .filter_map(|(idx, entry)| entry.label.as_deref().map(|label| (label, idx)))
            .collect();

        Machine {
            program,
            labels,
            scalars: HashMap::new(),
            arrays: HashMap::new(),
            stack: vec![],
            seed: 12345,
            output: String::new(),
        }
    }

    pub fn scalar(&self, id: usize) -> i32 {
        self.scalars.get(&id).copied().unwrap_or(0)
    }

    fn value(&self, arg: &ICArg) -> Result<i32, String> {
        match arg {
            ICArg::Scalar(id) => Ok(self.scalar(*id)),
            ICArg::Const(text) => match literal_value(text) {
                Some(v) => Ok(v),
                None => self
                    .labels
                    .get(text.as_str())
                    .map(|idx| *idx as i32)
                    .ok_or_else(|| format!("unknown literal '{}'", text)),
            },
            ICArg::Array(id) => Err(format!("array a{} used as a value", id)),
        }
    }

    fn array(&mut self, arg: &ICArg) -> Result<&mut Vec<i32>, String> {
        match arg {
            ICArg::Array(id) => Ok(self.arrays.entry(*id).or_default()),
            other => Err(format!("'{}' is not an array", other)),
        }
    }

    fn set(&mut self, arg: &ICArg, value: i32) -> Result<(), String> {
        match arg {
            ICArg::Scalar(id) => {
                self.scalars.insert(*id, value);
                Ok(())
            }
            other => Err(format!("cannot write to '{}'", other)),
        }
    }

    fn random(&mut self, bound: i32) -> i32 {
        self.seed = self.seed.wrapping_mul(1103515245).wrapping_add(12345);
        if bound <= 0 {
            0
        } else {
            ((self.seed >> 16) as i32).rem_euclid(bound)
        }
    }

    pub fn run(mut self) -> Result<Machine<'a>, String> {
        let entries = &self.program.entries;
        let mut pc = 0;
        let mut steps = 0;

        while pc < entries.len() {
            steps += 1;
            if steps > STEP_LIMIT {
                return Err("step limit exceeded".to_owned());
            }

            let entry = &entries[pc];
            pc += 1;
            let Some(opcode) = entry.opcode else {
                continue;
            };
            let a = &entry.args;

            match opcode {
                Opcode::ValCopy => {
                    let v = self.value(&a[0])?;
                    self.set(&a[1], v)?;
                }
                op if op.is_binary() => {
                    let (l, r) = (self.value(&a[0])?, self.value(&a[1])?);
                    let v = match op {
                        Opcode::Add => l.wrapping_add(r),
                        Opcode::Sub => l.wrapping_sub(r),
                        Opcode::Mult => l.wrapping_mul(r),
                        Opcode::Div | Opcode::Mod if r == 0 => {
                            return Err("division by zero".to_owned())
                        }
                        Opcode::Div => l.wrapping_div(r),
                        Opcode::Mod => l.wrapping_rem(r),
                        Opcode::TestLess => (l < r) as i32,
                        Opcode::TestGtr => (l > r) as i32,
                        Opcode::TestEqu => (l == r) as i32,
                        Opcode::TestNequ => (l != r) as i32,
                        Opcode::TestLte => (l <= r) as i32,
                        _ => (l >= r) as i32,
                    };
                    self.set(&a[2], v)?;
                }
                Opcode::Jump => pc = self.value(&a[0])? as usize,
                Opcode::JumpIf0 => {
                    if self.value(&a[0])? == 0 {
                        pc = self.value(&a[1])? as usize;
                    }
                }
                Opcode::JumpIfN0 => {
                    if self.value(&a[0])? != 0 {
                        pc = self.value(&a[1])? as usize;
                    }
                }
                Opcode::Random => {
                    let bound = self.value(&a[0])?;
                    let v = self.random(bound);
                    self.set(&a[1], v)?;
                }
                Opcode::OutInt => {
                    let v = self.value(&a[0])?;
                    self.output.push_str(&v.to_string());
                }
                Opcode::OutChar => {
                    let v = self.value(&a[0])?;
                    self.output.push(char::from_u32(v as u32).unwrap_or('?'));
                }
                Opcode::Nop => {}
                Opcode::Push => {
                    let v = self.value(&a[0])?;
                    self.stack.push(v);
                }
                Opcode::Pop => {
                    let v = self.stack.pop().ok_or("pop from empty stack")?;
                    self.set(&a[0], v)?;
                }
                Opcode::ArGetIdx => {
                    let idx = self.value(&a[1])?;
                    let v = *self
                        .array(&a[0])?
                        .get(idx as usize)
                        .ok_or_else(|| format!("index {} out of range", idx))?;
                    self.set(&a[2], v)?;
                }
                Opcode::ArSetIdx => {
                    let idx = self.value(&a[1])?;
                    let v = self.value(&a[2])?;
                    let slot = self
                        .array(&a[0])?
                        .get_mut(idx as usize)
                        .ok_or_else(|| format!("index {} out of range", idx))?;
                    *slot = v;
                }
                Opcode::ArGetSize => {
                    let size = self.array(&a[0])?.len() as i32;
                    self.set(&a[1], size)?;
                }
                Opcode::ArSetSize => {
                    let size = self.value(&a[1])?.max(0) as usize;
                    self.array(&a[0])?.resize(size, 0);
                }
                Opcode::ArCopy => {
                    let src = self.array(&a[0])?.clone();
                    *self.array(&a[1])? = src;
                }
                Opcode::ArPush => {
                    let values = self.array(&a[0])?.clone();
                    self.stack.extend(values.iter().rev());
                    self.stack.push(values.len() as i32);
                }
                Opcode::ArPop => {
                    let size = self.stack.pop().ok_or("pop from empty stack")?;
                    let mut values = Vec::new();
                    for _ in 0..size {
                        values.push(self.stack.pop().ok_or("pop from empty stack")?);
                    }
                    *self.array(&a[0])? = values;
                }
                _ => return Err(format!("unhandled opcode {}", opcode)),
            }
        }

        Ok(self)
    }

    pub fn output(&self) -> &str {
        &self.output
    }
}

/// Run a program and return what it printed.
pub fn run(program: &ICProgram) -> Result<String, String> {
    Machine::new(program).run().map(|m| m.output)
}

pub fn compile_program(ast: &Node, table: &mut SymbolTable) -> ICProgram {
    compile(ast, table).expect("program compiles")
}

pub fn optimize_all(program: &ICProgram) -> ICProgram {
    program
        .optimize(&Optimization::ALL)
        .expect("optimizer accepts compiled code")
}

/// Printed lines, without comments or surrounding whitespace.
pub fn lines(program: &ICProgram) -> Vec<String> {
    program
        .entries
        .iter()
        .map(|entry| {
            let mut entry = entry.clone();
            entry.comment = None;
            entry.to_string().trim().to_owned()
        })
        .collect()
}
