use crate::ast::{char_lexeme, ArrayMethod, BoolOp, Literal, Node, NodeKind, UnaryOp};
use crate::error::Result;
use crate::ic::{ICArg, ICProgram, Opcode};
use crate::symbol_table::{EntryId, FunctionId, SymbolTable};
use crate::types::Type;
use crate::{bail_at, ice};

pub const PROGRAM_END: &str = "program_end";

/// Compile a whole program: the top-level tree first, then every function body declared in
/// `table`, placed behind a jump to `program_end`.
pub fn compile(ast: &Node, table: &mut SymbolTable) -> Result<ICProgram> {
    let mut ic = ICProgram::new();

    if let Some(result) = compile_node(ast, table, &mut ic)? {
        table.release(result);
    }

    let bodies = table.take_function_bodies();
    if !bodies.is_empty() {
        ic.add(Opcode::Jump, vec![ICArg::constant(PROGRAM_END)])?;
        for (function, body) in &bodies {
            compile_function(*function, body, table, &mut ic)?;
        }
        ic.add_label(PROGRAM_END);
    }

    let named: Vec<usize> = table
        .entries()
        .filter(|entry| !entry.is_temp)
        .map(|entry| entry.var_id)
        .collect();
    for var_id in named {
        ic.pin(var_id);
    }

    tracing::debug!("compiled {} IC entries", ic.len());
    Ok(ic)
}

fn compile_function(
    function: FunctionId,
    body: &Node,
    table: &mut SymbolTable,
    ic: &mut ICProgram,
) -> Result<()> {
    let entry = table.function(function);
    let label = entry.label.clone();
    let comment = format!("Function '{}'", entry.name);
    let return_slot = entry.return_slot;

    ic.add_label_with_comment(label, &comment);
    if let Some(result) = compile_node(body, table, ic)? {
        table.release(result);
    }
    emit_return_jump(return_slot, table, ic)
}

fn arg(table: &SymbolTable, id: EntryId) -> ICArg {
    let entry = table.entry(id);
    if entry.ty.is_array() {
        ICArg::Array(entry.var_id)
    } else {
        ICArg::Scalar(entry.var_id)
    }
}

/// Move `src` into `dst`, storing back into the array when `dst` stands for an element.
fn copy_value(table: &SymbolTable, ic: &mut ICProgram, src: EntryId, dst: EntryId) -> Result<()> {
    let target = table.entry(dst);

    match (target.array_ref, target.index_ref) {
        (Some(array), Some(index)) => {
            ic.add(
                Opcode::ArSetIdx,
                vec![arg(table, array), arg(table, index), arg(table, src)],
            )?;
        }
        _ if target.ty.is_array() => {
            ic.add(Opcode::ArCopy, vec![arg(table, src), arg(table, dst)])?;
        }
        _ => {
            ic.add(Opcode::ValCopy, vec![arg(table, src), arg(table, dst)])?;
        }
    }

    Ok(())
}

fn emit_return_jump(return_slot: EntryId, table: &SymbolTable, ic: &mut ICProgram) -> Result<()> {
    ic.add(Opcode::Pop, vec![arg(table, return_slot)])?;
    ic.add(Opcode::Jump, vec![arg(table, return_slot)])?;
    Ok(())
}

/// Compile a node that must produce a value.
fn value(node: &Node, table: &mut SymbolTable, ic: &mut ICProgram) -> Result<EntryId> {
    match compile_node(node, table, ic)? {
        Some(id) => Ok(id),
        None => ice!("expression on line {} produced no value", node.line),
    }
}

/// Append the IC for `node` and return the entry holding its result, if it has one.
/// Temporaries returned here belong to the caller, which releases them once consumed.
pub fn compile_node(
    node: &Node,
    table: &mut SymbolTable,
    ic: &mut ICProgram,
) -> Result<Option<EntryId>> {
    match &node.kind {
        NodeKind::Block(children) => {
            for child in children {
                if let Some(result) = compile_node(child, table, ic)? {
                    table.release(result);
                }
            }
            Ok(None)
        }

        NodeKind::Literal(literal) => compile_literal(literal, table, ic).map(Some),

        NodeKind::Variable(id) => Ok(Some(*id)),

        NodeKind::Assign { lhs, rhs } => {
            let lhs_id = value(lhs, table, ic)?;
            let rhs_id = value(rhs, table, ic)?;
            copy_value(table, ic, rhs_id, lhs_id)?;

            // An element temp still holds the old value, so the assignment yields the rhs.
            if table.entry(lhs_id).is_array_element() {
                table.release(lhs_id);
                Ok(Some(rhs_id))
            } else {
                table.release(rhs_id);
                Ok(Some(lhs_id))
            }
        }

        NodeKind::MathAssign { op, lhs, rhs } => {
            let lhs_id = value(lhs, table, ic)?;
            let rhs_id = value(rhs, table, ic)?;
            let target = arg(table, lhs_id);

            ic.add(
                op.opcode(),
                vec![target.clone(), arg(table, rhs_id), target.clone()],
            )?;

            let entry = table.entry(lhs_id);
            if let (Some(array), Some(index)) = (entry.array_ref, entry.index_ref) {
                ic.add(
                    Opcode::ArSetIdx,
                    vec![arg(table, array), arg(table, index), target],
                )?;
            }

            table.release(rhs_id);
            Ok(Some(lhs_id))
        }

        NodeKind::UnaryMath { op, operand } => {
            let in_id = value(operand, table, ic)?;
            let out_id = table.new_temp(Type::Int);
            let (input, out) = (arg(table, in_id), arg(table, out_id));

            match op {
                UnaryOp::Negate => {
                    ic.add(Opcode::ValCopy, vec![ICArg::constant("-1"), out.clone()])?;
                    ic.add(Opcode::Mult, vec![out.clone(), input, out])?;
                }
                UnaryOp::Not => {
                    ic.add(Opcode::TestEqu, vec![input, ICArg::constant("0"), out])?;
                }
            }

            table.release(in_id);
            Ok(Some(out_id))
        }

        NodeKind::BinaryMath { op, lhs, rhs } => {
            let lhs_id = value(lhs, table, ic)?;
            let rhs_id = value(rhs, table, ic)?;
            let out_id = table.new_temp(Type::Int);

            ic.add(
                op.opcode(),
                vec![arg(table, lhs_id), arg(table, rhs_id), arg(table, out_id)],
            )?;

            table.release(lhs_id);
            table.release(rhs_id);
            Ok(Some(out_id))
        }

        NodeKind::BinaryBool { op, lhs, rhs } => {
            let lhs_id = value(lhs, table, ic)?;
            let out_id = table.new_temp(Type::Int);
            let out = arg(table, out_id);
            let end_label = table.next_label("end_bool_");

            ic.add(
                Opcode::TestNequ,
                vec![arg(table, lhs_id), ICArg::constant("0"), out.clone()],
            )?;
            table.release(lhs_id);

            let (jump, comment) = match op {
                BoolOp::And => (Opcode::JumpIf0, "AND!"),
                BoolOp::Or => (Opcode::JumpIfN0, "OR!"),
            };
            ic.add_with_comment(
                jump,
                vec![out.clone(), ICArg::constant(end_label.clone())],
                comment,
            )?;

            // Only reached when the left side did not decide the result.
            let rhs_id = value(rhs, table, ic)?;
            ic.add(
                Opcode::TestNequ,
                vec![arg(table, rhs_id), ICArg::constant("0"), out],
            )?;
            table.release(rhs_id);
            ic.add_label(end_label);

            Ok(Some(out_id))
        }

        NodeKind::Conditional {
            cond,
            then_value,
            else_value,
        } => {
            let cond_id = value(cond, table, ic)?;
            let out_id = table.new_temp(node.ty);
            let false_label = table.next_label("cond_false_");
            let end_label = table.next_label("cond_end_");

            ic.add(
                Opcode::JumpIf0,
                vec![arg(table, cond_id), ICArg::constant(false_label.clone())],
            )?;
            table.release(cond_id);

            let then_id = value(then_value, table, ic)?;
            copy_value(table, ic, then_id, out_id)?;
            table.release(then_id);
            ic.add(Opcode::Jump, vec![ICArg::constant(end_label.clone())])?;

            ic.add_label(false_label);
            let else_id = value(else_value, table, ic)?;
            copy_value(table, ic, else_id, out_id)?;
            table.release(else_id);
            ic.add_label(end_label);

            Ok(Some(out_id))
        }

        NodeKind::If {
            cond,
            then_branch,
            else_branch,
        } => {
            let cond_id = value(cond, table, ic)?;

            let else_label = table.next_label("if_else_");
            let end_label = table.next_label("if_end_");

            ic.add(
                Opcode::JumpIf0,
                vec![arg(table, cond_id), ICArg::constant(else_label.clone())],
            )?;
            table.release(cond_id);

            compile_statement(then_branch, table, ic)?;
            ic.add(Opcode::Jump, vec![ICArg::constant(end_label.clone())])?;
            ic.add_label(else_label);
            if let Some(else_branch) = else_branch {
                compile_statement(else_branch, table, ic)?;
            }
            ic.add_label(end_label);

            Ok(None)
        }

        NodeKind::While { cond, body } => {
            let start_label = table.next_label("while_start_");
            let end_label = table.next_label("while_end_");

            ic.add_label(start_label.clone());
            let cond_id = value(cond, table, ic)?;
            ic.add(
                Opcode::JumpIf0,
                vec![arg(table, cond_id), ICArg::constant(end_label.clone())],
            )?;
            table.release(cond_id);

            table.push_loop_end(end_label.clone());
            compile_statement(body, table, ic)?;
            table.pop_loop_end();

            ic.add(Opcode::Jump, vec![ICArg::constant(start_label)])?;
            ic.add_label(end_label);

            Ok(None)
        }

        NodeKind::For {
            init,
            cond,
            step,
            body,
        } => {
            if let Some(init) = init {
                compile_statement(init, table, ic)?;
            }

            let start_label = table.next_label("for_start_");
            let end_label = table.next_label("for_end_");

            ic.add_label(start_label.clone());
            let cond_id = value(cond, table, ic)?;
            ic.add(
                Opcode::JumpIf0,
                vec![arg(table, cond_id), ICArg::constant(end_label.clone())],
            )?;
            table.release(cond_id);

            table.push_loop_end(end_label.clone());
            compile_statement(body, table, ic)?;
            table.pop_loop_end();

            if let Some(step) = step {
                compile_statement(step, table, ic)?;
            }
            ic.add(Opcode::Jump, vec![ICArg::constant(start_label)])?;
            ic.add_label(end_label);

            Ok(None)
        }

        NodeKind::Break => {
            let Some(end_label) = table.current_loop_end() else {
                bail_at!(node.line, "'break' command used outside of any loop");
            };
            ic.add(Opcode::Jump, vec![ICArg::constant(end_label)])?;
            Ok(None)
        }

        NodeKind::Print(args) => {
            for print_arg in args {
                let id = value(print_arg, table, ic)?;
                match print_arg.ty {
                    Type::Int => {
                        ic.add(Opcode::OutInt, vec![arg(table, id)])?;
                    }
                    Type::Char => {
                        ic.add(Opcode::OutChar, vec![arg(table, id)])?;
                    }
                    Type::IntArray | Type::CharArray => print_array(id, table, ic)?,
                    Type::Void => ice!("cannot print a void value on line {}", print_arg.line),
                }
                table.release(id);
            }

            ic.add_with_comment(
                Opcode::OutChar,
                vec![ICArg::constant(char_lexeme('\n'))],
                "End print statements with a newline.",
            )?;
            Ok(None)
        }

        NodeKind::Random(arg_node) => {
            let in_id = value(arg_node, table, ic)?;
            let out_id = table.new_temp(Type::Int);
            ic.add(Opcode::Random, vec![arg(table, in_id), arg(table, out_id)])?;
            table.release(in_id);
            Ok(Some(out_id))
        }

        NodeKind::ArrayAccess { array, index } => {
            let array_id = value(array, table, ic)?;
            let index_id = value(index, table, ic)?;
            let out_id = table.new_temp(node.ty);

            ic.add(
                Opcode::ArGetIdx,
                vec![
                    arg(table, array_id),
                    arg(table, index_id),
                    arg(table, out_id),
                ],
            )?;

            // Array and index stay alive until the element itself is released.
            table.link_array_element(out_id, array_id, index_id);
            Ok(Some(out_id))
        }

        NodeKind::MethodCall {
            method,
            array,
            args,
        } => {
            let array_id = value(array, table, ic)?;

            let result = match method {
                ArrayMethod::Size => {
                    let out_id = table.new_temp(Type::Int);
                    ic.add(
                        Opcode::ArGetSize,
                        vec![arg(table, array_id), arg(table, out_id)],
                    )?;
                    Some(out_id)
                }
                ArrayMethod::Resize => {
                    let [size] = args.as_slice() else {
                        ice!("resize() on line {} without a size", node.line);
                    };
                    let size_id = value(size, table, ic)?;
                    ic.add(
                        Opcode::ArSetSize,
                        vec![arg(table, array_id), arg(table, size_id)],
                    )?;
                    table.release(size_id);
                    None
                }
            };

            table.release(array_id);
            Ok(result)
        }

        NodeKind::FunctionCall { function, args } => {
            compile_call(*function, args, node.ty, table, ic)
        }

        NodeKind::Return { function, value: returned } => {
            let entry = table.function(*function);
            let (return_slot, value_slot) = (entry.return_slot, entry.return_value_slot);

            if let Some(returned) = returned {
                let id = value(returned, table, ic)?;
                copy_value(table, ic, id, value_slot)?;
                table.release(id);
            }

            emit_return_jump(return_slot, table, ic)?;
            Ok(None)
        }
    }
}

fn compile_statement(node: &Node, table: &mut SymbolTable, ic: &mut ICProgram) -> Result<()> {
    if let Some(result) = compile_node(node, table, ic)? {
        table.release(result);
    }
    Ok(())
}

fn compile_literal(literal: &Literal, table: &mut SymbolTable, ic: &mut ICProgram) -> Result<EntryId> {
    match literal {
        Literal::Int(n) => {
            let out_id = table.new_temp(Type::Int);
            ic.add(
                Opcode::ValCopy,
                vec![ICArg::constant(n.to_string()), arg(table, out_id)],
            )?;
            Ok(out_id)
        }
        Literal::Char(c) => {
            let out_id = table.new_temp(Type::Char);
            ic.add(
                Opcode::ValCopy,
                vec![ICArg::constant(char_lexeme(*c)), arg(table, out_id)],
            )?;
            Ok(out_id)
        }
        Literal::String(text) => {
            let elements: Vec<String> = text.chars().map(char_lexeme).collect();
            fill_array(Type::CharArray, &elements, table, ic)
        }
        Literal::IntArray(values) => {
            let elements: Vec<String> = values.iter().map(ToString::to_string).collect();
            fill_array(Type::IntArray, &elements, table, ic)
        }
    }
}

fn fill_array(
    ty: Type,
    elements: &[String],
    table: &mut SymbolTable,
    ic: &mut ICProgram,
) -> Result<EntryId> {
    let out_id = table.new_temp(ty);
    let out = arg(table, out_id);

    ic.add(
        Opcode::ArSetSize,
        vec![out.clone(), ICArg::constant(elements.len().to_string())],
    )?;
    for (idx, element) in elements.iter().enumerate() {
        ic.add(
            Opcode::ArSetIdx,
            vec![
                out.clone(),
                ICArg::constant(idx.to_string()),
                ICArg::constant(element.clone()),
            ],
        )?;
    }

    Ok(out_id)
}

fn print_array(array_id: EntryId, table: &mut SymbolTable, ic: &mut ICProgram) -> Result<()> {
    let elem_type = table.entry(array_id).ty.inner_type();
    let size_id = table.new_temp(Type::Int);
    let index_id = table.new_temp(Type::Int);
    let entry_id = table.new_temp(elem_type);
    let start_label = table.next_label("print_array_start_");
    let end_label = table.next_label("print_array_end_");

    let array = arg(table, array_id);
    let (size, index, entry) = (
        arg(table, size_id),
        arg(table, index_id),
        arg(table, entry_id),
    );
    let out = if elem_type == Type::Char {
        Opcode::OutChar
    } else {
        Opcode::OutInt
    };

    ic.add_with_comment(
        Opcode::ValCopy,
        vec![ICArg::constant("0"), index.clone()],
        "Init loop variable for printing array.",
    )?;
    ic.add_with_comment(
        Opcode::ArGetSize,
        vec![array.clone(), size.clone()],
        "Save size of array into variable.",
    )?;
    ic.add_label(start_label.clone());
    ic.add_with_comment(
        Opcode::TestGte,
        vec![index.clone(), size, entry.clone()],
        "Test if we are finished yet...",
    )?;
    ic.add_with_comment(
        Opcode::JumpIfN0,
        vec![entry.clone(), ICArg::constant(end_label.clone())],
        " ...and jump to end if so.",
    )?;
    ic.add_with_comment(
        Opcode::ArGetIdx,
        vec![array, index.clone(), entry.clone()],
        "Collect the value at the next index.",
    )?;
    ic.add_with_comment(out, vec![entry], "Print this entry!")?;
    ic.add_with_comment(
        Opcode::Add,
        vec![index.clone(), ICArg::constant("1"), index],
        "Increment to the next index.",
    )?;
    ic.add(Opcode::Jump, vec![ICArg::constant(start_label)])?;
    ic.add_label(end_label);

    table.release(size_id);
    table.release(index_id);
    table.release(entry_id);
    Ok(())
}

// Arguments are evaluated before any parameter slot is written, so a nested call to the
// same function cannot clobber them.
fn compile_call(
    function: FunctionId,
    args: &[Node],
    return_type: Type,
    table: &mut SymbolTable,
    ic: &mut ICProgram,
) -> Result<Option<EntryId>> {
    let arg_ids = args
        .iter()
        .map(|a| value(a, table, ic))
        .collect::<Result<Vec<_>>>()?;

    let entry = table.function(function);
    let params = entry.params.clone();
    let function_label = entry.label.clone();
    let value_slot = entry.return_value_slot;

    for (arg_id, param) in arg_ids.iter().zip(&params) {
        copy_value(table, ic, *arg_id, *param)?;
        table.release(*arg_id);
    }

    let return_label = table.next_label("call_return_");
    ic.add(Opcode::Push, vec![ICArg::constant(return_label.clone())])?;
    ic.add(Opcode::Jump, vec![ICArg::constant(function_label)])?;
    ic.add_label(return_label);

    if return_type == Type::Void {
        return Ok(None);
    }

    let out_id = table.new_temp(return_type);
    copy_value(table, ic, value_slot, out_id)?;
    Ok(Some(out_id))
}
