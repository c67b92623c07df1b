use crate::ast::parse_char_literal;
use crate::ic::{ICArg, Opcode};
use crate::optimizer::tracker::{Analysis, Rewrite};

/// Numeric value of a literal operand: a decimal integer or a quoted char.
pub fn literal_value(text: &str) -> Option<i32> {
    if text.starts_with('\'') {
        return parse_char_literal(text).map(|c| c as i32);
    }
    text.parse::<i32>().ok()
}

fn const_value(arg: &ICArg) -> Option<i32> {
    arg.as_const().and_then(literal_value)
}

/// Result of a binary opcode on two known operands. Division by zero is left for run time.
pub fn evaluate(opcode: Opcode, lhs: i32, rhs: i32) -> Option<i32> {
    let truth = |b: bool| Some(b as i32);

    match opcode {
        Opcode::Add => Some(lhs.wrapping_add(rhs)),
        Opcode::Sub => Some(lhs.wrapping_sub(rhs)),
        Opcode::Mult => Some(lhs.wrapping_mul(rhs)),
        Opcode::Div if rhs != 0 => Some(lhs.wrapping_div(rhs)),
        Opcode::Mod if rhs != 0 => Some(lhs.wrapping_rem(rhs)),
        Opcode::TestLess => truth(lhs < rhs),
        Opcode::TestGtr => truth(lhs > rhs),
        Opcode::TestEqu => truth(lhs == rhs),
        Opcode::TestNequ => truth(lhs != rhs),
        Opcode::TestLte => truth(lhs <= rhs),
        Opcode::TestGte => truth(lhs >= rhs),
        _ => None,
    }
}

pub fn constant_folding(analysis: &Analysis) -> Vec<Rewrite> {
    let mut rewrites = vec![];

    for (line, entry) in analysis.entries.iter().enumerate() {
        let Some(opcode) = entry.opcode else {
            continue;
        };

        if opcode.is_binary() {
            let [lhs, rhs, dst] = entry.args.as_slice() else {
                continue;
            };

            if let (Some(l), Some(r)) = (const_value(lhs), const_value(rhs)) {
                if let Some(result) = evaluate(opcode, l, r) {
                    rewrites.push(Rewrite::new("constant folding").replace(
                        line,
                        Opcode::ValCopy,
                        vec![ICArg::constant(result.to_string()), dst.clone()],
                    ));
                }
                continue;
            }

            if let Some(src) = simplify_identity(opcode, lhs, rhs) {
                rewrites.push(Rewrite::new("identity simplification").replace(
                    line,
                    Opcode::ValCopy,
                    vec![src, dst.clone()],
                ));
            }
        } else if opcode.is_conditional_jump() {
            let [cond, target] = entry.args.as_slice() else {
                continue;
            };
            let Some(value) = const_value(cond) else {
                continue;
            };

            let taken = match opcode {
                Opcode::JumpIf0 => value == 0,
                _ => value != 0,
            };

            let rewrite = Rewrite::new("jump folding");
            rewrites.push(if taken {
                rewrite.replace(line, Opcode::Jump, vec![target.clone()])
            } else {
                rewrite.delete(line)
            });
        }
    }

    rewrites
}

/// The operand a binary op reduces to when the other side is an identity or zero element.
fn simplify_identity(opcode: Opcode, lhs: &ICArg, rhs: &ICArg) -> Option<ICArg> {
    let l = const_value(lhs);
    let r = const_value(rhs);

    match (opcode, l, r) {
        (Opcode::Mult, Some(0), _) | (Opcode::Mult, _, Some(0)) => Some(ICArg::constant("0")),
        (Opcode::Mult, Some(1), _) | (Opcode::Add, Some(0), _) => Some(rhs.clone()),
        (Opcode::Mult, _, Some(1))
        | (Opcode::Add, _, Some(0))
        | (Opcode::Sub, _, Some(0))
        | (Opcode::Div, _, Some(1)) => Some(lhs.clone()),
        _ => None,
    }
}
