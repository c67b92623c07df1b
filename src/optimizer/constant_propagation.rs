use crate::ic::{ICArg, Opcode};
use crate::optimizer::tracker::{Analysis, Rewrite};

/// `val_copy CONST v` where `v` is written nowhere else: substitute the literal into every
/// read of `v` and drop the copy.
///
/// Only fires when every read comes after the copy and either all of `v` lives in one block
/// or the copy sits in the entry block ahead of any label. Pinned variables keep their copy.
pub fn constant_propagation(analysis: &Analysis) -> Vec<Rewrite> {
    let mut rewrites = vec![];

    for (line, entry) in analysis.entries.iter().enumerate() {
        if entry.opcode != Some(Opcode::ValCopy) {
            continue;
        }
        let [ICArg::Const(_), ICArg::Scalar(var)] = entry.args.as_slice() else {
            continue;
        };
        let Some(tracker) = analysis.tracker(*var) else {
            continue;
        };
        let Some(value) = tracker.replace.as_ref().filter(|_| tracker.ssa) else {
            continue;
        };

        if tracker.read_slots.is_empty() || tracker.read_slots.iter().any(|(l, _)| *l <= line) {
            continue;
        }
        if !tracker.local() && !analysis.runs_once_first(line) {
            continue;
        }

        let mut rewrite = Rewrite::new("constant propagation");
        for (read_line, slot) in &tracker.read_slots {
            rewrite = rewrite.set_arg(*read_line, *slot, ICArg::constant(value.clone()));
        }

        rewrite = if analysis.is_pinned(*var) {
            rewrite.claim(line)
        } else {
            rewrite.delete(line)
        };

        rewrites.push(rewrite);
    }

    rewrites
}
