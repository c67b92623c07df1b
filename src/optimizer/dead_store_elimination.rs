use crate::optimizer::tracker::{Analysis, Rewrite};

/// Drop side-effect-free instructions whose result is never observed: either nothing
/// reads the variable at all, or the next mention of it in the same block overwrites it.
pub fn dead_store_elimination(analysis: &Analysis) -> Vec<Rewrite> {
    let mut rewrites = vec![];

    for (line, entry) in analysis.entries.iter().enumerate() {
        if !entry.opcode.is_some_and(|op| op.is_pure()) {
            continue;
        }
        let writes = entry.scalar_writes();
        let [(_, var)] = writes.as_slice() else {
            continue;
        };
        let var = *var;
        let Some(tracker) = analysis.tracker(var) else {
            continue;
        };

        if tracker.used_count() == 0 && !analysis.is_pinned(var) {
            rewrites.push(Rewrite::new("dead code elimination").delete(line));
            continue;
        }

        if let Some(next) = tracker.next_occurrence(line) {
            if next.writes && !next.reads && analysis.block_of(next.line) == analysis.block_of(line) {
                rewrites.push(
                    Rewrite::new("dead store elimination")
                        .delete(line)
                        .claim(next.line),
                );
            }
        }
    }

    rewrites
}
