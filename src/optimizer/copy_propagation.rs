use crate::ic::{ICArg, Opcode};
use crate::optimizer::tracker::{Analysis, Rewrite};

pub fn copy_propagation(analysis: &Analysis) -> Vec<Rewrite> {
    let mut rewrites = vec![];

    for (line, entry) in analysis.entries.iter().enumerate() {
        if entry.opcode != Some(Opcode::ValCopy) {
            continue;
        }
        let [ICArg::Scalar(src), ICArg::Scalar(dst)] = entry.args.as_slice() else {
            continue;
        };

        if src == dst {
            rewrites.push(Rewrite::new("self copy").delete(line));
            continue;
        }

        if let Some(rewrite) = coalesce(analysis, line, *src, *dst) {
            rewrites.push(rewrite);
        } else if let Some(rewrite) = forward(analysis, line, *src, *dst) {
            rewrites.push(rewrite);
        }
    }

    rewrites
}

// `P ... -> a; val_copy a b` where `a` exists only to carry P's result into `b`:
// let P write `b` directly.
fn coalesce(analysis: &Analysis, line: usize, src: usize, dst: usize) -> Option<Rewrite> {
    if line == 0 || analysis.entries[line].label.is_some() || analysis.is_pinned(src) {
        return None;
    }

    let producer = line - 1;
    let (slot, _) = analysis.entries[producer]
        .scalar_writes()
        .into_iter()
        .find(|(_, var)| *var == src)?;

    let tracker = analysis.tracker(src)?;
    if tracker.writes != [producer] || tracker.read_slots != [(line, 0)] {
        return None;
    }

    Some(
        Rewrite::new("copy coalescing")
            .set_arg(producer, slot, ICArg::Scalar(dst))
            .delete(line),
    )
}

// `val_copy a b` where `b` is a single-write local: read `a` wherever `b` was read, as long
// as `a` keeps its value until the last of those reads.
fn forward(analysis: &Analysis, line: usize, src: usize, dst: usize) -> Option<Rewrite> {
    if analysis.is_pinned(dst) {
        return None;
    }

    let copy = analysis.tracker(dst)?;
    if copy.writes != [line] || !copy.local() || copy.read_slots.is_empty() {
        return None;
    }
    if copy.read_slots.iter().any(|(l, _)| *l <= line) {
        return None;
    }

    let last_read = copy.last_read_line()?;
    if analysis.tracker(src)?.written_between(line, last_read) {
        return None;
    }

    let mut rewrite = Rewrite::new("copy propagation").claim_range(line..=last_read);
    for (read_line, slot) in &copy.read_slots {
        rewrite = rewrite.set_arg(*read_line, *slot, ICArg::Scalar(src));
    }

    Some(rewrite.delete(line))
}
