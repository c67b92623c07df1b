use std::collections::BTreeSet;

use crate::cfg::CFG;
use crate::error::Result;
use crate::optimizer::tracker::{Analysis, Rewrite};

pub fn unreachable_code_elimination(analysis: &Analysis) -> Result<Vec<Rewrite>> {
    let mut rewrites = eliminate_unreachable_blocks(analysis)?;
    rewrites.extend(eliminate_useless_jumps(analysis));
    rewrites.extend(eliminate_useless_labels(analysis));
    Ok(rewrites)
}

pub fn eliminate_unreachable_blocks(analysis: &Analysis) -> Result<Vec<Rewrite>> {
    let cfg = CFG::build(analysis.entries)?;
    let reachable = cfg.reachable_blocks();

    let rewrites = cfg
        .basic_blocks
        .iter()
        .enumerate()
        .filter(|(idx, _)| !reachable.contains(idx))
        .filter_map(|(_, block)| {
            let dead_lines: Vec<usize> = block
                .lines
                .clone()
                .filter(|line| !analysis.entries[*line].is_label_only())
                .collect();

            if dead_lines.is_empty() {
                return None;
            }

            let rewrite = Rewrite::new("unreachable code elimination");
            Some(dead_lines.into_iter().fold(rewrite, |rw, line| rw.delete(line)))
        })
        .collect();

    Ok(rewrites)
}

/// A jump to the label that directly follows it.
pub fn eliminate_useless_jumps(analysis: &Analysis) -> Vec<Rewrite> {
    analysis
        .entries
        .iter()
        .enumerate()
        .filter(|(line, entry)| match (entry.jump_target(), analysis.entries.get(line + 1)) {
            (Some(target), Some(next)) => next.label.as_deref() == Some(target),
            _ => false,
        })
        .map(|(line, _)| Rewrite::new("useless jump elimination").delete(line))
        .collect()
}

/// Labels nothing refers to, whether as a jump target or as a pushed address.
pub fn eliminate_useless_labels(analysis: &Analysis) -> Vec<Rewrite> {
    let referenced: BTreeSet<&str> = analysis
        .entries
        .iter()
        .flat_map(|entry| entry.args.iter().filter_map(|arg| arg.as_const()))
        .collect();

    analysis
        .entries
        .iter()
        .enumerate()
        .filter(|(_, entry)| {
            entry
                .label
                .as_deref()
                .is_some_and(|label| !referenced.contains(label))
        })
        .map(|(line, _)| Rewrite::new("useless label elimination").clear_label(line))
        .collect()
}
