use std::collections::{BTreeSet, HashMap};
use std::io::Write;
use std::ops::Range;

use crate::error::Result;
use crate::ic::{ICEntry, Opcode};
use crate::ice;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeId {
    Entry,
    Block(usize), // Block ID is represented by an index
    Exit,
}

#[derive(Clone, Debug, PartialEq)]
pub struct BasicBlock {
    pub id: NodeId,
    pub lines: Range<usize>, // Lines of the program this block covers
    pub succs: Vec<NodeId>,
}

#[derive(Clone, Debug, Default)]
pub struct CFG {
    pub basic_blocks: Vec<BasicBlock>,
    pub entry_succs: Vec<NodeId>,
}

/// Split the program into maximal straight-line runs. A block starts at every label and
/// right after every jump.
pub fn partition_into_basic_blocks(entries: &[ICEntry]) -> Vec<Range<usize>> {
    let mut finished_blocks = Vec::new();
    let mut start = 0;

    for (line, entry) in entries.iter().enumerate() {
        if entry.label.is_some() && line > start {
            finished_blocks.push(start..line);
            start = line;
        }

        if entry.opcode.is_some_and(|op| op.is_jump()) {
            finished_blocks.push(start..line + 1);
            start = line + 1;
        }
    }

    if start < entries.len() {
        finished_blocks.push(start..entries.len());
    }

    finished_blocks
}

pub fn assign_block_ids(entries: &mut [ICEntry]) {
    for (id, lines) in partition_into_basic_blocks(entries).into_iter().enumerate() {
        for entry in &mut entries[lines] {
            entry.block_id = Some(id);
        }
    }
}

/// Labels used as values rather than as direct jump targets, e.g. pushed return addresses.
/// Any of them may be the destination of a computed jump.
pub fn address_taken_labels(entries: &[ICEntry]) -> BTreeSet<String> {
    let defined: BTreeSet<&str> = entries.iter().filter_map(|e| e.label.as_deref()).collect();

    entries
        .iter()
        .flat_map(|entry| {
            let target_slot = entry.opcode.and_then(|op| op.target_slot());
            entry
                .args
                .iter()
                .enumerate()
                .filter(move |(slot, _)| Some(*slot) != target_slot)
                .filter_map(|(_, arg)| arg.as_const())
        })
        .filter(|text| defined.contains(text))
        .map(str::to_owned)
        .collect()
}

impl CFG {
    pub fn build(entries: &[ICEntry]) -> Result<CFG> {
        let basic_blocks = partition_into_basic_blocks(entries)
            .into_iter()
            .enumerate()
            .map(|(idx, lines)| BasicBlock {
                id: NodeId::Block(idx),
                lines,
                succs: vec![],
            })
            .collect();

        let mut cfg = CFG {
            basic_blocks,
            entry_succs: vec![],
        };

        cfg.add_all_edges(entries)?;
        Ok(cfg)
    }

    pub fn get_succs(&self, node_id: &NodeId) -> &[NodeId] {
        match node_id {
            NodeId::Entry => &self.entry_succs,
            NodeId::Block(n) => &self.basic_blocks[*n].succs,
            NodeId::Exit => &[], // Exit node has no successors
        }
    }

    pub fn add_edge(&mut self, pred: NodeId, succ: NodeId) {
        let add_if_missing = |node_list: &mut Vec<NodeId>, node_id: NodeId| {
            if !node_list.contains(&node_id) {
                node_list.push(node_id);
            }
        };

        match pred {
            NodeId::Entry => add_if_missing(&mut self.entry_succs, succ),
            NodeId::Block(n) => add_if_missing(&mut self.basic_blocks[n].succs, succ),
            NodeId::Exit => {}
        }
    }

    /// Ids of every block a run can reach from the entry node.
    pub fn reachable_blocks(&self) -> BTreeSet<usize> {
        let mut explored = BTreeSet::new();
        let mut stack = vec![NodeId::Entry];

        while let Some(node_id) = stack.pop() {
            if !explored.insert(node_id.clone()) {
                continue;
            }
            stack.extend(self.get_succs(&node_id).iter().cloned());
        }

        explored
            .into_iter()
            .filter_map(|node| match node {
                NodeId::Block(n) => Some(n),
                _ => None,
            })
            .collect()
    }

    fn add_all_edges(&mut self, entries: &[ICEntry]) -> Result<()> {
        let mut label_map = HashMap::new();
        for block in &self.basic_blocks {
            for entry in &entries[block.lines.clone()] {
                if let Some(label) = &entry.label {
                    if label_map.insert(label.clone(), block.id.clone()).is_some() {
                        ice!("label '{}' is defined more than once", label);
                    }
                }
            }
        }

        let computed_targets: Vec<NodeId> = address_taken_labels(entries)
            .iter()
            .filter_map(|label| label_map.get(label).cloned())
            .collect();

        let block_count = self.basic_blocks.len();
        for idx in 0..block_count {
            let block_id = NodeId::Block(idx);
            let next_block = if idx + 1 == block_count {
                NodeId::Exit
            } else {
                NodeId::Block(idx + 1)
            };

            let last_instr = &entries[self.basic_blocks[idx].lines.end - 1];

            let targets = if last_instr.is_computed_jump() {
                let mut targets = computed_targets.clone();
                targets.push(NodeId::Exit);
                targets
            } else if let Some(target) = last_instr.jump_target() {
                match label_map.get(target) {
                    Some(target_id) => vec![target_id.clone()],
                    None => ice!("jump to undefined label '{}'", target),
                }
            } else {
                vec![]
            };

            for target in targets {
                self.add_edge(block_id.clone(), target);
            }

            if last_instr.opcode != Some(Opcode::Jump) {
                self.add_edge(block_id, next_block);
            }
        }

        match self.basic_blocks.first() {
            Some(block) => {
                let first = block.id.clone();
                self.add_edge(NodeId::Entry, first);
            }
            None => self.add_edge(NodeId::Entry, NodeId::Exit),
        }

        Ok(())
    }

    pub fn write_graphviz(&self, entries: &[ICEntry], out: &mut impl Write) -> std::io::Result<()> {
        writeln!(out, "digraph {{")?;

        writeln!(out, "  labeljust=l;")?;
        writeln!(out, "  node[shape=\"box\"];")?;
        writeln!(out, "  Entry[label=\"ENTRY\"];")?;
        writeln!(out, "  Exit[label=\"EXIT\"];")?;

        fn extract_id(node: &NodeId) -> String {
            match node {
                NodeId::Entry => "Entry".to_string(),
                NodeId::Block(n) => format!("Block{}", n),
                NodeId::Exit => "Exit".to_string(),
            }
        }

        for (idx, block) in self.basic_blocks.iter().enumerate() {
            writeln!(out, "  Block{}[label=<", idx)?;
            writeln!(out, "    <table border=\"0\" cellborder=\"1\" cellspacing=\"0\">")?;
            writeln!(out, "      <tr><td><b>Block {}</b></td></tr>", idx)?;

            for entry in &entries[block.lines.clone()] {
                writeln!(
                    out,
                    "      <tr><td align=\"left\">{}</td></tr>",
                    escape_html(entry.to_string().trim())
                )?;
            }

            writeln!(out, "    </table>")?;
            writeln!(out, "  >];")?;
        }

        for succ in &self.entry_succs {
            writeln!(out, "  Entry -> {};", extract_id(succ))?;
        }

        for (idx, block) in self.basic_blocks.iter().enumerate() {
            for succ in &block.succs {
                writeln!(out, "  Block{} -> {};", idx, extract_id(succ))?;
            }
        }

        writeln!(out, "}}")
    }
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
