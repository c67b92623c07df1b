use std::collections::{BTreeSet, HashMap};

use crate::ic::{ICArg, ICEntry, Opcode};

/// One line on which a variable shows up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Occurrence {
    pub line: usize,
    pub reads: bool,
    pub writes: bool,
}

/// Everything one scan knows about a single scalar variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tracker {
    pub occurrences: Vec<Occurrence>,
    pub read_slots: Vec<(usize, usize)>, // (line, slot)
    pub writes: Vec<usize>,
    pub first_line: usize,
    pub last_line: usize,
    pub first_block: usize,
    pub last_block: usize,
    /// Exactly one write, and that write is a `val_copy`.
    pub ssa: bool,
    /// The literal this variable always holds, when its single write copies one in.
    pub replace: Option<String>,
}

impl Tracker {
    pub fn used_count(&self) -> usize {
        self.read_slots.len()
    }

    pub fn local(&self) -> bool {
        self.first_block == self.last_block
    }

    pub fn last_read_line(&self) -> Option<usize> {
        self.read_slots.iter().map(|(line, _)| *line).max()
    }

    /// The first line after `line` mentioning this variable.
    pub fn next_occurrence(&self, line: usize) -> Option<Occurrence> {
        self.occurrences.iter().find(|occ| occ.line > line).copied()
    }

    /// Whether any write lands strictly between `after` and `before`.
    pub fn written_between(&self, after: usize, before: usize) -> bool {
        self.writes.iter().any(|line| *line > after && *line < before)
    }
}

pub struct Analysis<'a> {
    pub entries: &'a [ICEntry],
    pub pinned: &'a BTreeSet<usize>,
    pub trackers: HashMap<usize, Tracker>,
}

impl<'a> Analysis<'a> {
    /// Scan the program once. Entries are expected to carry their block ids already.
    pub fn new(entries: &'a [ICEntry], pinned: &'a BTreeSet<usize>) -> Self {
        let mut trackers: HashMap<usize, Tracker> = HashMap::new();

        for (line, entry) in entries.iter().enumerate() {
            let block = entry.block_id.unwrap_or(0);
            let reads = entry.scalar_reads();
            let writes = entry.scalar_writes();

            let mut touched: Vec<usize> = reads.iter().chain(&writes).map(|(_, var)| *var).collect();
            touched.sort_unstable();
            touched.dedup();

            for var in touched {
                let tracker = trackers.entry(var).or_insert_with(|| Tracker {
                    occurrences: vec![],
                    read_slots: vec![],
                    writes: vec![],
                    first_line: line,
                    last_line: line,
                    first_block: block,
                    last_block: block,
                    ssa: false,
                    replace: None,
                });

                tracker.last_line = line;
                tracker.first_block = tracker.first_block.min(block);
                tracker.last_block = tracker.last_block.max(block);

                let occ = Occurrence {
                    line,
                    reads: reads.iter().any(|(_, v)| *v == var),
                    writes: writes.iter().any(|(_, v)| *v == var),
                };
                if occ.writes {
                    tracker.writes.push(line);
                }
                tracker.occurrences.push(occ);
                tracker
                    .read_slots
                    .extend(reads.iter().filter(|(_, v)| *v == var).map(|(slot, _)| (line, *slot)));
            }
        }

        for tracker in trackers.values_mut() {
            if let [write] = tracker.writes.as_slice() {
                let entry = &entries[*write];
                if entry.opcode == Some(Opcode::ValCopy) {
                    tracker.ssa = true;
                    tracker.replace = entry.args.first().and_then(ICArg::as_const).map(str::to_owned);
                }
            }
        }

        Analysis {
            entries,
            pinned,
            trackers,
        }
    }

    pub fn tracker(&self, var: usize) -> Option<&Tracker> {
        self.trackers.get(&var)
    }

    pub fn is_pinned(&self, var: usize) -> bool {
        self.pinned.contains(&var)
    }

    pub fn block_of(&self, line: usize) -> usize {
        self.entries[line].block_id.unwrap_or(0)
    }

    /// True when `line` sits in the entry block with no label before it, so it can
    /// execute at most once and always before anything outside that block.
    pub fn runs_once_first(&self, line: usize) -> bool {
        self.block_of(line) == 0 && self.entries[..=line].iter().all(|e| e.label.is_none())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Edit {
    SetArg { line: usize, slot: usize, arg: ICArg },
    Replace { line: usize, opcode: Opcode, args: Vec<ICArg> },
    Delete { line: usize },
    ClearLabel { line: usize },
}

/// A proposed change together with every line it depends on. Two rewrites whose claims
/// overlap are never applied in the same scan.
#[derive(Debug, Clone, PartialEq)]
pub struct Rewrite {
    pub rule: &'static str,
    pub claims: BTreeSet<usize>,
    pub edits: Vec<Edit>,
}

impl Rewrite {
    pub fn new(rule: &'static str) -> Self {
        Rewrite {
            rule,
            claims: BTreeSet::new(),
            edits: vec![],
        }
    }

    pub fn claim(mut self, line: usize) -> Self {
        self.claims.insert(line);
        self
    }

    pub fn claim_range(mut self, lines: std::ops::RangeInclusive<usize>) -> Self {
        self.claims.extend(lines);
        self
    }

    pub fn set_arg(mut self, line: usize, slot: usize, arg: ICArg) -> Self {
        self.edits.push(Edit::SetArg { line, slot, arg });
        self.claim(line)
    }

    pub fn replace(mut self, line: usize, opcode: Opcode, args: Vec<ICArg>) -> Self {
        self.edits.push(Edit::Replace { line, opcode, args });
        self.claim(line)
    }

    pub fn delete(mut self, line: usize) -> Self {
        self.edits.push(Edit::Delete { line });
        self.claim(line)
    }

    pub fn clear_label(mut self, line: usize) -> Self {
        self.edits.push(Edit::ClearLabel { line });
        self.claim(line)
    }
}

/// Apply every proposal whose claims do not overlap an earlier accepted one, and return
/// how many were applied. Deleted instructions keep their label as a label-only entry.
pub fn apply_rewrites(entries: &mut Vec<ICEntry>, proposals: Vec<Rewrite>) -> usize {
    let mut claimed = BTreeSet::new();
    let mut accepted = vec![];

    for rewrite in proposals {
        if !rewrite.claims.is_disjoint(&claimed) {
            tracing::debug!("{} deferred, lines {:?} already claimed", rewrite.rule, rewrite.claims);
            continue;
        }
        claimed.extend(rewrite.claims.iter().copied());
        accepted.push(rewrite);
    }

    let mut deleted = vec![false; entries.len()];

    for rewrite in &accepted {
        tracing::debug!("{} on lines {:?}", rewrite.rule, rewrite.claims);

        for edit in &rewrite.edits {
            match edit {
                Edit::SetArg { line, slot, arg } => {
                    if let Some(target) = entries[*line].args.get_mut(*slot) {
                        *target = arg.clone();
                    }
                }
                Edit::Replace { line, opcode, args } => {
                    entries[*line].opcode = Some(*opcode);
                    entries[*line].args = args.clone();
                }
                Edit::Delete { line } => deleted[*line] = true,
                Edit::ClearLabel { line } => entries[*line].label = None,
            }
        }
    }

    let old_entries = std::mem::take(entries);
    for (line, mut entry) in old_entries.into_iter().enumerate() {
        if deleted[line] {
            if entry.label.is_none() {
                continue;
            }
            entry.opcode = None;
            entry.args.clear();
            entry.comment = None;
        }

        if entry.is_label_only() && entry.label.is_none() {
            continue;
        }

        entries.push(entry);
    }

    accepted.len()
}
