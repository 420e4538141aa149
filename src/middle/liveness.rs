//! Liveness analysis: fixpoint live-in/live-out at each IR instruction
//! (spec.md §4.3).
//!
//! Computed in two passes, matching the classical block-level-then-local
//! decomposition: a block-level fixpoint (`use`/`def` summarized per
//! block) establishes each block's live-out set, then one backward sweep
//! per block turns that into exact per-instruction sets. Successors of a
//! block with no instructions contribute their own live-in directly, which
//! (since an empty block's `use`/`def` are both empty) equals its
//! live-out, so the BFS-skip-empty-blocks rule in spec.md §4.3 falls out
//! of the block-level equations without special-casing.

use log::trace;

use crate::common::Set;
use crate::front::symbol::SymbolId;
use crate::middle::cfg::{BlockId, CFG};

/// Live-in/live-out sets at every instruction, keyed by `(block, index)`.
pub struct Liveness {
    pub live_in: crate::common::Map<(BlockId, usize), Set<SymbolId>>,
    pub live_out: crate::common::Map<(BlockId, usize), Set<SymbolId>>,
}

impl Liveness {
    pub fn live_in_at(&self, block: BlockId, idx: usize) -> &Set<SymbolId> {
        static EMPTY: std::sync::OnceLock<Set<SymbolId>> = std::sync::OnceLock::new();
        self.live_in
            .get(&(block, idx))
            .unwrap_or_else(|| EMPTY.get_or_init(Set::new))
    }

    pub fn live_out_at(&self, block: BlockId, idx: usize) -> &Set<SymbolId> {
        static EMPTY: std::sync::OnceLock<Set<SymbolId>> = std::sync::OnceLock::new();
        self.live_out
            .get(&(block, idx))
            .unwrap_or_else(|| EMPTY.get_or_init(Set::new))
    }
}

fn dfs_preorder(cfg: &CFG) -> Vec<BlockId> {
    let mut order = Vec::new();
    let mut seen = vec![false; cfg.blocks.len()];
    let mut stack = vec![cfg.entry()];
    while let Some(b) = stack.pop() {
        if seen[b.0] {
            continue;
        }
        seen[b.0] = true;
        order.push(b);
        let block = cfg.block(b);
        // Push false before true so true is visited first (stack is LIFO).
        if let Some(f) = block.exit_false {
            stack.push(f);
        }
        if let Some(t) = block.exit_true {
            stack.push(t);
        }
    }
    order
}

/// Local upward-exposed uses and the full local kill set for one block,
/// via a backward scan seeded with the empty live-out set.
fn local_use_def(cfg: &CFG, id: BlockId) -> (Set<SymbolId>, Set<SymbolId>) {
    let block = cfg.block(id);
    let mut running: Set<SymbolId> = Set::new();
    let mut def: Set<SymbolId> = Set::new();
    for instr in block.instrs.iter().rev() {
        for d in instr.defs() {
            running.remove(&d);
            def.insert(d);
        }
        for u in instr.uses() {
            running.insert(u);
        }
    }
    (running, def)
}

pub fn analyze(cfg: &CFG) -> Liveness {
    let order = dfs_preorder(cfg);
    let n = cfg.blocks.len();
    let mut use_sets = vec![Set::new(); n];
    let mut def_sets = vec![Set::new(); n];
    for &b in &order {
        let (u, d) = local_use_def(cfg, b);
        use_sets[b.0] = u;
        def_sets[b.0] = d;
    }

    let mut block_live_in = vec![Set::new(); n];
    let mut block_live_out = vec![Set::new(); n];

    let mut changed = true;
    let mut iterations = 0;
    while changed {
        changed = false;
        iterations += 1;
        for &b in &order {
            let block = cfg.block(b);
            let mut live_out = Set::new();
            if let Some(t) = block.exit_true {
                live_out.extend(block_live_in[t.0].iter().copied());
            }
            if let Some(f) = block.exit_false {
                live_out.extend(block_live_in[f.0].iter().copied());
            }
            let mut live_in = use_sets[b.0].clone();
            for v in live_out.iter() {
                if !def_sets[b.0].contains(v) {
                    live_in.insert(*v);
                }
            }
            if live_out != block_live_out[b.0] || live_in != block_live_in[b.0] {
                block_live_out[b.0] = live_out;
                block_live_in[b.0] = live_in;
                changed = true;
            }
        }
    }
    trace!("liveness fixpoint converged after {iterations} passes over {n} blocks");

    let mut live_in = crate::common::Map::new();
    let mut live_out = crate::common::Map::new();
    for &b in &order {
        let block = cfg.block(b);
        let mut running = block_live_out[b.0].clone();
        for (idx, instr) in block.instrs.iter().enumerate().rev() {
            live_out.insert((b, idx), running.clone());
            let mut this_in = running.clone();
            for d in instr.defs() {
                this_in.remove(&d);
            }
            for u in instr.uses() {
                this_in.insert(u);
            }
            live_in.insert((b, idx), this_in.clone());
            running = this_in;
        }
    }

    Liveness { live_in, live_out }
}
