//! Interference graph construction and the Chaitin-style graph-coloring
//! register allocator (spec.md §4.4).

use log::trace;

use crate::common::{Map, Set};
use crate::front::symbol::SymbolId;
use crate::middle::cfg::CFG;
use crate::middle::liveness::Liveness;

/// Physical registers available to the allocator (conceptually
/// `r8d..r14d`); index 7 (`r15d`) is the scratch and is never assigned.
pub const NUM_REGISTERS: u8 = 7;

/// The outcome of allocation: a partial coloring. Symbols with no entry
/// are spilled and are materialized through the scratch register at
/// emission time.
#[derive(Default, Debug)]
pub struct Allocation {
    pub colors: Map<SymbolId, u8>,
}

impl Allocation {
    pub fn register_of(&self, sym: SymbolId) -> Option<u8> {
        self.colors.get(&sym).copied()
    }

    pub fn is_spilled(&self, sym: SymbolId) -> bool {
        !self.colors.contains_key(&sym)
    }
}

/// Build the interference graph: an edge between `d` and every symbol
/// simultaneously live after an instruction that defines `d` (spec.md
/// §4.4). Stored as a `BTreeMap` of `BTreeSet`s for deterministic
/// neighbor iteration.
pub fn build_interference(cfg: &CFG, live: &Liveness) -> Map<SymbolId, Set<SymbolId>> {
    let mut graph: Map<SymbolId, Set<SymbolId>> = Map::new();
    let mut add_node = |graph: &mut Map<SymbolId, Set<SymbolId>>, s: SymbolId| {
        graph.entry(s).or_default();
    };

    for (bi, block) in cfg.blocks.iter().enumerate() {
        let block_id = crate::middle::cfg::BlockId(bi);
        for (idx, instr) in block.instrs.iter().enumerate() {
            for d in instr.defs() {
                add_node(&mut graph, d);
                for v in live.live_out_at(block_id, idx).iter() {
                    if *v == d {
                        continue;
                    }
                    add_node(&mut graph, *v);
                    graph.get_mut(&d).unwrap().insert(*v);
                    graph.get_mut(v).unwrap().insert(d);
                }
            }
        }
    }
    graph
}

/// Chaitin-style simplify/spill/select coloring with `K = NUM_REGISTERS`
/// colors. Spill selection is the simple deterministic policy spec.md
/// documents as a baseline (first non-selected node in `SymbolId` order);
/// see DESIGN.md for why a degree-based heuristic is not substituted.
pub fn allocate(graph: &Map<SymbolId, Set<SymbolId>>) -> Allocation {
    let k = NUM_REGISTERS as usize;
    let mut removed: Set<SymbolId> = Set::new();
    let mut order: Vec<SymbolId> = Vec::new();
    let mut spilled: Set<SymbolId> = Set::new();

    let degree = |removed: &Set<SymbolId>, n: &SymbolId| -> usize {
        graph[n].iter().filter(|v| !removed.contains(v)).count()
    };

    let total = graph.len();
    while order.len() + spilled.len() < total {
        // Deterministic scan: lowest SymbolId with current degree < K.
        let candidate = graph
            .keys()
            .find(|n| !removed.contains(n) && !spilled.contains(n) && degree(&removed, n) < k)
            .copied();
        match candidate {
            Some(n) => {
                removed.insert(n);
                order.push(n);
            }
            None => {
                // No simplifiable node: spill the first remaining node in
                // SymbolId order.
                let victim = graph
                    .keys()
                    .find(|n| !removed.contains(n) && !spilled.contains(n))
                    .copied()
                    .expect("loop invariant guarantees a remaining node");
                trace!("spilling {victim:?}: no node with degree < {k}");
                spilled.insert(victim);
                removed.insert(victim);
            }
        }
    }

    let mut colors: Map<SymbolId, u8> = Map::new();
    for n in order.into_iter().rev() {
        let used: Set<u8> = graph[&n]
            .iter()
            .filter_map(|neighbor| colors.get(neighbor).copied())
            .collect();
        let color = (0..NUM_REGISTERS).find(|c| !used.contains(c)).expect(
            "a node simplified at degree < K always has a free color among its colored neighbors",
        );
        trace!("coloring {n:?} -> register {color}");
        colors.insert(n, color);
    }

    Allocation { colors }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sym(n: u32) -> SymbolId {
        SymbolId(n)
    }

    #[test]
    fn no_two_interfering_symbols_share_a_color() {
        let mut graph: Map<SymbolId, Set<SymbolId>> = Map::new();
        // A small clique of size 3: all pairwise interfere.
        for i in 0..3 {
            graph.entry(sym(i)).or_default();
        }
        for i in 0..3 {
            for j in 0..3 {
                if i != j {
                    graph.get_mut(&sym(i)).unwrap().insert(sym(j));
                }
            }
        }
        let alloc = allocate(&graph);
        let colors: Vec<u8> = (0..3).map(|i| alloc.register_of(sym(i)).unwrap()).collect();
        assert_ne!(colors[0], colors[1]);
        assert_ne!(colors[1], colors[2]);
        assert_ne!(colors[0], colors[2]);
    }

    #[test]
    fn more_than_k_simultaneously_live_forces_a_spill() {
        let mut graph: Map<SymbolId, Set<SymbolId>> = Map::new();
        let n = NUM_REGISTERS as u32 + 2;
        for i in 0..n {
            graph.entry(sym(i)).or_default();
        }
        for i in 0..n {
            for j in 0..n {
                if i != j {
                    graph.get_mut(&sym(i)).unwrap().insert(sym(j));
                }
            }
        }
        let alloc = allocate(&graph);
        let spilled = (0..n).filter(|i| alloc.is_spilled(sym(*i))).count();
        assert!(spilled >= 2);
    }

    #[test]
    fn disjoint_symbols_can_share_a_color() {
        let mut graph: Map<SymbolId, Set<SymbolId>> = Map::new();
        graph.entry(sym(0)).or_default();
        graph.entry(sym(1)).or_default();
        let alloc = allocate(&graph);
        assert_eq!(alloc.register_of(sym(0)), alloc.register_of(sym(1)));
    }
}
