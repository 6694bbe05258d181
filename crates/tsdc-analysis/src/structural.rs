//! The structural analyzer: collapses a region graph into a single
//! `VirtualRegion` tree via iterative acyclic/cyclic reduction, falling back
//! to goto synthesis when a pass makes no progress.

use std::collections::{HashMap, HashSet};

use tracing::{debug, trace};
use tsdc_core::{back_edges, BasicBlock, Cfg, Dominators, Op};

use crate::error::AnalysisError;
use crate::region::{
    existing_body_elements, push_flattened, FunctionHeader, RegionGraph, VirtualRegion,
};

/// Collapses `cfg` into its single root region.
pub fn analyze(cfg: &Cfg) -> Result<VirtualRegion, AnalysisError> {
    let doms = Dominators::compute(cfg)?;
    let edges = back_edges(cfg, &doms);

    let mut cycle_starts: HashSet<u32> = HashSet::new();
    let mut cycle_ends: HashSet<u32> = HashSet::new();
    let mut natural_loops: HashMap<u32, HashSet<u32>> = HashMap::new();
    for e in &edges {
        let head_addr = cfg.block_at(e.head).addr;
        let tail_addr = cfg.block_at(e.tail).addr;
        cycle_starts.insert(head_addr);
        cycle_ends.insert(tail_addr);
        let members: HashSet<u32> = tsdc_core::natural_loop(cfg, e)
            .into_iter()
            .map(|idx| cfg.block_at(idx).addr)
            .collect();
        natural_loops
            .entry(head_addr)
            .or_default()
            .extend(members);
    }

    let mut rg = RegionGraph::from_cfg(cfg);
    let mut vr: HashMap<u32, VirtualRegion> = HashMap::new();
    let mut unreduced_loops: Vec<u32> = Vec::new();

    // A node count of one is not by itself "done": a single block with a
    // self-loop (scenario: `Jmp 0`) still has an edge to collapse into a
    // `Loop` region, so the real terminus is "one node, no edges left."
    loop {
        let before = rg.node_count();
        let mut any_progress = false;
        for addr in rg.post_order_from_entry() {
            if !rg.contains(addr) {
                continue; // absorbed by an earlier step this same pass
            }
            if reduce_node(
                &mut rg,
                &mut vr,
                addr,
                &cycle_starts,
                &cycle_ends,
                &mut unreduced_loops,
            )? {
                any_progress = true;
            }
        }
        trace!(before, after = rg.node_count(), "reduction pass");

        if rg.node_count() == 1 && rg.successors(rg.entry_addr()).is_empty() {
            break;
        }

        if !any_progress {
            let drained = unreduced_loops.len();
            refine_unreduced_regions(
                &mut rg,
                &mut vr,
                &mut unreduced_loops,
                &natural_loops,
                &doms,
                cfg,
            )?;
            debug!(drained, "refinement pass ran");
        }
    }

    let entry_addr = rg.entry_addr();
    Ok(vr
        .remove(&entry_addr)
        .unwrap_or_else(|| VirtualRegion::Instruction(rg.block(entry_addr))))
}

fn reduce_node(
    rg: &mut RegionGraph,
    vr: &mut HashMap<u32, VirtualRegion>,
    addr: u32,
    cycle_starts: &HashSet<u32>,
    cycle_ends: &HashSet<u32>,
    unreduced_loops: &mut Vec<u32>,
) -> Result<bool, AnalysisError> {
    let mut any = false;
    loop {
        if !rg.contains(addr) {
            return Ok(any);
        }
        let succ_count = rg.successors(addr).len();
        if succ_count > 2 {
            return Err(tsdc_core::CoreError::TooManySuccessors {
                addr,
                count: succ_count,
            }
            .into());
        }

        let is_cycle_end = cycle_ends.contains(&addr);
        let mut progressed = if !is_cycle_end {
            acyclic_reduce(rg, vr, addr, cycle_ends)?
        } else {
            false
        };
        if !progressed && cycle_starts.contains(&addr) {
            progressed = cyclic_reduce(rg, vr, addr, unreduced_loops)?;
        }
        if !progressed {
            return Ok(any);
        }
        any = true;
    }
}

fn wrap_body(block: &BasicBlock, body: Vec<VirtualRegion>) -> VirtualRegion {
    if block.is_function {
        VirtualRegion::Function {
            header: FunctionHeader::from_block(block),
            body,
        }
    } else {
        VirtualRegion::Sequence(body)
    }
}

/// Takes the body elements of a branch arm being absorbed into a
/// `Conditional`: its existing virtual region, spliced if it's a `Sequence`,
/// or a fresh single-instruction leaf if reduction hasn't touched it yet.
fn take_body(rg: &RegionGraph, vr: &mut HashMap<u32, VirtualRegion>, addr: u32) -> Vec<VirtualRegion> {
    vr.remove(&addr)
        .map(|r| match r {
            VirtualRegion::Sequence(elems) => elems,
            other => vec![other],
        })
        .unwrap_or_else(|| vec![VirtualRegion::Instruction(rg.block(addr))])
}

fn acyclic_reduce(
    rg: &mut RegionGraph,
    vr: &mut HashMap<u32, VirtualRegion>,
    addr: u32,
    cycle_ends: &HashSet<u32>,
) -> Result<bool, AnalysisError> {
    let succs = rg.successors(addr);
    match succs.as_slice() {
        [] => Ok(false),
        [s] => {
            let s = *s;
            if rg.predecessors(s) != vec![addr] {
                return Ok(false);
            }
            let n_block = rg.block(addr);
            let s_block = rg.block(s);

            let mut body = existing_body_elements(vr.get(&addr), &n_block);
            let tail = if cycle_ends.contains(&s) {
                VirtualRegion::LoopFooter(s_block)
            } else {
                vr.remove(&s)
                    .unwrap_or_else(|| VirtualRegion::Instruction(s_block))
            };
            push_flattened(&mut body, tail);

            let new_region = wrap_body(&n_block, body);

            for s_succ in rg.successors(s) {
                rg.add_edge(addr, s_succ);
            }
            rg.remove_node(s);
            vr.insert(addr, new_region);
            Ok(true)
        }
        [a, b] => {
            let n_block = rg.block(addr);
            // Condition inversion follows the branch instruction: `JmpIfNot`/
            // `JmpIffNot` name the fall-through as "then"; `JmpIf`/`JmpIff`
            // name the branch target. `rg.successors` itself has no notion of
            // which edge is which, so it must be resolved here.
            let (t, e) = then_else_addrs(&n_block, &[*a, *b]);
            let t_succ = rg.successors(t);
            let e_succ = rg.successors(e);

            if t_succ == vec![e] && rg.predecessors(t) == vec![addr] {
                let then_body = take_body(rg, vr, t);
                vr.insert(
                    addr,
                    VirtualRegion::Conditional {
                        head_block: n_block,
                        then_body,
                        else_body: Vec::new(),
                    },
                );
                rg.remove_edge(addr, t);
                rg.remove_edge(t, e);
                rg.remove_node(t);
                return Ok(true);
            }

            if !e_succ.is_empty()
                && t_succ == e_succ
                && rg.predecessors(t) == vec![addr]
                && rg.predecessors(e) == vec![addr]
            {
                let join = e_succ[0];
                let then_body = take_body(rg, vr, t);
                let else_body = take_body(rg, vr, e);
                vr.insert(
                    addr,
                    VirtualRegion::Conditional {
                        head_block: n_block,
                        then_body,
                        else_body,
                    },
                );
                rg.remove_edge(addr, t);
                rg.remove_edge(addr, e);
                rg.remove_edge(t, join);
                rg.remove_edge(e, join);
                rg.add_edge(addr, join);
                rg.remove_node(t);
                rg.remove_node(e);
                return Ok(true);
            }

            // Both arms terminal (e.g. `if (cond) { return A; } else { return
            // B; }`) -- there is no shared join block for either of the
            // cases above to find, but the conditional still collapses: it
            // just leaves `addr` with no remaining successors of its own.
            if t_succ.is_empty()
                && e_succ.is_empty()
                && rg.predecessors(t) == vec![addr]
                && rg.predecessors(e) == vec![addr]
            {
                let then_body = take_body(rg, vr, t);
                let else_body = take_body(rg, vr, e);
                vr.insert(
                    addr,
                    VirtualRegion::Conditional {
                        head_block: n_block,
                        then_body,
                        else_body,
                    },
                );
                rg.remove_edge(addr, t);
                rg.remove_edge(addr, e);
                rg.remove_node(t);
                rg.remove_node(e);
                return Ok(true);
            }

            Ok(false)
        }
        _ => unreachable!("successor count already checked"),
    }
}

fn cyclic_reduce(
    rg: &mut RegionGraph,
    vr: &mut HashMap<u32, VirtualRegion>,
    addr: u32,
    unreduced_loops: &mut Vec<u32>,
) -> Result<bool, AnalysisError> {
    let succs = rg.successors(addr);
    for &s in &succs {
        let is_match = if s == addr {
            true
        } else {
            rg.successors(s) == vec![addr] && rg.predecessors(s) == vec![addr]
        };
        if !is_match {
            continue;
        }

        let branch_block = rg.block(s);
        if !branch_block.last().is_branch() {
            return Err(tsdc_core::CoreError::CyclicBlockNotBranch { addr: s }.into());
        }
        // Whether the loop has any way out: once the back edge between `n`
        // and `s` is cut, a node with no remaining successors is an
        // unconditional loop; one that still has an edge elsewhere (the
        // head's own exit test, in the common while-loop shape) is not.
        let infinite = rg.successors(addr).iter().all(|&x| x == s);

        let n_block = rg.block(addr);
        let mut body = vec![vr
            .remove(&addr)
            .unwrap_or_else(|| VirtualRegion::Instruction(n_block.clone()))];
        if s != addr {
            body.push(
                vr.remove(&s)
                    .unwrap_or_else(|| VirtualRegion::Instruction(branch_block.clone())),
            );
        }

        rg.remove_edge(addr, s);
        if s != addr {
            rg.remove_edge(s, addr);
            rg.remove_node(s);
        }

        vr.insert(addr, VirtualRegion::Loop { infinite, body });
        return Ok(true);
    }

    unreduced_loops.push(addr);
    Ok(false)
}

fn refine_unreduced_regions(
    rg: &mut RegionGraph,
    vr: &mut HashMap<u32, VirtualRegion>,
    unreduced_loops: &mut Vec<u32>,
    natural_loops: &HashMap<u32, HashSet<u32>>,
    doms: &Dominators,
    cfg: &Cfg,
) -> Result<(), AnalysisError> {
    let mut progress = false;
    let mut heads: Vec<u32> = unreduced_loops.drain(..).collect();
    heads.sort_unstable();
    heads.dedup();

    for head in heads {
        if !rg.contains(head) {
            continue;
        }
        let Some(members_all) = natural_loops.get(&head) else {
            continue;
        };
        let members: HashSet<u32> = members_all.iter().copied().filter(|a| rg.contains(*a)).collect();
        if members.len() <= 1 {
            continue;
        }

        let true_head = *members
            .iter()
            .max_by_key(|&&m| {
                rg.predecessors(m)
                    .into_iter()
                    .filter(|p| !members.contains(p))
                    .count()
            })
            .expect("non-empty member set");

        for &m in &members {
            if m == true_head {
                continue;
            }
            let preds = rg.predecessors(m);
            for p in preds {
                if members.contains(&p) {
                    continue;
                }
                let p_block = rg.block(p);
                let mut body = existing_body_elements(vr.get(&p), &p_block);
                push_flattened(&mut body, VirtualRegion::Goto { target_addr: m });
                vr.insert(p, wrap_body(&p_block, body));
                rg.remove_edge(p, m);
                progress = true;
            }
        }
    }

    // Tail-successor folding (structural analyzer refinement step 2) is a
    // known-incomplete hook upstream; left unimplemented here too, so it
    // always reports no progress and refinement falls through to the
    // last-resort cut below.

    if !progress {
        last_resort(rg, vr, doms, cfg)?;
    }

    Ok(())
}

fn last_resort(
    rg: &mut RegionGraph,
    vr: &mut HashMap<u32, VirtualRegion>,
    doms: &Dominators,
    cfg: &Cfg,
) -> Result<(), AnalysisError> {
    let mut addrs: Vec<u32> = rg.post_order_from_entry();
    addrs.sort_unstable();

    for addr in addrs {
        let succs = rg.successors(addr);
        let block = rg.block(addr);

        if succs.len() == 1 {
            let s = succs[0];
            if !has_dominance(doms, cfg, addr, s) {
                let mut body = existing_body_elements(vr.get(&addr), &block);
                push_flattened(&mut body, VirtualRegion::Goto { target_addr: s });
                vr.insert(addr, wrap_body(&block, body));
                rg.remove_edge(addr, s);
                return Ok(());
            }
        } else if succs.len() == 2 {
            let (_then_addr, else_addr) = then_else_addrs(&block, &succs);
            if !has_dominance(doms, cfg, addr, else_addr) {
                vr.insert(
                    addr,
                    VirtualRegion::ConditionalGoto {
                        head_block: block,
                        target_addr: else_addr,
                    },
                );
                rg.remove_edge(addr, else_addr);
                return Ok(());
            }
        }
    }

    unreachable!("last-resort refinement found no eligible cut")
}

fn has_dominance(doms: &Dominators, cfg: &Cfg, a: u32, b: u32) -> bool {
    match (cfg.node_index(a), cfg.node_index(b)) {
        (Some(na), Some(nb)) => doms.dominates(na, nb, false) || doms.dominates(nb, na, false),
        _ => false,
    }
}

fn then_else_addrs(block: &BasicBlock, succs: &[u32]) -> (u32, u32) {
    match &block.last().op {
        Op::Branch { target_addr, kind } => {
            let fallthrough = succs.iter().copied().find(|a| a != target_addr).unwrap_or(*target_addr);
            if kind.inverts_condition() {
                (fallthrough, *target_addr)
            } else {
                (*target_addr, fallthrough)
            }
        }
        _ => (succs[0], succs[1]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tsdc_core::{build_cfgs, disassemble};
    use tsdc_core::file_data::test_support::FakeFileData;

    fn raw(name: &str) -> u32 {
        const NAMES: &[&str] = &[
            "FuncDecl", "CreateObject", "AddObject", "EndObject", "Jmp", "JmpIf", "JmpIff",
            "JmpIfNot", "JmpIffNot", "JmpIfNp", "JmpIfNotNp", "Return",
        ];
        NAMES.iter().position(|n| *n == name).unwrap() as u32
    }

    #[test]
    fn self_loop_becomes_infinite_loop() {
        let file = FakeFileData::new(vec![raw("Jmp"), 0]);
        let d = disassemble(&file).unwrap();
        let cfgs = build_cfgs(&d).unwrap();
        let region = analyze(&cfgs[0]).unwrap();
        match region {
            VirtualRegion::Loop { infinite, body } => {
                assert!(infinite);
                assert_eq!(body.len(), 1);
            }
            other => panic!("expected Loop, got {other:?}"),
        }
    }

    #[test]
    fn if_then_else_both_arms_terminal_becomes_conditional() {
        // 0: JmpIfNot -> 3   (both arms return, no shared join block)
        // 2: Return
        // 3: Return
        let file = FakeFileData::new(vec![raw("JmpIfNot"), 3, raw("Return"), raw("Return")]);
        let d = disassemble(&file).unwrap();
        let cfgs = build_cfgs(&d).unwrap();
        let region = analyze(&cfgs[0]).unwrap();
        match region {
            VirtualRegion::Conditional { then_body, else_body, .. } => {
                assert_eq!(then_body.len(), 1);
                assert_eq!(else_body.len(), 1);
            }
            other => panic!("expected Conditional, got {other:?}"),
        }
    }

    #[test]
    fn if_then_with_genuine_empty_else_joins_back() {
        // 0: JmpIfNot -> 3   (else falls straight through to the join)
        // 2: Push            (then body)
        // 3: Return          (join)
        let file = FakeFileData::new(vec![raw("JmpIfNot"), 3, 63, raw("Return")]);
        let d = disassemble(&file).unwrap();
        let cfgs = build_cfgs(&d).unwrap();
        let region = analyze(&cfgs[0]).unwrap();
        match region {
            VirtualRegion::Sequence(elems) => {
                assert_eq!(elems.len(), 2);
                match &elems[0] {
                    VirtualRegion::Conditional { then_body, else_body, .. } => {
                        assert_eq!(then_body.len(), 1);
                        assert!(else_body.is_empty());
                    }
                    other => panic!("expected Conditional, got {other:?}"),
                }
            }
            other => panic!("expected Sequence, got {other:?}"),
        }
    }

    #[test]
    fn jmp_if_non_inverting_assigns_then_to_branch_target() {
        // 0: JmpIf -> 3      (JmpIf does not invert: the branch target is "then")
        // 2: Return          (else, fall-through)
        // 3: Return          (then, branch target)
        let file = FakeFileData::new(vec![raw("JmpIf"), 3, raw("Return"), raw("Return")]);
        let d = disassemble(&file).unwrap();
        let cfgs = build_cfgs(&d).unwrap();
        let region = analyze(&cfgs[0]).unwrap();
        match region {
            VirtualRegion::Conditional { head_block, then_body, else_body } => {
                match &then_body[0] {
                    VirtualRegion::Instruction(b) => assert_eq!(b.addr, 3),
                    other => panic!("expected Instruction, got {other:?}"),
                }
                match &else_body[0] {
                    VirtualRegion::Instruction(b) => assert_eq!(b.addr, 2),
                    other => panic!("expected Instruction, got {other:?}"),
                }
                let _ = head_block;
            }
            other => panic!("expected Conditional, got {other:?}"),
        }
    }

    #[test]
    fn while_loop_with_exit_collapses_fully() {
        // 0: JmpIfNot -> 5   (loop exit test)
        // 2: Push            (loop body)
        // 3: Jmp -> 0        (back edge)
        // 5: Return          (loop exit)
        let file = FakeFileData::new(vec![
            raw("JmpIfNot"),
            5,
            63, // Push
            raw("Jmp"),
            0,
            raw("Return"),
        ]);
        let d = disassemble(&file).unwrap();
        let cfgs = build_cfgs(&d).unwrap();
        let region = analyze(&cfgs[0]).unwrap();
        match region {
            VirtualRegion::Sequence(elems) => {
                assert!(matches!(elems[0], VirtualRegion::Loop { infinite: false, .. }));
            }
            other => panic!("expected Sequence, got {other:?}"),
        }
    }
}
