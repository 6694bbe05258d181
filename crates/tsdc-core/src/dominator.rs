//! The dominator computation (Component E).
//!
//! A direct, hand-rolled implementation of the Cooper/Harvey/Kennedy "simple,
//! fast dominance" algorithm rather than a wrapper over `petgraph`'s
//! `dominators::simple_fast`: the iterative reduction pass downstream needs
//! the exact semantics this algorithm produces -- a reverse-postorder
//! numbering used for a two-finger common-dominator walk, and an entry node
//! that is self-dominated only during the fixpoint iteration and reset to
//! "no immediate dominator" once it converges.

use std::collections::{HashMap, HashSet, VecDeque};

use petgraph::stable_graph::NodeIndex;
use petgraph::Direction;

use crate::cfg::Cfg;
use crate::error::CoreError;

type Node = NodeIndex<u32>;

/// Immediate-dominator table for one CFG, plus the reverse-postorder
/// numbering the two-finger walk depends on.
#[derive(Debug)]
pub struct Dominators {
    idom: HashMap<Node, Node>,
    rpo_number: HashMap<Node, usize>,
    entry: Node,
}

impl Dominators {
    /// Computes dominators for every node reachable from `cfg`'s entry (the
    /// CFG builder already dropped anything unreachable, so that is every
    /// node in the graph).
    ///
    /// Fails with `CoreError::MissingDominator` if some non-entry node never
    /// picks up an immediate dominator -- this would mean the CFG builder's
    /// "every node reachable from entry" invariant was violated, since the
    /// fixpoint below always assigns one to a node with at least one already
    /// processed predecessor.
    pub fn compute(cfg: &Cfg) -> Result<Self, CoreError> {
        let entry = cfg.entry_index();
        let rpo = reverse_postorder(cfg, entry);
        let rpo_number: HashMap<Node, usize> =
            rpo.iter().enumerate().map(|(i, &n)| (n, i)).collect();

        // Entry is temporarily its own dominator so the intersection walk
        // below has a defined fixpoint to converge toward.
        let mut idom: HashMap<Node, Node> = HashMap::new();
        idom.insert(entry, entry);

        let mut changed = true;
        while changed {
            changed = false;
            for &b in rpo.iter().filter(|&&n| n != entry) {
                let preds: Vec<Node> = cfg
                    .graph()
                    .neighbors_directed(b, Direction::Incoming)
                    .collect();
                let mut processed = preds.iter().copied().filter(|p| idom.contains_key(p));
                let Some(first) = processed.next() else {
                    continue;
                };
                let mut new_idom = first;
                for p in processed {
                    new_idom = intersect(&idom, &rpo_number, new_idom, p);
                }
                if idom.get(&b) != Some(&new_idom) {
                    idom.insert(b, new_idom);
                    changed = true;
                }
            }
        }

        idom.remove(&entry);

        for &n in rpo.iter().filter(|&&n| n != entry) {
            if !idom.contains_key(&n) {
                return Err(CoreError::MissingDominator {
                    addr: cfg.block_at(n).addr,
                });
            }
        }

        Ok(Dominators {
            idom,
            rpo_number,
            entry,
        })
    }

    pub fn entry(&self) -> Node {
        self.entry
    }

    /// The immediate dominator of `n`, or `None` for the entry node.
    pub fn immediate_dominator(&self, n: Node) -> Option<Node> {
        self.idom.get(&n).copied()
    }

    /// `true` if `a` dominates `b`. With `strict == false`, a node is
    /// considered to dominate itself.
    pub fn dominates(&self, a: Node, b: Node, strict: bool) -> bool {
        if !strict && a == b {
            return true;
        }
        let mut cur = b;
        loop {
            match self.idom.get(&cur) {
                Some(&next) => {
                    if next == a {
                        return true;
                    }
                    if next == cur {
                        return false;
                    }
                    cur = next;
                }
                None => return false,
            }
        }
    }
}

/// The two-finger walk: climbs both candidates toward the root, at each step
/// advancing whichever has the larger reverse-postorder number, until they
/// meet.
fn intersect(
    idom: &HashMap<Node, Node>,
    rpo_number: &HashMap<Node, usize>,
    mut u: Node,
    mut v: Node,
) -> Node {
    while u != v {
        while rpo_number[&u] > rpo_number[&v] {
            u = idom[&u];
        }
        while rpo_number[&v] > rpo_number[&u] {
            v = idom[&v];
        }
    }
    u
}

fn reverse_postorder(cfg: &Cfg, entry: Node) -> Vec<Node> {
    let mut visited = HashSet::new();
    let mut postorder = Vec::new();
    // Iterative postorder DFS to avoid recursion depth limits on large CFGs.
    let mut stack: Vec<(Node, bool)> = vec![(entry, false)];
    while let Some((n, expanded)) = stack.pop() {
        if expanded {
            postorder.push(n);
            continue;
        }
        if !visited.insert(n) {
            continue;
        }
        stack.push((n, true));
        for succ in cfg.graph().neighbors(n) {
            if !visited.contains(&succ) {
                stack.push((succ, false));
            }
        }
    }
    postorder.reverse();
    postorder
}

/// A back edge: an edge whose head dominates its tail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackEdge {
    pub tail: Node,
    pub head: Node,
}

/// Finds every back edge in the CFG: edges `tail -> head` where `head`
/// dominates `tail`. Each back edge identifies a loop, with `head` as the
/// loop's header.
pub fn back_edges(cfg: &Cfg, doms: &Dominators) -> Vec<BackEdge> {
    let mut edges = Vec::new();
    for tail in cfg.graph().node_indices() {
        for head in cfg.graph().neighbors(tail) {
            if doms.dominates(head, tail, false) {
                edges.push(BackEdge { tail, head });
            }
        }
    }
    edges
}

/// The natural loop of a back edge: its header plus every node that can
/// reach the back edge's tail without passing through the header.
pub fn natural_loop(cfg: &Cfg, edge: &BackEdge) -> HashSet<Node> {
    let mut loop_nodes = HashSet::new();
    loop_nodes.insert(edge.head);
    loop_nodes.insert(edge.tail);

    let mut queue = VecDeque::new();
    if edge.tail != edge.head {
        queue.push_back(edge.tail);
    }
    while let Some(n) = queue.pop_front() {
        for pred in cfg.graph().neighbors_directed(n, Direction::Incoming) {
            if loop_nodes.insert(pred) {
                queue.push_back(pred);
            }
        }
    }
    loop_nodes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfg::build_cfgs;
    use crate::disassembler::disassemble;
    use crate::file_data::test_support::FakeFileData;

    fn raw(name: &str) -> u32 {
        const NAMES: &[&str] = &[
            "FuncDecl", "CreateObject", "AddObject", "EndObject", "Jmp", "JmpIf", "JmpIff",
            "JmpIfNot", "JmpIffNot", "JmpIfNp", "JmpIfNotNp", "Return",
        ];
        NAMES.iter().position(|n| *n == name).unwrap() as u32
    }

    #[test]
    fn diamond_if_else_dominator_tree() {
        // 0: JmpIfNot -> 3   (else branch)
        // 2: Return          (then branch)
        // 3: Return          (else branch)
        let file = FakeFileData::new(vec![
            raw("JmpIfNot"),
            3,
            raw("Return"),
            raw("Return"),
        ]);
        let d = disassemble(&file).unwrap();
        let cfgs = build_cfgs(&d).unwrap();
        let cfg = &cfgs[0];
        let doms = Dominators::compute(cfg).unwrap();

        let n0 = cfg.node_index(0).unwrap();
        let n2 = cfg.node_index(2).unwrap();
        let n3 = cfg.node_index(3).unwrap();

        assert_eq!(doms.immediate_dominator(n0), None);
        assert_eq!(doms.immediate_dominator(n2), Some(n0));
        assert_eq!(doms.immediate_dominator(n3), Some(n0));
        assert!(doms.dominates(n0, n2, true));
        assert!(doms.dominates(n0, n3, true));
        assert!(!doms.dominates(n2, n3, false));
    }

    #[test]
    fn back_edge_and_natural_loop_are_detected() {
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
        let cfg = &cfgs[0];
        let doms = Dominators::compute(cfg).unwrap();

        let header = cfg.node_index(0).unwrap();
        let body = cfg.node_index(2).unwrap();
        let exit = cfg.node_index(5).unwrap();

        let edges = back_edges(cfg, &doms);
        assert_eq!(edges, vec![BackEdge { tail: body, head: header }]);

        let loop_nodes = natural_loop(cfg, &edges[0]);
        assert!(loop_nodes.contains(&header));
        assert!(loop_nodes.contains(&body));
        assert!(!loop_nodes.contains(&exit));
    }
}
