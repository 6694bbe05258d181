//! The region graph and the virtual region tree it collapses into.

use std::collections::HashMap;
use std::rc::Rc;

use petgraph::stable_graph::{NodeIndex, StableGraph};
use petgraph::{Directed, Direction};

use tsdc_core::{BasicBlock, Cfg, Ident, Op};

/// A node in the mutable region graph: one reference to a CFG block, keyed
/// by that block's address. The region graph starts as a 1:1 copy of a
/// `Cfg` and shrinks as the structural analyzer collapses it.
#[derive(Debug, Clone)]
pub struct RegionNode {
    pub addr: u32,
    pub block: Rc<BasicBlock>,
}

/// Mutable mirror of a `Cfg`, built once per analysis run and discarded once
/// it collapses to a single node.
#[derive(Debug)]
pub struct RegionGraph {
    graph: StableGraph<RegionNode, (), Directed, u32>,
    addr_to_node: HashMap<u32, NodeIndex<u32>>,
    entry: NodeIndex<u32>,
}

impl RegionGraph {
    pub fn from_cfg(cfg: &Cfg) -> Self {
        let mut graph = StableGraph::<RegionNode, (), Directed, u32>::default();
        let mut addr_to_node = HashMap::new();
        let mut old_to_new: HashMap<NodeIndex<u32>, NodeIndex<u32>> = HashMap::new();

        for old_idx in cfg.graph().node_indices() {
            let block = cfg.block_at(old_idx).clone();
            let addr = block.addr;
            let new_idx = graph.add_node(RegionNode {
                addr,
                block: Rc::new(block),
            });
            addr_to_node.insert(addr, new_idx);
            old_to_new.insert(old_idx, new_idx);
        }
        for old_idx in cfg.graph().node_indices() {
            for succ in cfg.graph().neighbors(old_idx) {
                graph.add_edge(old_to_new[&old_idx], old_to_new[&succ], ());
            }
        }

        let entry = old_to_new[&cfg.entry_index()];
        RegionGraph {
            graph,
            addr_to_node,
            entry,
        }
    }

    pub fn entry_addr(&self) -> u32 {
        self.graph[self.entry].addr
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn contains(&self, addr: u32) -> bool {
        self.addr_to_node.contains_key(&addr)
    }

    pub fn block(&self, addr: u32) -> Rc<BasicBlock> {
        let idx = self.addr_to_node[&addr];
        self.graph[idx].block.clone()
    }

    pub fn successors(&self, addr: u32) -> Vec<u32> {
        let idx = self.addr_to_node[&addr];
        self.graph.neighbors(idx).map(|n| self.graph[n].addr).collect()
    }

    pub fn predecessors(&self, addr: u32) -> Vec<u32> {
        let idx = self.addr_to_node[&addr];
        self.graph
            .neighbors_directed(idx, Direction::Incoming)
            .map(|n| self.graph[n].addr)
            .collect()
    }

    pub fn add_edge(&mut self, from: u32, to: u32) {
        let f = self.addr_to_node[&from];
        let t = self.addr_to_node[&to];
        self.graph.update_edge(f, t, ());
    }

    pub fn remove_edge(&mut self, from: u32, to: u32) {
        let f = self.addr_to_node[&from];
        let t = self.addr_to_node[&to];
        if let Some(e) = self.graph.find_edge(f, t) {
            self.graph.remove_edge(e);
        }
    }

    /// Removes a node and every edge touching it. Callers must have already
    /// redirected whatever edges should survive.
    pub fn remove_node(&mut self, addr: u32) {
        if let Some(idx) = self.addr_to_node.remove(&addr) {
            self.graph.remove_node(idx);
        }
    }

    /// Addresses of every live node, in post-order DFS from the entry. The
    /// structural analyzer re-derives this at the start of every pass since
    /// reduction steps change the graph shape.
    pub fn post_order_from_entry(&self) -> Vec<u32> {
        let mut visited = std::collections::HashSet::new();
        let mut order = Vec::new();
        let mut stack: Vec<(NodeIndex<u32>, bool)> = vec![(self.entry, false)];
        while let Some((n, expanded)) = stack.pop() {
            if expanded {
                order.push(self.graph[n].addr);
                continue;
            }
            if !visited.insert(n) {
                continue;
            }
            stack.push((n, true));
            for succ in self.graph.neighbors(n) {
                if !visited.contains(&succ) {
                    stack.push((succ, false));
                }
            }
        }
        order
    }
}

/// Header metadata for a `Function` region, lifted from the `FunctionDecl`
/// instruction that opens the function's entry block.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionHeader {
    pub name: Ident,
    pub namespace: Ident,
    pub package: Ident,
    pub args: Vec<Ident>,
}

impl FunctionHeader {
    pub fn from_block(block: &BasicBlock) -> Self {
        match &block.instructions[0].op {
            Op::FunctionDecl {
                name,
                namespace,
                package,
                args,
                ..
            } => FunctionHeader {
                name: name.clone(),
                namespace: namespace.clone(),
                package: package.clone(),
                args: args.clone(),
            },
            other => panic!("FunctionHeader::from_block called on non-FunctionDecl block: {other:?}"),
        }
    }
}

/// One node of the structured tree the analyzer collapses the region graph
/// into.
#[derive(Debug, Clone, PartialEq)]
pub enum VirtualRegion {
    Instruction(Rc<BasicBlock>),
    LoopFooter(Rc<BasicBlock>),
    Sequence(Vec<VirtualRegion>),
    Function {
        header: FunctionHeader,
        body: Vec<VirtualRegion>,
    },
    Conditional {
        head_block: Rc<BasicBlock>,
        then_body: Vec<VirtualRegion>,
        else_body: Vec<VirtualRegion>,
    },
    Loop {
        infinite: bool,
        body: Vec<VirtualRegion>,
    },
    ConditionalGoto {
        head_block: Rc<BasicBlock>,
        target_addr: u32,
    },
    Goto {
        target_addr: u32,
    },
    Break,
    Continue,
}

/// Appends `region` to `body`, splicing its elements in directly if it is
/// itself a `Sequence` -- a `Sequence` never directly contains another
/// `Sequence`.
pub fn push_flattened(body: &mut Vec<VirtualRegion>, region: VirtualRegion) {
    match region {
        VirtualRegion::Sequence(elems) => body.extend(elems),
        other => body.push(other),
    }
}

/// The starting body elements for growing `n`'s region across repeated
/// sequence-reduction steps: if `n` already holds a `Function` or
/// `Sequence`, its body is reused (and extended) rather than re-wrapped, so
/// a function absorbing its third, fourth, ... block never nests inside
/// itself.
pub fn existing_body_elements(
    vr: Option<&VirtualRegion>,
    fallback_block: &Rc<BasicBlock>,
) -> Vec<VirtualRegion> {
    match vr {
        None => vec![VirtualRegion::Instruction(fallback_block.clone())],
        Some(VirtualRegion::Function { body, .. }) => body.clone(),
        Some(VirtualRegion::Sequence(elems)) => elems.clone(),
        Some(other) => vec![other.clone()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_flattened_splices_sequences() {
        let mut body = vec![VirtualRegion::Break];
        push_flattened(
            &mut body,
            VirtualRegion::Sequence(vec![VirtualRegion::Continue, VirtualRegion::Break]),
        );
        assert_eq!(
            body,
            vec![VirtualRegion::Break, VirtualRegion::Continue, VirtualRegion::Break]
        );
    }

    #[test]
    fn push_flattened_keeps_non_sequences_whole() {
        let mut body = vec![VirtualRegion::Break];
        push_flattened(&mut body, VirtualRegion::Continue);
        assert_eq!(body, vec![VirtualRegion::Break, VirtualRegion::Continue]);
    }
}
