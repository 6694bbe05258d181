//! The CFG builder.
//!
//! Splits an instruction region into basic blocks at leader boundaries and
//! builds a directed graph keyed by block address. One CFG is built for the
//! main script body and one for each function body.
//! Graph storage uses `petgraph`'s `StableGraph` keyed through an
//! address-to-`NodeIndex` side table.

use std::collections::{HashMap, HashSet, VecDeque};

use petgraph::stable_graph::{NodeIndex, StableGraph};
use petgraph::Directed;

use crate::disassembler::Disassembly;
use crate::error::CoreError;
use crate::instruction::{Instruction, Op};
use crate::opcode::BranchKind;

/// A maximal straight-line run of instructions with a single entry and exit.
#[derive(Debug, Clone, PartialEq)]
pub struct BasicBlock {
    /// Address of this block's first (leader) instruction -- the block's key.
    pub addr: u32,
    /// The block's instructions, in address order.
    pub instructions: Vec<Instruction>,
    /// `true` if this block's leader instruction is a `FunctionDecl` with a
    /// body -- the block that opens a function's CFG.
    pub is_function: bool,
}

impl BasicBlock {
    pub fn last(&self) -> &Instruction {
        self.instructions
            .last()
            .expect("basic block invariant: never empty")
    }

    /// The `FunctionDecl` operands, if this block is a function header.
    pub fn func_header(&self) -> Option<&Op> {
        if self.is_function {
            Some(&self.instructions[0].op)
        } else {
            None
        }
    }
}

/// One control-flow graph: the main script body, or one function's body.
#[derive(Debug)]
pub struct Cfg {
    graph: StableGraph<BasicBlock, (), Directed, u32>,
    addr_to_node: HashMap<u32, NodeIndex<u32>>,
    entry: NodeIndex<u32>,
}

impl Cfg {
    pub fn entry_addr(&self) -> u32 {
        self.graph[self.entry].addr
    }

    pub fn entry_index(&self) -> NodeIndex<u32> {
        self.entry
    }

    pub fn block(&self, addr: u32) -> Option<&BasicBlock> {
        self.addr_to_node.get(&addr).map(|&i| &self.graph[i])
    }

    pub fn node_index(&self, addr: u32) -> Option<NodeIndex<u32>> {
        self.addr_to_node.get(&addr).copied()
    }

    pub fn block_at(&self, idx: NodeIndex<u32>) -> &BasicBlock {
        &self.graph[idx]
    }

    pub fn successors(&self, addr: u32) -> Vec<u32> {
        let Some(&idx) = self.addr_to_node.get(&addr) else {
            return Vec::new();
        };
        self.graph
            .neighbors(idx)
            .map(|n| self.graph[n].addr)
            .collect()
    }

    pub fn predecessors(&self, addr: u32) -> Vec<u32> {
        let Some(&idx) = self.addr_to_node.get(&addr) else {
            return Vec::new();
        };
        self.graph
            .neighbors_directed(idx, petgraph::Direction::Incoming)
            .map(|n| self.graph[n].addr)
            .collect()
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn addrs(&self) -> impl Iterator<Item = u32> + '_ {
        self.graph.node_indices().map(move |i| self.graph[i].addr)
    }

    pub(crate) fn graph(&self) -> &StableGraph<BasicBlock, (), Directed, u32> {
        &self.graph
    }
}

/// Builds one CFG for the main script body (if non-empty) and one CFG per
/// function with a body, skipping over function spans when assembling the
/// main script's instruction sequence: functions are interleaved with
/// top-level code in the DSO's linear layout, but form their own
/// independent regions.
pub fn build_cfgs(disasm: &Disassembly) -> Result<Vec<Cfg>, CoreError> {
    let mut function_spans: Vec<(u32, u32)> = Vec::new();
    for i in disasm.iter() {
        if let Op::FunctionDecl {
            has_body: true,
            end_addr,
            ..
        } = &i.op
        {
            function_spans.push((i.addr, *end_addr));
        }
    }

    let in_function_span = |addr: u32| -> bool {
        function_spans
            .iter()
            .any(|(start, end)| addr >= *start && addr < *end)
    };

    let mut cfgs = Vec::new();

    let main_addrs: Vec<u32> = disasm
        .iter()
        .map(|i| i.addr)
        .filter(|a| !in_function_span(*a))
        .collect();
    if !main_addrs.is_empty() {
        cfgs.push(build_region_cfg(disasm, &main_addrs)?);
    }

    for (start, end) in &function_spans {
        let addrs: Vec<u32> = disasm
            .iter()
            .map(|i| i.addr)
            .filter(|a| *a >= *start && *a < *end)
            .collect();
        if !addrs.is_empty() {
            cfgs.push(build_region_cfg(disasm, &addrs)?);
        }
    }

    Ok(cfgs)
}

fn build_region_cfg(disasm: &Disassembly, addrs: &[u32]) -> Result<Cfg, CoreError> {
    let in_region: HashSet<u32> = addrs.iter().copied().collect();

    // Leader detection: entry, branch targets, and the
    // instruction right after a branch/return/function-decl boundary.
    let mut leaders: HashSet<u32> = HashSet::new();
    leaders.insert(addrs[0]);
    for (pos, &addr) in addrs.iter().enumerate() {
        let instr = disasm.get(addr).expect("address came from disassembly");
        if instr.is_branch_target {
            leaders.insert(addr);
        }
        if pos > 0 {
            let prev = disasm.get(addrs[pos - 1]).unwrap();
            if prev.is_branch() || prev.is_return() || prev.is_func_decl() {
                leaders.insert(addr);
            }
        }
    }

    // Partition into blocks by walking addrs and cutting at each leader.
    let mut blocks: Vec<Vec<u32>> = Vec::new();
    let mut current: Vec<u32> = Vec::new();
    for &addr in addrs {
        if leaders.contains(&addr) && !current.is_empty() {
            blocks.push(std::mem::take(&mut current));
        }
        current.push(addr);
    }
    if !current.is_empty() {
        blocks.push(current);
    }

    let mut graph = StableGraph::<BasicBlock, (), Directed, u32>::default();
    let mut addr_to_node = HashMap::new();
    let mut addr_to_next: HashMap<u32, u32> = HashMap::new();
    for w in addrs.windows(2) {
        addr_to_next.insert(w[0], w[1]);
    }

    for block_addrs in &blocks {
        let leader = block_addrs[0];
        let instructions: Vec<Instruction> = block_addrs
            .iter()
            .map(|a| disasm.get(*a).unwrap().clone())
            .collect();
        let is_function = instructions[0].is_func_decl();
        let idx = graph.add_node(BasicBlock {
            addr: leader,
            instructions,
            is_function,
        });
        addr_to_node.insert(leader, idx);
    }

    // Map any address to the block leader that contains it.
    let mut addr_to_leader: HashMap<u32, u32> = HashMap::new();
    for block_addrs in &blocks {
        let leader = block_addrs[0];
        for &a in block_addrs {
            addr_to_leader.insert(a, leader);
        }
    }

    for block_addrs in &blocks {
        let leader = block_addrs[0];
        let last_addr = *block_addrs.last().unwrap();
        let last = disasm.get(last_addr).unwrap();
        let from_idx = addr_to_node[&leader];

        let fallthrough = addr_to_next.get(&last_addr).copied();

        match &last.op {
            Op::Branch { target_addr, kind } => {
                if !in_region.contains(target_addr) {
                    return Err(CoreError::InvalidBranchTarget {
                        offset: last_addr,
                        target: *target_addr,
                    });
                }
                let target_leader = addr_to_leader[target_addr];
                graph.add_edge(from_idx, addr_to_node[&target_leader], ());
                if !matches!(kind, BranchKind::Jmp) {
                    if let Some(ft) = fallthrough {
                        let ft_leader = addr_to_leader[&ft];
                        graph.add_edge(from_idx, addr_to_node[&ft_leader], ());
                    }
                }
            }
            Op::Return { .. } => {}
            _ => {
                if let Some(ft) = fallthrough {
                    let ft_leader = addr_to_leader[&ft];
                    graph.add_edge(from_idx, addr_to_node[&ft_leader], ());
                }
            }
        }
    }

    let entry = addr_to_node[&addrs[0]];
    drop_unreachable(&mut graph, &mut addr_to_node, entry);

    Ok(Cfg {
        graph,
        addr_to_node,
        entry,
    })
}

/// Every node in a CFG must be reachable from the entry. Any block not
/// reached by a forward walk from the entry is dropped.
fn drop_unreachable(
    graph: &mut StableGraph<BasicBlock, (), Directed, u32>,
    addr_to_node: &mut HashMap<u32, NodeIndex<u32>>,
    entry: NodeIndex<u32>,
) {
    let mut reachable = HashSet::new();
    let mut queue = VecDeque::new();
    queue.push_back(entry);
    reachable.insert(entry);
    while let Some(n) = queue.pop_front() {
        for succ in graph.neighbors(n) {
            if reachable.insert(succ) {
                queue.push_back(succ);
            }
        }
    }

    let to_remove: Vec<NodeIndex<u32>> = graph
        .node_indices()
        .filter(|n| !reachable.contains(n))
        .collect();
    for n in to_remove {
        let addr = graph[n].addr;
        graph.remove_node(n);
        addr_to_node.remove(&addr);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disassembler::disassemble;
    use crate::file_data::test_support::FakeFileData;

    // Re-derive raw tag words locally to avoid depending on the
    // disassembler's private RawTag from this integration-style test.
    fn raw(name: &str) -> u32 {
        const NAMES: &[&str] = &[
            "FuncDecl", "CreateObject", "AddObject", "EndObject", "Jmp", "JmpIf", "JmpIff",
            "JmpIfNot", "JmpIffNot", "JmpIfNp", "JmpIfNotNp", "Return",
        ];
        NAMES.iter().position(|n| *n == name).unwrap() as u32
    }

    #[test]
    fn empty_disassembly_yields_no_cfgs() {
        let file = FakeFileData::new(vec![]);
        let d = disassemble(&file).unwrap();
        let cfgs = build_cfgs(&d).unwrap();
        assert!(cfgs.is_empty());
    }

    #[test]
    fn self_loop_jmp_is_one_block_with_self_edge() {
        // Jmp 0 -- a single instruction that jumps to itself.
        let file = FakeFileData::new(vec![raw("Jmp"), 0]);
        let d = disassemble(&file).unwrap();
        let cfgs = build_cfgs(&d).unwrap();
        assert_eq!(cfgs.len(), 1);
        let cfg = &cfgs[0];
        assert_eq!(cfg.node_count(), 1);
        assert_eq!(cfg.successors(0), vec![0]);
    }

    #[test]
    fn if_then_splits_into_three_blocks() {
        // 0: JmpIfNot -> 3   (fallthrough to 2, target to 3)
        // 2: Return
        // 3: Return
        let file = FakeFileData::new(vec![
            raw("JmpIfNot"),
            3,
            raw("Return"),
            raw("Return"),
        ]);
        let d = disassemble(&file).unwrap();
        let cfgs = build_cfgs(&d).unwrap();
        assert_eq!(cfgs.len(), 1);
        let cfg = &cfgs[0];
        assert_eq!(cfg.node_count(), 3);
        let mut succs = cfg.successors(0);
        succs.sort();
        assert_eq!(succs, vec![2, 3]);
        assert!(cfg.successors(2).is_empty());
        assert!(cfg.successors(3).is_empty());
    }

    #[test]
    fn unreachable_block_is_dropped() {
        // 0: Jmp 4   (2 words: opcode + target)
        // 2: Return  (unreachable -- nothing jumps here, and instr 0's
        //             unconditional jump skips straight over it)
        // 3: Return  (also unreachable)
        // 4: Return  (the jump target)
        let file = FakeFileData::new(vec![
            raw("Jmp"),
            4,
            raw("Return"),
            raw("Return"),
            raw("Return"),
        ]);
        let d = disassemble(&file).unwrap();
        let cfgs = build_cfgs(&d).unwrap();
        let cfg = &cfgs[0];
        // Blocks starting at 2 and 3 are unreachable and must be dropped.
        assert!(cfg.block(2).is_none());
        assert!(cfg.block(3).is_none());
        assert!(cfg.block(4).is_some());
    }
}
