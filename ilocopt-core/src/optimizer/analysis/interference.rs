//! Interference graph and graph colouring.
//!
//! One node per live range, an edge between every pair of simultaneously
//! live ranges. Construction walks each block backward from the
//! live-variable out-set; formal-argument ranges are seeded live across
//! every block (they are call-by-reference) until they have been spilled,
//! and all formal-argument ranges mutually interfere.
//!
//! Colouring is Chaitin-Briggs colour-or-spill: peel low-degree nodes onto
//! a stack, falling back to the cheapest node by `uses / degree` when none
//! has low degree, then pop and colour. Colours `0..4` are reserved for
//! `%vr0..%vr3`; everything else colours from `4..k`.

use std::collections::{BTreeMap, BTreeSet};

use log::{debug, trace};

use super::live_ranges::LiveRanges;
use super::liveness::{LiveVariables, SsaKey};
use crate::optimizer::error::{OptimizerError, Result};
use crate::optimizer::ir::{Procedure, SsaInfo};

/// Total palette size.
pub const NUM_COLORS: u8 = 8;
/// Colours reserved for the four special registers.
pub const RESERVED_COLORS: u8 = 4;

/// One live range in the graph.
#[derive(Debug, Clone)]
pub struct InterferenceNode {
    pub name: String,
    /// Total use-site count over every value in the range.
    pub uses: usize,
    /// Set once the range has been spilled in a previous iteration;
    /// re-spilling it would loop forever.
    pub infinite_cost: bool,
    /// Colour pinned by a reserved register in the range, if any.
    pub forced_color: Option<u8>,
    pub color: Option<u8>,
    pub edges: BTreeSet<String>,
}

impl InterferenceNode {
    pub fn degree(&self) -> usize {
        self.edges.len()
    }

    pub fn spill_cost(&self) -> f64 {
        if self.infinite_cost || self.degree() == 0 {
            f64::INFINITY
        } else {
            self.uses as f64 / self.degree() as f64
        }
    }
}

/// The interference graph of one procedure.
#[derive(Debug, Clone, Default)]
pub struct InterferenceGraph {
    nodes: BTreeMap<String, InterferenceNode>,
}

impl InterferenceGraph {
    /// Build the graph from live ranges and SSA-aware liveness.
    /// `spilled` names the ranges already rewritten by a previous spill
    /// iteration.
    pub fn build(
        proc: &Procedure,
        ranges: &LiveRanges,
        liveness: &LiveVariables<SsaKey>,
        info: &SsaInfo,
        spilled: &BTreeSet<String>,
    ) -> Result<Self> {
        let mut graph = InterferenceGraph::default();

        for range in ranges.iter() {
            graph.add_node(InterferenceNode {
                name: range.name.clone(),
                uses: range.use_count(info),
                infinite_cost: spilled.contains(&range.name),
                forced_color: range.reserved_color(),
                color: None,
                edges: BTreeSet::new(),
            });
        }

        // unspilled formal arguments are implicitly live everywhere
        let mut argument_ranges: Vec<String> = Vec::new();
        for arg in &proc.frame.arguments {
            let range = ranges.range_of_value(arg)?;
            argument_ranges.push(range.name.clone());
        }

        for block in proc.ordered_blocks() {
            let out = &liveness
                .block_sets(proc.name(), &block.debug_name)?
                .out_set;

            let mut live: BTreeSet<String> = BTreeSet::new();
            for value in out.values() {
                if let Ok(range) = ranges.range_of_value(value) {
                    live.insert(range.name.clone());
                }
            }
            for name in &argument_ranges {
                if !spilled.contains(name) {
                    live.insert(name.clone());
                }
            }

            for inst in block.instructions.iter().rev() {
                if inst.is_deleted() {
                    continue;
                }
                for lval in &inst.operation.lvalues {
                    if !lval.is_virtual_reg() {
                        continue;
                    }
                    let range_name = ranges.range_of_value(lval)?.name.clone();
                    for other in &live {
                        if *other != range_name {
                            graph.connect(&range_name, other)?;
                        }
                    }
                    live.remove(&range_name);
                }
                for rval in &inst.operation.rvalues {
                    if rval.is_virtual_reg() {
                        if let Ok(range) = ranges.range_of_value(rval) {
                            live.insert(range.name.clone());
                        }
                    }
                }
            }
        }

        // formal arguments must each occupy a distinct register
        for (i, a) in argument_ranges.iter().enumerate() {
            for b in argument_ranges.iter().skip(i + 1) {
                if a != b {
                    graph.connect(a, b)?;
                }
            }
        }

        Ok(graph)
    }

    pub fn add_node(&mut self, node: InterferenceNode) {
        self.nodes.entry(node.name.clone()).or_insert(node);
    }

    pub fn node(&self, name: &str) -> Result<&InterferenceNode> {
        self.nodes
            .get(name)
            .ok_or_else(|| OptimizerError::lookup("interference node", name))
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn connect(&mut self, a: &str, b: &str) -> Result<()> {
        if !self.nodes.contains_key(a) {
            return Err(OptimizerError::lookup("interference node", a));
        }
        if !self.nodes.contains_key(b) {
            return Err(OptimizerError::lookup("interference node", b));
        }
        self.nodes.get_mut(a).unwrap().edges.insert(b.to_string());
        self.nodes.get_mut(b).unwrap().edges.insert(a.to_string());
        Ok(())
    }

    /// Remove a node, detaching it from its neighbors' edge sets. The
    /// returned node keeps the edge list it had at removal time.
    pub fn remove_node(&mut self, name: &str) -> Result<InterferenceNode> {
        let node = self
            .nodes
            .remove(name)
            .ok_or_else(|| OptimizerError::lookup("interference node", name))?;
        for neighbor in &node.edges {
            if let Some(other) = self.nodes.get_mut(neighbor) {
                other.edges.remove(name);
            }
        }
        Ok(node)
    }

    fn min_degree(&self) -> Option<usize> {
        self.nodes.values().map(InterferenceNode::degree).min()
    }

    /// First node (name order) with the given degree.
    fn any_node_with_degree(&self, degree: usize) -> Option<String> {
        self.nodes
            .values()
            .find(|n| n.degree() == degree)
            .map(|n| n.name.clone())
    }

    /// Node with the lowest spill cost, name order breaking ties.
    fn lowest_spill_cost_node(&self) -> Option<String> {
        self.nodes
            .values()
            .min_by(|a, b| {
                a.spill_cost()
                    .partial_cmp(&b.spill_cost())
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.name.cmp(&b.name))
            })
            .map(|n| n.name.clone())
    }

    /// Chaitin-Briggs colouring with `k` colours. Nodes that cannot be
    /// coloured are left with `color == None`.
    pub fn color(&mut self, k: u8) -> Result<()> {
        let mut stack: Vec<InterferenceNode> = Vec::with_capacity(self.len());

        while !self.is_empty() {
            let low_threshold = (k - RESERVED_COLORS) as usize;
            let victim = match self.min_degree() {
                Some(min) if min < low_threshold => self
                    .any_node_with_degree(min)
                    .expect("graph is non-empty"),
                _ => self
                    .lowest_spill_cost_node()
                    .expect("graph is non-empty"),
            };
            let node = self.remove_node(&victim)?;
            stack.push(node);
        }

        while let Some(mut node) = stack.pop() {
            // a popped node's recorded neighbors were removed later and so
            // have already been reinserted
            node.color = None;
            let name = node.name.clone();
            let edges = node.edges.clone();
            self.add_node(node);
            for neighbor in &edges {
                if self.nodes.contains_key(neighbor) {
                    self.connect(&name, neighbor)?;
                }
            }
            self.color_node(&name, k)?;
        }

        Ok(())
    }

    fn color_node(&mut self, name: &str, k: u8) -> Result<()> {
        let (forced, edges) = {
            let node = self.node(name)?;
            (node.forced_color, node.edges.clone())
        };

        if let Some(forced) = forced {
            self.nodes.get_mut(name).unwrap().color = Some(forced);
            return Ok(());
        }

        let mut neighbor_colors: BTreeSet<u8> = BTreeSet::new();
        for neighbor in edges {
            if let Some(other) = self.nodes.get(&neighbor) {
                if let Some(color) = other.color {
                    neighbor_colors.insert(color);
                }
            }
        }

        let chosen = (RESERVED_COLORS..k).find(|c| !neighbor_colors.contains(c));
        match chosen {
            Some(color) => {
                trace!("colored {name} with {color}");
                self.nodes.get_mut(name).unwrap().color = Some(color);
            }
            None => {
                debug!("no color available for {name}");
            }
        }
        Ok(())
    }

    /// Names of the ranges left uncoloured, in name order.
    pub fn uncolored(&self) -> Vec<String> {
        self.nodes
            .values()
            .filter(|n| n.color.is_none())
            .map(|n| n.name.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(name: &str) -> InterferenceNode {
        InterferenceNode {
            name: name.to_string(),
            uses: 1,
            infinite_cost: false,
            forced_color: None,
            color: None,
            edges: BTreeSet::new(),
        }
    }

    #[test]
    fn edges_are_symmetric_and_removal_detaches() {
        let mut graph = InterferenceGraph::default();
        graph.add_node(node("a"));
        graph.add_node(node("b"));
        graph.add_node(node("c"));
        graph.add_node(node("d"));

        graph.connect("a", "b").unwrap();
        graph.connect("c", "d").unwrap();
        graph.connect("d", "b").unwrap();

        assert_eq!(graph.node("a").unwrap().degree(), 1);
        assert_eq!(graph.node("b").unwrap().degree(), 2);
        assert_eq!(graph.node("d").unwrap().degree(), 2);

        graph.remove_node("b").unwrap();
        assert_eq!(graph.node("a").unwrap().degree(), 0);
        assert_eq!(graph.node("d").unwrap().degree(), 1);
    }

    #[test]
    fn triangle_colors_with_three_free_colors() {
        let mut graph = InterferenceGraph::default();
        for name in ["a", "b", "c"] {
            graph.add_node(node(name));
        }
        graph.connect("a", "b").unwrap();
        graph.connect("b", "c").unwrap();
        graph.connect("a", "c").unwrap();

        graph.color(NUM_COLORS).unwrap();

        let colors: BTreeSet<u8> = ["a", "b", "c"]
            .iter()
            .map(|n| graph.node(n).unwrap().color.unwrap())
            .collect();
        assert_eq!(colors.len(), 3);
        assert!(colors.iter().all(|&c| (RESERVED_COLORS..NUM_COLORS).contains(&c)));
    }

    #[test]
    fn clique_of_five_spills_someone() {
        let mut graph = InterferenceGraph::default();
        let names = ["a", "b", "c", "d", "e"];
        for name in names {
            graph.add_node(node(name));
        }
        for (i, a) in names.iter().enumerate() {
            for b in names.iter().skip(i + 1) {
                graph.connect(a, b).unwrap();
            }
        }

        graph.color(NUM_COLORS).unwrap();
        assert_eq!(graph.uncolored().len(), 1);
    }

    #[test]
    fn reserved_register_is_pinned() {
        let mut graph = InterferenceGraph::default();
        let mut special = node("%vr0_0");
        special.forced_color = Some(0);
        graph.add_node(special);
        graph.add_node(node("x"));
        graph.connect("%vr0_0", "x").unwrap();

        graph.color(NUM_COLORS).unwrap();
        assert_eq!(graph.node("%vr0_0").unwrap().color, Some(0));
        assert!(graph.node("x").unwrap().color.unwrap() >= RESERVED_COLORS);
    }
}
