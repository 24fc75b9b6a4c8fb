//! # Transaction Trees
//!
//! VTXO trees and connector trees are both trees of PSBTs where each child spends
//! one output of its parent. The coordinator transports them flat, as a list of
//! [`TxTreeNode`]s keyed by txid.

use crate::error::{ArkError, ArkResult};
use bitcoin::{OutPoint, Psbt, Txid};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::str::FromStr;

/// Flat transport form of one tree node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxTreeNode {
    pub txid: Txid,
    /// Base64 PSBT
    pub tx: String,
    /// Output index -> child txid
    #[serde(default)]
    pub children: BTreeMap<u32, Txid>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TxTree {
    pub root: Psbt,
    /// Output index of `root` -> subtree spending it
    pub children: BTreeMap<u32, TxTree>,
}

impl TxTree {
    pub fn new(root: Psbt) -> Self {
        Self {
            root,
            children: BTreeMap::new(),
        }
    }

    pub fn txid(&self) -> Txid {
        self.root.unsigned_tx.compute_txid()
    }

    /// Number of transactions in the tree
    pub fn len(&self) -> usize {
        1 + self.children.values().map(TxTree::len).sum::<usize>()
    }

    /// Leaf transactions, depth-first with children in output-index order
    pub fn leaves(&self) -> Vec<&Psbt> {
        let mut leaves = Vec::new();
        self.collect_leaves(&mut leaves);
        leaves
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a Psbt>) {
        if self.children.is_empty() {
            out.push(&self.root);
            return;
        }
        for child in self.children.values() {
            child.collect_leaves(out);
        }
    }

    /// Flatten into transport nodes, parents before children
    pub fn to_nodes(&self) -> Vec<TxTreeNode> {
        let mut nodes = Vec::with_capacity(self.len());
        self.collect_nodes(&mut nodes);
        nodes
    }

    fn collect_nodes(&self, out: &mut Vec<TxTreeNode>) {
        out.push(TxTreeNode {
            txid: self.txid(),
            tx: self.root.to_string(),
            children: self
                .children
                .iter()
                .map(|(vout, child)| (*vout, child.txid()))
                .collect(),
        });
        for child in self.children.values() {
            child.collect_nodes(out);
        }
    }

    /// Rebuild a tree from transport nodes.
    ///
    /// The root is the only node no other node references. Every node's txid must
    /// match its PSBT and every child must spend the parent output it hangs from.
    pub fn from_nodes(nodes: Vec<TxTreeNode>) -> ArkResult<Self> {
        if nodes.is_empty() {
            return Err(ArkError::missing("transaction tree nodes"));
        }

        let referenced: HashSet<Txid> = nodes
            .iter()
            .flat_map(|node| node.children.values().copied())
            .collect();
        let mut roots = nodes.iter().filter(|node| !referenced.contains(&node.txid));
        let root = roots
            .next()
            .map(|node| node.txid)
            .ok_or_else(|| ArkError::transaction("transaction tree has no root"))?;
        if roots.next().is_some() {
            return Err(ArkError::transaction("transaction tree has more than one root"));
        }

        let by_txid: HashMap<Txid, TxTreeNode> =
            nodes.into_iter().map(|node| (node.txid, node)).collect();
        let mut visited = HashSet::new();
        Self::build_subtree(&root, &by_txid, &mut visited)
    }

    fn build_subtree(
        txid: &Txid,
        nodes: &HashMap<Txid, TxTreeNode>,
        visited: &mut HashSet<Txid>,
    ) -> ArkResult<Self> {
        if !visited.insert(*txid) {
            return Err(ArkError::transaction(format!(
                "transaction {} appears twice in tree",
                txid
            )));
        }

        let node = nodes
            .get(txid)
            .ok_or_else(|| ArkError::missing(format!("tree node {}", txid)))?;
        let psbt = Psbt::from_str(&node.tx)?;
        let actual = psbt.unsigned_tx.compute_txid();
        if actual != *txid {
            return Err(ArkError::transaction(format!(
                "tree node txid mismatch: expected {}, got {}",
                txid, actual
            )));
        }

        let mut tree = TxTree::new(psbt);
        for (vout, child_txid) in &node.children {
            let child = Self::build_subtree(child_txid, nodes, visited)?;
            let parent_output = OutPoint::new(*txid, *vout);
            let spends_parent = child
                .root
                .unsigned_tx
                .input
                .iter()
                .any(|input| input.previous_output == parent_output);
            if !spends_parent {
                return Err(ArkError::transaction(format!(
                    "tree node {} does not spend {}",
                    child_txid, parent_output
                )));
            }
            tree.children.insert(*vout, child);
        }
        Ok(tree)
    }
}
