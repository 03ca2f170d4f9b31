//! Tree Builder.
//!
//! Turns a flat list of `(id, parent_id)` records into a hierarchy anchored
//! at a synthetic root id. Records are indexed first and linked second, so a
//! child may appear before its parent in the input. Siblings keep their
//! input order.

use std::collections::{BTreeSet, HashMap};

use crate::error::TreeError;

/// A record that knows its own id and its parent's id.
pub trait TreeRecord {
    fn record_id(&self) -> &str;
    fn parent_record_id(&self) -> &str;
}

/// A record with its children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeNode<T> {
    pub record: T,
    pub children: Vec<TreeNode<T>>,
}

/// A rooted tree. The root itself is synthetic and carries no record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tree<T> {
    root_id: String,
    children: Vec<TreeNode<T>>,
}

impl<T: TreeRecord> Tree<T> {
    /// Id of the synthetic root.
    #[must_use]
    pub fn root_id(&self) -> &str {
        &self.root_id
    }

    /// Top-level nodes.
    #[must_use]
    pub fn children(&self) -> &[TreeNode<T>] {
        &self.children
    }

    /// Number of records in the tree.
    #[must_use]
    pub fn len(&self) -> usize {
        fn count<T>(nodes: &[TreeNode<T>]) -> usize {
            nodes.iter().map(|n| 1 + count(&n.children)).sum()
        }
        count(&self.children)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Records in pre-order: every parent comes before its children.
    #[must_use]
    pub fn pre_order(&self) -> Vec<&T> {
        let mut out = Vec::with_capacity(self.len());
        let mut stack: Vec<&TreeNode<T>> = self.children.iter().rev().collect();
        while let Some(node) = stack.pop() {
            out.push(&node.record);
            stack.extend(node.children.iter().rev());
        }
        out
    }

    /// All `(parent_id, child_id)` edges, including edges from the root.
    #[must_use]
    pub fn edges(&self) -> BTreeSet<(String, String)> {
        let mut edges = BTreeSet::new();
        let mut stack: Vec<(&str, &TreeNode<T>)> = self
            .children
            .iter()
            .map(|n| (self.root_id.as_str(), n))
            .collect();
        while let Some((parent, node)) = stack.pop() {
            let id = node.record.record_id();
            edges.insert((parent.to_string(), id.to_string()));
            stack.extend(node.children.iter().map(|c| (id, c)));
        }
        edges
    }
}

/// Build a tree from flat records.
///
/// # Errors
///
/// - `TreeError::DuplicateId` if two records share an id or a record uses the root id
/// - `TreeError::OrphanRecord` if a parent id matches neither a record nor the root
/// - `TreeError::Cycle` if a parent chain never reaches the root
pub fn build_tree<T: TreeRecord>(root_id: &str, records: Vec<T>) -> Result<Tree<T>, TreeError> {
    let mut index: HashMap<&str, usize> = HashMap::with_capacity(records.len());
    for (i, record) in records.iter().enumerate() {
        let id = record.record_id();
        if id == root_id || index.insert(id, i).is_some() {
            return Err(TreeError::DuplicateId { id: id.to_string() });
        }
    }

    let mut parents: Vec<Option<usize>> = Vec::with_capacity(records.len());
    for record in &records {
        let parent_id = record.parent_record_id();
        if parent_id == root_id {
            parents.push(None);
        } else if let Some(&p) = index.get(parent_id) {
            parents.push(Some(p));
        } else {
            return Err(TreeError::OrphanRecord {
                id: record.record_id().to_string(),
                parent_id: parent_id.to_string(),
            });
        }
    }

    detect_cycles(&records, &parents)?;

    let mut children_of: Vec<Vec<usize>> = vec![Vec::new(); records.len()];
    let mut top_level = Vec::new();
    for (i, parent) in parents.iter().enumerate() {
        match parent {
            Some(p) => children_of[*p].push(i),
            None => top_level.push(i),
        }
    }

    let mut slots: Vec<Option<T>> = records.into_iter().map(Some).collect();
    let children = top_level
        .into_iter()
        .map(|i| assemble(i, &children_of, &mut slots))
        .collect();

    Ok(Tree {
        root_id: root_id.to_string(),
        children,
    })
}

/// Walk every parent chain once; a node seen twice on the same walk is a cycle.
fn detect_cycles<T: TreeRecord>(records: &[T], parents: &[Option<usize>]) -> Result<(), TreeError> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Unvisited,
        OnPath,
        Rooted,
    }

    let mut marks = vec![Mark::Unvisited; records.len()];
    let mut path = Vec::new();

    for start in 0..records.len() {
        let mut current = Some(start);
        while let Some(i) = current {
            match marks[i] {
                Mark::Rooted => break,
                Mark::OnPath => {
                    return Err(TreeError::Cycle {
                        id: records[i].record_id().to_string(),
                    })
                }
                Mark::Unvisited => {
                    marks[i] = Mark::OnPath;
                    path.push(i);
                    current = parents[i];
                }
            }
        }
        for i in path.drain(..) {
            marks[i] = Mark::Rooted;
        }
    }
    Ok(())
}

fn assemble<T>(i: usize, children_of: &[Vec<usize>], slots: &mut [Option<T>]) -> TreeNode<T> {
    let children = children_of[i]
        .iter()
        .map(|&c| assemble(c, children_of, slots))
        .collect();
    // Acyclic and each index has exactly one parent, so every slot is taken once.
    let record = slots[i].take().unwrap_or_else(|| unreachable!("record {i} linked twice"));
    TreeNode { record, children }
}
