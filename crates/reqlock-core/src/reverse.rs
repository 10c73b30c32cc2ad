//! Inversion of the dependency graph: who requires each package.

use crate::graph::{DependencyGraph, Node};
use reqlock_schema::PackageName;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// A parent edge: the requiring package and its installed version.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct ParentRef {
    pub name: PackageName,
    pub version: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReverseEntry {
    pub installed: Option<String>,
    pub required: Option<String>,
    /// Immediate requirers, collected along every chain that reaches this
    /// package. Root ancestors further up a chain are not recorded here.
    pub parents: BTreeSet<ParentRef>,
    /// Specifier each parent imposes on this package. Unconstrained edges
    /// are not recorded; the first edge seen from a parent wins.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub constraints: BTreeMap<PackageName, String>,
}

/// One visit of a node during the walk.
struct Visit<'a> {
    node: &'a Node,
    required: String,
    parent: Option<&'a Node>,
    constraint: Option<String>,
}

/// Package name to the set of packages that require it, across every chain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ReverseIndex {
    entries: BTreeMap<PackageName, ReverseEntry>,
}

impl ReverseIndex {
    /// Walk depth-first from every root, recording each node after its
    /// children. A package reached along several chains gets the union of
    /// every parent seen; the first visit that knows its versions fills them.
    pub fn invert(graph: &DependencyGraph) -> Self {
        let mut index = Self::default();
        for root in graph.roots() {
            let Some(node) = graph.node(root) else {
                continue;
            };
            let mut chain = vec![&node.name];
            index.walk(
                graph,
                Visit {
                    node,
                    required: node.installed.clone(),
                    parent: None,
                    constraint: None,
                },
                &mut chain,
            );
        }
        index
    }

    fn walk<'a>(
        &mut self,
        graph: &'a DependencyGraph,
        visit: Visit<'a>,
        chain: &mut Vec<&'a PackageName>,
    ) {
        for edge in &visit.node.children {
            if chain.contains(&&edge.name) {
                continue;
            }
            let Some(child) = graph.node(&edge.name) else {
                continue;
            };
            chain.push(&child.name);
            self.walk(
                graph,
                Visit {
                    node: child,
                    required: edge.required(),
                    parent: Some(visit.node),
                    constraint: (!edge.specifier.is_empty()).then(|| edge.specifier.to_string()),
                },
                chain,
            );
            chain.pop();
        }
        self.record(visit);
    }

    fn record(&mut self, visit: Visit<'_>) {
        let entry = self.entries.entry(visit.node.name.clone()).or_default();
        if entry.required.is_none() && entry.installed.is_none() {
            entry.required = Some(visit.required);
            entry.installed = Some(visit.node.installed.clone());
        }
        if let Some(parent) = visit.parent {
            entry.parents.insert(ParentRef {
                name: parent.name.clone(),
                version: parent.installed.clone(),
            });
            if let Some(spec) = visit.constraint {
                entry.constraints.entry(parent.name.clone()).or_insert(spec);
            }
        }
    }

    pub fn get(&self, name: &PackageName) -> Option<&ReverseEntry> {
        self.entries.get(name)
    }

    pub fn parents(&self, name: &PackageName) -> Option<&BTreeSet<ParentRef>> {
        self.entries.get(name).map(|e| &e.parents)
    }

    /// Constraints parents impose on `name`, ordered by parent name.
    pub fn constraints(&self, name: &PackageName) -> impl Iterator<Item = (&PackageName, &str)> {
        self.entries
            .get(name)
            .into_iter()
            .flat_map(|e| e.constraints.iter().map(|(p, s)| (p, s.as_str())))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PackageName, &ReverseEntry)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
