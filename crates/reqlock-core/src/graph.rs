//! The "package requires package" graph over installed distributions.

use crate::inspect::{DistributionSource, InstalledDistribution};
use reqlock_schema::{
    MarkerEnvironment, MarkerError, PackageName, Requirement, RequirementError, SpecifierSet,
};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap, HashSet};
use thiserror::Error;
use tracing::{debug, warn};

/// Rendered in place of an empty specifier.
pub const ANY_VERSION: &str = "Any";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("malformed requirement '{requirement}' in {package}: {source}")]
    MalformedRequirement {
        package: String,
        requirement: String,
        #[source]
        source: RequirementError,
    },
    #[error("requirement '{requirement}' in {package} uses undefined marker variable '{variable}'")]
    UndefinedMarkerVariable {
        package: String,
        requirement: String,
        variable: String,
    },
}

/// A package left out of the graph and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DroppedPackage {
    pub name: PackageName,
    pub reason: GraphError,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    pub name: PackageName,
    pub specifier: SpecifierSet,
}

impl Edge {
    /// The specifier as recorded in trees and the reverse index.
    pub fn required(&self) -> String {
        if self.specifier.is_empty() {
            ANY_VERSION.to_owned()
        } else {
            self.specifier.to_string()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub name: PackageName,
    pub installed: String,
    pub children: Vec<Edge>,
}

/// A requirement chain rooted at one package.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RequirementTree {
    pub package_name: String,
    pub installed_version: String,
    pub required_version: String,
    pub dependencies: Vec<RequirementTree>,
}

/// Dependency graph restricted to one set of installed packages.
///
/// Children are looked up by hash; roots are the packages no other package
/// in the graph requires, in name order.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    nodes: HashMap<PackageName, Node>,
    roots: Vec<PackageName>,
    dropped: Vec<DroppedPackage>,
}

impl DependencyGraph {
    /// Build the graph, evaluating every requirement's marker against `env`
    /// with no extras requested.
    ///
    /// A distribution with a malformed requirement, or one whose marker reads
    /// a variable `env` does not define, is left out and recorded in
    /// [`dropped`](Self::dropped). Requirements whose markers are false are
    /// skipped. Edges only point at packages that made it into the graph.
    pub fn build(distributions: &[InstalledDistribution], env: &MarkerEnvironment) -> Self {
        let mut seen = HashSet::new();
        let mut candidates = Vec::with_capacity(distributions.len());
        for dist in distributions {
            let name = dist.package_name();
            if !seen.insert(name.clone()) {
                debug!("ignoring duplicate distribution {} {}", dist.name, dist.version);
                continue;
            }
            candidates.push((name, dist));
        }

        let no_extras = BTreeSet::new();
        let mut nodes = HashMap::with_capacity(candidates.len());
        let mut dropped = Vec::new();
        for (name, dist) in candidates {
            match active_requirements(dist, env, &no_extras) {
                Ok(children) => {
                    nodes.insert(
                        name.clone(),
                        Node {
                            name,
                            installed: dist.version.clone(),
                            children,
                        },
                    );
                }
                Err(reason) => {
                    warn!("dropping {} from dependency graph: {reason}", dist.name);
                    dropped.push(DroppedPackage { name, reason });
                }
            }
        }

        let in_scope: HashSet<PackageName> = nodes.keys().cloned().collect();
        for node in nodes.values_mut() {
            let own = node.name.clone();
            node.children
                .retain(|edge| edge.name != own && in_scope.contains(&edge.name));
        }

        let required: HashSet<&PackageName> = nodes
            .values()
            .flat_map(|n| n.children.iter().map(|e| &e.name))
            .collect();
        let mut roots: Vec<PackageName> = nodes
            .keys()
            .filter(|name| !required.contains(name))
            .cloned()
            .collect();
        roots.sort();
        dropped.sort_by(|a, b| a.name.cmp(&b.name));

        debug!(
            "dependency graph: {} nodes, {} roots, {} dropped",
            nodes.len(),
            roots.len(),
            dropped.len()
        );
        Self {
            nodes,
            roots,
            dropped,
        }
    }

    /// Build from a distribution source. A failing source yields an empty graph.
    pub fn from_source(source: &dyn DistributionSource, env: &MarkerEnvironment) -> Self {
        match source.distributions() {
            Ok(dists) => Self::build(&dists, env),
            Err(e) => {
                warn!("could not enumerate installed distributions: {e}");
                Self::default()
            }
        }
    }

    pub fn node(&self, name: &PackageName) -> Option<&Node> {
        self.nodes.get(name)
    }

    /// Direct children of `name`; empty when `name` is not in the graph.
    pub fn children(&self, name: &PackageName) -> &[Edge] {
        self.nodes.get(name).map_or(&[], |n| n.children.as_slice())
    }

    pub fn roots(&self) -> &[PackageName] {
        &self.roots
    }

    pub fn dropped(&self) -> &[DroppedPackage] {
        &self.dropped
    }

    pub fn contains(&self, name: &PackageName) -> bool {
        self.nodes.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes in name order.
    pub fn nodes(&self) -> Vec<&Node> {
        let mut nodes: Vec<&Node> = self.nodes.values().collect();
        nodes.sort_by(|a, b| a.name.cmp(&b.name));
        nodes
    }

    /// Requirement trees for every root, or for `package` alone.
    ///
    /// A root's required version is its installed version. A child already on
    /// the current chain is not expanded again.
    pub fn requirement_tree(&self, package: Option<&PackageName>) -> Vec<RequirementTree> {
        let starts: Vec<&PackageName> = match package {
            Some(name) if self.contains(name) => vec![name],
            Some(_) => Vec::new(),
            None => self.roots.iter().collect(),
        };
        starts
            .into_iter()
            .filter_map(|name| {
                let node = self.nodes.get(name)?;
                let mut chain = vec![&node.name];
                Some(RequirementTree {
                    package_name: node.name.to_string(),
                    installed_version: node.installed.clone(),
                    required_version: node.installed.clone(),
                    dependencies: self.subtrees(node, &mut chain),
                })
            })
            .collect()
    }

    fn subtrees<'a>(
        &'a self,
        node: &'a Node,
        chain: &mut Vec<&'a PackageName>,
    ) -> Vec<RequirementTree> {
        let mut out = Vec::with_capacity(node.children.len());
        for edge in &node.children {
            if chain.contains(&&edge.name) {
                continue;
            }
            let Some(child) = self.nodes.get(&edge.name) else {
                continue;
            };
            chain.push(&child.name);
            let dependencies = self.subtrees(child, chain);
            chain.pop();
            out.push(RequirementTree {
                package_name: child.name.to_string(),
                installed_version: child.installed.clone(),
                required_version: edge.required(),
                dependencies,
            });
        }
        out
    }
}

fn active_requirements(
    dist: &InstalledDistribution,
    env: &MarkerEnvironment,
    extras: &BTreeSet<String>,
) -> Result<Vec<Edge>, GraphError> {
    let mut edges: Vec<Edge> = Vec::with_capacity(dist.requires.len());
    for raw in &dist.requires {
        let malformed = |source| GraphError::MalformedRequirement {
            package: dist.name.clone(),
            requirement: raw.clone(),
            source,
        };
        let req = Requirement::parse(raw).map_err(malformed)?;
        if let Some(marker) = req.marker() {
            match marker.evaluate(env, extras) {
                Ok(true) => {}
                Ok(false) => continue,
                Err(MarkerError::UndefinedVariable(variable)) => {
                    return Err(GraphError::UndefinedMarkerVariable {
                        package: dist.name.clone(),
                        requirement: raw.clone(),
                        variable,
                    });
                }
                Err(source) => {
                    return Err(GraphError::MalformedRequirement {
                        package: dist.name.clone(),
                        requirement: raw.clone(),
                        source: RequirementError::Marker {
                            input: raw.clone(),
                            source,
                        },
                    });
                }
            }
        }
        if edges.iter().any(|e| e.name == *req.name()) {
            continue;
        }
        edges.push(Edge {
            name: req.name().clone(),
            specifier: req.specifier().clone(),
        });
    }
    Ok(edges)
}
