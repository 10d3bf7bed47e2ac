// ABOUTME: Joins running identities to invoker grants to produce caller -> callee edges
// ABOUTME: and lays the result out as a DOT graph with one cluster per region
use crate::dot::{escape_html, AttrValue, DotEdge, DotGraph, DotNode, Subgraph};
use crate::palette::color_for;
use iamviz_core::{Inventory, Region, Service, ServiceKey};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, warn};

/// `caller` runs as `identity`, which holds the invoker role on `callee`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct InvocationEdge {
    pub caller: ServiceKey,
    pub callee: ServiceKey,
    pub identity: String,
}

/// Invoker grants held by an identity no discovered service runs as.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DanglingGrant {
    pub identity: String,
    pub targets: Vec<ServiceKey>,
}

#[derive(Debug, Clone)]
struct RegionGroup {
    region: Region,
    services: Vec<Service>,
}

/// Services grouped by region plus the edges between them.
#[derive(Debug, Clone, Default)]
pub struct InvocationGraph {
    groups: BTreeMap<String, RegionGroup>,
    edges: Vec<InvocationEdge>,
    dangling: Vec<DanglingGrant>,
}

impl InvocationGraph {
    /// Build the graph from a discovery snapshot.
    ///
    /// Every service S running as identity I gets an edge to each service
    /// on which I holds an invoker binding, itself included. Regions with no
    /// services produce no cluster.
    pub fn build(inventory: &Inventory) -> Self {
        let mut groups: BTreeMap<String, RegionGroup> = BTreeMap::new();
        for perms in &inventory.services {
            let service = &perms.service;
            groups
                .entry(service.region.id.clone())
                .or_insert_with(|| RegionGroup {
                    region: service.region.clone(),
                    services: Vec::new(),
                })
                .services
                .push(service.clone());
        }
        for group in groups.values_mut() {
            group.services.sort_by(|a, b| a.name.cmp(&b.name));
            group.services.dedup_by(|a, b| a.name == b.name);
        }

        // identity -> services it may invoke
        let mut grants: BTreeMap<&str, BTreeSet<ServiceKey>> = BTreeMap::new();
        for perms in &inventory.services {
            for identity in &perms.invokers {
                grants
                    .entry(identity.as_str())
                    .or_default()
                    .insert(perms.service.key());
            }
        }

        // identity -> services running as it
        let mut runners: HashMap<&str, Vec<ServiceKey>> = HashMap::new();
        for perms in &inventory.services {
            runners
                .entry(perms.service.identity.as_str())
                .or_default()
                .push(perms.service.key());
        }

        let mut edges = BTreeSet::new();
        let mut dangling = Vec::new();
        for (identity, targets) in &grants {
            match runners.get(identity) {
                Some(callers) => {
                    for caller in callers {
                        for callee in targets {
                            debug!("edge {} -> {} via {}", caller, callee, identity);
                            edges.insert(InvocationEdge {
                                caller: caller.clone(),
                                callee: callee.clone(),
                                identity: identity.to_string(),
                            });
                        }
                    }
                }
                None => {
                    let targets: Vec<ServiceKey> = targets.iter().cloned().collect();
                    warn!(
                        "{} may invoke {} service(s) but no service runs as it",
                        identity,
                        targets.len()
                    );
                    dangling.push(DanglingGrant {
                        identity: identity.to_string(),
                        targets,
                    });
                }
            }
        }

        Self {
            groups,
            edges: edges.into_iter().collect(),
            dangling,
        }
    }

    /// Services in region order, then name order.
    pub fn services(&self) -> impl Iterator<Item = &Service> {
        self.groups.values().flat_map(|g| g.services.iter())
    }

    pub fn service_count(&self) -> usize {
        self.groups.values().map(|g| g.services.len()).sum()
    }

    pub fn regions(&self) -> impl Iterator<Item = &Region> {
        self.groups.values().map(|g| &g.region)
    }

    /// Edges sorted by caller then callee.
    pub fn edges(&self) -> &[InvocationEdge] {
        &self.edges
    }

    pub fn dangling_grants(&self) -> &[DanglingGrant] {
        &self.dangling
    }

    /// Lay the graph out for Graphviz.
    pub fn to_dot(&self) -> DotGraph {
        let mut graph = DotGraph::digraph("G");

        let mut permissions_urls: HashMap<ServiceKey, String> = HashMap::new();

        for group in self.groups.values() {
            let mut cluster = Subgraph::new(cluster_id(&group.region.id))
                .attr("style", AttrValue::id("dashed"))
                .attr("label", AttrValue::quoted(group.region.to_string()))
                .node_default("style", AttrValue::id("filled"))
                .node_default("shape", AttrValue::id("box"));

            for service in &group.services {
                let key = service.key();
                cluster.add_node(
                    DotNode::new(key.node_id())
                        .attr("href", AttrValue::quoted(service.console_url()))
                        .attr("color", AttrValue::id(color_for(&service.name)))
                        .attr("label", AttrValue::html(node_label(service))),
                );
                permissions_urls.insert(key, service.permissions_url());
            }

            graph.add_subgraph(cluster);
        }

        for edge in &self.edges {
            let mut dot_edge = DotEdge::new(edge.caller.node_id(), edge.callee.node_id());
            if let Some(url) = permissions_urls.get(&edge.callee) {
                dot_edge = dot_edge.attr("href", AttrValue::quoted(url.as_str()));
            }
            graph.add_edge(dot_edge);
        }

        graph
    }
}

/// `cluster_` prefix makes Graphviz draw the box; `-` is not valid in a bare id.
fn cluster_id(region: &str) -> String {
    format!("cluster_{}", region.replace('-', "_"))
}

fn node_label(service: &Service) -> String {
    format!(
        "{}<br/><font point-size='9'>{}</font>",
        escape_html(&service.name),
        escape_html(&service.identity)
    )
}
