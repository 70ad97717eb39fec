// src/engine/graph.rs

//! Static job graph: roles as vertices, data edges with ship strategies.
//!
//! The graph is acyclic by construction of a valid job. The feedback path
//! from Tail to Head is the backchannel, which is not a graph edge.

use std::collections::BTreeMap;

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use petgraph::Direction;

use crate::channel::EdgeSpec;
use crate::config::JobConfig;
use crate::errors::{IterdagError, Result};
use crate::types::{Role, ShipStrategy};

pub const SEED_TO_HEAD: &str = "seed_to_head";
pub const TRANSITION_TO_HEAD: &str = "transition_to_head";
pub const HEAD_TO_INTERMEDIATE: &str = "head_to_intermediate";
pub const COMPANION_TO_INTERMEDIATE: &str = "companion_to_intermediate";
pub const INTERMEDIATE_TO_TAIL: &str = "intermediate_to_tail";
pub const HEAD_TO_DELTA: &str = "head_to_delta";
pub const TAIL_TO_DELTA: &str = "tail_to_delta";
pub const HEAD_TO_OUTPUT: &str = "head_to_output";

/// One data edge between two roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobEdge {
    pub from: Role,
    pub to: Role,
    pub spec: EdgeSpec,
}

#[derive(Debug, Clone)]
pub struct JobGraph {
    graph: DiGraphMap<Role, &'static str>,
    edges: BTreeMap<&'static str, JobEdge>,
    order: Vec<Role>,
}

impl JobGraph {
    /// Build and validate a graph from explicit edges.
    pub fn new(edges: impl IntoIterator<Item = JobEdge>) -> Result<Self> {
        let mut graph: DiGraphMap<Role, &'static str> = DiGraphMap::new();
        let mut by_name = BTreeMap::new();

        for edge in edges {
            if by_name.insert(edge.spec.name, edge).is_some() {
                return Err(IterdagError::ConfigError(format!(
                    "edge '{}' declared twice",
                    edge.spec.name
                )));
            }
            if edge.spec.strategy == ShipStrategy::Forward && edge.spec.senders != edge.spec.receivers {
                return Err(IterdagError::ConfigError(format!(
                    "forward edge '{}' connects {} senders to {} receivers",
                    edge.spec.name, edge.spec.senders, edge.spec.receivers
                )));
            }
            if let Some(existing) = graph.add_edge(edge.from, edge.to, edge.spec.name) {
                return Err(IterdagError::ConfigError(format!(
                    "edges '{existing}' and '{}' connect the same roles",
                    edge.spec.name
                )));
            }
        }

        let order = toposort(&graph, None).map_err(|cycle| {
            IterdagError::DagCycle(format!(
                "cycle detected in job graph involving role '{}'",
                cycle.node_id()
            ))
        })?;

        Ok(Self {
            graph,
            edges: by_name,
            order,
        })
    }

    /// The graph of an iteration job described by `config`.
    pub fn for_job(config: &JobConfig, with_transition: bool) -> Result<Self> {
        let p = config.job.parallelism;
        let keys = config.keys;
        let strategies = config.edges;

        let edge = |from, to, name, strategy, key_field| JobEdge {
            from,
            to,
            spec: EdgeSpec {
                name,
                strategy,
                key_field,
                senders: p,
                receivers: p,
            },
        };

        let mut edges = vec![
            edge(Role::SeedSource, Role::Head, SEED_TO_HEAD, strategies.seed_to_head, keys.state),
            edge(
                Role::Head,
                Role::Intermediate,
                HEAD_TO_INTERMEDIATE,
                strategies.head_to_intermediate,
                keys.state,
            ),
            edge(
                Role::CompanionSource,
                Role::Intermediate,
                COMPANION_TO_INTERMEDIATE,
                strategies.companion_to_intermediate,
                keys.companion,
            ),
            edge(
                Role::Intermediate,
                Role::Tail,
                INTERMEDIATE_TO_TAIL,
                strategies.intermediate_to_tail,
                keys.partial,
            ),
            edge(Role::Head, Role::DeltaPath, HEAD_TO_DELTA, strategies.head_to_delta, keys.state),
            edge(Role::Tail, Role::DeltaPath, TAIL_TO_DELTA, strategies.tail_to_delta, keys.state),
            edge(Role::Head, Role::Output, HEAD_TO_OUTPUT, strategies.head_to_output, keys.state),
        ];
        if with_transition {
            edges.push(edge(
                Role::TransitionSource,
                Role::Head,
                TRANSITION_TO_HEAD,
                ShipStrategy::Broadcast,
                0,
            ));
        }

        Self::new(edges)
    }

    pub fn spec(&self, name: &str) -> Result<EdgeSpec> {
        self.edges
            .get(name)
            .map(|edge| edge.spec)
            .ok_or_else(|| IterdagError::ConfigError(format!("job graph has no edge '{name}'")))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.edges.contains_key(name)
    }

    /// Roles in topological order.
    pub fn roles(&self) -> &[Role] {
        &self.order
    }

    /// Edges ordered by the topological position of their source role.
    pub fn edges(&self) -> Vec<JobEdge> {
        let mut out = Vec::with_capacity(self.edges.len());
        for role in &self.order {
            for (_, _, name) in self.graph.edges_directed(*role, Direction::Outgoing) {
                if let Some(edge) = self.edges.get(name) {
                    out.push(*edge);
                }
            }
        }
        out
    }

    /// Edges arriving at `role`.
    pub fn inputs_of(&self, role: Role) -> Vec<JobEdge> {
        self.graph
            .edges_directed(role, Direction::Incoming)
            .filter_map(|(_, _, name)| self.edges.get(name).copied())
            .collect()
    }
}
