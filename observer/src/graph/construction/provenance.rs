use petgraph::dot::{Config, Dot};
use petgraph::prelude::*;

use lineage::{Edge, GraphSink, Relation, Stamp, Vertex};

use std::collections::HashMap;
use std::fmt::{self, Display, Formatter};
use std::ops::Index;

pub type IndexType = u32;
pub type NodeIdx = NodeIndex<IndexType>;
pub type EdgeIdx = EdgeIndex<IndexType>;

/// One observation of an edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeRecord {
    pub relation: Relation,
    pub operation: Option<String>,
    pub stamp: Stamp,
    pub flags: Option<String>,
}

impl From<Edge> for EdgeRecord {
    fn from(edge: Edge) -> Self {
        Self {
            relation: edge.relation,
            operation: edge.operation,
            stamp: edge.stamp,
            flags: edge.flags,
        }
    }
}

#[derive(Debug, Default)]
pub struct Log {
    records: Vec<EdgeRecord>,
}

impl Log {
    pub fn records(&self) -> &[EdgeRecord] {
        &self.records
    }
}

impl Display for Log {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut labels: Vec<String> = vec![];
        for record in &self.records {
            let label = match &record.operation {
                Some(operation) => format!("{} ({})", record.relation, operation),
                None => record.relation.to_string(),
            };
            if !labels.contains(&label) {
                labels.push(label);
            }
        }
        write!(f, "{}", labels.join("\n"))
    }
}

impl From<Vec<EdgeRecord>> for Log {
    fn from(records: Vec<EdgeRecord>) -> Self {
        Self { records }
    }
}

pub type ProvGraph = DiGraph<Vertex, Log, IndexType>;

/// Vertices are kept once per distinct value; edges once per (child, parent) pair with
/// every observation accumulated in its [`Log`].
pub struct ProvenanceGraph {
    flow: ProvGraph,
    nodes: HashMap<Vertex, NodeIdx>,
    edges: HashMap<(NodeIdx, NodeIdx), EdgeIdx>,
}

impl ProvenanceGraph {
    pub fn new() -> Self {
        Self {
            flow: DiGraph::default(),
            nodes: HashMap::new(),
            edges: HashMap::new(),
        }
    }

    pub fn add_node(&mut self, weight: Vertex) -> NodeIdx {
        if let Some(idx) = self.nodes.get(&weight) {
            return *idx;
        }
        let idx = self.flow.add_node(weight.clone());
        self.nodes.insert(weight, idx);
        idx
    }

    pub fn add_log(&mut self, from: NodeIdx, to: NodeIdx, weight: EdgeRecord) -> EdgeIdx {
        let edges = &mut self.edges;
        let flow = &mut self.flow;
        *edges
            .entry((from, to))
            .and_modify(|e| {
                let edge = &mut flow[*e];
                edge.records.push(weight.clone());
            })
            .or_insert_with(|| flow.add_edge(from, to, Log::from(vec![weight])))
    }

    pub fn node(&self, vertex: &Vertex) -> Option<NodeIdx> {
        self.nodes.get(vertex).copied()
    }

    pub fn log(&self, from: NodeIdx, to: NodeIdx) -> Option<&Log> {
        self.edges.get(&(from, to)).map(|e| &self.flow[*e])
    }

    pub fn get_dot_with_config<'a>(&'a self, config: &'a [Config]) -> Dot<&'a ProvGraph> {
        Dot::with_config(&self.flow, config)
    }

    pub fn get_graph(&self) -> &ProvGraph {
        &self.flow
    }
}

impl Default for ProvenanceGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl Index<NodeIdx> for ProvenanceGraph {
    type Output = Vertex;

    fn index(&self, idx: NodeIdx) -> &Self::Output {
        &self.flow[idx]
    }
}

impl GraphSink for ProvenanceGraph {
    fn put_vertex(&mut self, vertex: Vertex) {
        self.add_node(vertex);
    }

    fn put_edge(&mut self, edge: Edge) {
        let child = self.add_node(edge.child.clone());
        let parent = self.add_node(edge.parent.clone());
        self.add_log(child, parent, EdgeRecord::from(edge));
    }
}
