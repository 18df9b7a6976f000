//! Vertices and edges handed to the graph, and the two policies for drawing agents.


mod embedded;
pub use embedded::EmbeddedAgent;

mod separate;
pub use separate::SeparateAgent;

use crate::history::ProcessRecord;
use crate::identity::{
    annotation, AgentIdentity, Annotations, NamespaceIdentity, ProcessIdentity, UnitIdentity,
};

use std::fmt::{self, Display, Formatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexKind {
    Process,
    Agent,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Vertex {
    pub kind: VertexKind,
    pub annotations: Annotations,
}

impl Vertex {
    pub fn process(annotations: Annotations) -> Self {
        Self {
            kind: VertexKind::Process,
            annotations,
        }
    }

    pub fn agent(annotations: Annotations) -> Self {
        Self {
            kind: VertexKind::Agent,
            annotations,
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.annotations.get(key).map(String::as_str)
    }
}

impl Display for Vertex {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self.kind {
            VertexKind::Process => write!(f, "Process")?,
            VertexKind::Agent => write!(f, "Agent")?,
        }
        for (key, value) in &self.annotations {
            write!(f, "\n{}: {}", key, value)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Relation {
    TriggeredBy,
    ControlledBy,
}

impl Display for Relation {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Relation::TriggeredBy => write!(f, "WasTriggeredBy"),
            Relation::ControlledBy => write!(f, "WasControlledBy"),
        }
    }
}

/// Where and when an edge was observed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Stamp {
    pub time: String,
    pub event_id: String,
    pub source: String,
}

impl Stamp {
    pub fn new<S: Into<String>>(time: S, event_id: S, source: S) -> Self {
        Self {
            time: time.into(),
            event_id: event_id.into(),
            source: source.into(),
        }
    }

    pub fn with_source(&self, source: &str) -> Self {
        Self {
            source: source.to_string(),
            ..self.clone()
        }
    }
}

/// An edge points from the effect (`child`) to its cause (`parent`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    pub relation: Relation,
    pub child: Vertex,
    pub parent: Vertex,
    pub operation: Option<String>,
    pub stamp: Stamp,
    pub flags: Option<String>,
}

impl Edge {
    pub fn triggered_by(child: Vertex, parent: Vertex, operation: &str, stamp: Stamp) -> Self {
        Self {
            relation: Relation::TriggeredBy,
            child,
            parent,
            operation: Some(operation.to_string()),
            stamp,
            flags: None,
        }
    }

    pub fn controlled_by(
        child: Vertex,
        agent: Vertex,
        operation: Option<&str>,
        stamp: Stamp,
    ) -> Self {
        Self {
            relation: Relation::ControlledBy,
            child,
            parent: agent,
            operation: operation.map(str::to_string),
            stamp,
            flags: None,
        }
    }

    pub fn with_flags(mut self, flags: String) -> Self {
        if !flags.is_empty() {
            self.flags = Some(flags);
        }
        self
    }
}

pub trait GraphSink {
    fn put_vertex(&mut self, vertex: Vertex);
    fn put_edge(&mut self, edge: Edge);
}

impl<K: GraphSink + ?Sized> GraphSink for &mut K {
    fn put_vertex(&mut self, vertex: Vertex) {
        (**self).put_vertex(vertex)
    }

    fn put_edge(&mut self, edge: Edge) {
        (**self).put_edge(edge)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Update {
    Agent(AgentIdentity),
    Namespace(NamespaceIdentity),
}

/// Decides how agents appear in the graph and which vertices are new enough to emit.
pub trait VertexStrategy {
    fn build_vertex(
        &self,
        process: &ProcessIdentity,
        agent: Option<&AgentIdentity>,
        unit: Option<&UnitIdentity>,
        namespace: &NamespaceIdentity,
    ) -> Vertex;

    /// Emits the vertex of a newly created record and returns it.
    fn put_process(
        &mut self,
        record: &mut ProcessRecord,
        stamp: &Stamp,
        sink: &mut dyn GraphSink,
    ) -> Vertex;

    /// Emits the vertex of the record's active unit. `None` when no unit is active.
    fn put_unit(
        &mut self,
        record: &mut ProcessRecord,
        stamp: &Stamp,
        sink: &mut dyn GraphSink,
    ) -> Option<Vertex>;

    /// Applies a credential or namespace change to the record and draws it.
    fn update(
        &mut self,
        record: &mut ProcessRecord,
        update: Update,
        operation: &str,
        stamp: &Stamp,
        sink: &mut dyn GraphSink,
    );

    fn clear(&mut self);

    /// The vertex standing for the record right now: its active unit, if any.
    fn vertex_of(&self, record: &ProcessRecord) -> Vertex {
        self.build_vertex(
            record.identity(),
            record.agent(),
            record.unit(),
            record.namespace(),
        )
    }
}

fn merge_process(
    process: &ProcessIdentity,
    agent: Option<&AgentIdentity>,
    unit: Option<&UnitIdentity>,
    namespace: &NamespaceIdentity,
) -> Annotations {
    let mut annotations = process.annotations();
    if let Some(agent) = agent {
        annotations.extend(agent.annotations());
    }
    if let Some(unit) = unit {
        annotations.remove(annotation::SEEN_TIME);
        annotations.extend(unit.annotations());
    }
    annotations.extend(namespace.annotations());
    annotations
}

/// The edge tying a unit vertex to the process hosting it.
pub fn unit_edge(unit_vertex: Vertex, process_vertex: Vertex, unit: &UnitIdentity) -> Edge {
    Edge::triggered_by(
        unit_vertex,
        process_vertex,
        crate::event::OPERATION_UNIT,
        Stamp::new(
            unit.start_time.as_str(),
            unit.event_id.as_deref().unwrap_or("0"),
            crate::SOURCE_BEEP,
        ),
    )
}
