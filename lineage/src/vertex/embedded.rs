use super::{merge_process, unit_edge, Edge, GraphSink, Stamp, Update, Vertex, VertexStrategy};
use crate::history::{ProcessRecord, Seen};
use crate::identity::{AgentIdentity, NamespaceIdentity, ProcessIdentity, UnitIdentity};

/// Agent annotations live inside the process and unit vertices.
///
/// A vertex is emitted the first time an (agent, namespace) pairing shows up for a
/// record in the process role or in the unit role; later occurrences only get edges.
#[derive(Debug, Default)]
pub struct EmbeddedAgent;

impl EmbeddedAgent {
    pub fn new() -> Self {
        Self
    }
}

impl VertexStrategy for EmbeddedAgent {
    fn build_vertex(
        &self,
        process: &ProcessIdentity,
        agent: Option<&AgentIdentity>,
        unit: Option<&UnitIdentity>,
        namespace: &NamespaceIdentity,
    ) -> Vertex {
        Vertex::process(merge_process(process, agent, unit, namespace))
    }

    fn put_process(
        &mut self,
        record: &mut ProcessRecord,
        _stamp: &Stamp,
        sink: &mut dyn GraphSink,
    ) -> Vertex {
        let vertex = self.build_vertex(
            record.identity(),
            record.agent(),
            None,
            record.namespace(),
        );
        let seen = Seen {
            agent: record.agent().cloned(),
            namespace: record.namespace().clone(),
        };
        if record.seen_mut().process.insert(seen) {
            sink.put_vertex(vertex.clone());
        }
        vertex
    }

    fn put_unit(
        &mut self,
        record: &mut ProcessRecord,
        _stamp: &Stamp,
        sink: &mut dyn GraphSink,
    ) -> Option<Vertex> {
        let unit = record.unit()?;
        let vertex = self.build_vertex(
            record.identity(),
            record.agent(),
            Some(unit),
            record.namespace(),
        );
        let seen = Seen {
            agent: record.agent().cloned(),
            namespace: record.namespace().clone(),
        };
        if record.seen_mut().unit.insert(seen) {
            sink.put_vertex(vertex.clone());
        }
        Some(vertex)
    }

    fn update(
        &mut self,
        record: &mut ProcessRecord,
        update: Update,
        operation: &str,
        stamp: &Stamp,
        sink: &mut dyn GraphSink,
    ) {
        let old_agent = record.agent().cloned();
        let old_namespace = record.namespace().clone();
        let (new_agent, new_namespace) = match &update {
            Update::Agent(agent) => (Some(agent.clone()), old_namespace.clone()),
            Update::Namespace(namespace) => (old_agent.clone(), namespace.clone()),
        };
        let identity = record.identity().clone();
        let build = |agent: &Option<AgentIdentity>,
                     unit: Option<&UnitIdentity>,
                     namespace: &NamespaceIdentity| {
            self.build_vertex(&identity, agent.as_ref(), unit, namespace)
        };

        let old_process = build(&old_agent, None, &old_namespace);
        let new_process = build(&new_agent, None, &new_namespace);
        let seen = Seen {
            agent: new_agent.clone(),
            namespace: new_namespace.clone(),
        };

        if record.seen_mut().process.insert(seen.clone()) {
            sink.put_vertex(new_process.clone());
        }
        sink.put_edge(Edge::triggered_by(
            new_process.clone(),
            old_process,
            operation,
            stamp.clone(),
        ));

        if let Some(unit) = record.unit().cloned() {
            let old_unit = build(&old_agent, Some(&unit), &old_namespace);
            let new_unit = build(&new_agent, Some(&unit), &new_namespace);

            if record.seen_mut().unit.insert(seen) {
                sink.put_vertex(new_unit.clone());
            }
            sink.put_edge(Edge::triggered_by(
                new_unit.clone(),
                old_unit,
                operation,
                stamp.clone(),
            ));
            sink.put_edge(unit_edge(new_unit, new_process, &unit));
        }

        match update {
            Update::Agent(agent) => record.set_agent(agent),
            Update::Namespace(namespace) => record.set_namespace(namespace),
        }
    }

    fn clear(&mut self) {}
}
