use super::{merge_process, unit_edge, Edge, GraphSink, Stamp, Update, Vertex, VertexStrategy};
use crate::history::{ProcessRecord, Seen};
use crate::identity::{annotation, AgentIdentity, NamespaceIdentity, ProcessIdentity, UnitIdentity};

use log::warn;

use std::collections::HashMap;

/// Agents are vertices of their own, linked to processes and units by controlled-by
/// edges. Each distinct agent is emitted once, tagged with the source it was first
/// seen from.
#[derive(Debug, Default)]
pub struct SeparateAgent {
    agent_sources: HashMap<AgentIdentity, String>,
}

impl SeparateAgent {
    pub fn new() -> Self {
        Self::default()
    }

    fn agent_vertex(agent: &AgentIdentity, source: &str) -> Vertex {
        let mut annotations = agent.annotations();
        annotations.insert(annotation::SOURCE.to_string(), source.to_string());
        Vertex::agent(annotations)
    }

    fn put_agent(
        &mut self,
        agent: &AgentIdentity,
        source: &str,
        sink: &mut dyn GraphSink,
    ) -> Vertex {
        match self.agent_sources.get(agent) {
            Some(first_source) => Self::agent_vertex(agent, first_source),
            None => {
                self.agent_sources.insert(agent.clone(), source.to_string());
                let vertex = Self::agent_vertex(agent, source);
                sink.put_vertex(vertex.clone());
                vertex
            }
        }
    }

    fn control(
        &mut self,
        vertex: Vertex,
        agent: Option<&AgentIdentity>,
        operation: Option<&str>,
        stamp: &Stamp,
        sink: &mut dyn GraphSink,
    ) {
        match agent {
            Some(agent) => {
                let agent = self.put_agent(agent, &stamp.source, sink);
                sink.put_edge(Edge::controlled_by(vertex, agent, operation, stamp.clone()));
            }
            None => warn!("No agent to attach to vertex {:?}", vertex.annotations),
        }
    }
}

impl VertexStrategy for SeparateAgent {
    fn build_vertex(
        &self,
        process: &ProcessIdentity,
        _agent: Option<&AgentIdentity>,
        unit: Option<&UnitIdentity>,
        namespace: &NamespaceIdentity,
    ) -> Vertex {
        Vertex::process(merge_process(process, None, unit, namespace))
    }

    fn put_process(
        &mut self,
        record: &mut ProcessRecord,
        stamp: &Stamp,
        sink: &mut dyn GraphSink,
    ) -> Vertex {
        let vertex = self.build_vertex(record.identity(), None, None, record.namespace());
        let seen = Seen {
            agent: None,
            namespace: record.namespace().clone(),
        };
        if record.seen_mut().process.insert(seen) {
            sink.put_vertex(vertex.clone());
        }
        self.control(vertex.clone(), record.agent(), None, stamp, sink);
        vertex
    }

    fn put_unit(
        &mut self,
        record: &mut ProcessRecord,
        stamp: &Stamp,
        sink: &mut dyn GraphSink,
    ) -> Option<Vertex> {
        let vertex = self.build_vertex(
            record.identity(),
            None,
            Some(record.unit()?),
            record.namespace(),
        );
        sink.put_vertex(vertex.clone());
        self.control(vertex.clone(), record.agent(), None, stamp, sink);
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
        let identity = record.identity().clone();
        let unit = record.unit().cloned();

        match update {
            Update::Agent(agent) => {
                let namespace = record.namespace();
                let process = self.build_vertex(&identity, None, None, namespace);
                let unit_vertex = unit
                    .as_ref()
                    .map(|unit| self.build_vertex(&identity, None, Some(unit), namespace));

                self.control(process, Some(&agent), Some(operation), stamp, sink);
                if let Some(unit_vertex) = unit_vertex {
                    self.control(unit_vertex, Some(&agent), Some(operation), stamp, sink);
                }
                record.set_agent(agent);
            }
            Update::Namespace(namespace) => {
                let old_namespace = record.namespace().clone();
                let old_process = self.build_vertex(&identity, None, None, &old_namespace);
                let new_process = self.build_vertex(&identity, None, None, &namespace);

                let seen = Seen {
                    agent: None,
                    namespace: namespace.clone(),
                };
                if record.seen_mut().process.insert(seen) {
                    sink.put_vertex(new_process.clone());
                }
                sink.put_edge(Edge::triggered_by(
                    new_process.clone(),
                    old_process,
                    operation,
                    stamp.clone(),
                ));

                if let Some(unit) = unit {
                    let old_unit = self.build_vertex(&identity, None, Some(&unit), &old_namespace);
                    let new_unit = self.build_vertex(&identity, None, Some(&unit), &namespace);
                    sink.put_vertex(new_unit.clone());
                    sink.put_edge(Edge::triggered_by(
                        new_unit.clone(),
                        old_unit,
                        operation,
                        stamp.clone(),
                    ));
                    sink.put_edge(unit_edge(new_unit, new_process, &unit));
                }
                record.set_namespace(namespace);
            }
        }
    }

    fn clear(&mut self) {
        self.agent_sources.clear();
    }
}
