//! The process lifecycle state machine.
//!
//! One event is fully handled before the next one is accepted. Records live in the
//! [`ProcessTable`], sharing state in the [`ProcessStateStore`], and vertices leave
//! through the [`GraphSink`] as the [`VertexStrategy`] decides.

#[cfg(test)]
mod tests;

use crate::config::Config;
use crate::event::{fields, Event, Syscall, OPERATION_UNIT_DEPENDENCY, OPERATION_UNKNOWN};
use crate::flags::CloneFlags;
use crate::history::{HistoryStore, ProcessRecord, ProcessTable};
use crate::identity::*;
use crate::procfs;
use crate::state::{FileDescriptor, ProcessStateStore};
use crate::vertex::{
    EmbeddedAgent, Edge, GraphSink, SeparateAgent, Stamp, Update, Vertex, VertexStrategy,
};
use crate::{Result, SOURCE_BEEP, SOURCE_PROCFS, SOURCE_SYSCALL};

use log::{debug, info, warn};

use std::collections::HashMap;
use std::path::Path;

/// One side of a unit dependency: the unit as it ran inside a specific thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitRef {
    pub pid: String,
    pub thread_start_time: String,
    pub unit: UnitIdentity,
}

impl UnitRef {
    fn from_event(event: &Event, suffix: &str) -> Option<Self> {
        let field = |name: &str| event.owned(&format!("{}{}", name, suffix));
        Some(Self {
            pid: field(fields::UNIT_PID)?,
            thread_start_time: field(fields::UNIT_THREAD_START_TIME)?,
            unit: UnitIdentity::from_event(event, suffix)?,
        })
    }

    fn key(&self) -> ProcessKey {
        ProcessKey::new(self.pid.as_str(), Some(self.thread_start_time.as_str()))
    }

    fn has_valid_times(&self) -> bool {
        self.thread_start_time.trim().parse::<f64>().is_ok()
            && self.unit.start_time.trim().parse::<f64>().is_ok()
    }
}

/// Data flowed from the writing unit into the reading unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitDependency {
    pub reading: UnitRef,
    pub writing: UnitRef,
}

impl UnitDependency {
    pub fn from_event(event: &Event) -> Option<Self> {
        Some(Self {
            reading: UnitRef::from_event(event, "")?,
            writing: UnitRef::from_event(event, fields::WRITER_SUFFIX)?,
        })
    }
}

fn stamp(event: &Event, source: &str) -> Stamp {
    Stamp::new(
        event.time().unwrap_or_default(),
        event.event_id().unwrap_or_default(),
        source,
    )
}

/// A child pid of zero or below means the creation failed.
fn is_valid_child(pid: &str) -> bool {
    pid.trim().parse::<i64>().map_or(false, |pid| pid > 0)
}

pub struct Engine<S, K> {
    config: Config,
    table: ProcessTable<S>,
    states: ProcessStateStore,
    strategy: Box<dyn VertexStrategy>,
    sink: K,
}

impl<S: HistoryStore, K: GraphSink> Engine<S, K> {
    pub fn new(config: Config, store: S, sink: K) -> Self {
        let strategy: Box<dyn VertexStrategy> = if config.agent_vertices {
            Box::new(SeparateAgent::new())
        } else {
            Box::new(EmbeddedAgent::new())
        };
        Self::with_strategy(config, store, sink, strategy)
    }

    pub fn with_strategy(
        config: Config,
        store: S,
        sink: K,
        strategy: Box<dyn VertexStrategy>,
    ) -> Self {
        Self {
            config,
            table: ProcessTable::new(store),
            states: ProcessStateStore::new(),
            strategy,
            sink,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut K {
        &mut self.sink
    }

    pub fn table(&self) -> &ProcessTable<S> {
        &self.table
    }

    pub fn states(&mut self) -> &mut ProcessStateStore {
        &mut self.states
    }

    pub fn handle(&mut self, syscall: Syscall, event: &Event) -> Result<bool> {
        match syscall {
            Syscall::Fork | Syscall::Vfork | Syscall::Clone => {
                self.handle_fork_vfork_clone(syscall, event)
            }
            Syscall::Execve => self.handle_execve(event),
            Syscall::Exit => self.handle_exit(event, false, true),
            Syscall::ExitGroup => self.handle_exit(event, true, true),
            Syscall::Setuid
            | Syscall::Setreuid
            | Syscall::Setresuid
            | Syscall::Setfsuid
            | Syscall::Setgid
            | Syscall::Setregid
            | Syscall::Setresgid
            | Syscall::Setfsgid => self.handle_credential_update(syscall, event),
            Syscall::Setns | Syscall::Unshare => self.handle_namespace_update(syscall, event),
            Syscall::Unit => self.handle_unit_entry(event),
            Syscall::UnitExit => self.handle_unit_exit(event),
            Syscall::UnitDependency => match UnitDependency::from_event(event) {
                Some(dependency) => self.handle_unit_dependency(&dependency),
                None => {
                    info!("Incomplete unit dependency event {:?}", event.event_id());
                    Ok(false)
                }
            },
            Syscall::Update => Ok(self.sync_process(event)?.is_some()),
        }
    }

    fn agent(&self, event: &Event) -> AgentIdentity {
        AgentIdentity::from_event(event, self.config.agents)
    }

    fn namespace(&self, event: &Event) -> NamespaceIdentity {
        NamespaceIdentity::from_event(event, &self.config)
    }

    /// Creates, stores, activates and draws a new record.
    fn create(
        &mut self,
        identity: ProcessIdentity,
        agent: AgentIdentity,
        namespace: NamespaceIdentity,
        thread_group: String,
        stamp: &Stamp,
    ) -> Result<(ProcessKey, Vertex)> {
        let key = self.table.key_for(&identity);
        let mut record = ProcessRecord::new(identity, agent, namespace, thread_group);
        let vertex = self
            .strategy
            .put_process(&mut record, stamp, &mut self.sink);
        self.table.insert(key.clone(), record)?;
        Ok((key, vertex))
    }

    /// Confirms the process of `event` exists, synthesizing it from the event when it
    /// was never seen. Draws an update only when the agent actually changed. Returns the
    /// vertex currently standing for the process.
    pub fn sync_process(&mut self, event: &Event) -> Result<Option<Vertex>> {
        let pid = match event.pid() {
            Some(pid) => pid,
            None => {
                warn!("Event {:?} carries no pid", event.event_id());
                return Ok(None);
            }
        };
        let agent = self.agent(event);

        match self.table.active_record(pid)? {
            Some((key, mut record)) => {
                if record.agent() != Some(&agent) {
                    self.strategy.update(
                        &mut record,
                        Update::Agent(agent),
                        crate::event::OPERATION_UPDATE,
                        &stamp(event, SOURCE_SYSCALL),
                        &mut self.sink,
                    );
                }
                let vertex = self.strategy.vertex_of(&record);
                self.table.put(key, record)?;
                Ok(Some(vertex))
            }
            None => {
                let identity = match ProcessIdentity::seen_from(event, &self.config, SOURCE_SYSCALL)
                {
                    Some(identity) => identity,
                    None => return Ok(None),
                };
                debug!("Synthesizing unseen process {}", pid);
                let namespace = self.namespace(event);
                let thread_group = pid.to_string();
                let (_, vertex) = self.create(
                    identity,
                    agent,
                    namespace,
                    thread_group,
                    &stamp(event, SOURCE_SYSCALL),
                )?;
                Ok(Some(vertex))
            }
        }
    }

    /// Drops the active mapping of the key's pid. The record is deleted unless it hosted
    /// units, in which case it is partially cleaned and kept.
    fn retire(&mut self, key: &ProcessKey) -> Result<()> {
        if self.table.is_active(key) {
            self.table.deactivate(&key.pid);
        }
        match self.table.get(key)? {
            Some(mut record) if record.had_units() => {
                debug!("Partially cleaning {}", key);
                record.partial_clean();
                self.table.put(key.clone(), record)
            }
            Some(_) => {
                self.table.remove(key)?;
                Ok(())
            }
            None => Ok(()),
        }
    }

    /// Retires whatever is currently running as `pid`, leaving its thread group.
    fn retire_pid(&mut self, pid: &str) -> Result<()> {
        self.states.on_exit(pid);
        if let Some((key, record)) = self.table.active_record(pid)? {
            self.table.leave_thread_group(record.thread_group(), &key);
            self.retire(&key)?;
        } else {
            self.table.deactivate(pid);
        }
        Ok(())
    }

    pub fn handle_execve(&mut self, event: &Event) -> Result<bool> {
        let old_vertex = match self.sync_process(event)? {
            Some(vertex) => vertex,
            None => return Ok(false),
        };
        let pid = match event.pid() {
            Some(pid) => pid.to_string(),
            None => return Ok(false),
        };

        if let Some((key, record)) = self.table.active_record(&pid)? {
            self.table.leave_thread_group(record.thread_group(), &key);
            self.retire(&key)?;
        }
        self.states.on_exec(&pid);

        let identity = ProcessIdentity {
            pid: pid.clone(),
            ppid: event.owned(fields::PPID),
            name: event.owned(fields::COMM),
            cwd: event.owned(fields::CWD),
            command_line: event.command_line(),
            time: event.owned(fields::TIME).map(ProcessTime::Start),
            ns_pid: event.owned(fields::NS_PID),
            exe: event.owned(fields::EXE),
            unit_id: self.config.unit_id(),
            source: SOURCE_SYSCALL.to_string(),
        };
        let agent = self.agent(event);
        let namespace = self.namespace(event);
        let stamp = stamp(event, SOURCE_SYSCALL);
        let (_, new_vertex) = self.create(identity, agent, namespace, pid, &stamp)?;

        self.sink.put_edge(Edge::triggered_by(
            new_vertex,
            old_vertex,
            Syscall::Execve.operation(),
            stamp,
        ));
        Ok(true)
    }

    pub fn handle_fork_vfork_clone(&mut self, syscall: Syscall, event: &Event) -> Result<bool> {
        let flags = CloneFlags::parse(event.get(fields::ARG0));
        let creation = match syscall {
            Syscall::Clone => flags.classify(),
            other => other,
        };

        let parent_pid = match event.pid() {
            Some(pid) => pid.to_string(),
            None => return Ok(false),
        };
        let child_field = if self.config.namespaces && event.get(fields::HOST_EXIT).is_some() {
            fields::HOST_EXIT
        } else {
            fields::EXIT
        };
        let child_pid = match event.get(child_field) {
            Some(pid) if is_valid_child(pid) => pid.trim().to_string(),
            other => {
                debug!("No child created by {} of {}: {:?}", syscall, parent_pid, other);
                return Ok(false);
            }
        };

        let parent_vertex = match self.sync_process(event)? {
            Some(vertex) => vertex,
            None => return Ok(false),
        };

        self.retire_pid(&child_pid)?;

        let (parent_key, parent) = match self.table.active_record(&parent_pid)? {
            Some(active) => active,
            None => return Ok(false),
        };
        let parent_identity = parent.identity();

        let identity = ProcessIdentity {
            pid: child_pid.clone(),
            ppid: Some(parent_pid.clone()),
            name: event
                .owned(fields::COMM)
                .or_else(|| parent_identity.name.clone()),
            cwd: event
                .owned(fields::CWD)
                .or_else(|| parent_identity.cwd.clone()),
            command_line: parent_identity.command_line.clone(),
            time: event.owned(fields::TIME).map(ProcessTime::Start),
            ns_pid: if child_field == fields::HOST_EXIT {
                event.owned(fields::EXIT)
            } else {
                None
            },
            exe: parent_identity.exe.clone(),
            unit_id: self.config.unit_id(),
            source: SOURCE_SYSCALL.to_string(),
        };

        let thread = creation == Syscall::Clone && flags.is_thread();
        let thread_group = if thread {
            parent.thread_group().to_string()
        } else {
            child_pid.clone()
        };

        let agent = self.agent(event);
        let namespace = self.namespace(event);
        let stamp = stamp(event, SOURCE_SYSCALL);
        let (child_key, child_vertex) =
            self.create(identity, agent, namespace, thread_group.clone(), &stamp)?;

        if thread {
            if self.table.thread_group(&thread_group).is_none() {
                let leader = if parent_key.pid == thread_group {
                    Some(parent_key)
                } else {
                    self.table.active_key(&thread_group).cloned()
                };
                if let Some(leader) = leader {
                    self.table.join_thread_group(&thread_group, leader);
                }
            }
            self.table.join_thread_group(&thread_group, child_key);
        }

        match creation {
            Syscall::Fork => self.states.on_fork(&parent_pid, &child_pid),
            Syscall::Vfork => self.states.on_vfork(&parent_pid, &child_pid),
            _ => self.states.on_clone(
                &parent_pid,
                &child_pid,
                flags.link_fds(),
                flags.share_memory(),
                flags.share_fs(),
            ),
        }

        let mut edge = Edge::triggered_by(child_vertex, parent_vertex, creation.operation(), stamp);
        if syscall == Syscall::Clone {
            edge = edge.with_flags(flags.render());
        }
        self.sink.put_edge(edge);
        Ok(true)
    }

    /// Explicit credential changes are always drawn, even when the agent is unchanged.
    pub fn handle_credential_update(&mut self, syscall: Syscall, event: &Event) -> Result<bool> {
        if syscall.is_fs_credential() && !self.config.fs_credentials {
            return Ok(true);
        }
        let pid = match event.pid() {
            Some(pid) => pid,
            None => return Ok(false),
        };

        if self.table.active_key(pid).is_none() && self.sync_process(event)?.is_none() {
            return Ok(false);
        }
        let agent = self.agent(event);
        self.update(pid, Update::Agent(agent), syscall.operation(), event)
    }

    pub fn handle_namespace_update(&mut self, syscall: Syscall, event: &Event) -> Result<bool> {
        let pid = match event.pid() {
            Some(pid) => pid,
            None => return Ok(false),
        };
        if self.sync_process(event)?.is_none() {
            return Ok(false);
        }
        if !self.config.namespaces {
            return Ok(true);
        }
        let namespace = self.namespace(event);
        self.update(pid, Update::Namespace(namespace), syscall.operation(), event)
    }

    fn update(&mut self, pid: &str, update: Update, operation: &str, event: &Event) -> Result<bool> {
        match self.table.active_record(pid)? {
            Some((key, mut record)) => {
                self.strategy.update(
                    &mut record,
                    update,
                    operation,
                    &stamp(event, SOURCE_SYSCALL),
                    &mut self.sink,
                );
                self.table.put(key, record)?;
                Ok(true)
            }
            None => {
                info!("Tried to update process {} without seeing it", pid);
                Ok(false)
            }
        }
    }

    /// Exits are strict no-ops for processes that are not currently known. With
    /// `emit_edge` unset the process is retired without drawing its exit self-loop.
    pub fn handle_exit(&mut self, event: &Event, group: bool, emit_edge: bool) -> Result<bool> {
        let pid = match event.pid() {
            Some(pid) => pid,
            None => return Ok(false),
        };
        let (key, record) = match self.table.active_record(pid)? {
            Some(active) => active,
            None => {
                self.states.on_exit(pid);
                self.table.deactivate(pid);
                debug!("Exit of unknown process {}", pid);
                return Ok(false);
            }
        };

        if emit_edge {
            let vertex = self.strategy.vertex_of(&record);
            let operation = if group {
                Syscall::ExitGroup.operation()
            } else {
                Syscall::Exit.operation()
            };
            self.sink.put_edge(Edge::triggered_by(
                vertex.clone(),
                vertex,
                operation,
                stamp(event, SOURCE_SYSCALL),
            ));
        }

        self.exit(&key, record.thread_group(), group)?;
        Ok(true)
    }

    fn exit(&mut self, key: &ProcessKey, thread_group: &str, group: bool) -> Result<()> {
        self.states.on_exit(&key.pid);

        if group {
            let members = self.table.take_thread_group(thread_group).unwrap_or_default();
            for member in &members {
                if self.table.is_active(member) {
                    self.table.deactivate(&member.pid);
                    self.states.on_exit(&member.pid);
                }
                self.table.remove(member)?;
            }
            if !members.contains(key) {
                self.retire(key)?;
            }
            self.table.deactivate(&key.pid);
        } else if self.table.leave_thread_group(thread_group, key) {
            self.retire(key)?;
        } else {
            self.table.deactivate(&key.pid);
            self.table.remove(key)?;
        }
        Ok(())
    }

    pub fn handle_unit_entry(&mut self, event: &Event) -> Result<bool> {
        let pid = match event.pid() {
            Some(pid) => pid,
            None => return Ok(false),
        };
        let unit = match UnitIdentity::from_event(event, "") {
            Some(unit) => unit.with_event_id(event.event_id()),
            None => {
                info!("Incomplete unit entry for process {}", pid);
                return Ok(false);
            }
        };

        if let Some((key, mut record)) = self.table.active_record(pid)? {
            if record.unit_exit().is_some() {
                self.table.put(key, record)?;
            }
        }

        let process_vertex = match self.sync_process(event)? {
            Some(vertex) => vertex,
            None => return Ok(false),
        };
        let (key, mut record) = match self.table.active_record(pid)? {
            Some(active) => active,
            None => return Ok(false),
        };

        record.unit_enter(unit);
        let stamp = stamp(event, SOURCE_BEEP);
        let unit_vertex = self
            .strategy
            .put_unit(&mut record, &stamp, &mut self.sink);
        self.table.put(key, record)?;

        if let Some(unit_vertex) = unit_vertex {
            self.sink.put_edge(Edge::triggered_by(
                unit_vertex,
                process_vertex,
                Syscall::Unit.operation(),
                stamp,
            ));
        }
        Ok(true)
    }

    /// Returns whether a unit was active.
    pub fn handle_unit_exit(&mut self, event: &Event) -> Result<bool> {
        let pid = match event.pid() {
            Some(pid) => pid,
            None => return Ok(false),
        };
        match self.table.active_record(pid)? {
            Some((key, mut record)) => match record.unit_exit() {
                Some(_) => {
                    self.table.put(key, record)?;
                    Ok(true)
                }
                None => Ok(false),
            },
            None => Ok(false),
        }
    }

    fn historical_unit(&mut self, side: &UnitRef) -> Result<Option<Vertex>> {
        let record = match self.table.get(&side.key())? {
            Some(record) => record,
            None => {
                info!("No history for {} in unit dependency", side.key());
                return Ok(None);
            }
        };
        let agent = match record.agent_for_unit(&side.unit) {
            Some(agent) => agent,
            None => {
                info!("No agent known for unit {:?} of {}", side.unit, side.key());
                return Ok(None);
            }
        };
        Ok(Some(self.strategy.build_vertex(
            record.identity(),
            Some(agent),
            Some(&side.unit),
            record.namespace(),
        )))
    }

    /// Best effort: missing history yields no edge and no error.
    pub fn handle_unit_dependency(&mut self, dependency: &UnitDependency) -> Result<bool> {
        if !dependency.reading.has_valid_times() || !dependency.writing.has_valid_times() {
            info!("Unparseable time in unit dependency {:?}", dependency);
            return Ok(false);
        }
        let reading = match self.historical_unit(&dependency.reading)? {
            Some(vertex) => vertex,
            None => return Ok(false),
        };
        let writing = match self.historical_unit(&dependency.writing)? {
            Some(vertex) => vertex,
            None => return Ok(false),
        };
        self.sink.put_edge(Edge::triggered_by(
            reading,
            writing,
            OPERATION_UNIT_DEPENDENCY,
            Stamp::new("0", "0", SOURCE_BEEP),
        ));
        Ok(true)
    }

    /// Seeds records for processes already running, as listed under `root`.
    pub fn put_procfs_processes(&mut self, root: &Path) -> Result<usize> {
        let entries = procfs::scan(root)?;
        let stamp = Stamp::new("", "", SOURCE_PROCFS);
        let mut parents = HashMap::new();

        for entry in entries {
            let identity = entry.identity(&self.config);
            let agent = entry.agent(self.config.agents);
            self.retire_pid(&entry.pid)?;
            self.create(
                identity,
                agent,
                NamespaceIdentity::default(),
                entry.pid.clone(),
                &stamp,
            )?;
            for (fd, target) in &entry.fds {
                self.states
                    .set_fd(&entry.pid, fd, FileDescriptor::new(target.as_str(), None));
            }
            self.states.set_cwd(&entry.pid, entry.cwd.clone());
            parents.insert(entry.pid, entry.ppid);
        }

        for (pid, ppid) in &parents {
            let child = self.process_vertex(pid)?;
            let parent = self.process_vertex(ppid)?;
            if let (Some(child), Some(parent)) = (child, parent) {
                self.sink.put_edge(Edge::triggered_by(
                    child,
                    parent,
                    OPERATION_UNKNOWN,
                    stamp.clone(),
                ));
            }
        }
        info!("Seeded {} processes from {}", parents.len(), root.display());
        Ok(parents.len())
    }

    /// The vertex of the active process, or of its active unit.
    pub fn process_vertex(&mut self, pid: &str) -> Result<Option<Vertex>> {
        Ok(self
            .table
            .active_record(pid)?
            .map(|(_, record)| self.strategy.vertex_of(&record)))
    }

    pub fn record(&mut self, pid: &str) -> Result<Option<ProcessRecord>> {
        Ok(self.table.active_record(pid)?.map(|(_, record)| record))
    }

    pub fn record_by_key(&mut self, key: &ProcessKey) -> Result<Option<ProcessRecord>> {
        self.table.get(key)
    }

    pub fn active_key(&self, pid: &str) -> Option<&ProcessKey> {
        self.table.active_key(pid)
    }

    pub fn clear_all(&mut self) -> Result<()> {
        self.states.clear();
        self.strategy.clear();
        self.table.clear()
    }

    pub fn close(&mut self) -> Result<()> {
        self.table.close()
    }
}
