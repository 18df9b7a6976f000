use crate::identity::{AgentIdentity, NamespaceIdentity, ProcessIdentity, UnitIdentity};

use serde::{Deserialize, Serialize};

use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Lifecycle {
    Live,
    /// The process is gone but its unit history is kept for late dependency lookups.
    PartiallyCleaned,
}

/// An (agent, namespace) pairing that has already been drawn for a record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Seen {
    pub agent: Option<AgentIdentity>,
    pub namespace: NamespaceIdentity,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeenSets {
    pub process: HashSet<Seen>,
    pub unit: HashSet<Seen>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessRecord {
    identity: ProcessIdentity,
    agent: Option<AgentIdentity>,
    namespace: NamespaceIdentity,
    unit: Option<UnitIdentity>,
    #[serde(with = "unit_agents")]
    unit_agents: HashMap<UnitIdentity, AgentIdentity>,
    had_units: bool,
    thread_group: String,
    lifecycle: Lifecycle,
    seen: SeenSets,
}

impl ProcessRecord {
    pub fn new(
        identity: ProcessIdentity,
        agent: AgentIdentity,
        namespace: NamespaceIdentity,
        thread_group: String,
    ) -> Self {
        Self {
            identity,
            agent: Some(agent),
            namespace,
            unit: None,
            unit_agents: HashMap::new(),
            had_units: false,
            thread_group,
            lifecycle: Lifecycle::Live,
            seen: SeenSets::default(),
        }
    }

    pub fn identity(&self) -> &ProcessIdentity {
        &self.identity
    }

    pub fn agent(&self) -> Option<&AgentIdentity> {
        self.agent.as_ref()
    }

    pub fn namespace(&self) -> &NamespaceIdentity {
        &self.namespace
    }

    pub fn unit(&self) -> Option<&UnitIdentity> {
        self.unit.as_ref()
    }

    pub fn had_units(&self) -> bool {
        self.had_units
    }

    pub fn thread_group(&self) -> &str {
        &self.thread_group
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn seen(&self) -> &SeenSets {
        &self.seen
    }

    pub(crate) fn seen_mut(&mut self) -> &mut SeenSets {
        &mut self.seen
    }

    /// Also becomes the last known agent of the active unit.
    pub fn set_agent(&mut self, agent: AgentIdentity) {
        if let Some(unit) = &self.unit {
            self.unit_agents.insert(unit.clone(), agent.clone());
        }
        self.agent = Some(agent);
    }

    pub fn set_namespace(&mut self, namespace: NamespaceIdentity) {
        self.namespace = namespace;
    }

    /// Activates `unit`, leaving any active unit first. Returns the unit that was left.
    pub fn unit_enter(&mut self, unit: UnitIdentity) -> Option<UnitIdentity> {
        let previous = self.unit_exit();
        if let Some(agent) = &self.agent {
            self.unit_agents.insert(unit.clone(), agent.clone());
        }
        self.unit = Some(unit);
        self.had_units = true;
        previous
    }

    /// Drops the active unit pointer. Its agent history stays.
    pub fn unit_exit(&mut self) -> Option<UnitIdentity> {
        let previous = self.unit.take();
        if previous.is_some() {
            self.seen.unit.clear();
        }
        previous
    }

    pub fn agent_for_unit(&self, unit: &UnitIdentity) -> Option<&AgentIdentity> {
        self.unit_agents.get(unit)
    }

    pub fn partial_clean(&mut self) {
        self.agent = None;
        self.unit = None;
        self.seen = SeenSets::default();
        self.lifecycle = Lifecycle::PartiallyCleaned;
    }
}

mod unit_agents {
    use crate::identity::{AgentIdentity, UnitIdentity};

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use std::collections::HashMap;

    pub fn serialize<S>(
        map: &HashMap<UnitIdentity, AgentIdentity>,
        serializer: S,
    ) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let pairs: Vec<(&UnitIdentity, &AgentIdentity)> = map.iter().collect();
        pairs.serialize(serializer)
    }

    pub fn deserialize<'de, D>(
        deserializer: D,
    ) -> Result<HashMap<UnitIdentity, AgentIdentity>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let pairs = Vec::<(UnitIdentity, AgentIdentity)>::deserialize(deserializer)?;
        Ok(pairs.into_iter().collect())
    }
}
