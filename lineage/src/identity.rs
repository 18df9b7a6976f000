
use crate::config::{AgentDetail, Config};
use crate::event::{fields, Event};

use serde::{Deserialize, Serialize};

use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};
use std::hash::{Hash, Hasher};

pub type Annotations = BTreeMap<String, String>;

pub mod annotation {
    pub const SOURCE: &str = "source";

    pub const PID: &str = "pid";
    pub const PPID: &str = "ppid";
    pub const NAME: &str = "name";
    pub const CWD: &str = "cwd";
    pub const COMMAND_LINE: &str = "command line";
    pub const START_TIME: &str = "start time";
    pub const SEEN_TIME: &str = "seen time";
    pub const NS_PID: &str = "ns pid";
    pub const EXE: &str = "exe";
    pub const UNIT: &str = "unit";
    pub const ITERATION: &str = "iteration";
    pub const COUNT: &str = "count";

    pub const UID: &str = "uid";
    pub const EUID: &str = "euid";
    pub const SUID: &str = "suid";
    pub const FSUID: &str = "fsuid";
    pub const GID: &str = "gid";
    pub const EGID: &str = "egid";
    pub const SGID: &str = "sgid";
    pub const FSGID: &str = "fsgid";

    pub const NS_MOUNT: &str = "mount namespace";
    pub const NS_USER: &str = "user namespace";
    pub const NS_NET: &str = "net namespace";
    pub const NS_PID_INUM: &str = "pid namespace";
    pub const NS_PID_CHILDREN: &str = "pid children namespace";
    pub const NS_IPC: &str = "ipc namespace";
    pub const NS_CGROUP: &str = "cgroup namespace";
}

fn put(map: &mut Annotations, key: &str, value: &Option<String>) {
    if let Some(value) = value {
        map.insert(key.to_string(), value.clone());
    }
}

/// When a process came into view. A process either was seen being created or was
/// first observed mid-lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProcessTime {
    Start(String),
    Seen(String),
}

impl ProcessTime {
    pub fn as_str(&self) -> &str {
        match self {
            ProcessTime::Start(t) | ProcessTime::Seen(t) => t,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProcessIdentity {
    pub pid: String,
    pub ppid: Option<String>,
    pub name: Option<String>,
    pub cwd: Option<String>,
    pub command_line: Option<String>,
    pub time: Option<ProcessTime>,
    pub ns_pid: Option<String>,
    pub exe: Option<String>,
    pub unit_id: Option<String>,
    pub source: String,
}

impl ProcessIdentity {
    /// Placeholder identity for a process whose creation was never observed.
    pub fn seen_from(event: &Event, config: &Config, source: &str) -> Option<Self> {
        Some(Self {
            pid: event.pid()?.to_string(),
            ppid: event.owned(fields::PPID),
            name: event.owned(fields::COMM),
            cwd: event.owned(fields::CWD),
            command_line: None,
            time: event.owned(fields::TIME).map(ProcessTime::Seen),
            ns_pid: event.owned(fields::NS_PID),
            exe: event.owned(fields::EXE),
            unit_id: config.unit_id(),
            source: source.to_string(),
        })
    }

    pub fn start_time(&self) -> Option<&str> {
        match &self.time {
            Some(ProcessTime::Start(t)) => Some(t),
            _ => None,
        }
    }

    pub fn seen_time(&self) -> Option<&str> {
        match &self.time {
            Some(ProcessTime::Seen(t)) => Some(t),
            _ => None,
        }
    }

    pub fn annotations(&self) -> Annotations {
        use annotation::*;

        let mut map = Annotations::new();
        map.insert(PID.to_string(), self.pid.clone());
        put(&mut map, PPID, &self.ppid);
        put(&mut map, NAME, &self.name);
        put(&mut map, CWD, &self.cwd);
        put(&mut map, COMMAND_LINE, &self.command_line);
        match &self.time {
            Some(ProcessTime::Start(t)) => {
                map.insert(START_TIME.to_string(), t.clone());
            }
            Some(ProcessTime::Seen(t)) => {
                map.insert(SEEN_TIME.to_string(), t.clone());
            }
            None => (),
        }
        put(&mut map, NS_PID, &self.ns_pid);
        put(&mut map, EXE, &self.exe);
        put(&mut map, UNIT, &self.unit_id);
        map.insert(SOURCE.to_string(), self.source.clone());
        map
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgentIdentity {
    pub uid: Option<String>,
    pub euid: Option<String>,
    pub gid: Option<String>,
    pub egid: Option<String>,
    pub suid: Option<String>,
    pub fsuid: Option<String>,
    pub sgid: Option<String>,
    pub fsgid: Option<String>,
}

impl AgentIdentity {
    pub fn simple<S: Into<String>>(uid: S, euid: S, gid: S, egid: S) -> Self {
        Self {
            uid: Some(uid.into()),
            euid: Some(euid.into()),
            gid: Some(gid.into()),
            egid: Some(egid.into()),
            ..Self::default()
        }
    }

    pub fn from_event(event: &Event, detail: AgentDetail) -> Self {
        let mut agent = Self {
            uid: event.owned(fields::UID),
            euid: event.owned(fields::EUID),
            gid: event.owned(fields::GID),
            egid: event.owned(fields::EGID),
            ..Self::default()
        };
        if let AgentDetail::Complete = detail {
            agent.suid = event.owned(fields::SUID);
            agent.fsuid = event.owned(fields::FSUID);
            agent.sgid = event.owned(fields::SGID);
            agent.fsgid = event.owned(fields::FSGID);
        }
        agent
    }

    pub fn annotations(&self) -> Annotations {
        use annotation::*;

        let mut map = Annotations::new();
        put(&mut map, UID, &self.uid);
        put(&mut map, EUID, &self.euid);
        put(&mut map, GID, &self.gid);
        put(&mut map, EGID, &self.egid);
        put(&mut map, SUID, &self.suid);
        put(&mut map, FSUID, &self.fsuid);
        put(&mut map, SGID, &self.sgid);
        put(&mut map, FSGID, &self.fsgid);
        map
    }
}

/// Namespace inode numbers. All fields absent when namespaces are not tracked.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NamespaceIdentity {
    pub mount: Option<String>,
    pub user: Option<String>,
    pub net: Option<String>,
    pub pid: Option<String>,
    pub pid_children: Option<String>,
    pub ipc: Option<String>,
    pub cgroup: Option<String>,
}

impl NamespaceIdentity {
    pub fn from_event(event: &Event, config: &Config) -> Self {
        if !config.namespaces {
            return Self::default();
        }
        Self {
            mount: event.owned(fields::NS_MNT),
            user: event.owned(fields::NS_USR),
            net: event.owned(fields::NS_NET),
            pid: event.owned(fields::NS_PID_INUM),
            pid_children: event.owned(fields::NS_PID_CHILDREN),
            ipc: event.owned(fields::NS_IPC),
            cgroup: event.owned(fields::NS_CGROUP),
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn annotations(&self) -> Annotations {
        use annotation::*;

        let mut map = Annotations::new();
        put(&mut map, NS_MOUNT, &self.mount);
        put(&mut map, NS_USER, &self.user);
        put(&mut map, NS_NET, &self.net);
        put(&mut map, NS_PID_INUM, &self.pid);
        put(&mut map, NS_PID_CHILDREN, &self.pid_children);
        put(&mut map, NS_IPC, &self.ipc);
        put(&mut map, NS_CGROUP, &self.cgroup);
        map
    }
}

/// A sub-process partition of work layered on a process.
///
/// Two units are equal when id, iteration, count and start time match; the event that
/// introduced the unit is carried along but does not take part in equality.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitIdentity {
    pub id: String,
    pub iteration: String,
    pub count: String,
    pub start_time: String,
    pub event_id: Option<String>,
}

impl UnitIdentity {
    pub fn new<S: Into<String>>(id: S, iteration: S, count: S, start_time: S) -> Self {
        Self {
            id: id.into(),
            iteration: iteration.into(),
            count: count.into(),
            start_time: start_time.into(),
            event_id: None,
        }
    }

    pub fn with_event_id<S: Into<String>>(mut self, event_id: Option<S>) -> Self {
        self.event_id = event_id.map(Into::into);
        self
    }

    /// Reads the unit fields, optionally suffixed (the writing side of a dependency
    /// record uses the suffix `0`).
    pub fn from_event(event: &Event, suffix: &str) -> Option<Self> {
        let field = |name: &str| event.owned(&format!("{}{}", name, suffix));
        Some(Self {
            id: field(fields::UNIT_ID)?,
            iteration: field(fields::UNIT_ITERATION)?,
            count: field(fields::UNIT_COUNT)?,
            start_time: field(fields::UNIT_TIME)?,
            event_id: None,
        })
    }

    pub fn annotations(&self) -> Annotations {
        use annotation::*;

        let mut map = Annotations::new();
        map.insert(UNIT.to_string(), self.id.clone());
        map.insert(ITERATION.to_string(), self.iteration.clone());
        map.insert(COUNT.to_string(), self.count.clone());
        map.insert(START_TIME.to_string(), self.start_time.clone());
        map.insert(SOURCE.to_string(), crate::SOURCE_BEEP.to_string());
        map
    }
}

impl PartialEq for UnitIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.iteration == other.iteration
            && self.count == other.count
            && self.start_time == other.start_time
    }
}

impl Eq for UnitIdentity {}

impl Hash for UnitIdentity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
        self.iteration.hash(state);
        self.count.hash(state);
        self.start_time.hash(state);
    }
}

/// (pid, disambiguating time). Survives pid reuse by the OS.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProcessKey {
    pub pid: String,
    pub time: Option<String>,
}

impl ProcessKey {
    pub fn new<S: Into<String>>(pid: S, time: Option<S>) -> Self {
        Self {
            pid: pid.into(),
            time: time.map(Into::into),
        }
    }

    /// Start time when known, otherwise the time of the key already active for the
    /// pid, otherwise the seen time.
    pub fn for_identity(process: &ProcessIdentity, active: Option<&ProcessKey>) -> Self {
        let time = match (&process.time, active) {
            (Some(ProcessTime::Start(t)), _) => Some(t.clone()),
            (_, Some(active)) if active.pid == process.pid => active.time.clone(),
            (Some(ProcessTime::Seen(t)), _) => Some(t.clone()),
            (None, _) => None,
        };
        Self {
            pid: process.pid.clone(),
            time,
        }
    }
}

impl Display for ProcessKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.time {
            Some(time) => write!(f, "{}@{}", self.pid, time),
            None => write!(f, "{}", self.pid),
        }
    }
}
