use std::collections::HashMap;
use std::fmt::{self, Display, Formatter};
use std::iter::FromIterator;
use std::str::FromStr;

pub mod fields {
    pub const PID: &str = "pid";
    pub const PPID: &str = "ppid";
    pub const COMM: &str = "comm";
    pub const CWD: &str = "cwd";
    pub const EXE: &str = "exe";
    pub const TIME: &str = "time";
    pub const EVENT_ID: &str = "eventid";
    pub const ARG0: &str = "a0";
    pub const EXIT: &str = "exit";
    pub const HOST_EXIT: &str = "host_exit";
    pub const NS_PID: &str = "ns_pid";

    pub const UID: &str = "uid";
    pub const EUID: &str = "euid";
    pub const SUID: &str = "suid";
    pub const FSUID: &str = "fsuid";
    pub const GID: &str = "gid";
    pub const EGID: &str = "egid";
    pub const SGID: &str = "sgid";
    pub const FSGID: &str = "fsgid";

    pub const EXECVE_ARGC: &str = "execve_argc";
    pub const EXECVE_PREFIX: &str = "execve_";

    pub const NS_MNT: &str = "ns_inum_mnt";
    pub const NS_USR: &str = "ns_inum_usr";
    pub const NS_NET: &str = "ns_inum_net";
    pub const NS_PID_INUM: &str = "ns_inum_pid";
    pub const NS_PID_CHILDREN: &str = "ns_inum_pid_children";
    pub const NS_IPC: &str = "ns_inum_ipc";
    pub const NS_CGROUP: &str = "ns_inum_cgroup";

    pub const UNIT_PID: &str = "unit_pid";
    pub const UNIT_THREAD_START_TIME: &str = "unit_thread_start_time";
    pub const UNIT_ID: &str = "unit_unitid";
    pub const UNIT_ITERATION: &str = "unit_iteration";
    pub const UNIT_COUNT: &str = "unit_count";
    pub const UNIT_TIME: &str = "unit_time";
    /// Appended to the unit fields to address the writing side of a dependency.
    pub const WRITER_SUFFIX: &str = "0";
}

/// One normalized audit event: field name to raw string value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Event {
    fields: HashMap<String, String>,
}

impl Event {
    pub fn new(fields: HashMap<String, String>) -> Self {
        Self { fields }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    pub fn owned(&self, key: &str) -> Option<String> {
        self.fields.get(key).cloned()
    }

    pub fn insert<K: Into<String>, V: Into<String>>(&mut self, key: K, value: V) {
        self.fields.insert(key.into(), value.into());
    }

    pub fn pid(&self) -> Option<&str> {
        self.get(fields::PID)
    }

    pub fn time(&self) -> Option<&str> {
        self.get(fields::TIME)
    }

    pub fn event_id(&self) -> Option<&str> {
        self.get(fields::EVENT_ID)
    }

    /// Joins `execve_a0 .. execve_a{argc-1}` with spaces. `None` when argc is absent or
    /// not a number. An argc past the highest argument present is clamped to it.
    pub fn command_line(&self) -> Option<String> {
        let argc: usize = self.get(fields::EXECVE_ARGC)?.trim().parse().ok()?;
        let arg_prefix = format!("{}a", fields::EXECVE_PREFIX);
        let present = self
            .fields
            .keys()
            .filter_map(|k| k.strip_prefix(arg_prefix.as_str())?.parse::<usize>().ok())
            .max()
            .map_or(0, |last| last + 1);
        let args: Vec<&str> = (0..argc.min(present))
            .map(|a| self.get(&format!("{}{}", arg_prefix, a)).unwrap_or(""))
            .collect();
        Some(args.join(" ").trim().to_string())
    }
}

impl<K, V> FromIterator<(K, V)> for Event
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl From<HashMap<String, String>> for Event {
    fn from(fields: HashMap<String, String>) -> Self {
        Self::new(fields)
    }
}

pub const OPERATION_CLONE: &str = "clone";
pub const OPERATION_EXECVE: &str = "execve";
pub const OPERATION_EXIT: &str = "exit";
pub const OPERATION_FORK: &str = "fork";
pub const OPERATION_SETGID: &str = "setgid";
pub const OPERATION_SETNS: &str = "setns";
pub const OPERATION_SETUID: &str = "setuid";
pub const OPERATION_UNIT: &str = "unit";
pub const OPERATION_UNIT_DEPENDENCY: &str = "unit dependency";
pub const OPERATION_UNKNOWN: &str = "unknown";
pub const OPERATION_UNSHARE: &str = "unshare";
pub const OPERATION_UPDATE: &str = "update";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Syscall {
    Fork,
    Vfork,
    Clone,
    Execve,
    Exit,
    ExitGroup,
    Setuid,
    Setreuid,
    Setresuid,
    Setfsuid,
    Setgid,
    Setregid,
    Setresgid,
    Setfsgid,
    Setns,
    Unshare,
    Unit,
    UnitExit,
    UnitDependency,
    Update,
}

impl Syscall {
    pub fn operation(self) -> &'static str {
        use Syscall::*;
        match self {
            Fork | Vfork => OPERATION_FORK,
            Clone => OPERATION_CLONE,
            Execve => OPERATION_EXECVE,
            Exit | ExitGroup => OPERATION_EXIT,
            Setuid | Setreuid | Setresuid | Setfsuid => OPERATION_SETUID,
            Setgid | Setregid | Setresgid | Setfsgid => OPERATION_SETGID,
            Setns => OPERATION_SETNS,
            Unshare => OPERATION_UNSHARE,
            Unit => OPERATION_UNIT,
            UnitDependency => OPERATION_UNIT_DEPENDENCY,
            Update => OPERATION_UPDATE,
            UnitExit => OPERATION_UNKNOWN,
        }
    }

    pub fn name(self) -> &'static str {
        use Syscall::*;
        match self {
            Fork => "fork",
            Vfork => "vfork",
            Clone => "clone",
            Execve => "execve",
            Exit => "exit",
            ExitGroup => "exit_group",
            Setuid => "setuid",
            Setreuid => "setreuid",
            Setresuid => "setresuid",
            Setfsuid => "setfsuid",
            Setgid => "setgid",
            Setregid => "setregid",
            Setresgid => "setresgid",
            Setfsgid => "setfsgid",
            Setns => "setns",
            Unshare => "unshare",
            Unit => "unit",
            UnitExit => "unit_exit",
            UnitDependency => "unit_dependency",
            Update => "update",
        }
    }

    pub fn is_fs_credential(self) -> bool {
        matches!(self, Syscall::Setfsuid | Syscall::Setfsgid)
    }
}

impl Display for Syscall {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownSyscall(pub String);

impl Display for UnknownSyscall {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "unknown syscall: {}", self.0)
    }
}

impl std::error::Error for UnknownSyscall {}

impl FromStr for Syscall {
    type Err = UnknownSyscall;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        use Syscall::*;
        let syscall = match s.trim().to_ascii_lowercase().as_str() {
            "fork" => Fork,
            "vfork" => Vfork,
            "clone" => Clone,
            "execve" => Execve,
            "exit" => Exit,
            "exit_group" => ExitGroup,
            "setuid" => Setuid,
            "setreuid" => Setreuid,
            "setresuid" => Setresuid,
            "setfsuid" => Setfsuid,
            "setgid" => Setgid,
            "setregid" => Setregid,
            "setresgid" => Setresgid,
            "setfsgid" => Setfsgid,
            "setns" => Setns,
            "unshare" => Unshare,
            "unit" => Unit,
            "unit_exit" => UnitExit,
            "unit_dependency" => UnitDependency,
            "update" => Update,
            other => return Err(UnknownSyscall(other.to_string())),
        };
        Ok(syscall)
    }
}
