//! Per-pid bookkeeping of what a live process shares with others.
//!
//! A pid's state is created on first reference, so observing a process mid-lifetime is
//! never an error. File-descriptor tables and working directories are reference
//! counted: linking two processes makes them share one table, copying gives the child
//! its own.


use log::debug;

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDescriptor {
    artifact: String,
    opened_for_read: Option<bool>,
}

impl FileDescriptor {
    /// # Panics
    ///
    /// An empty artifact identifier is a caller bug and panics.
    pub fn new<S: Into<String>>(artifact: S, opened_for_read: Option<bool>) -> Self {
        let artifact = artifact.into();
        assert!(
            !artifact.is_empty(),
            "file descriptor without an artifact identifier"
        );
        Self {
            artifact,
            opened_for_read,
        }
    }

    pub fn artifact(&self) -> &str {
        &self.artifact
    }

    pub fn opened_for_read(&self) -> Option<bool> {
        self.opened_for_read
    }
}

type FdTable = Rc<RefCell<HashMap<String, FileDescriptor>>>;
type Cwd = Rc<RefCell<Option<String>>>;

#[derive(Debug)]
struct ProcessState {
    memory_group: String,
    fd_group: String,
    fds: FdTable,
    cwd: Cwd,
}

impl ProcessState {
    fn new(pid: &str) -> Self {
        Self {
            memory_group: pid.to_string(),
            fd_group: pid.to_string(),
            fds: FdTable::default(),
            cwd: Cwd::default(),
        }
    }

    fn copied_fds(&self) -> FdTable {
        Rc::new(RefCell::new(self.fds.borrow().clone()))
    }

    fn copied_cwd(&self) -> Cwd {
        Rc::new(RefCell::new(self.cwd.borrow().clone()))
    }
}

#[derive(Debug, Default)]
pub struct ProcessStateStore {
    states: HashMap<String, ProcessState>,
}

impl ProcessStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&mut self, pid: &str) -> &mut ProcessState {
        self.states
            .entry(pid.to_string())
            .or_insert_with(|| ProcessState::new(pid))
    }

    fn spawn(&mut self, parent: &str, child: &str, link_fds: bool, share_fs: bool) {
        let parent_state = self.state(parent);
        let fds = if link_fds {
            Rc::clone(&parent_state.fds)
        } else {
            parent_state.copied_fds()
        };
        let cwd = if share_fs {
            Rc::clone(&parent_state.cwd)
        } else {
            parent_state.copied_cwd()
        };
        let fd_group = if link_fds {
            parent_state.fd_group.clone()
        } else {
            child.to_string()
        };

        self.states.insert(
            child.to_string(),
            ProcessState {
                memory_group: child.to_string(),
                fd_group,
                fds,
                cwd,
            },
        );
    }

    pub fn on_fork(&mut self, parent: &str, child: &str) {
        self.spawn(parent, child, false, false);
    }

    pub fn on_vfork(&mut self, parent: &str, child: &str) {
        self.spawn(parent, child, false, false);
        let memory_group = self.state(parent).memory_group.clone();
        self.state(child).memory_group = memory_group;
    }

    pub fn on_clone(
        &mut self,
        parent: &str,
        child: &str,
        link_fds: bool,
        share_memory: bool,
        share_fs: bool,
    ) {
        self.spawn(parent, child, link_fds, share_fs);
        if share_memory {
            let memory_group = self.state(parent).memory_group.clone();
            self.state(child).memory_group = memory_group;
        }
    }

    pub fn on_exec(&mut self, pid: &str) {
        let state = self.state(pid);
        state.memory_group = pid.to_string();
        state.fd_group = pid.to_string();
        state.fds = state.copied_fds();
        state.cwd = state.copied_cwd();
    }

    pub fn on_exit(&mut self, pid: &str) {
        if self.states.remove(pid).is_none() {
            debug!("No state to discard for exiting pid {}", pid);
        }
    }

    pub fn clear(&mut self) {
        self.states.clear();
    }

    pub fn set_fd(&mut self, pid: &str, fd: &str, descriptor: FileDescriptor) {
        self.state(pid)
            .fds
            .borrow_mut()
            .insert(fd.to_string(), descriptor);
    }

    pub fn fd(&mut self, pid: &str, fd: &str) -> Option<FileDescriptor> {
        self.state(pid).fds.borrow().get(fd).cloned()
    }

    pub fn remove_fd(&mut self, pid: &str, fd: &str) -> Option<FileDescriptor> {
        self.state(pid).fds.borrow_mut().remove(fd)
    }

    pub fn memory_group(&mut self, pid: &str) -> String {
        self.state(pid).memory_group.clone()
    }

    pub fn fd_group(&mut self, pid: &str) -> String {
        self.state(pid).fd_group.clone()
    }

    pub fn set_cwd(&mut self, pid: &str, cwd: Option<String>) {
        *self.state(pid).cwd.borrow_mut() = cwd;
    }

    pub fn cwd(&mut self, pid: &str) -> Option<String> {
        self.state(pid).cwd.borrow().clone()
    }

    pub fn contains(&self, pid: &str) -> bool {
        self.states.contains_key(pid)
    }
}
