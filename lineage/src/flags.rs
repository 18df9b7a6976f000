//! Interpretation of the flag word passed to clone(2).
//!
//! Values follow include/uapi/linux/sched.h and include/uapi/asm-generic/signal.h.


use crate::event::Syscall;

pub const CSIGNAL: u64 = 0x0000_00ff;
pub const SIGCHLD: u64 = 17;

pub const CLONE_VM: u64 = 0x0000_0100;
pub const CLONE_FS: u64 = 0x0000_0200;
pub const CLONE_FILES: u64 = 0x0000_0400;
pub const CLONE_SIGHAND: u64 = 0x0000_0800;
pub const CLONE_PTRACE: u64 = 0x0000_2000;
pub const CLONE_VFORK: u64 = 0x0000_4000;
pub const CLONE_PARENT: u64 = 0x0000_8000;
pub const CLONE_THREAD: u64 = 0x0001_0000;
pub const CLONE_NEWNS: u64 = 0x0002_0000;
pub const CLONE_SYSVSEM: u64 = 0x0004_0000;
pub const CLONE_SETTLS: u64 = 0x0008_0000;
pub const CLONE_PARENT_SETTID: u64 = 0x0010_0000;
pub const CLONE_CHILD_CLEARTID: u64 = 0x0020_0000;
pub const CLONE_UNTRACED: u64 = 0x0080_0000;
pub const CLONE_CHILD_SETTID: u64 = 0x0100_0000;
pub const CLONE_NEWCGROUP: u64 = 0x0200_0000;
pub const CLONE_NEWUTS: u64 = 0x0400_0000;
pub const CLONE_NEWIPC: u64 = 0x0800_0000;
pub const CLONE_NEWUSER: u64 = 0x1000_0000;
pub const CLONE_NEWPID: u64 = 0x2000_0000;
pub const CLONE_NEWNET: u64 = 0x4000_0000;
pub const CLONE_IO: u64 = 0x8000_0000;

const NAMES: [(u64, &str); 22] = [
    (CLONE_VM, "CLONE_VM"),
    (CLONE_FS, "CLONE_FS"),
    (CLONE_FILES, "CLONE_FILES"),
    (CLONE_SIGHAND, "CLONE_SIGHAND"),
    (CLONE_PTRACE, "CLONE_PTRACE"),
    (CLONE_VFORK, "CLONE_VFORK"),
    (CLONE_PARENT, "CLONE_PARENT"),
    (CLONE_THREAD, "CLONE_THREAD"),
    (CLONE_NEWNS, "CLONE_NEWNS"),
    (CLONE_SYSVSEM, "CLONE_SYSVSEM"),
    (CLONE_SETTLS, "CLONE_SETTLS"),
    (CLONE_PARENT_SETTID, "CLONE_PARENT_SETTID"),
    (CLONE_CHILD_CLEARTID, "CLONE_CHILD_CLEARTID"),
    (CLONE_UNTRACED, "CLONE_UNTRACED"),
    (CLONE_CHILD_SETTID, "CLONE_CHILD_SETTID"),
    (CLONE_NEWCGROUP, "CLONE_NEWCGROUP"),
    (CLONE_NEWUTS, "CLONE_NEWUTS"),
    (CLONE_NEWIPC, "CLONE_NEWIPC"),
    (CLONE_NEWUSER, "CLONE_NEWUSER"),
    (CLONE_NEWPID, "CLONE_NEWPID"),
    (CLONE_NEWNET, "CLONE_NEWNET"),
    (CLONE_IO, "CLONE_IO"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CloneFlags(u64);

impl CloneFlags {
    pub fn new(bits: u64) -> Self {
        Self(bits)
    }

    /// Accepts decimal or `0x`-prefixed hexadecimal. Anything else is read as no flags.
    pub fn parse(raw: Option<&str>) -> Self {
        let bits = raw
            .map(str::trim)
            .and_then(|s| {
                if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
                    u64::from_str_radix(hex, 16).ok()
                } else {
                    s.parse::<u64>().ok()
                }
            })
            .unwrap_or(0);
        Self(bits)
    }

    pub fn bits(self) -> u64 {
        self.0
    }

    pub fn contains(self, flag: u64) -> bool {
        self.0 & flag == flag
    }

    pub fn exit_signal(self) -> u64 {
        self.0 & CSIGNAL
    }

    /// fork(2) and vfork(2) are often issued through clone(2); recover the real intent.
    pub fn classify(self) -> Syscall {
        let sigchld = self.exit_signal() == SIGCHLD;
        if sigchld && self.contains(CLONE_VM) && self.contains(CLONE_VFORK) {
            Syscall::Vfork
        } else if sigchld {
            Syscall::Fork
        } else {
            Syscall::Clone
        }
    }

    pub fn link_fds(self) -> bool {
        self.contains(CLONE_FILES)
    }

    pub fn share_memory(self) -> bool {
        self.contains(CLONE_VM)
    }

    pub fn share_fs(self) -> bool {
        self.contains(CLONE_FS)
    }

    pub fn is_thread(self) -> bool {
        self.contains(CLONE_THREAD)
    }

    pub fn render(self) -> String {
        let mut parts: Vec<String> = NAMES
            .iter()
            .filter(|(bit, _)| self.contains(*bit))
            .map(|(_, name)| (*name).to_string())
            .collect();
        match self.exit_signal() {
            0 => (),
            SIGCHLD => parts.push(String::from("SIGCHLD")),
            sig => parts.push(sig.to_string()),
        }
        parts.join("|")
    }
}
