//! Reads the processes that were already running from a procfs mount.


use crate::config::{AgentDetail, Config};
use crate::identity::{AgentIdentity, ProcessIdentity, ProcessTime};
use crate::{Error, ErrorKind, Result, SOURCE_PROCFS};

use log::{debug, warn};

use std::fs;
use std::path::Path;

/// USER_HZ is 100 on every Linux platform
const MS_PER_TICK: u64 = 10;
const START_TIME_FIELD: usize = 22;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcEntry {
    pub pid: String,
    pub ppid: String,
    pub name: String,
    pub cwd: Option<String>,
    pub command_line: String,
    pub start_time: String,
    /// real, effective, saved, filesystem
    pub uids: [String; 4],
    pub gids: [String; 4],
    /// fd number to link target
    pub fds: Vec<(String, String)>,
}

impl ProcEntry {
    pub fn identity(&self, config: &Config) -> ProcessIdentity {
        ProcessIdentity {
            pid: self.pid.clone(),
            ppid: Some(self.ppid.clone()),
            name: Some(self.name.clone()),
            cwd: self.cwd.clone(),
            command_line: Some(self.command_line.clone()),
            time: Some(ProcessTime::Start(self.start_time.clone())),
            ns_pid: None,
            exe: None,
            unit_id: config.unit_id(),
            source: SOURCE_PROCFS.to_string(),
        }
    }

    pub fn agent(&self, detail: AgentDetail) -> AgentIdentity {
        let [uid, euid, suid, fsuid] = self.uids.clone();
        let [gid, egid, sgid, fsgid] = self.gids.clone();
        let mut agent = AgentIdentity::simple(uid, euid, gid, egid);
        if let AgentDetail::Complete = detail {
            agent.suid = Some(suid);
            agent.fsuid = Some(fsuid);
            agent.sgid = Some(sgid);
            agent.fsgid = Some(fsgid);
        }
        agent
    }
}

fn malformed<S: Into<String>>(msg: S) -> Error {
    Error::new(ErrorKind::MalformedProc, msg.into())
}

/// Boot time in milliseconds, from the `btime` line of `/proc/stat`.
pub fn parse_boot_time(stat: &str) -> Result<u64> {
    stat.lines()
        .find_map(|line| {
            let mut tokens = line.split_whitespace();
            match tokens.next() {
                Some("btime") => tokens.next(),
                _ => None,
            }
        })
        .and_then(|secs| secs.parse::<u64>().ok())
        .map(|secs| secs * 1000)
        .ok_or_else(|| malformed("no btime in stat"))
}

/// Start time in clock ticks after boot, field 22 of `/proc/<pid>/stat`.
pub fn parse_start_ticks(stat: &str) -> Result<u64> {
    // comm may contain spaces and parentheses, so fields are counted after the last ')'
    let rest = stat
        .rfind(')')
        .map(|idx| &stat[idx + 1..])
        .ok_or_else(|| malformed("no comm in stat"))?;
    rest.split_whitespace()
        .nth(START_TIME_FIELD - 3)
        .and_then(|ticks| ticks.parse::<u64>().ok())
        .ok_or_else(|| malformed("no start time in stat"))
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct Status {
    pub name: String,
    pub ppid: String,
    pub uids: [String; 4],
    pub gids: [String; 4],
}

fn ids(value: &str, key: &str) -> Result<[String; 4]> {
    let tokens: Vec<&str> = value.split_whitespace().collect();
    match tokens.as_slice() {
        [real, effective, saved, fs, ..] => Ok([
            real.to_string(),
            effective.to_string(),
            saved.to_string(),
            fs.to_string(),
        ]),
        _ => Err(malformed(format!("{} needs four ids: {:?}", key, value))),
    }
}

pub fn parse_status(status: &str) -> Result<Status> {
    let (mut name, mut ppid, mut uids, mut gids) = (None, None, None, None);
    for line in status.lines() {
        let mut parts = line.splitn(2, ':');
        let key = parts.next().unwrap_or("").trim().to_ascii_lowercase();
        let value = parts.next().unwrap_or("").trim();
        match key.as_str() {
            "name" => name = Some(value.to_string()),
            "ppid" => ppid = Some(value.to_string()),
            "uid" => uids = Some(ids(value, "Uid")?),
            "gid" => gids = Some(ids(value, "Gid")?),
            _ => continue,
        }
        if name.is_some() && ppid.is_some() && uids.is_some() && gids.is_some() {
            break;
        }
    }
    Ok(Status {
        name: name.ok_or_else(|| malformed("no Name in status"))?,
        ppid: ppid.ok_or_else(|| malformed("no PPid in status"))?,
        uids: uids.ok_or_else(|| malformed("no Uid in status"))?,
        gids: gids.ok_or_else(|| malformed("no Gid in status"))?,
    })
}

/// Arguments are NUL separated; double quotes are swapped for single ones.
pub fn parse_cmdline(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw)
        .replace('\0', " ")
        .replace('"', "'")
        .trim()
        .to_string()
}

fn read_fds(dir: &Path) -> Vec<(String, String)> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            debug!("Cannot list {}: {}", dir.display(), e);
            return vec![];
        }
    };
    let mut fds: Vec<(String, String)> = entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            let fd = entry.file_name().to_string_lossy().into_owned();
            let target = fs::read_link(entry.path()).ok()?;
            let target = target.to_string_lossy().into_owned();
            if target.is_empty() {
                None
            } else {
                Some((fd, target))
            }
        })
        .collect();
    fds.sort();
    fds
}

pub fn read_entry(root: &Path, pid: &str, boot_ms: u64) -> Result<ProcEntry> {
    let dir = root.join(pid);
    let status = parse_status(&fs::read_to_string(dir.join("status"))?)?;
    let ticks = parse_start_ticks(&fs::read_to_string(dir.join("stat"))?)?;
    let command_line = parse_cmdline(&fs::read(dir.join("cmdline"))?);
    let cwd = fs::read_link(dir.join("cwd"))
        .ok()
        .map(|cwd| cwd.to_string_lossy().into_owned());

    Ok(ProcEntry {
        pid: pid.to_string(),
        ppid: status.ppid,
        name: status.name,
        cwd,
        command_line,
        start_time: (boot_ms + ticks * MS_PER_TICK).to_string(),
        uids: status.uids,
        gids: status.gids,
        fds: read_fds(&dir.join("fd")),
    })
}

/// Every numeric directory under `root`. Pids that vanish or cannot be read are skipped.
pub fn scan(root: &Path) -> Result<Vec<ProcEntry>> {
    let boot_ms = parse_boot_time(&fs::read_to_string(root.join("stat"))?)?;

    let mut entries = vec![];
    for dir in fs::read_dir(root)? {
        let dir = dir?;
        let pid = dir.file_name().to_string_lossy().into_owned();
        if pid.parse::<u32>().is_err() || !dir.path().is_dir() {
            continue;
        }
        match read_entry(root, &pid, boot_ms) {
            Ok(entry) => entries.push(entry),
            Err(e) => warn!("Skipping pid {} under {}: {}", pid, root.display(), e),
        }
    }
    entries.sort_by_key(|entry| entry.pid.parse::<u32>().unwrap_or(u32::MAX));
    Ok(entries)
}
