use super::*;
use crate::config::AgentDetail;
use crate::event::{OPERATION_CLONE, OPERATION_EXECVE, OPERATION_SETUID};
use crate::flags::{CLONE_FILES, CLONE_FS, CLONE_SIGHAND, CLONE_THREAD, CLONE_VM};
use crate::history::{Lifecycle, MemoryStore};
use crate::tests::{root, user, Recorder};
use crate::vertex::{Relation, VertexKind};
use crate::{Error, ErrorKind};

use mockall::mock;

use pretty_assertions::assert_eq;

use std::fs;
use std::os::unix::fs::symlink;

const THREAD: u64 = CLONE_VM | CLONE_FS | CLONE_FILES | CLONE_SIGHAND | CLONE_THREAD;

mock! {
    pub Store {}
    trait HistoryStore {
        fn get(&mut self, key: &ProcessKey) -> Result<Option<ProcessRecord>>;
        fn put(&mut self, key: ProcessKey, record: ProcessRecord) -> Result<()>;
        fn remove(&mut self, key: &ProcessKey) -> Result<Option<ProcessRecord>>;
        fn clear(&mut self) -> Result<()>;
        fn close(&mut self) -> Result<()>;
    }
}

type TestEngine = Engine<MemoryStore, Recorder>;

fn engine() -> TestEngine {
    let _ = env_logger::builder().is_test(true).try_init();
    Engine::new(Config::default(), MemoryStore::new(), Recorder::new())
}

/// Root credentials plus `fields`, the latter taking precedence.
fn event(fields: &[(&str, &str)]) -> Event {
    let mut event = crate::tests::event(&[
        ("uid", "0"),
        ("euid", "0"),
        ("gid", "0"),
        ("egid", "0"),
        ("eventid", "1"),
    ]);
    for (k, v) in fields {
        event.insert(*k, *v);
    }
    event
}

fn clone(engine: &mut TestEngine, parent: &str, child: &str, flags: u64, time: &str) -> bool {
    let flags = format!("{:#x}", flags);
    let event = event(&[
        ("pid", parent),
        ("exit", child),
        ("a0", flags.as_str()),
        ("time", time),
    ]);
    engine.handle(Syscall::Clone, &event).unwrap()
}

fn fork(engine: &mut TestEngine, parent: &str, child: &str, time: &str) -> bool {
    let event = event(&[("pid", parent), ("exit", child), ("time", time)]);
    engine.handle(Syscall::Fork, &event).unwrap()
}

fn unit_fields<'a>(pid: &'a str, iteration: &'a str, time: &'a str) -> Vec<(&'a str, &'a str)> {
    vec![
        ("pid", pid),
        ("unit_unitid", "1"),
        ("unit_iteration", iteration),
        ("unit_count", "0"),
        ("unit_time", time),
        ("time", time),
    ]
}

fn enter_unit(engine: &mut TestEngine, pid: &str, iteration: &str, time: &str) {
    let event = event(&unit_fields(pid, iteration, time));
    assert!(engine.handle(Syscall::Unit, &event).unwrap());
}

/// The reader (pid, thread start, unit time) read what the writer wrote.
fn dependency_fields<'a>(
    reader: (&'a str, &'a str, &'a str),
    writer: (&'a str, &'a str, &'a str),
) -> Vec<(&'a str, &'a str)> {
    let (pid, start, unit_time) = reader;
    let (pid0, start0, unit_time0) = writer;
    vec![
        ("unit_pid", pid),
        ("unit_thread_start_time", start),
        ("unit_unitid", "1"),
        ("unit_iteration", "0"),
        ("unit_count", "0"),
        ("unit_time", unit_time),
        ("unit_pid0", pid0),
        ("unit_thread_start_time0", start0),
        ("unit_unitid0", "1"),
        ("unit_iteration0", "0"),
        ("unit_count0", "0"),
        ("unit_time0", unit_time0),
    ]
}

fn dependency(reader: (&str, &str, &str), writer: (&str, &str, &str)) -> Event {
    crate::tests::event(&dependency_fields(reader, writer))
}

#[test]
fn clone_thread_then_setuid() {
    let mut engine = engine();

    assert!(clone(&mut engine, "1", "100", THREAD, "10"));
    let setuid = event(&[("pid", "100"), ("uid", "5"), ("euid", "5"), ("time", "11")]);
    assert!(engine.handle(Syscall::Setuid, &setuid).unwrap());

    let sink = engine.sink();
    let clones = sink.edges_for(OPERATION_CLONE);
    assert_eq!(1, clones.len());
    assert_eq!(Some("100"), clones[0].child.get(annotation::PID));
    assert_eq!(Some("1"), clones[0].parent.get(annotation::PID));
    assert_eq!(
        Some("CLONE_VM|CLONE_FS|CLONE_FILES|CLONE_SIGHAND|CLONE_THREAD"),
        clones[0].flags.as_deref()
    );

    let updates = sink.edges_for(OPERATION_SETUID);
    assert_eq!(1, updates.len());
    assert_eq!(Some("0"), updates[0].parent.get(annotation::UID));
    assert_eq!(Some("5"), updates[0].child.get(annotation::UID));
    assert_eq!(Some("100"), updates[0].child.get(annotation::PID));
    assert_eq!(2, sink.edges.len());

    let child = ProcessKey::new("100", Some("10"));
    let group = engine.table().thread_group("1").unwrap();
    assert!(group.contains(&child));
    assert!(group.contains(&ProcessKey::new("1", Some("10"))));
    assert_eq!(Some(&user("5")), engine.record("100").unwrap().unwrap().agent());
}

#[test]
fn thread_shares_fd_table() {
    let mut engine = engine();
    clone(&mut engine, "1", "100", THREAD, "10");

    engine
        .states()
        .set_fd("100", "3", FileDescriptor::new("/etc/passwd", Some(true)));
    assert_eq!(
        Some(String::from("/etc/passwd")),
        engine.states().fd("1", "3").map(|fd| fd.artifact().to_string())
    );
    assert_eq!(engine.states().memory_group("1"), engine.states().memory_group("100"));
}

#[test]
fn fork_copies_fd_table() {
    let mut engine = engine();
    engine
        .states()
        .set_fd("1", "0", FileDescriptor::new("/dev/null", None));
    fork(&mut engine, "1", "50", "10");

    engine.states().set_fd("50", "1", FileDescriptor::new("/tmp/out", Some(false)));
    assert!(engine.states().fd("50", "0").is_some());
    assert_eq!(None, engine.states().fd("1", "1"));
}

#[test]
fn disguised_fork_through_clone() {
    let mut engine = engine();
    // SIGCHLD only
    assert!(clone(&mut engine, "1", "60", 17, "10"));

    let sink = engine.sink();
    assert_eq!(1, sink.edges_for(crate::event::OPERATION_FORK).len());
    assert_eq!(Some("SIGCHLD"), sink.edges[0].flags.as_deref());
    assert_eq!(None, engine.table().thread_group("1"));
}

#[test]
fn failed_creation_is_skipped() {
    let mut engine = engine();
    assert!(!fork(&mut engine, "1", "-1", "10"));
    assert!(!fork(&mut engine, "1", "abc", "10"));
    assert!(engine.sink().edges.is_empty());
    assert!(engine.sink().vertices.is_empty());
}

#[test]
fn namespaced_child_pid() {
    let mut config = Config::default();
    config.namespaces = true;
    let mut engine = Engine::new(config, MemoryStore::new(), Recorder::new());

    let event = event(&[("pid", "1"), ("exit", "2"), ("host_exit", "4400"), ("time", "10")]);
    assert!(engine.handle(Syscall::Fork, &event).unwrap());

    let record = engine.record("4400").unwrap().unwrap();
    assert_eq!(Some("2"), record.identity().ns_pid.as_deref());
    assert_eq!(None, engine.active_key("2"));
}

#[test]
fn execve_replaces_seen_record() {
    let mut engine = engine();
    let seen = event(&[("pid", "7"), ("time", "12"), ("comm", "sh")]);
    assert!(engine.handle(Syscall::Update, &seen).unwrap());
    assert_eq!(
        Some(&ProcessKey::new("7", Some("12"))),
        engine.active_key("7")
    );

    let execve = event(&[
        ("pid", "7"),
        ("time", "20"),
        ("comm", "ls"),
        ("execve_argc", "2"),
        ("execve_a0", "/bin/ls"),
        ("execve_a1", "-l"),
    ]);
    assert!(engine.handle(Syscall::Execve, &execve).unwrap());

    let key = ProcessKey::new("7", Some("20"));
    assert_eq!(Some(&key), engine.active_key("7"));
    assert_eq!(None, engine.record_by_key(&ProcessKey::new("7", Some("12"))).unwrap());
    let record = engine.record_by_key(&key).unwrap().unwrap();
    assert_eq!(Some("/bin/ls -l"), record.identity().command_line.as_deref());

    let edges = engine.sink().edges_for(OPERATION_EXECVE);
    assert_eq!(1, edges.len());
    assert_eq!(Some("20"), edges[0].child.get(annotation::START_TIME));
    assert_eq!(Some("12"), edges[0].parent.get(annotation::SEEN_TIME));
    assert_eq!(Some("/bin/ls -l"), edges[0].child.get(annotation::COMMAND_LINE));
}

#[test]
fn execve_with_oversized_argc() {
    let mut engine = engine();
    let execve = event(&[
        ("pid", "7"),
        ("time", "20"),
        ("execve_argc", "18446744073709551615"),
        ("execve_a0", "/bin/ls"),
    ]);
    assert!(engine.handle(Syscall::Execve, &execve).unwrap());

    let record = engine
        .record_by_key(&ProcessKey::new("7", Some("20")))
        .unwrap()
        .unwrap();
    assert_eq!(Some("/bin/ls"), record.identity().command_line.as_deref());

    let bare = event(&[("pid", "8"), ("time", "21"), ("execve_argc", "1000000000")]);
    assert!(engine.handle(Syscall::Execve, &bare).unwrap());
}

#[test]
fn execve_unlinks_fd_table() {
    let mut engine = engine();
    assert!(clone(&mut engine, "1", "7", CLONE_FILES, "15"));
    engine.states().set_fd("1", "4", FileDescriptor::new("/var/log/a", None));
    assert!(engine.states().fd("7", "4").is_some());

    let execve = event(&[("pid", "7"), ("time", "20")]);
    assert!(engine.handle(Syscall::Execve, &execve).unwrap());

    engine.states().set_fd("1", "5", FileDescriptor::new("/var/log/b", None));
    engine.states().set_fd("7", "6", FileDescriptor::new("/var/log/c", None));
    assert_eq!(None, engine.states().fd("7", "5"));
    assert_eq!(None, engine.states().fd("1", "6"));
    assert!(engine.states().fd("7", "4").is_some());
    assert_eq!("7", engine.states().fd_group("7"));

    let edges = engine.sink().edges_for(OPERATION_EXECVE);
    assert_eq!(Some("15"), edges[0].parent.get(annotation::START_TIME));
}

#[test]
fn pid_reuse_keeps_distinct_records() {
    let mut engine = engine();
    fork(&mut engine, "1", "7", "20");
    enter_unit(&mut engine, "7", "0", "21");
    fork(&mut engine, "1", "7", "30");

    let first = ProcessKey::new("7", Some("20"));
    let second = ProcessKey::new("7", Some("30"));
    assert_eq!(Some(&second), engine.active_key("7"));

    let old = engine.record_by_key(&first).unwrap().unwrap();
    assert_eq!(Lifecycle::PartiallyCleaned, old.lifecycle());
    assert_eq!(Some("20"), old.identity().start_time());
    let new = engine.record_by_key(&second).unwrap().unwrap();
    assert_eq!(Lifecycle::Live, new.lifecycle());
    assert_eq!(Some("30"), new.identity().start_time());
}

#[test]
fn exit_group_idempotent() {
    let mut engine = engine();
    clone(&mut engine, "1", "100", THREAD, "10");
    clone(&mut engine, "1", "101", THREAD, "11");
    assert_eq!(3, engine.table().thread_group("1").unwrap().len());

    let exit_group = event(&[("pid", "1"), ("time", "12")]);
    assert!(engine.handle(Syscall::ExitGroup, &exit_group).unwrap());

    assert_eq!(None, engine.table().thread_group("1"));
    for pid in &["1", "100", "101"] {
        assert_eq!(None, engine.active_key(pid));
    }
    assert!(engine.table().store().is_empty());

    let edges = engine.sink().edges.len();
    assert!(!engine.handle(Syscall::ExitGroup, &exit_group).unwrap());
    let exit = event(&[("pid", "100"), ("time", "13")]);
    assert!(!engine.handle(Syscall::Exit, &exit).unwrap());
    assert_eq!(edges, engine.sink().edges.len());
}

#[test]
fn exit_draws_self_loop() {
    let mut engine = engine();
    fork(&mut engine, "1", "50", "10");
    let exit = event(&[("pid", "50"), ("time", "11")]);
    assert!(engine.handle(Syscall::Exit, &exit).unwrap());

    let edges = engine.sink().edges_for(crate::event::OPERATION_EXIT);
    assert_eq!(1, edges.len());
    assert_eq!(edges[0].child, edges[0].parent);
    assert_eq!(None, engine.active_key("50"));
    assert_eq!(
        None,
        engine.record_by_key(&ProcessKey::new("50", Some("10"))).unwrap()
    );
}

#[test]
fn exit_without_edge() {
    let mut engine = engine();
    fork(&mut engine, "1", "50", "10");
    let edges = engine.sink().edges.len();

    let exit = event(&[("pid", "50"), ("time", "11")]);
    assert!(engine.handle_exit(&exit, false, false).unwrap());

    assert_eq!(edges, engine.sink().edges.len());
    assert_eq!(None, engine.active_key("50"));
    assert_eq!(
        None,
        engine.record_by_key(&ProcessKey::new("50", Some("10"))).unwrap()
    );
}

#[test]
fn partial_clean_retention() {
    let mut engine = engine();
    clone(&mut engine, "1", "100", THREAD, "10");
    enter_unit(&mut engine, "100", "0", "31.5");
    let setuid = event(&[("pid", "100"), ("uid", "5"), ("euid", "5"), ("time", "32")]);
    engine.handle(Syscall::Setuid, &setuid).unwrap();
    enter_unit(&mut engine, "100", "1", "33.5");
    enter_unit(&mut engine, "1", "0", "34.5");

    let exit = event(&[("pid", "100"), ("time", "35")]);
    assert!(engine.handle(Syscall::Exit, &exit).unwrap());

    let key = ProcessKey::new("100", Some("10"));
    assert_eq!(None, engine.active_key("100"));
    let shell = engine.record_by_key(&key).unwrap().unwrap();
    assert_eq!(Lifecycle::PartiallyCleaned, shell.lifecycle());
    assert_eq!(None, shell.agent());
    assert_eq!(None, shell.unit());
    assert_eq!(
        Some(&user("5")),
        shell.agent_for_unit(&UnitIdentity::new("1", "0", "0", "31.5"))
    );
    assert!(engine.table().thread_group("1").is_some());

    engine.sink_mut().reset();
    let dependency = dependency(("1", "10", "34.5"), ("100", "10", "31.5"));
    assert!(engine.handle(Syscall::UnitDependency, &dependency).unwrap());

    let edges = engine.sink().edges_for(OPERATION_UNIT_DEPENDENCY);
    assert_eq!(1, edges.len());
    assert_eq!(Some("5"), edges[0].parent.get(annotation::UID));
    assert_eq!(Some("31.5"), edges[0].parent.get(annotation::START_TIME));
    assert_eq!(Some("0"), edges[0].child.get(annotation::UID));
    assert_eq!("0", edges[0].stamp.time);
    assert_eq!(SOURCE_BEEP, edges[0].stamp.source);
}

#[test]
fn unit_dependency_best_effort() {
    let mut engine = engine();
    fork(&mut engine, "1", "10", "5");
    fork(&mut engine, "1", "20", "6");
    enter_unit(&mut engine, "10", "0", "7.5");
    enter_unit(&mut engine, "20", "0", "8.5");
    engine.sink_mut().reset();

    let good = dependency(("10", "5", "7.5"), ("20", "6", "8.5"));
    assert!(engine.handle(Syscall::UnitDependency, &good).unwrap());
    assert_eq!(1, engine.sink().edges.len());
    engine.sink_mut().reset();

    let garbled = dependency(("10", "5", "7.5"), ("20", "six", "8.5"));
    assert!(!engine.handle(Syscall::UnitDependency, &garbled).unwrap());

    let absent: Vec<(&str, &str)> = dependency_fields(("10", "5", "7.5"), ("20", "6", "8.5"))
        .into_iter()
        .filter(|(k, _)| *k != "unit_thread_start_time0")
        .collect();
    let absent = crate::tests::event(&absent);
    assert!(!engine.handle(Syscall::UnitDependency, &absent).unwrap());

    let unknown = dependency(("10", "5", "7.5"), ("30", "6", "8.5"));
    assert!(!engine.handle(Syscall::UnitDependency, &unknown).unwrap());

    let unseen_unit = dependency(("10", "5", "9.5"), ("20", "6", "8.5"));
    assert!(!engine.handle(Syscall::UnitDependency, &unseen_unit).unwrap());

    assert!(engine.sink().edges.is_empty());
}

#[test]
fn unit_entry_and_exit() {
    let mut engine = engine();
    fork(&mut engine, "1", "10", "5");
    engine.sink_mut().reset();

    enter_unit(&mut engine, "10", "0", "7.5");
    let edges = engine.sink().edges_for(crate::event::OPERATION_UNIT);
    assert_eq!(1, edges.len());
    assert_eq!(Some("7.5"), edges[0].child.get(annotation::START_TIME));
    assert_eq!(Some("5"), edges[0].parent.get(annotation::START_TIME));
    assert_eq!(SOURCE_BEEP, edges[0].stamp.source);

    let exit = event(&[("pid", "10")]);
    assert!(engine.handle(Syscall::UnitExit, &exit).unwrap());
    assert!(!engine.handle(Syscall::UnitExit, &exit).unwrap());
    assert_eq!(
        Some("5"),
        engine.process_vertex("10").unwrap().unwrap().get(annotation::START_TIME)
    );
}

#[test]
fn embedded_dedup_through_engine() {
    let mut engine = engine();
    fork(&mut engine, "1", "10", "5");
    engine.sink_mut().reset();

    let same = event(&[("pid", "10"), ("time", "6")]);
    assert!(engine.handle(Syscall::Setuid, &same).unwrap());
    assert!(engine.handle(Syscall::Setuid, &same).unwrap());
    assert!(engine.sink().vertices.is_empty());
    assert_eq!(2, engine.sink().edges.len());

    let other = event(&[("pid", "10"), ("uid", "33"), ("euid", "33"), ("time", "7")]);
    assert!(engine.handle(Syscall::Setuid, &other).unwrap());
    assert_eq!(1, engine.sink().vertices.len());
    assert_eq!(3, engine.sink().edges.len());
}

#[test]
fn silent_sync_draws_only_changes() {
    let mut engine = engine();
    fork(&mut engine, "1", "10", "5");
    engine.sink_mut().reset();

    let same = event(&[("pid", "10"), ("time", "6")]);
    assert!(engine.handle(Syscall::Update, &same).unwrap());
    assert!(engine.sink().edges.is_empty());

    let changed = event(&[("pid", "10"), ("uid", "33"), ("time", "7")]);
    assert!(engine.handle(Syscall::Update, &changed).unwrap());
    assert_eq!(1, engine.sink().edges_for(crate::event::OPERATION_UPDATE).len());
}

#[test]
fn credential_update_synthesizes_process() {
    let mut engine = engine();
    let setuid = event(&[("pid", "42"), ("uid", "5"), ("euid", "5"), ("time", "9")]);
    assert!(engine.handle(Syscall::Setuid, &setuid).unwrap());

    let sink = engine.sink();
    assert_eq!(1, sink.vertices.len());
    assert_eq!(1, sink.edges.len());
    assert_eq!(sink.edges[0].child, sink.edges[0].parent);
    assert_eq!(Some("9"), sink.vertices[0].get(annotation::SEEN_TIME));
}

#[test]
fn fs_credentials_ignored_by_default() {
    let mut engine = engine();
    let setfsuid = event(&[("pid", "42"), ("fsuid", "5"), ("time", "9")]);
    assert!(engine.handle(Syscall::Setfsuid, &setfsuid).unwrap());
    assert!(engine.sink().vertices.is_empty());
    assert_eq!(None, engine.active_key("42"));

    let mut config = Config::default();
    config.fs_credentials = true;
    config.agents = AgentDetail::Complete;
    let mut engine = Engine::new(config, MemoryStore::new(), Recorder::new());
    assert!(engine.handle(Syscall::Setfsuid, &setfsuid).unwrap());
    assert_eq!(
        Some("5"),
        engine.sink().vertices[0].get(annotation::FSUID)
    );
}

#[test]
fn namespace_update() {
    let mut config = Config::default();
    config.namespaces = true;
    let mut engine = Engine::new(config, MemoryStore::new(), Recorder::new());
    fork(&mut engine, "1", "10", "5");
    engine.sink_mut().reset();

    let setns = event(&[("pid", "10"), ("ns_inum_net", "4026532000"), ("time", "6")]);
    assert!(engine.handle(Syscall::Setns, &setns).unwrap());
    let edges = engine.sink().edges_for(crate::event::OPERATION_SETNS);
    assert_eq!(1, edges.len());
    assert_eq!(Some("4026532000"), edges[0].child.get(annotation::NS_NET));
    assert_eq!(None, edges[0].parent.get(annotation::NS_NET));

    let mut engine = self::engine();
    fork(&mut engine, "1", "10", "5");
    engine.sink_mut().reset();
    assert!(engine.handle(Syscall::Unshare, &setns).unwrap());
    assert!(engine.sink().edges.is_empty());
}

#[test]
fn separate_agents_through_engine() {
    let mut config = Config::default();
    config.agent_vertices = true;
    let mut engine = Engine::new(config, MemoryStore::new(), Recorder::new());

    fork(&mut engine, "1", "10", "5");
    fork(&mut engine, "1", "11", "6");

    let sink = engine.sink();
    let agents = sink
        .vertices
        .iter()
        .filter(|v| v.kind == VertexKind::Agent)
        .count();
    assert_eq!(1, agents);
    assert!(sink
        .vertices
        .iter()
        .filter(|v| v.kind == VertexKind::Process)
        .all(|v| v.get(annotation::UID).is_none()));
    assert_eq!(
        3,
        sink.edges
            .iter()
            .filter(|e| e.relation == Relation::ControlledBy)
            .count()
    );
    assert_eq!(Some(&root()), engine.record("10").unwrap().unwrap().agent());
}

fn fake_pid(root: &Path, pid: &str, ppid: &str) {
    let dir = root.join(pid);
    fs::create_dir_all(dir.join("fd")).unwrap();
    fs::write(
        dir.join("status"),
        format!(
            "Name:\tproc{}\nPPid:\t{}\nUid:\t0\t0\t0\t0\nGid:\t0\t0\t0\t0\n",
            pid, ppid
        ),
    )
    .unwrap();
    fs::write(
        dir.join("stat"),
        format!("{} (proc) S {} 0 0 0 -1 0 0 0 0 0 0 0 0 0 20 0 1 0 300 0 0", pid, ppid),
    )
    .unwrap();
    fs::write(dir.join("cmdline"), format!("proc{}\0", pid)).unwrap();
    symlink("/srv", dir.join("cwd")).unwrap();
    symlink("/dev/null", dir.join("fd").join("0")).unwrap();
}

#[test]
fn procfs_seeding() {
    let root = tempfile::tempdir().unwrap();
    fs::write(root.path().join("stat"), "btime 2\n").unwrap();
    fake_pid(root.path(), "1", "0");
    fake_pid(root.path(), "812", "1");

    let mut engine = engine();
    assert_eq!(2, engine.put_procfs_processes(root.path()).unwrap());

    let key = ProcessKey::new("812", Some("5000"));
    assert_eq!(Some(&key), engine.active_key("812"));
    assert_eq!(
        Some(String::from("/dev/null")),
        engine.states().fd("812", "0").map(|fd| fd.artifact().to_string())
    );
    assert_eq!(Some(String::from("/srv")), engine.states().cwd("812"));

    let sink = engine.sink();
    assert_eq!(2, sink.vertices.len());
    assert!(sink
        .vertices
        .iter()
        .all(|v| v.get(annotation::SOURCE) == Some(SOURCE_PROCFS)));
    let edges = sink.edges_for(OPERATION_UNKNOWN);
    assert_eq!(1, edges.len());
    assert_eq!(Some("812"), edges[0].child.get(annotation::PID));
    assert_eq!(Some("1"), edges[0].parent.get(annotation::PID));
    assert_eq!(SOURCE_PROCFS, edges[0].stamp.source);
}

#[test]
fn clear_all_forgets_everything() {
    let mut engine = engine();
    clone(&mut engine, "1", "100", THREAD, "10");
    engine.states().set_fd("1", "3", FileDescriptor::new("/tmp/x", None));

    engine.clear_all().unwrap();
    assert_eq!(None, engine.active_key("1"));
    assert_eq!(None, engine.table().thread_group("1"));
    assert!(engine.table().store().is_empty());
    assert!(!engine.states().contains("1"));
}

#[test]
fn store_failure_propagates() {
    let mut store = MockStore::new();
    store.expect_put().times(1).returning(|_, _| Ok(()));
    store
        .expect_get()
        .returning(|_| Err(Error::new(ErrorKind::Store, "disk gone")));
    let mut engine = Engine::new(Config::default(), store, Recorder::new());

    let fork = event(&[("pid", "1"), ("exit", "2"), ("time", "10")]);
    let err = engine.handle(Syscall::Fork, &fork).unwrap_err();
    assert_eq!(ErrorKind::Store, err.kind());
}
