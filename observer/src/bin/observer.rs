use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use structopt::StructOpt;

use async_std::io::BufReader;
use async_std::task::{self, JoinHandle};
use async_std::{channel, io};

use futures::select;
use futures::FutureExt;

use lineage::{
    Config, Engine, Error, ErrorKind, Event, HistoryStore, MemoryStore, SpillStore, StoreConfig,
    Syscall,
};
use observer::graph::{self, dot, ProvenanceGraph};
use observer::input;

use signal_hook::iterator::Signals;

use log::{error, info};

#[derive(StructOpt)]
#[structopt(name = "observer")]
struct Opt {
    /// JSON-lines audit events, `-` for stdin
    input: String,

    /// JSON engine configuration
    #[structopt(short, long)]
    config: Option<PathBuf>,

    /// Where to write the provenance graph in DOT
    #[structopt(short, long)]
    output: Option<PathBuf>,

    /// Spill process history to this directory once the cache is full
    #[structopt(short, long)]
    spill_dir: Option<PathBuf>,

    #[structopt(long, default_value = "65536")]
    cache_capacity: usize,

    /// Seed the processes already running from /proc
    #[structopt(long)]
    procfs: bool,

    /// Leave edge labels out of the DOT output
    #[structopt(long)]
    no_edge_labels: bool,
}

fn main() {
    env_logger::init();

    let code = match run() {
        Ok(()) => exitcode::OK,
        Err(e) => {
            error!("{}", e);
            match e.kind() {
                ErrorKind::Config => exitcode::CONFIG,
                ErrorKind::IO | ErrorKind::Closed => exitcode::IOERR,
                ErrorKind::MalformedProc => exitcode::OSFILE,
                ErrorKind::Serde => exitcode::DATAERR,
                ErrorKind::Store => exitcode::SOFTWARE,
            }
        }
    };
    process::exit(code);
}

fn run() -> Result<(), Error> {
    let opt = Opt::from_args();

    let config = match &opt.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    let store_config = StoreConfig {
        cache_capacity: opt.cache_capacity,
        spill_dir: opt.spill_dir.clone(),
    };
    store_config.validate()?;

    if store_config.spill_dir.is_some() {
        observe(&opt, config, SpillStore::new(&store_config)?)
    } else {
        observe(&opt, config, MemoryStore::new())
    }
}

fn spawn_reader(
    input: &str,
    log_tx: channel::Sender<(Syscall, Event)>,
) -> Result<JoinHandle<std::io::Result<usize>>, Error> {
    let handle = if input == "-" {
        task::spawn(input::read_events(BufReader::new(io::stdin()), log_tx))
    } else {
        let file = async_std::fs::File::from(fs::File::open(input)?);
        task::spawn(input::read_events(BufReader::new(file), log_tx))
    };
    Ok(handle)
}

fn observe<S: HistoryStore>(opt: &Opt, config: Config, store: S) -> Result<(), Error> {
    let mut engine = Engine::new(config, store, ProvenanceGraph::new());
    if opt.procfs {
        engine.put_procfs_processes(Path::new("/proc"))?;
    }

    let (log_tx, log_rx) = channel::bounded(1000);
    let (sig_tx, sig_rx) = channel::bounded::<()>(1);

    let signals = Signals::new(&[signal_hook::SIGINT, signal_hook::SIGTERM])?;
    let signals2 = signals.clone();
    let sig_handle = task::spawn_blocking(move || {
        // dropping the sender wakes the receiver
        let _tx = sig_tx;
        signals2.into_iter().next();
    });

    let reader = spawn_reader(&opt.input, log_tx)?;

    let interrupted = task::block_on(async {
        let mut construct = Box::pin(graph::construct(log_rx, &mut engine)).fuse();
        let mut sig = Box::pin(sig_rx.recv()).fuse();
        select! {
            _ = construct => false,
            _ = sig => true,
        }
    });

    if interrupted {
        info!("Interrupted, stopping early");
    } else {
        let read = task::block_on(reader)?;
        info!("Read {} events from {}", read, opt.input);
    }
    signals.close();
    task::block_on(sig_handle);

    if let Some(path) = &opt.output {
        task::block_on(dot::write_file(engine.sink(), path, !opt.no_edge_labels))?;
    }
    engine.close()
}
