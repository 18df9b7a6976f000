
mod provenance;
pub use provenance::*;

use async_std::channel::Receiver;

use lineage::{Engine, Event, GraphSink, HistoryStore, Syscall};

use log::{debug, error, info};

/// Feeds every event from `log_rx` into the engine until the channel closes. Events
/// the engine fails on are logged and skipped. Returns how many events left a trace.
pub async fn construct<S, K>(log_rx: Receiver<(Syscall, Event)>, engine: &mut Engine<S, K>) -> usize
where
    S: HistoryStore,
    K: GraphSink,
{
    let mut handled = 0;
    while let Ok((syscall, event)) = log_rx.recv().await {
        match engine.handle(syscall, &event) {
            Ok(true) => handled += 1,
            Ok(false) => debug!("{} event {:?} ignored", syscall, event.event_id()),
            Err(e) => error!(
                "Failed to handle {} event {:?}: {}",
                syscall,
                event.event_id(),
                e
            ),
        }
    }
    info!("Event stream closed after {} handled events", handled);
    handled
}
