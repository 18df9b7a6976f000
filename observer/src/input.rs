//! JSON-lines event input. Each line is an object with a `syscall` tag; every other
//! member becomes an event field.


use async_std::channel::Sender;
use async_std::io::BufRead;
use async_std::prelude::*;

use lineage::{Error, ErrorKind, Event, Result, Syscall};

use log::{info, warn};

use serde_json::Value;

use std::io;

pub const SYSCALL_FIELD: &str = "syscall";

fn malformed<S: Into<String>>(msg: S) -> Error {
    Error::new(ErrorKind::Serde, msg.into())
}

/// Non-string values keep their JSON text; nulls are dropped.
pub fn parse_line(line: &str) -> Result<(Syscall, Event)> {
    let object = match serde_json::from_str::<Value>(line)? {
        Value::Object(object) => object,
        other => return Err(malformed(format!("expected an object, got {}", other))),
    };

    let mut syscall = None;
    let mut event = Event::default();
    for (key, value) in object {
        let value = match value {
            Value::String(s) => s,
            Value::Null => continue,
            other => other.to_string(),
        };
        if key == SYSCALL_FIELD {
            syscall = Some(value);
        } else {
            event.insert(key, value);
        }
    }

    let syscall = syscall.ok_or_else(|| malformed("no syscall tag"))?;
    let syscall = syscall
        .parse::<Syscall>()
        .map_err(|e| Error::new(ErrorKind::Serde, e))?;
    Ok((syscall, event))
}

/// Sends every well-formed line to `log_tx`; returns how many were sent. Stops early
/// when the receiving side is gone.
pub async fn read_events<R>(reader: R, log_tx: Sender<(Syscall, Event)>) -> io::Result<usize>
where
    R: BufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut line_no = 0;
    let mut sent = 0;
    while let Some(line) = lines.next().await {
        let line = line?;
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }
        match parse_line(&line) {
            Ok(parsed) => {
                if log_tx.send(parsed).await.is_err() {
                    info!("Event consumer gone at line {}", line_no);
                    break;
                }
                sent += 1;
            }
            Err(e) => warn!("Skipping line {}: {}", line_no, e),
        }
    }
    Ok(sent)
}
