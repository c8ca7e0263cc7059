//! Serial bridge pumps
//!
//! Two independent pumps relay bytes between a caller's session and the
//! door process's emulated serial endpoint: caller→process writes to the
//! endpoint, process→caller reads from it on a blocking thread and
//! forwards into the session's ordered writer. Neither direction ever
//! blocks the other. The process→caller pump can optionally be throttled
//! to the descriptor's simulated baud rate for doors that are sensitive
//! to transfer timing.

use std::io::{Read, Write};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use dw_core::error::LaunchError;

use crate::session::Session;

use super::serial::{SerialChannel, SerialCounters};

/// How long to wait for a pump to wind down before moving on
const PUMP_JOIN_TIMEOUT: Duration = Duration::from_millis(500);

/// Running bridge for one door launch
pub struct SerialBridge {
    cancel: CancellationToken,
    inbound: JoinHandle<()>,
    reader: JoinHandle<()>,
    forwarder: JoinHandle<()>,
    /// Held so the endpoint lives exactly as long as the bridge
    channel: Option<SerialChannel>,
    counters: SerialCounters,
}

impl SerialBridge {
    /// Start both pumps over an open channel.
    ///
    /// `caller_input` carries decoded data bytes from the session task;
    /// process output goes straight into the session's ordered writer.
    pub fn start(
        mut channel: SerialChannel,
        caller_input: mpsc::Receiver<Bytes>,
        session: Arc<Session>,
        throttle_baud: Option<u32>,
    ) -> Result<Self, LaunchError> {
        let writer = channel.take_writer()?;
        let reader = channel.clone_reader()?;
        let counters = channel.counters();
        let cancel = CancellationToken::new();

        let inbound = tokio::spawn(pump_inbound(
            writer,
            caller_input,
            counters.clone(),
            cancel.clone(),
        ));

        let (out_tx, out_rx) = mpsc::channel::<Vec<u8>>(64);
        let reader_task = spawn_endpoint_reader(reader, out_tx, cancel.clone());
        let forwarder = tokio::spawn(pump_outbound(
            out_rx,
            session,
            counters.clone(),
            throttle_baud,
        ));

        Ok(Self {
            cancel,
            inbound,
            reader: reader_task,
            forwarder,
            channel: Some(channel),
            counters,
        })
    }

    /// Bytes relayed so far (in = caller→process, out = process→caller)
    pub fn counters(&self) -> &SerialCounters {
        &self.counters
    }

    /// Stop the pumps and tear the endpoint down.
    ///
    /// Consumes the bridge, so teardown runs exactly once no matter which
    /// exit path got here. Dropping the channel closes both endpoint
    /// halves, which also unblocks the reader thread.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        drop(self.channel.take());

        let _ = tokio::time::timeout(PUMP_JOIN_TIMEOUT, self.inbound).await;
        let _ = tokio::time::timeout(PUMP_JOIN_TIMEOUT, self.reader).await;
        let _ = tokio::time::timeout(PUMP_JOIN_TIMEOUT, self.forwarder).await;
    }
}

/// Caller→process pump: drains the session's data channel into the
/// endpoint
async fn pump_inbound(
    mut writer: Box<dyn Write + Send>,
    mut rx: mpsc::Receiver<Bytes>,
    counters: SerialCounters,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            data = rx.recv() => {
                let Some(data) = data else { break };
                if let Err(e) = writer.write_all(&data).and_then(|_| writer.flush()) {
                    tracing::debug!("Endpoint write failed: {}", e);
                    break;
                }
                counters.add_in(data.len());
            }
        }
    }
}

/// Blocking reader on the endpoint's internal side.
///
/// The read blocks on a dedicated thread; the cancellation token is
/// checked between reads, and closing the endpoint unblocks a read in
/// progress with EOF or an error.
fn spawn_endpoint_reader(
    mut reader: Box<dyn Read + Send>,
    tx: mpsc::Sender<Vec<u8>>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::task::spawn_blocking(move || {
        let mut buf = [0u8; 4096];
        loop {
            if cancel.is_cancelled() {
                break;
            }
            match reader.read(&mut buf) {
                Ok(0) => {
                    // EOF: the process side hung up
                    break;
                }
                Ok(n) => {
                    if tx.blocking_send(buf[..n].to_vec()).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    if !cancel.is_cancelled() {
                        tracing::debug!("Endpoint reader closed: {}", e);
                    }
                    break;
                }
            }
        }
    })
}

/// Process→caller pump, with optional baud throttling
async fn pump_outbound(
    mut rx: mpsc::Receiver<Vec<u8>>,
    session: Arc<Session>,
    counters: SerialCounters,
    throttle_baud: Option<u32>,
) {
    while let Some(chunk) = rx.recv().await {
        counters.add_out(chunk.len());
        if let Some(baud) = throttle_baud {
            // 10 bits per byte on the simulated line (8N1 plus framing)
            let millis = chunk.len() as u64 * 10_000 / u64::from(baud.max(300));
            if millis > 0 {
                tokio::time::sleep(Duration::from_millis(millis)).await;
            }
        }
        if session.send_data(Bytes::from(chunk)).await.is_err() {
            break;
        }
    }
}
