//! Request/completion worker for work handed off the emulation thread,
//! such as sound synthesis.
//!
//! The loop submits a request and later waits for its completion. The wait
//! spins briefly, then blocks with a timeout. A worker that misses the
//! timeout or dies is marked crashed and stays crashed; it is never retried.

use std::{
    thread::{self, JoinHandle},
    time::Duration,
};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, bounded, unbounded};
use tracing::{debug, error};

use crate::error::OffloadError;

const SPIN_TRIES: u32 = 128;
const SPIN_YIELD_EVERY: u32 = 16;
pub const DEFAULT_WORKER_TIMEOUT: Duration = Duration::from_millis(500);

pub struct OffloadWorker<Req, Resp> {
    name: &'static str,
    req_tx: Option<Sender<Req>>,
    done_rx: Receiver<Resp>,
    join: Option<JoinHandle<()>>,
    timeout: Duration,
    in_flight: usize,
    crashed: bool,
}

impl<Req, Resp> OffloadWorker<Req, Resp>
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    pub fn spawn(
        name: &'static str,
        timeout: Duration,
        mut handler: impl FnMut(Req) -> Resp + Send + 'static,
    ) -> Result<Self, OffloadError> {
        let (req_tx, req_rx) = unbounded::<Req>();
        let (done_tx, done_rx) = bounded::<Resp>(16);

        let join = thread::Builder::new()
            .name(format!("picofront-{name}"))
            .spawn(move || {
                debug!(worker = name, "offload worker started");
                for req in req_rx {
                    if done_tx.send(handler(req)).is_err() {
                        break;
                    }
                }
                debug!(worker = name, "offload worker exit");
            })
            .map_err(|source| OffloadError::Spawn { name, source })?;

        Ok(Self {
            name,
            req_tx: Some(req_tx),
            done_rx,
            join: Some(join),
            timeout,
            in_flight: 0,
            crashed: false,
        })
    }

    pub fn submit(&mut self, req: Req) -> Result<(), OffloadError> {
        if self.crashed {
            return Err(OffloadError::Crashed { name: self.name });
        }
        let sent = self.req_tx.as_ref().is_some_and(|tx| tx.send(req).is_ok());
        if !sent {
            return Err(self.mark_crashed());
        }
        self.in_flight += 1;
        Ok(())
    }

    /// Waits for the oldest outstanding completion.
    pub fn wait(&mut self) -> Result<Resp, OffloadError> {
        if self.crashed {
            return Err(OffloadError::Crashed { name: self.name });
        }

        for spin in 1..=SPIN_TRIES {
            match self.done_rx.try_recv() {
                Ok(resp) => return Ok(self.completed(resp)),
                Err(TryRecvError::Empty) => {}
                Err(TryRecvError::Disconnected) => return Err(self.mark_crashed()),
            }
            std::hint::spin_loop();
            if spin.is_multiple_of(SPIN_YIELD_EVERY) {
                thread::yield_now();
            }
        }

        match self.done_rx.recv_timeout(self.timeout) {
            Ok(resp) => Ok(self.completed(resp)),
            Err(RecvTimeoutError::Timeout) => {
                self.crashed = true;
                error!(
                    worker = self.name,
                    in_flight = self.in_flight,
                    "offload worker unresponsive"
                );
                Err(OffloadError::Unresponsive {
                    name: self.name,
                    waited_ms: self.timeout.as_millis() as u64,
                })
            }
            Err(RecvTimeoutError::Disconnected) => Err(self.mark_crashed()),
        }
    }

    pub fn call(&mut self, req: Req) -> Result<Resp, OffloadError> {
        self.submit(req)?;
        self.wait()
    }

    pub fn is_crashed(&self) -> bool {
        self.crashed
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    fn completed(&mut self, resp: Resp) -> Resp {
        self.in_flight = self.in_flight.saturating_sub(1);
        resp
    }

    fn mark_crashed(&mut self) -> OffloadError {
        self.crashed = true;
        error!(worker = self.name, "offload worker crashed");
        OffloadError::Crashed { name: self.name }
    }
}

impl<Req, Resp> Drop for OffloadWorker<Req, Resp> {
    fn drop(&mut self) {
        self.req_tx = None;
        // Dropping the completion receiver fails any send the worker is
        // blocked in, so a full queue cannot hold up the join.
        self.done_rx = crossbeam_channel::never();
        let Some(join) = self.join.take() else {
            return;
        };
        // A hung worker would block the join forever; leave it detached.
        if !self.crashed || join.is_finished() {
            let _ = join.join();
        }
    }
}
