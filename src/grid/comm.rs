//! Message passing between ranks.
//!
//! [`SerialComm`] is the one-rank case and [`ThreadComm`] runs one rank
//! per OS thread over `mpsc` channels; with the `mpi` feature, `MpiComm`
//! runs one rank per MPI process. All collectives are built from tagged
//! point-to-point messages, and reductions are combined at rank 0 in rank
//! order, so every rank sees bitwise-identical results.
//!
//! # Example
//!
//! ```
//! use icesheet_rs::grid::{Communicator, ReduceOp, ThreadComm};
//!
//! let sums = ThreadComm::run(3, |comm| {
//!     comm.all_reduce(comm.rank() as f64 + 1.0, ReduceOp::Sum).unwrap()
//! });
//! assert_eq!(sums, vec![6.0, 6.0, 6.0]);
//! ```

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

use parking_lot::Mutex;

use crate::error::{IceError, Result};

/// Message tags reserved by the collectives.
pub mod tags {
    pub const REDUCE: u32 = 1;
    pub const BROADCAST: u32 = 2;
    pub const GATHER: u32 = 3;
    pub const BARRIER: u32 = 4;
    pub const GHOST_EAST: u32 = 10;
    pub const GHOST_WEST: u32 = 11;
    pub const GHOST_NORTH: u32 = 12;
    pub const GHOST_SOUTH: u32 = 13;
}

/// Element-wise reduction operator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReduceOp {
    Sum,
    Min,
    Max,
}

impl ReduceOp {
    fn combine(self, acc: &mut [f64], other: &[f64]) {
        for (a, b) in acc.iter_mut().zip(other) {
            *a = match self {
                Self::Sum => *a + b,
                Self::Min => a.min(*b),
                Self::Max => a.max(*b),
            };
        }
    }
}

/// Point-to-point and collective communication.
///
/// Implementors provide `send` and `recv`; the collectives have default
/// implementations rooted at rank 0.
pub trait Communicator: Send + Sync + fmt::Debug {
    fn rank(&self) -> usize;

    fn size(&self) -> usize;

    /// Non-blocking send of `data` to `dest`.
    fn send(&self, dest: usize, tag: u32, data: Vec<f64>) -> Result<()>;

    /// Blocking receive of the next message from `source` with `tag`.
    fn recv(&self, source: usize, tag: u32) -> Result<Vec<f64>>;

    /// Element-wise reduction over all ranks.
    fn all_reduce_vec(&self, values: &[f64], op: ReduceOp) -> Result<Vec<f64>> {
        if self.size() == 1 {
            return Ok(values.to_vec());
        }
        if self.rank() == 0 {
            let mut acc = values.to_vec();
            for r in 1..self.size() {
                let part = self.recv(r, tags::REDUCE)?;
                if part.len() != acc.len() {
                    return Err(IceError::Comm(format!(
                        "rank {} contributed {} values to a reduction of {}",
                        r,
                        part.len(),
                        acc.len()
                    )));
                }
                op.combine(&mut acc, &part);
            }
            self.broadcast(acc)
        } else {
            self.send(0, tags::REDUCE, values.to_vec())?;
            self.broadcast(Vec::new())
        }
    }

    /// Scalar reduction over all ranks.
    fn all_reduce(&self, value: f64, op: ReduceOp) -> Result<f64> {
        Ok(self.all_reduce_vec(&[value], op)?[0])
    }

    /// Rank 0's `data`, delivered to every rank.
    fn broadcast(&self, data: Vec<f64>) -> Result<Vec<f64>> {
        if self.size() == 1 {
            return Ok(data);
        }
        if self.rank() == 0 {
            for r in 1..self.size() {
                self.send(r, tags::BROADCAST, data.clone())?;
            }
            Ok(data)
        } else {
            self.recv(0, tags::BROADCAST)
        }
    }

    /// Collect every rank's `data` at rank 0, in rank order.
    fn gather(&self, data: Vec<f64>) -> Result<Option<Vec<Vec<f64>>>> {
        if self.rank() == 0 {
            let mut all = Vec::with_capacity(self.size());
            all.push(data);
            for r in 1..self.size() {
                all.push(self.recv(r, tags::GATHER)?);
            }
            Ok(Some(all))
        } else {
            self.send(0, tags::GATHER, data)?;
            Ok(None)
        }
    }

    /// Block until every rank has arrived.
    fn barrier(&self) -> Result<()> {
        self.all_reduce(0.0, ReduceOp::Sum).map(|_| ())
    }
}

// =============================================================================
// Serial
// =============================================================================

/// Single-rank communicator. Messages to self are queued locally.
#[derive(Debug, Default)]
pub struct SerialComm {
    mailbox: Mutex<HashMap<u32, VecDeque<Vec<f64>>>>,
}

impl SerialComm {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Communicator for SerialComm {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn send(&self, dest: usize, tag: u32, data: Vec<f64>) -> Result<()> {
        if dest != 0 {
            return Err(IceError::Comm(format!("serial communicator cannot send to rank {}", dest)));
        }
        self.mailbox.lock().entry(tag).or_default().push_back(data);
        Ok(())
    }

    fn recv(&self, source: usize, tag: u32) -> Result<Vec<f64>> {
        if source != 0 {
            return Err(IceError::Comm(format!("serial communicator cannot receive from rank {}", source)));
        }
        self.mailbox
            .lock()
            .get_mut(&tag)
            .and_then(|q| q.pop_front())
            .ok_or_else(|| IceError::Comm(format!("no pending message with tag {}", tag)))
    }
}

// =============================================================================
// Threads
// =============================================================================

struct Envelope {
    source: usize,
    tag: u32,
    data: Vec<f64>,
}

/// One rank of an in-process group connected by channels.
pub struct ThreadComm {
    rank: usize,
    peers: Vec<Sender<Envelope>>,
    inbox: Mutex<Receiver<Envelope>>,
    pending: Mutex<HashMap<(usize, u32), VecDeque<Vec<f64>>>>,
    timeout: Duration,
}

impl fmt::Debug for ThreadComm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadComm")
            .field("rank", &self.rank)
            .field("size", &self.peers.len())
            .finish()
    }
}

impl ThreadComm {
    /// Create a connected group of `size` ranks.
    pub fn group(size: usize) -> Vec<ThreadComm> {
        let (senders, receivers): (Vec<_>, Vec<_>) = (0..size).map(|_| mpsc::channel()).unzip();
        receivers
            .into_iter()
            .enumerate()
            .map(|(rank, inbox)| ThreadComm {
                rank,
                peers: senders.clone(),
                inbox: Mutex::new(inbox),
                pending: Mutex::new(HashMap::new()),
                timeout: Duration::from_secs(120),
            })
            .collect()
    }

    /// Run `f` on `size` ranks, one thread each, returning results in rank order.
    pub fn run<R, F>(size: usize, f: F) -> Vec<R>
    where
        R: Send,
        F: Fn(ThreadComm) -> R + Sync,
    {
        let comms = Self::group(size);
        std::thread::scope(|scope| {
            let handles: Vec<_> = comms
                .into_iter()
                .map(|comm| {
                    let f = &f;
                    scope.spawn(move || f(comm))
                })
                .collect();
            handles
                .into_iter()
                .map(|h| match h.join() {
                    Ok(r) => r,
                    Err(panic) => std::panic::resume_unwind(panic),
                })
                .collect()
        })
    }

    /// Set how long `recv` waits before reporting a deadlock.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Communicator for ThreadComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.peers.len()
    }

    fn send(&self, dest: usize, tag: u32, data: Vec<f64>) -> Result<()> {
        let peer = self
            .peers
            .get(dest)
            .ok_or_else(|| IceError::Comm(format!("no rank {}", dest)))?;
        peer.send(Envelope {
            source: self.rank,
            tag,
            data,
        })
        .map_err(|_| IceError::Comm(format!("rank {} has hung up", dest)))
    }

    fn recv(&self, source: usize, tag: u32) -> Result<Vec<f64>> {
        if let Some(data) = self.pending.lock().get_mut(&(source, tag)).and_then(|q| q.pop_front()) {
            return Ok(data);
        }
        let inbox = self.inbox.lock();
        loop {
            let msg = inbox.recv_timeout(self.timeout).map_err(|e| match e {
                RecvTimeoutError::Timeout => IceError::Comm(format!(
                    "rank {} timed out waiting for tag {} from rank {}",
                    self.rank, tag, source
                )),
                RecvTimeoutError::Disconnected => IceError::Comm("all peers have hung up".into()),
            })?;
            if msg.source == source && msg.tag == tag {
                return Ok(msg.data);
            }
            self.pending
                .lock()
                .entry((msg.source, msg.tag))
                .or_default()
                .push_back(msg.data);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serial_collectives() {
        let comm = SerialComm::new();
        assert_eq!(comm.all_reduce(2.5, ReduceOp::Max).unwrap(), 2.5);
        assert_eq!(comm.gather(vec![1.0]).unwrap(), Some(vec![vec![1.0]]));
        comm.send(0, 7, vec![3.0]).unwrap();
        assert_eq!(comm.recv(0, 7).unwrap(), vec![3.0]);
        assert!(comm.recv(0, 7).is_err());
    }

    #[test]
    fn test_thread_reductions_agree() {
        let results = ThreadComm::run(4, |comm| {
            let r = comm.rank() as f64;
            (
                comm.all_reduce(r, ReduceOp::Min).unwrap(),
                comm.all_reduce(r, ReduceOp::Max).unwrap(),
                comm.all_reduce_vec(&[r, 1.0], ReduceOp::Sum).unwrap(),
            )
        });
        for (min, max, sum) in results {
            assert_eq!(min, 0.0);
            assert_eq!(max, 3.0);
            assert_eq!(sum, vec![6.0, 4.0]);
        }
    }

    #[test]
    fn test_out_of_order_tags_are_buffered() {
        let got = ThreadComm::run(2, |comm| {
            if comm.rank() == 0 {
                comm.send(1, 21, vec![21.0]).unwrap();
                comm.send(1, 20, vec![20.0]).unwrap();
                Vec::new()
            } else {
                let a = comm.recv(0, 20).unwrap();
                let b = comm.recv(0, 21).unwrap();
                vec![a[0], b[0]]
            }
        });
        assert_eq!(got[1], vec![20.0, 21.0]);
    }

    #[test]
    fn test_gather_in_rank_order() {
        let got = ThreadComm::run(3, |comm| comm.gather(vec![comm.rank() as f64]).unwrap());
        assert_eq!(got[0], Some(vec![vec![0.0], vec![1.0], vec![2.0]]));
        assert!(got[1].is_none());
    }
}
