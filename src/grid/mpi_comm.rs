//! Ranks as MPI processes.
//!
//! Sends are posted with `MPI_Isend` from an owned copy of the message,
//! so a send never waits for the matching receive; the copy is freed
//! once MPI reports the send complete. Receives block. Every MPI call
//! goes through one lock, which is what `MPI_THREAD_SERIALIZED` needs.
//!
//! Start the executable under `mpirun`:
//!
//! ```text
//! mpirun -n 4 icesheet -i start.bin -y 1000 -o end.bin
//! ```

use std::fmt;

use mpi::Threading;
use mpi::environment::Universe;
use mpi::request::{Request, StaticScope};
use mpi::topology::SimpleCommunicator;
use mpi::traits::{Communicator as _, Destination, Source};
use parking_lot::Mutex;
use tracing::{debug, warn};

use super::Communicator;
use crate::error::{IceError, Result};

/// A posted send and the buffer it reads from.
struct InFlight {
    request: Request<'static, [f64], StaticScope>,
    buffer: *mut [f64],
}

impl InFlight {
    /// Free the buffer of a completed send.
    ///
    /// # Safety
    ///
    /// The request that read `buffer` must have completed.
    unsafe fn release(buffer: *mut [f64]) {
        // SAFETY: `buffer` came from `Box::into_raw` in `MpiComm::send`
        // and MPI no longer reads it.
        drop(unsafe { Box::from_raw(buffer) });
    }
}

struct State {
    world: SimpleCommunicator,
    in_flight: Vec<InFlight>,
}

impl State {
    /// Free the buffers of every completed send.
    fn reap(&mut self) {
        for f in std::mem::take(&mut self.in_flight) {
            match f.request.test() {
                // SAFETY: the send completed.
                Ok(_) => unsafe { InFlight::release(f.buffer) },
                Err(request) => self.in_flight.push(InFlight {
                    request,
                    buffer: f.buffer,
                }),
            }
        }
    }
}

/// The MPI world communicator.
///
/// Owns the MPI environment: MPI is finalized when this is dropped, so
/// create it once per process and share it through an `Arc`.
pub struct MpiComm {
    rank: usize,
    size: usize,
    state: Mutex<State>,
    _universe: Universe,
}

// SAFETY: the MPI handles are only used under `state`'s lock, and MPI is
// initialized with at least `MPI_THREAD_SERIALIZED`.
unsafe impl Send for MpiComm {}
// SAFETY: as above.
unsafe impl Sync for MpiComm {}

impl MpiComm {
    /// Initialize MPI and wrap its world communicator.
    pub fn init() -> Result<Self> {
        let (universe, threading) = mpi::initialize_with_threading(Threading::Serialized)
            .ok_or_else(|| IceError::Comm("MPI is already initialized in this process".into()))?;
        if threading < Threading::Serialized {
            return Err(IceError::Comm(format!(
                "the MPI library provides {:?} threading; serialized is required",
                threading
            )));
        }
        let world = universe.world();
        let (rank, size) = (world.rank() as usize, world.size() as usize);
        debug!(rank, size, "MPI initialized");
        Ok(Self {
            rank,
            size,
            state: Mutex::new(State {
                world,
                in_flight: Vec::new(),
            }),
            _universe: universe,
        })
    }

    fn peer(&self, rank: usize) -> Result<i32> {
        if rank >= self.size {
            return Err(IceError::Comm(format!(
                "rank {} is outside the communicator of size {}",
                rank, self.size
            )));
        }
        Ok(rank as i32)
    }
}

impl fmt::Debug for MpiComm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MpiComm")
            .field("rank", &self.rank)
            .field("size", &self.size)
            .finish()
    }
}

impl Communicator for MpiComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn send(&self, dest: usize, tag: u32, data: Vec<f64>) -> Result<()> {
        let dest = self.peer(dest)?;
        let buffer = Box::into_raw(data.into_boxed_slice());
        // SAFETY: the buffer stays allocated until `reap` or `drop` sees the
        // send complete.
        let view: &'static [f64] = unsafe { &*buffer };
        let mut state = self.state.lock();
        let request = state
            .world
            .process_at_rank(dest)
            .immediate_send_with_tag(StaticScope, view, tag as i32);
        state.in_flight.push(InFlight { request, buffer });
        state.reap();
        Ok(())
    }

    fn recv(&self, source: usize, tag: u32) -> Result<Vec<f64>> {
        let source = self.peer(source)?;
        let mut state = self.state.lock();
        let (data, _status) = state.world.process_at_rank(source).receive_vec_with_tag::<f64>(tag as i32);
        state.reap();
        Ok(data)
    }
}

impl Drop for MpiComm {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        if !state.in_flight.is_empty() {
            warn!(pending = state.in_flight.len(), "waiting for sends before finalizing MPI");
        }
        for f in state.in_flight.drain(..) {
            f.request.wait();
            // SAFETY: the send completed.
            unsafe { InFlight::release(f.buffer) };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::ReduceOp;

    // MPI can be initialized once per process, so one test covers the
    // single-rank world.
    #[test]
    fn test_single_rank_world() {
        let comm = MpiComm::init().unwrap();
        assert_eq!((comm.rank(), comm.size()), (0, 1));

        comm.send(0, 7, vec![1.0, 2.0]).unwrap();
        comm.send(0, 8, vec![3.0]).unwrap();
        assert_eq!(comm.recv(0, 8).unwrap(), vec![3.0]);
        assert_eq!(comm.recv(0, 7).unwrap(), vec![1.0, 2.0]);

        assert_eq!(comm.all_reduce(2.5, ReduceOp::Max).unwrap(), 2.5);
        assert!(matches!(comm.send(1, 7, vec![]), Err(IceError::Comm(_))));
        assert!(matches!(comm.recv(3, 7), Err(IceError::Comm(_))));
        assert!(MpiComm::init().is_err());
    }
}
