//! Inter-rank communication.
//!
//! The numerical kernels are single-threaded per rank; ranks cooperate only
//! through tagged buffer exchange and global reductions. `SerialComm` is the
//! one-rank case. `ChannelComm` connects ranks running as threads of one
//! process so decomposed solves can be checked against serial ones.

use std::collections::VecDeque;
use std::fmt;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::{FvError, Result};

/// Tag reserved for reductions.
const REDUCE_TAG: u64 = u64::MAX;

const RECEIVE_TIMEOUT: Duration = Duration::from_secs(120);

pub trait Communicator: Send + Sync + fmt::Debug {
    fn rank(&self) -> usize;

    fn n_procs(&self) -> usize;

    /// Posts a buffer to `to`. Never blocks.
    fn send(&self, to: usize, tag: u64, data: Vec<f64>) -> Result<()>;

    /// Blocks until the next buffer from `from` with `tag` is available.
    fn receive(&self, from: usize, tag: u64) -> Result<Vec<f64>>;

    fn is_parallel(&self) -> bool {
        self.n_procs() > 1
    }

    /// Element-wise global sum. Every rank combines contributions in rank
    /// order, so all ranks obtain bit-identical results.
    fn all_reduce_sum(&self, values: &[f64]) -> Result<Vec<f64>> {
        let gathered = self.all_gather(values)?;
        let mut out = vec![0.0; values.len()];
        for contribution in &gathered {
            for (o, v) in out.iter_mut().zip(contribution) {
                *o += v;
            }
        }
        Ok(out)
    }

    fn all_reduce_max(&self, values: &[f64]) -> Result<Vec<f64>> {
        let gathered = self.all_gather(values)?;
        let mut out = vec![f64::NEG_INFINITY; values.len()];
        for contribution in &gathered {
            for (o, v) in out.iter_mut().zip(contribution) {
                *o = o.max(*v);
            }
        }
        Ok(out)
    }

    fn sum(&self, value: f64) -> Result<f64> {
        Ok(self.all_reduce_sum(&[value])?[0])
    }

    fn max(&self, value: f64) -> Result<f64> {
        Ok(self.all_reduce_max(&[value])?[0])
    }

    fn all(&self, flag: bool) -> Result<bool> {
        let v = if flag { 0.0 } else { 1.0 };
        Ok(self.max(v)? == 0.0)
    }

    /// Contributions of all ranks, indexed by rank.
    fn all_gather(&self, values: &[f64]) -> Result<Vec<Vec<f64>>> {
        let n = self.n_procs();
        let me = self.rank();
        for to in (0..n).filter(|&r| r != me) {
            self.send(to, REDUCE_TAG, values.to_vec())?;
        }
        let mut gathered = Vec::with_capacity(n);
        for from in 0..n {
            if from == me {
                gathered.push(values.to_vec());
            } else {
                let data = self.receive(from, REDUCE_TAG)?;
                if data.len() != values.len() {
                    return Err(FvError::Parallel(format!(
                        "reduction length mismatch between rank {me} and rank {from}"
                    )));
                }
                gathered.push(data);
            }
        }
        Ok(gathered)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SerialComm;

impl Communicator for SerialComm {
    fn rank(&self) -> usize {
        0
    }

    fn n_procs(&self) -> usize {
        1
    }

    fn send(&self, to: usize, _tag: u64, _data: Vec<f64>) -> Result<()> {
        Err(FvError::Parallel(format!(
            "serial run cannot send to rank {to}"
        )))
    }

    fn receive(&self, from: usize, _tag: u64) -> Result<Vec<f64>> {
        Err(FvError::Parallel(format!(
            "serial run cannot receive from rank {from}"
        )))
    }
}

pub fn serial() -> Arc<dyn Communicator> {
    Arc::new(SerialComm)
}

struct Message {
    from: usize,
    tag: u64,
    data: Vec<f64>,
}

/// One rank of an in-process group.
pub struct ChannelComm {
    rank: usize,
    n_procs: usize,
    outboxes: Vec<Sender<Message>>,
    inbox: Mutex<Receiver<Message>>,
    pending: Mutex<VecDeque<Message>>,
}

impl fmt::Debug for ChannelComm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelComm")
            .field("rank", &self.rank)
            .field("n_procs", &self.n_procs)
            .finish()
    }
}

impl ChannelComm {
    /// Creates a fully connected group of `n` ranks.
    pub fn group(n: usize) -> Vec<ChannelComm> {
        let (senders, receivers): (Vec<_>, Vec<_>) = (0..n).map(|_| mpsc::channel()).unzip();
        receivers
            .into_iter()
            .enumerate()
            .map(|(rank, inbox)| ChannelComm {
                rank,
                n_procs: n,
                outboxes: senders.clone(),
                inbox: Mutex::new(inbox),
                pending: Mutex::new(VecDeque::new()),
            })
            .collect()
    }

    fn take_pending(&self, from: usize, tag: u64) -> Result<Option<Vec<f64>>> {
        let mut pending = self
            .pending
            .lock()
            .map_err(|_| FvError::Parallel("pending queue poisoned".to_string()))?;
        let found = pending
            .iter()
            .position(|m| m.from == from && m.tag == tag);
        Ok(found.and_then(|i| pending.remove(i)).map(|m| m.data))
    }
}

impl Communicator for ChannelComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn n_procs(&self) -> usize {
        self.n_procs
    }

    fn send(&self, to: usize, tag: u64, data: Vec<f64>) -> Result<()> {
        let outbox = self.outboxes.get(to).ok_or_else(|| {
            FvError::Parallel(format!("rank {to} is outside a group of {}", self.n_procs))
        })?;
        outbox
            .send(Message {
                from: self.rank,
                tag,
                data,
            })
            .map_err(|_| FvError::Parallel(format!("rank {to} has shut down")))
    }

    fn receive(&self, from: usize, tag: u64) -> Result<Vec<f64>> {
        if let Some(data) = self.take_pending(from, tag)? {
            return Ok(data);
        }
        let inbox = self
            .inbox
            .lock()
            .map_err(|_| FvError::Parallel("inbox poisoned".to_string()))?;
        loop {
            let message = inbox.recv_timeout(RECEIVE_TIMEOUT).map_err(|e| match e {
                RecvTimeoutError::Timeout => FvError::Parallel(format!(
                    "rank {} timed out waiting for rank {from} (tag {tag})",
                    self.rank
                )),
                RecvTimeoutError::Disconnected => {
                    FvError::Parallel("all peers have shut down".to_string())
                }
            })?;
            if message.from == from && message.tag == tag {
                return Ok(message.data);
            }
            self.pending
                .lock()
                .map_err(|_| FvError::Parallel("pending queue poisoned".to_string()))?
                .push_back(message);
        }
    }
}

/// Runs `f` once per rank of an `n`-rank in-process group, each on its own
/// thread of a dedicated pool, and returns the results in rank order.
pub fn run_ranks<F, R>(n: usize, f: F) -> Result<Vec<R>>
where
    F: Fn(Arc<dyn Communicator>) -> R + Send + Sync,
    R: Send,
{
    if n == 0 {
        return Err(FvError::Parallel("cannot run zero ranks".to_string()));
    }
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(n)
        .thread_name(|i| format!("fvx-rank-{i}"))
        .build()
        .map_err(|e| FvError::Parallel(e.to_string()))?;

    let mut slots: Vec<Option<R>> = (0..n).map(|_| None).collect();
    let comms = ChannelComm::group(n);
    pool.scope(|scope| {
        for (slot, comm) in slots.iter_mut().zip(comms) {
            let f = &f;
            scope.spawn(move |_| {
                let comm: Arc<dyn Communicator> = Arc::new(comm);
                *slot = Some(f(comm));
            });
        }
    });

    slots
        .into_iter()
        .enumerate()
        .map(|(rank, r)| {
            r.ok_or_else(|| FvError::Parallel(format!("rank {rank} produced no result")))
        })
        .collect()
}
