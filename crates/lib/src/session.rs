//! Connection-level mode machine
//!
//! A session is DISCONNECTED until a transport is opened, then moves between
//! ROOT, JOB and DATA as commands are acknowledged. Every operation is
//! checked against [`Operation::legal_modes`] before anything is written, and
//! any transport failure drops the connection together with all of its jobs.

use std::collections::BTreeMap;
use std::fmt;
use std::io;

use tracing::{debug, info, warn};

use crate::error::{LpdError, Result};
use crate::identity::Identity;
use crate::job::{ControlFields, Job, JobKey, MAX_JOB_ID};
use crate::protocol::{Ack, JobCommand, QueueFormat, RootCommand};
use crate::transfer::Transfer;
use crate::transport::{Connector, SourcePortPolicy, Transport};

/// Command mode of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    Disconnected,
    Root,
    Job,
    Data,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Mode::Disconnected => "DISCONNECTED",
            Mode::Root => "ROOT",
            Mode::Job => "JOB",
            Mode::Data => "DATA",
        };
        f.write_str(name)
    }
}

/// Everything a caller can ask of a session, for legality checks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Connect,
    Disconnect,
    PrintWaitingJobs,
    SendJobs,
    GetQueueState,
    RemoveJobs,
    NewJob,
    AbortJob,
    SendControlFile,
    /// Data without a declared size: opens or continues a transfer
    SendData,
    /// Data with a declared total size: opens a transfer
    SendDataSized,
}

impl Operation {
    /// The command-mode table
    pub fn legal_modes(self) -> &'static [Mode] {
        use Mode::*;
        match self {
            Operation::Connect => &[Disconnected],
            Operation::Disconnect => &[Disconnected, Root, Job, Data],
            Operation::PrintWaitingJobs
            | Operation::SendJobs
            | Operation::GetQueueState
            | Operation::RemoveJobs => &[Root],
            Operation::NewJob | Operation::AbortJob | Operation::SendControlFile => &[Job],
            Operation::SendData => &[Job, Data],
            Operation::SendDataSized => &[Job],
        }
    }

    pub fn is_legal_in(self, mode: Mode) -> bool {
        self.legal_modes().contains(&mode)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Connect => "connect",
            Operation::Disconnect => "disconnect",
            Operation::PrintWaitingJobs => "print_waiting_jobs",
            Operation::SendJobs => "send_jobs",
            Operation::GetQueueState => "get_queue_state",
            Operation::RemoveJobs => "remove_jobs",
            Operation::NewJob => "new_job",
            Operation::AbortJob => "abort_job",
            Operation::SendControlFile => "send_control_file",
            Operation::SendData => "send_data",
            Operation::SendDataSized => "send_data_sized",
        };
        f.write_str(name)
    }
}

/// Mode of a live connection; DATA owns the transfer in flight
#[derive(Debug)]
pub(crate) enum Phase {
    Root,
    Job,
    Data(Transfer),
}

impl Phase {
    fn mode(&self) -> Mode {
        match self {
            Phase::Root => Mode::Root,
            Phase::Job => Mode::Job,
            Phase::Data(_) => Mode::Data,
        }
    }
}

/// State that only exists while connected
#[derive(Debug)]
pub(crate) struct Link<T> {
    pub(crate) transport: T,
    pub(crate) phase: Phase,
    pub(crate) jobs: BTreeMap<JobKey, Job>,
}

/// Host and user stamped on new jobs
#[derive(Debug, Clone, PartialEq, Eq)]
struct Origin {
    host: String,
    user: String,
}

/// One LPD session over a transport of type `T`
#[derive(Debug)]
pub struct Session<T> {
    pub(crate) link: Option<Link<T>>,
    origin: Origin,
    next_key: u64,
    next_job_id: u16,
}

impl<T: Transport> Session<T> {
    /// Create a disconnected session. `job_id_seed` is the id the first
    /// automatically numbered job receives.
    pub fn new(identity: &dyn Identity, job_id_seed: u16) -> Self {
        Self {
            link: None,
            origin: Origin {
                host: identity.local_hostname(),
                user: identity.effective_username(),
            },
            next_key: 1,
            next_job_id: job_id_seed % (MAX_JOB_ID + 1),
        }
    }

    pub fn mode(&self) -> Mode {
        self.link
            .as_ref()
            .map_or(Mode::Disconnected, |link| link.phase.mode())
    }

    pub fn is_connected(&self) -> bool {
        self.link.is_some()
    }

    /// Fail with `WrongMode` unless `op` is legal right now
    pub fn check(&self, op: Operation) -> Result<()> {
        let mode = self.mode();
        if op.is_legal_in(mode) {
            Ok(())
        } else {
            Err(LpdError::WrongMode {
                operation: op,
                mode,
            })
        }
    }

    /// Legality check that also hands back the live connection
    pub(crate) fn link_for(&mut self, op: Operation) -> Result<&mut Link<T>> {
        self.check(op)?;
        // every mode other than DISCONNECTED implies a link
        self.link.as_mut().ok_or(LpdError::WrongMode {
            operation: op,
            mode: Mode::Disconnected,
        })
    }

    pub fn connect<C>(
        &mut self,
        connector: &C,
        host: &str,
        port: u16,
        policy: SourcePortPolicy,
    ) -> Result<()>
    where
        C: Connector<Transport = T>,
    {
        self.check(Operation::Connect)?;
        let transport = connector.open(host, port, policy)?;
        info!(host, port, ?policy, "Connected to line printer daemon");
        self.link = Some(Link {
            transport,
            phase: Phase::Root,
            jobs: BTreeMap::new(),
        });
        Ok(())
    }

    /// Close the connection and forget every job. A no-op when already
    /// disconnected.
    pub fn disconnect(&mut self) -> Result<()> {
        if let Some(mut link) = self.link.take() {
            if let Err(e) = link.transport.close() {
                debug!(error = %e, "Error while closing connection");
            }
            info!(jobs = link.jobs.len(), "Disconnected");
        }
        Ok(())
    }

    /// Drop the connection after a transport failure
    fn abandon(&mut self, error: &io::Error) {
        if let Some(mut link) = self.link.take() {
            warn!(%error, jobs = link.jobs.len(), "Transport failed, dropping connection");
            let _ = link.transport.close();
        }
    }

    /// Run one transport call; a failure forces DISCONNECTED
    pub(crate) fn wire<R>(&mut self, f: impl FnOnce(&mut T) -> io::Result<R>) -> Result<R> {
        let Some(link) = self.link.as_mut() else {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "not connected").into());
        };
        match f(&mut link.transport) {
            Ok(value) => Ok(value),
            Err(e) => {
                self.abandon(&e);
                Err(e.into())
            }
        }
    }

    pub(crate) fn send_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.wire(|t| t.send(bytes))
    }

    /// Wait for the one-byte reply to `command`
    pub(crate) fn expect_ack(&mut self, command: &dyn fmt::Display) -> Result<()> {
        let byte = self.wire(|t| t.recv_byte())?;
        match Ack::from_byte(byte) {
            Ack::Accepted => Ok(()),
            Ack::Rejected(code) => {
                warn!(%command, code, "Daemon rejected command");
                Err(LpdError::ProtocolNack {
                    command: command.to_string(),
                    code,
                })
            }
        }
    }

    fn send_root(&mut self, op: Operation, cmd: &RootCommand) -> Result<()> {
        self.check(op)?;
        cmd.validate()?;
        debug!(%cmd, "Sending command");
        self.send_bytes(&cmd.encode())
    }

    /// Ask the daemon to start printing its queue. Closes the connection.
    pub fn print_waiting_jobs(&mut self, queue: &str) -> Result<()> {
        let cmd = RootCommand::PrintWaitingJobs {
            queue: queue.to_string(),
        };
        self.send_root(Operation::PrintWaitingJobs, &cmd)?;
        self.disconnect()
    }

    /// Enter JOB mode for `queue`
    pub fn send_jobs(&mut self, queue: &str) -> Result<()> {
        let cmd = RootCommand::ReceiveJob {
            queue: queue.to_string(),
        };
        self.send_root(Operation::SendJobs, &cmd)?;
        self.expect_ack(&cmd)?;
        if let Some(link) = self.link.as_mut() {
            link.phase = Phase::Job;
        }
        debug!(queue, "Daemon is receiving jobs");
        Ok(())
    }

    /// Read the queue listing, one entry per line. Closes the connection.
    pub fn get_queue_state(
        &mut self,
        queue: &str,
        format: QueueFormat,
        list: &[&str],
    ) -> Result<Vec<String>> {
        let cmd = RootCommand::QueueState {
            queue: queue.to_string(),
            format,
            list: list.iter().map(|s| s.to_string()).collect(),
        };
        self.send_root(Operation::GetQueueState, &cmd)?;
        let mut lines = Vec::new();
        while let Some(line) = self.wire(|t| t.recv_line())? {
            lines.push(line);
        }
        self.disconnect()?;
        Ok(lines)
    }

    /// Remove jobs from `queue` on behalf of `agent`. Closes the connection.
    pub fn remove_jobs(&mut self, queue: &str, agent: &str, list: &[&str]) -> Result<()> {
        let cmd = RootCommand::RemoveJobs {
            queue: queue.to_string(),
            agent: agent.to_string(),
            list: list.iter().map(|s| s.to_string()).collect(),
        };
        self.send_root(Operation::RemoveJobs, &cmd)?;
        self.disconnect()
    }

    /// Create a job. Without an explicit id the previous id plus one is used.
    pub fn new_job(&mut self, id: Option<u16>, host: Option<&str>) -> Result<JobKey> {
        self.check(Operation::NewJob)?;
        let id = match id {
            Some(id) if id > MAX_JOB_ID => return Err(LpdError::InvalidJobId(id)),
            Some(id) => id,
            None => self.next_job_id,
        };
        let key = JobKey::new(self.next_key);
        let host = host.map_or_else(|| self.origin.host.clone(), String::from);
        let job = Job::new(key, id, host, self.origin.user.clone())?;

        let link = self.link_for(Operation::NewJob)?;
        link.jobs.insert(key, job);
        self.next_key += 1;
        self.next_job_id = (id + 1) % (MAX_JOB_ID + 1);
        debug!(%key, id, "Created job");
        Ok(key)
    }

    /// Jobs only live as long as the connection they were created on
    pub fn job(&self, key: JobKey) -> Result<&Job> {
        self.link
            .as_ref()
            .and_then(|link| link.jobs.get(&key))
            .ok_or(LpdError::NoSuchJob(key))
    }

    pub fn job_mut(&mut self, key: JobKey) -> Result<&mut Job> {
        self.link
            .as_mut()
            .and_then(|link| link.jobs.get_mut(&key))
            .ok_or(LpdError::NoSuchJob(key))
    }

    /// Apply `edit` to a job's control fields
    pub fn edit_job<R>(
        &mut self,
        key: JobKey,
        edit: impl FnOnce(&mut ControlFields) -> R,
    ) -> Result<R> {
        let fields = self.job_mut(key)?.fields_mut()?;
        Ok(edit(fields))
    }

    /// Keys of all jobs on the current connection
    pub fn jobs(&self) -> Vec<JobKey> {
        self.link
            .as_ref()
            .map(|link| link.jobs.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Abandon the receive-job exchange; the daemon discards what it got so
    /// far and every job of this session is dropped with it.
    pub fn abort_job(&mut self) -> Result<()> {
        self.check(Operation::AbortJob)?;
        let cmd = JobCommand::Abort;
        debug!(%cmd, "Sending sub-command");
        self.send_bytes(&cmd.encode())?;
        if let Some(link) = self.link.as_mut() {
            link.jobs.clear();
        }
        Ok(())
    }

    /// The data transfer in flight, if any
    pub fn transfer(&self) -> Option<&Transfer> {
        match self.link.as_ref().map(|link| &link.phase) {
            Some(Phase::Data(transfer)) => Some(transfer),
            _ => None,
        }
    }
}
