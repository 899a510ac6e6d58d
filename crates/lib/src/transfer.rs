//! Control-file and data-file sub-command sequences
//!
//! A data transfer opened with a declared size returns the session to JOB
//! mode as soon as the last declared byte is out and the daemon has
//! acknowledged the file. One opened without a size is only ended by
//! closing the connection.

use tracing::{debug, info, warn};

use crate::error::{LpdError, Result};
use crate::job::JobKey;
use crate::protocol::{END_OF_FILE, JobCommand, check_operand};
use crate::session::{Mode, Operation, Phase, Session};
use crate::transport::Transport;

/// Bookkeeping for the data file currently being streamed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transfer {
    job: JobKey,
    filename: String,
    declared: Option<u64>,
    sent: u64,
}

impl Transfer {
    fn new(job: JobKey, filename: String, declared: Option<u64>) -> Self {
        Self {
            job,
            filename,
            declared,
            sent: 0,
        }
    }

    pub fn job(&self) -> JobKey {
        self.job
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn declared(&self) -> Option<u64> {
        self.declared
    }

    pub fn sent(&self) -> u64 {
        self.sent
    }

    /// Bytes still owed, for sized transfers
    pub fn remaining(&self) -> Option<u64> {
        self.declared.map(|total| total - self.sent)
    }

    pub fn is_complete(&self) -> bool {
        self.declared == Some(self.sent)
    }

    /// Refuse a chunk that would run past the declared size
    fn admit(&self, len: u64) -> Result<()> {
        match self.declared {
            Some(declared) if self.sent + len > declared => Err(LpdError::OversizedTransfer {
                declared,
                sent: self.sent,
                attempted: len,
            }),
            _ => Ok(()),
        }
    }

    fn record(&mut self, len: u64) {
        self.sent += len;
    }

    fn command(&self) -> JobCommand {
        JobCommand::ReceiveDataFile {
            size: self.declared.unwrap_or(0),
            name: self.filename.clone(),
        }
    }
}

impl<T: Transport> Session<T> {
    /// Send the job's control file. The job can no longer be edited
    /// afterwards.
    pub fn send_control_file(&mut self, key: JobKey) -> Result<()> {
        self.check(Operation::SendControlFile)?;
        let job = self.job(key)?;
        if job.control_file_sent() {
            return Err(LpdError::ControlFileAlreadySent(key));
        }
        let (name, _) = job.wire_filenames()?;
        let mut payload = job.control_file();
        let cmd = JobCommand::ReceiveControlFile {
            size: payload.len() as u64,
            name,
        };

        debug!(%key, %cmd, "Sending sub-command");
        self.send_bytes(&cmd.encode())?;
        self.expect_ack(&cmd)?;
        payload.push(END_OF_FILE);
        self.send_bytes(&payload)?;
        self.expect_ack(&cmd)?;

        self.job_mut(key)?.mark_control_file_sent();
        info!(%key, %cmd, "Control file accepted");
        Ok(())
    }

    /// Stream `chunk` as data for `key`.
    ///
    /// In JOB mode this opens a data file of undeclared size which stays open
    /// until the connection is closed. In DATA mode the chunk is appended to
    /// the transfer in flight.
    pub fn send_data(&mut self, key: JobKey, chunk: &[u8]) -> Result<()> {
        self.check(Operation::SendData)?;
        if self.mode() == Mode::Job {
            if self.job(key)?.data_complete() {
                return Err(LpdError::WrongMode {
                    operation: Operation::SendData,
                    mode: Mode::Job,
                });
            }
            self.open_transfer(key, None)?;
        }
        self.stream(key, chunk)
    }

    /// Open a data file of `declared` bytes for `key` and send its first
    /// chunk. A chunk that covers the whole size completes the file at once.
    pub fn send_data_sized(&mut self, key: JobKey, chunk: &[u8], declared: u64) -> Result<()> {
        if self.mode() == Mode::Data {
            return Err(LpdError::UnexpectedArgument);
        }
        self.check(Operation::SendDataSized)?;
        self.job(key)?;
        let attempted = chunk.len() as u64;
        if attempted > declared {
            return Err(LpdError::OversizedTransfer {
                declared,
                sent: 0,
                attempted,
            });
        }
        self.open_transfer(key, Some(declared))?;
        self.stream(key, chunk)
    }

    fn open_transfer(&mut self, key: JobKey, declared: Option<u64>) -> Result<()> {
        let filename = self.job(key)?.data_filename();
        check_operand(&filename)?;
        let transfer = Transfer::new(key, filename, declared);
        let cmd = transfer.command();

        debug!(%key, %cmd, "Sending sub-command");
        self.send_bytes(&cmd.encode())?;
        self.expect_ack(&cmd)?;
        if let Some(link) = self.link.as_mut() {
            link.phase = Phase::Data(transfer);
        }
        Ok(())
    }

    fn transfer_mut(&mut self) -> Option<&mut Transfer> {
        match self.link.as_mut().map(|link| &mut link.phase) {
            Some(Phase::Data(transfer)) => Some(transfer),
            _ => None,
        }
    }

    fn stream(&mut self, key: JobKey, chunk: &[u8]) -> Result<()> {
        self.job(key)?;
        let mode = self.mode();
        let len = chunk.len() as u64;
        let Some(transfer) = self.transfer_mut() else {
            return Err(LpdError::WrongMode {
                operation: Operation::SendData,
                mode,
            });
        };
        if transfer.job() != key {
            return Err(LpdError::TransferInProgress(transfer.job()));
        }
        transfer.admit(len)?;

        if !chunk.is_empty() {
            self.send_bytes(chunk)?;
        }
        let complete = match self.transfer_mut() {
            Some(transfer) => {
                transfer.record(len);
                debug!(%key, sent = transfer.sent(), declared = ?transfer.declared(), "Sent data");
                transfer.is_complete()
            }
            None => false,
        };
        if complete {
            self.finish_transfer()?;
        }
        Ok(())
    }

    /// Terminate a fully sent file and go back to JOB mode
    fn finish_transfer(&mut self) -> Result<()> {
        let Some(transfer) = self.transfer().cloned() else {
            return Ok(());
        };
        self.send_bytes(&[END_OF_FILE])?;
        let acked = self.expect_ack(&transfer.command());

        // the daemon has consumed the file either way
        if let Some(link) = self.link.as_mut() {
            link.phase = Phase::Job;
            if acked.is_ok() {
                if let Some(job) = link.jobs.get_mut(&transfer.job()) {
                    job.mark_data_complete();
                }
            }
        }
        match &acked {
            Ok(()) => info!(
                key = %transfer.job(),
                bytes = transfer.sent(),
                file = transfer.filename(),
                "Data file accepted"
            ),
            Err(e) => warn!(key = %transfer.job(), error = %e, "Data file not accepted"),
        }
        acked
    }
}
