//! Scripted in-memory daemon for unit tests

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};

use crate::identity::FixedIdentity;
use crate::session::Session;
use crate::transport::{Connector, SourcePortPolicy, Transport};

#[derive(Debug, Default)]
struct Script {
    written: Vec<u8>,
    sends: usize,
    opens: usize,
    closed: bool,
    refuse: bool,
    fail_next_send: bool,
    replies: VecDeque<u8>,
    lines: VecDeque<String>,
}

/// Connector whose transports all share one script
#[derive(Debug, Clone, Default)]
pub(crate) struct MockConnector {
    script: Arc<Mutex<Script>>,
}

impl MockConnector {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn refusing() -> Self {
        let mock = Self::new();
        mock.script().refuse = true;
        mock
    }

    fn script(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script.lock().unwrap()
    }

    /// Queue `n` positive acknowledgments
    pub(crate) fn push_acks(&self, n: usize) {
        self.script().replies.extend(std::iter::repeat_n(0, n));
    }

    pub(crate) fn push_reply(&self, byte: u8) {
        self.script().replies.push_back(byte);
    }

    pub(crate) fn push_lines(&self, lines: &[&str]) {
        self.script()
            .lines
            .extend(lines.iter().map(|l| l.to_string()));
    }

    pub(crate) fn fail_next_send(&self) {
        self.script().fail_next_send = true;
    }

    pub(crate) fn written(&self) -> Vec<u8> {
        self.script().written.clone()
    }

    pub(crate) fn clear_written(&self) {
        self.script().written.clear();
    }

    /// Successful send calls so far
    pub(crate) fn sends(&self) -> usize {
        self.script().sends
    }

    pub(crate) fn opens(&self) -> usize {
        self.script().opens
    }

    pub(crate) fn closed(&self) -> bool {
        self.script().closed
    }
}

impl Connector for MockConnector {
    type Transport = MockTransport;

    fn open(&self, _host: &str, _port: u16, _policy: SourcePortPolicy) -> io::Result<MockTransport> {
        let mut script = self.script();
        if script.refuse {
            return Err(io::Error::new(io::ErrorKind::ConnectionRefused, "refused"));
        }
        script.opens += 1;
        script.closed = false;
        Ok(MockTransport {
            script: Arc::clone(&self.script),
        })
    }
}

#[derive(Debug)]
pub(crate) struct MockTransport {
    script: Arc<Mutex<Script>>,
}

impl Transport for MockTransport {
    fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
        let mut script = self.script.lock().unwrap();
        if std::mem::take(&mut script.fail_next_send) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "broken pipe"));
        }
        script.written.extend_from_slice(bytes);
        script.sends += 1;
        Ok(())
    }

    fn recv_byte(&mut self) -> io::Result<u8> {
        self.script
            .lock()
            .unwrap()
            .replies
            .pop_front()
            .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "daemon hung up"))
    }

    fn recv_line(&mut self) -> io::Result<Option<String>> {
        Ok(self.script.lock().unwrap().lines.pop_front())
    }

    fn close(&mut self) -> io::Result<()> {
        self.script.lock().unwrap().closed = true;
        Ok(())
    }
}

pub(crate) fn identity() -> FixedIdentity {
    FixedIdentity::new("printhost", "alice")
}

/// A session in ROOT mode, job ids starting at 100
pub(crate) fn connected_session() -> (Session<MockTransport>, MockConnector) {
    let mock = MockConnector::new();
    let mut session = Session::new(&identity(), 100);
    session
        .connect(&mock, "printer", 515, SourcePortPolicy::Any)
        .unwrap();
    (session, mock)
}
