//! Byte-stream transport to the daemon
//!
//! The session only needs to send bytes, read single acknowledgment bytes,
//! read text lines and close. [`TcpConnector`] provides that over TCP,
//! optionally binding one of the privileged source ports RFC 1179 asks
//! clients to use.

use std::io::{self, BufReader};
use std::net::{Ipv4Addr, Ipv6Addr, Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::ops::RangeInclusive;
use std::time::Duration;

use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use tracing::{debug, trace};

use crate::codec;

/// Source ports RFC 1179 reserves for clients
pub const RESERVED_PORTS: RangeInclusive<u16> = 721..=731;

/// Which local port a connection is made from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SourcePortPolicy {
    /// Whatever the OS assigns
    #[default]
    Any,
    /// The first free port in [`RESERVED_PORTS`]; usually needs root
    Reserved,
}

impl SourcePortPolicy {
    pub fn from_strict(strict_rfc_ports: bool) -> Self {
        if strict_rfc_ports {
            SourcePortPolicy::Reserved
        } else {
            SourcePortPolicy::Any
        }
    }
}

/// An open, half-duplex connection
pub trait Transport {
    fn send(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Block for one byte; end of stream is an error
    fn recv_byte(&mut self) -> io::Result<u8>;

    /// Block for one line, `None` once the peer has closed
    fn recv_line(&mut self) -> io::Result<Option<String>>;

    fn close(&mut self) -> io::Result<()>;
}

/// Opens transports
pub trait Connector {
    type Transport: Transport;

    fn open(&self, host: &str, port: u16, policy: SourcePortPolicy)
    -> io::Result<Self::Transport>;
}

/// TCP connector with an optional connect/read/write timeout
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector {
    timeout: Option<Duration>,
}

impl TcpConnector {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }

    fn connect_addr(&self, addr: SocketAddr, policy: SourcePortPolicy) -> io::Result<TcpStream> {
        let stream = match policy {
            SourcePortPolicy::Any => match self.timeout {
                Some(timeout) => TcpStream::connect_timeout(&addr, timeout)?,
                None => TcpStream::connect(addr)?,
            },
            SourcePortPolicy::Reserved => self.connect_reserved(addr)?,
        };
        stream.set_nodelay(true)?;
        stream.set_read_timeout(self.timeout)?;
        stream.set_write_timeout(self.timeout)?;
        Ok(stream)
    }

    /// Walk the reserved range until a port binds and connects
    fn connect_reserved(&self, addr: SocketAddr) -> io::Result<TcpStream> {
        let mut last_err = None;
        for port in RESERVED_PORTS {
            match self.connect_from(addr, port) {
                Ok(stream) => {
                    debug!(port, "Bound reserved source port");
                    return Ok(stream);
                }
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::AddrInUse | io::ErrorKind::AddrNotAvailable
                    ) =>
                {
                    trace!(port, "Reserved port busy");
                    last_err = Some(e);
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_err.unwrap_or_else(|| {
            io::Error::new(io::ErrorKind::AddrInUse, "no reserved source port available")
        }))
    }

    fn connect_from(&self, addr: SocketAddr, port: u16) -> io::Result<TcpStream> {
        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
        socket.set_reuse_address(true)?;
        let local: SocketAddr = match addr {
            SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, port).into(),
            SocketAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, port).into(),
        };
        socket.bind(&SockAddr::from(local))?;
        let remote = SockAddr::from(addr);
        match self.timeout {
            Some(timeout) => socket.connect_timeout(&remote, timeout)?,
            None => socket.connect(&remote)?,
        }
        Ok(socket.into())
    }
}

impl Connector for TcpConnector {
    type Transport = TcpTransport;

    fn open(&self, host: &str, port: u16, policy: SourcePortPolicy) -> io::Result<TcpTransport> {
        let mut last_err = None;
        for addr in (host, port).to_socket_addrs()? {
            match self.connect_addr(addr, policy) {
                Ok(stream) => return TcpTransport::new(stream),
                Err(e) => {
                    debug!(%addr, error = %e, "Connection attempt failed");
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("{host}: no addresses to connect to"),
            )
        }))
    }
}

/// Connected TCP stream with buffered reads
#[derive(Debug)]
pub struct TcpTransport {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
}

impl TcpTransport {
    pub fn new(stream: TcpStream) -> io::Result<Self> {
        let writer = stream.try_clone()?;
        Ok(Self {
            reader: BufReader::new(stream),
            writer,
        })
    }
}

impl Transport for TcpTransport {
    fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
        codec::write_all(&mut self.writer, bytes)
    }

    fn recv_byte(&mut self) -> io::Result<u8> {
        codec::read_byte(&mut self.reader)
    }

    fn recv_line(&mut self) -> io::Result<Option<String>> {
        codec::read_line(&mut self.reader)
    }

    fn close(&mut self) -> io::Result<()> {
        match self.writer.shutdown(Shutdown::Both) {
            Err(e) if e.kind() != io::ErrorKind::NotConnected => Err(e),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, Read, Write};
    use std::net::TcpListener;
    use std::thread;

    use crate::job::PrintMode;
    use crate::protocol::QueueFormat;
    use crate::session::{Mode, Session};
    use crate::testing::identity;

    fn read_command(reader: &mut impl BufRead) -> Vec<u8> {
        let mut line = Vec::new();
        reader.read_until(b'\n', &mut line).unwrap();
        line
    }

    #[test]
    fn strict_flag_selects_reserved_ports() {
        assert_eq!(SourcePortPolicy::from_strict(true), SourcePortPolicy::Reserved);
        assert_eq!(SourcePortPolicy::from_strict(false), SourcePortPolicy::Any);
        assert_eq!(SourcePortPolicy::default(), SourcePortPolicy::Any);
        assert_eq!(RESERVED_PORTS.count(), 11);
    }

    #[test]
    fn refused_connection_is_an_error() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let connector = TcpConnector::new(Some(Duration::from_secs(2)));
        assert!(connector.open("127.0.0.1", port, SourcePortPolicy::Any).is_err());
    }

    #[test]
    fn queue_listing_over_loopback() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let daemon = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let command = read_command(&mut reader);
            let mut writer = stream;
            writer.write_all(b"lp is ready\nno entries\n").unwrap();
            command
        });

        let connector = TcpConnector::new(Some(Duration::from_secs(5)));
        let mut session = Session::new(&identity(), 1);
        session
            .connect(&connector, "127.0.0.1", port, SourcePortPolicy::Any)
            .unwrap();
        let lines = session
            .get_queue_state("lp", QueueFormat::Short, &[])
            .unwrap();

        assert_eq!(daemon.join().unwrap(), b"\x03lp\n");
        assert_eq!(lines, vec!["lp is ready", "no entries"]);
        assert_eq!(session.mode(), Mode::Disconnected);
    }

    #[test]
    fn print_job_over_loopback() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let daemon = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut writer = stream;
            let mut received = Vec::new();

            // receive job
            received.push(read_command(&mut reader));
            writer.write_all(&[0]).unwrap();

            // control file then data file
            for _ in 0..2 {
                let command = read_command(&mut reader);
                let size: usize = std::str::from_utf8(&command[1..])
                    .unwrap()
                    .split(' ')
                    .next()
                    .unwrap()
                    .parse()
                    .unwrap();
                writer.write_all(&[0]).unwrap();
                let mut body = vec![0u8; size + 1];
                reader.read_exact(&mut body).unwrap();
                assert_eq!(body.pop(), Some(0));
                writer.write_all(&[0]).unwrap();
                received.push(command);
                received.push(body);
            }
            received
        });

        let connector = TcpConnector::new(Some(Duration::from_secs(5)));
        let mut session = Session::new(&identity(), 7);
        session
            .connect(&connector, "127.0.0.1", port, SourcePortPolicy::Any)
            .unwrap();
        session.send_jobs("lp").unwrap();
        let key = session.new_job(None, None).unwrap();
        session
            .edit_job(key, |f| f.mode = Some(PrintMode::Text(Default::default())))
            .unwrap();
        session.send_control_file(key).unwrap();
        session.send_data_sized(key, b"Hello World", 11).unwrap();
        assert_eq!(session.mode(), Mode::Job);
        session.disconnect().unwrap();

        let received = daemon.join().unwrap();
        assert_eq!(received[0], b"\x02lp\n");
        assert!(received[1].starts_with(b"\x02"));
        assert!(received[1].ends_with(b" cfA007printhost\n"));
        assert!(received[2].starts_with(b"Hprinthost\nPalice\n"));
        assert_eq!(received[3], b"\x0311 dfA007printhost\n");
        assert_eq!(received[4], b"Hello World");
    }
}
