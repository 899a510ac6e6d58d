use std::io::{self, BufRead, Read, Write};

/// Write raw bytes and flush
pub fn write_all(writer: &mut impl Write, bytes: &[u8]) -> io::Result<()> {
    writer.write_all(bytes)?;
    writer.flush()?;
    Ok(())
}

/// Read exactly one byte; end of stream is an error
pub fn read_byte(reader: &mut impl Read) -> io::Result<u8> {
    let mut buf = [0u8; 1];
    match reader.read_exact(&mut buf) {
        Ok(()) => Ok(buf[0]),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "connection closed while waiting for acknowledgment",
        )),
        Err(e) => Err(e),
    }
}

/// Read one text line without its terminator. Returns `None` once the peer
/// has closed the connection and nothing is left to read.
pub fn read_line(reader: &mut impl BufRead) -> io::Result<Option<String>> {
    let mut raw = Vec::new();
    let n = reader.read_until(b'\n', &mut raw)?;
    if n == 0 {
        return Ok(None);
    }
    if raw.last() == Some(&b'\n') {
        raw.pop();
        if raw.last() == Some(&b'\r') {
            raw.pop();
        }
    }
    Ok(Some(String::from_utf8_lossy(&raw).into_owned()))
}
