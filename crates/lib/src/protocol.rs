//! RFC 1179 wire format
//!
//! Commands are a single command byte followed directly by space-separated
//! operands and a terminating `\n`. Replies to job sub-commands are a single
//! acknowledgment byte.
//!
//! # Wire Format
//!
//! ## Top-level commands
//! ```text
//! \x01<queue>\n                     print any waiting jobs
//! \x02<queue>\n                     receive a printer job
//! \x03<queue> <list...>\n           send queue state (short)
//! \x04<queue> <list...>\n           send queue state (long)
//! \x05<queue> <agent> <list...>\n   remove jobs
//! ```
//!
//! ## Receive-job sub-commands
//! ```text
//! \x01\n                            abort job
//! \x02<count> <cfname>\n            receive control file, then <count> bytes and \x00
//! \x03<count> <dfname>\n            receive data file, then <count> bytes and \x00
//! ```
//!
//! ## Control file
//! ```text
//! H<host>\n
//! P<user>\n
//! <tag><value>\n ...
//! ```

use std::fmt;

use crate::error::{LpdError, Result};

/// Terminates the bytes of a transferred control or data file
pub const END_OF_FILE: u8 = 0x00;

/// Command issued while the connection is at the top level
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RootCommand {
    /// Start printing whatever is already queued, then close
    PrintWaitingJobs { queue: String },

    /// Enter the receive-job sub-protocol
    ReceiveJob { queue: String },

    /// Ask for a textual queue listing; the reply is read until close
    QueueState {
        queue: String,
        format: QueueFormat,
        list: Vec<String>,
    },

    /// Remove jobs on behalf of `agent`, then close
    RemoveJobs {
        queue: String,
        agent: String,
        list: Vec<String>,
    },
}

/// Short or long queue listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueueFormat {
    #[default]
    Short,
    Long,
}

/// Sub-command issued inside a receive-job exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobCommand {
    /// Drop everything received for this job
    Abort,

    /// A control file of `size` bytes follows
    ReceiveControlFile { size: u64, name: String },

    /// A data file of `size` bytes follows; 0 means "until the connection closes"
    ReceiveDataFile { size: u64, name: String },
}

/// One-byte reply to a receive-job command or sub-command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ack {
    Accepted,
    Rejected(u8),
}

impl Ack {
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            0 => Ack::Accepted,
            code => Ack::Rejected(code),
        }
    }
}

/// Refuse a queue, agent, list item or file name that would break the
/// command line it is written to
pub fn check_operand(value: &str) -> Result<()> {
    if value.is_empty() || value.chars().any(|c| c.is_whitespace() || c.is_control()) {
        Err(LpdError::InvalidName(value.to_string()))
    } else {
        Ok(())
    }
}

fn command_line(code: u8, operands: &[&str]) -> Vec<u8> {
    let mut out = Vec::with_capacity(2 + operands.iter().map(|o| o.len() + 1).sum::<usize>());
    out.push(code);
    out.extend_from_slice(operands.join(" ").as_bytes());
    out.push(b'\n');
    out
}

impl RootCommand {
    fn code(&self) -> u8 {
        match self {
            RootCommand::PrintWaitingJobs { .. } => 0x01,
            RootCommand::ReceiveJob { .. } => 0x02,
            RootCommand::QueueState {
                format: QueueFormat::Short,
                ..
            } => 0x03,
            RootCommand::QueueState {
                format: QueueFormat::Long,
                ..
            } => 0x04,
            RootCommand::RemoveJobs { .. } => 0x05,
        }
    }

    fn operands(&self) -> Vec<&str> {
        match self {
            RootCommand::PrintWaitingJobs { queue } | RootCommand::ReceiveJob { queue } => {
                vec![queue.as_str()]
            }
            RootCommand::QueueState { queue, list, .. } => {
                let mut operands = vec![queue.as_str()];
                operands.extend(list.iter().map(String::as_str));
                operands
            }
            RootCommand::RemoveJobs { queue, agent, list } => {
                let mut operands = vec![queue.as_str(), agent.as_str()];
                operands.extend(list.iter().map(String::as_str));
                operands
            }
        }
    }

    /// Check every operand with [`check_operand`]
    pub fn validate(&self) -> Result<()> {
        self.operands().into_iter().try_for_each(check_operand)
    }

    /// Encode command as a single newline-terminated line
    pub fn encode(&self) -> Vec<u8> {
        command_line(self.code(), &self.operands())
    }
}

impl JobCommand {
    /// Encode sub-command as a single newline-terminated line
    pub fn encode(&self) -> Vec<u8> {
        match self {
            JobCommand::Abort => command_line(0x01, &[]),
            JobCommand::ReceiveControlFile { size, name } => {
                command_line(0x02, &[size.to_string().as_str(), name.as_str()])
            }
            JobCommand::ReceiveDataFile { size, name } => {
                command_line(0x03, &[size.to_string().as_str(), name.as_str()])
            }
        }
    }
}

impl fmt::Display for RootCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RootCommand::PrintWaitingJobs { queue } => write!(f, "print-waiting-jobs {queue}"),
            RootCommand::ReceiveJob { queue } => write!(f, "receive-job {queue}"),
            RootCommand::QueueState { queue, format, .. } => {
                write!(f, "queue-state({format:?}) {queue}")
            }
            RootCommand::RemoveJobs { queue, agent, .. } => {
                write!(f, "remove-jobs {queue} as {agent}")
            }
        }
    }
}

impl fmt::Display for JobCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobCommand::Abort => write!(f, "abort-job"),
            JobCommand::ReceiveControlFile { size, name } => {
                write!(f, "receive-control-file {name} ({size} bytes)")
            }
            JobCommand::ReceiveDataFile { size: 0, name } => {
                write!(f, "receive-data-file {name} (until close)")
            }
            JobCommand::ReceiveDataFile { size, name } => {
                write!(f, "receive-data-file {name} ({size} bytes)")
            }
        }
    }
}

/// Control file line tags, declared in the order they are written
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ControlTag {
    Host,
    User,
    JobName,
    Class,
    Banner,
    Mail,
    Symlink,
    Title,
    Indent,
    Width,
    FontRoman,
    FontItalic,
    FontBold,
    FontSpecial,
    Text,
    TextNoFilter,
    Cif,
    Dvi,
    Plot,
    Ditroff,
    PostScript,
    Pr,
    Fortran,
    Troff,
    Raster,
    Unlink,
    SourceName,
}

impl ControlTag {
    pub fn to_byte(self) -> u8 {
        match self {
            ControlTag::Host => b'H',
            ControlTag::User => b'P',
            ControlTag::JobName => b'J',
            ControlTag::Class => b'C',
            ControlTag::Banner => b'L',
            ControlTag::Mail => b'M',
            ControlTag::Symlink => b'S',
            ControlTag::Title => b'T',
            ControlTag::Indent => b'I',
            ControlTag::Width => b'W',
            ControlTag::FontRoman => b'1',
            ControlTag::FontItalic => b'2',
            ControlTag::FontBold => b'3',
            ControlTag::FontSpecial => b'4',
            ControlTag::Text => b'f',
            ControlTag::TextNoFilter => b'l',
            ControlTag::Cif => b'c',
            ControlTag::Dvi => b'd',
            ControlTag::Plot => b'g',
            ControlTag::Ditroff => b'n',
            ControlTag::PostScript => b'o',
            ControlTag::Pr => b'p',
            ControlTag::Fortran => b'r',
            ControlTag::Troff => b't',
            ControlTag::Raster => b'v',
            ControlTag::Unlink => b'U',
            ControlTag::SourceName => b'N',
        }
    }
}

/// Replace characters that would break the line framing of a control file
fn sanitize_value(s: &str) -> String {
    s.replace(['\n', '\r'], " ")
}

/// Append one `<tag><value>\n` control file line
pub fn write_control_line(out: &mut Vec<u8>, tag: ControlTag, value: &str) {
    out.push(tag.to_byte());
    out.extend_from_slice(sanitize_value(value).as_bytes());
    out.push(b'\n');
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_command_bytes() {
        assert_eq!(
            RootCommand::PrintWaitingJobs { queue: "lp".into() }.encode(),
            b"\x01lp\n"
        );
        assert_eq!(
            RootCommand::ReceiveJob { queue: "lp".into() }.encode(),
            b"\x02lp\n"
        );
        assert_eq!(
            RootCommand::QueueState {
                queue: "lp".into(),
                format: QueueFormat::Short,
                list: vec![],
            }
            .encode(),
            b"\x03lp\n"
        );
        assert_eq!(
            RootCommand::QueueState {
                queue: "lp".into(),
                format: QueueFormat::Long,
                list: vec!["alice".into(), "12".into()],
            }
            .encode(),
            b"\x04lp alice 12\n"
        );
        assert_eq!(
            RootCommand::RemoveJobs {
                queue: "lp".into(),
                agent: "root".into(),
                list: vec!["7".into()],
            }
            .encode(),
            b"\x05lp root 7\n"
        );
    }

    #[test]
    fn job_command_bytes() {
        assert_eq!(JobCommand::Abort.encode(), b"\x01\n");
        assert_eq!(
            JobCommand::ReceiveControlFile {
                size: 42,
                name: "cfA001host".into()
            }
            .encode(),
            b"\x0242 cfA001host\n"
        );
        assert_eq!(
            JobCommand::ReceiveDataFile {
                size: 0,
                name: "dfA001host".into()
            }
            .encode(),
            b"\x030 dfA001host\n"
        );
    }

    #[test]
    fn operands_must_not_break_the_line() {
        for bad in ["", "lp\n\x03x", "two words", "tab\there", "nul\0"] {
            assert!(
                matches!(check_operand(bad), Err(LpdError::InvalidName(ref n)) if n == bad),
                "{bad:?}"
            );
        }
        assert!(check_operand("dfA001printhost").is_ok());
        assert!(check_operand("lp-2.floor_3").is_ok());

        let cmd = RootCommand::RemoveJobs {
            queue: "lp".into(),
            agent: "bob".into(),
            list: vec!["12".into(), "bad item".into()],
        };
        assert!(matches!(cmd.validate(), Err(LpdError::InvalidName(ref n)) if n == "bad item"));
        let cmd = RootCommand::QueueState {
            queue: "lp".into(),
            format: QueueFormat::Long,
            list: vec!["alice".into()],
        };
        assert!(cmd.validate().is_ok());
    }

    #[test]
    fn ack_bytes() {
        assert_eq!(Ack::from_byte(0), Ack::Accepted);
        assert_eq!(Ack::from_byte(1), Ack::Rejected(1));
        assert_eq!(Ack::from_byte(255), Ack::Rejected(255));
    }

    #[test]
    fn control_line_strips_line_breaks() {
        let mut out = Vec::new();
        write_control_line(&mut out, ControlTag::JobName, "evil\nname\r");
        assert_eq!(out, b"Jevil name \n");
    }

    #[test]
    fn tag_order_matches_declaration() {
        assert!(ControlTag::Host < ControlTag::User);
        assert!(ControlTag::Width < ControlTag::FontRoman);
        assert!(ControlTag::Raster < ControlTag::Unlink);
        assert!(ControlTag::Unlink < ControlTag::SourceName);
    }
}
