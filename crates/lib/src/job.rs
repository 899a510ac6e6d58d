//! Print job model
//!
//! A [`Job`] accumulates the control file fields of one print job. Nothing
//! touches the wire here; the session serializes a job with
//! [`Job::control_file`] when it is sent, after which the job is latched and
//! refuses further edits.

use std::fmt;

use crate::error::{LpdError, Result};
use crate::protocol::{ControlTag, check_operand, write_control_line};

/// Highest job number the protocol can carry in a file name
pub const MAX_JOB_ID: u16 = 999;

/// Opaque handle to a job owned by a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JobKey(u64);

impl JobKey {
    pub(crate) fn new(n: u64) -> Self {
        Self(n)
    }
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job#{}", self.0)
    }
}

/// Options for plain text printing (`f`, or `l` when unfiltered)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TextOptions {
    /// Page width in columns (`W`)
    pub width: Option<u32>,
    /// Indentation in columns (`I`)
    pub indent: Option<u32>,
    /// Pass control characters through untouched
    pub no_filter: bool,
}

/// How the daemon should interpret the data file. A job carries at most one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrintMode {
    Text(TextOptions),
    Cif,
    Dvi,
    Plot,
    Ditroff,
    PostScript,
    /// Print with `pr(1)` page headers
    Pr {
        title: Option<String>,
        width: Option<u32>,
    },
    Fortran,
    Troff,
    Raster,
}

impl PrintMode {
    pub fn tag(&self) -> ControlTag {
        match self {
            PrintMode::Text(TextOptions {
                no_filter: true, ..
            }) => ControlTag::TextNoFilter,
            PrintMode::Text(_) => ControlTag::Text,
            PrintMode::Cif => ControlTag::Cif,
            PrintMode::Dvi => ControlTag::Dvi,
            PrintMode::Plot => ControlTag::Plot,
            PrintMode::Ditroff => ControlTag::Ditroff,
            PrintMode::PostScript => ControlTag::PostScript,
            PrintMode::Pr { .. } => ControlTag::Pr,
            PrintMode::Fortran => ControlTag::Fortran,
            PrintMode::Troff => ControlTag::Troff,
            PrintMode::Raster => ControlTag::Raster,
        }
    }

    fn title(&self) -> Option<&str> {
        match self {
            PrintMode::Pr { title, .. } => title.as_deref(),
            _ => None,
        }
    }

    fn indent(&self) -> Option<u32> {
        match self {
            PrintMode::Text(opts) => opts.indent,
            _ => None,
        }
    }

    fn width(&self) -> Option<u32> {
        match self {
            PrintMode::Text(opts) => opts.width,
            PrintMode::Pr { width, .. } => *width,
            _ => None,
        }
    }
}

/// Font slots used by troff output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TroffFont {
    Roman,
    Italic,
    Bold,
    Special,
}

impl TroffFont {
    fn index(self) -> usize {
        match self {
            TroffFont::Roman => 0,
            TroffFont::Italic => 1,
            TroffFont::Bold => 2,
            TroffFont::Special => 3,
        }
    }
}

const FONT_TAGS: [ControlTag; 4] = [
    ControlTag::FontRoman,
    ControlTag::FontItalic,
    ControlTag::FontBold,
    ControlTag::FontSpecial,
];

/// Device and inode of a file printed through a symbolic link (`S`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Symlink {
    pub device: u64,
    pub inode: u64,
}

/// Control file fields. `None` fields produce no line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ControlFields {
    /// Host the job originates from (`H`)
    pub host: String,
    /// User the job is printed for (`P`)
    pub user: String,
    /// Job name printed on the banner page (`J`)
    pub job_name: Option<String>,
    /// Class name printed on the banner page (`C`)
    pub class: Option<String>,
    /// Print a banner page naming this user (`L`)
    pub banner: Option<String>,
    /// Mail this user when printing completes (`M`)
    pub mail: Option<String>,
    /// Name of the original source file (`N`)
    pub source_name: Option<String>,
    pub symlink: Option<Symlink>,
    /// Ask the daemon to remove the data file after printing (`U`)
    pub unlink: bool,
    fonts: [Option<String>; 4],
    pub mode: Option<PrintMode>,
}

impl ControlFields {
    pub fn set_font(&mut self, font: TroffFont, name: impl Into<String>) {
        self.fonts[font.index()] = Some(name.into());
    }

    /// Serialize in protocol order; the order of edits never matters
    pub fn encode(&self, data_filename: &str) -> Vec<u8> {
        let mut out = Vec::new();
        write_control_line(&mut out, ControlTag::Host, &self.host);
        write_control_line(&mut out, ControlTag::User, &self.user);

        let optional = [
            (ControlTag::JobName, self.job_name.as_deref()),
            (ControlTag::Class, self.class.as_deref()),
            (ControlTag::Banner, self.banner.as_deref()),
            (ControlTag::Mail, self.mail.as_deref()),
        ];
        for (tag, value) in optional {
            if let Some(value) = value {
                write_control_line(&mut out, tag, value);
            }
        }

        if let Some(link) = self.symlink {
            let value = format!("{} {}", link.device, link.inode);
            write_control_line(&mut out, ControlTag::Symlink, &value);
        }

        if let Some(mode) = &self.mode {
            if let Some(title) = mode.title() {
                write_control_line(&mut out, ControlTag::Title, title);
            }
            if let Some(indent) = mode.indent() {
                write_control_line(&mut out, ControlTag::Indent, &indent.to_string());
            }
            if let Some(width) = mode.width() {
                write_control_line(&mut out, ControlTag::Width, &width.to_string());
            }
        }

        for (tag, font) in FONT_TAGS.iter().zip(&self.fonts) {
            if let Some(font) = font {
                write_control_line(&mut out, *tag, font);
            }
        }

        if let Some(mode) = &self.mode {
            write_control_line(&mut out, mode.tag(), data_filename);
        }
        if self.unlink {
            write_control_line(&mut out, ControlTag::Unlink, data_filename);
        }
        if let Some(name) = &self.source_name {
            write_control_line(&mut out, ControlTag::SourceName, name);
        }
        out
    }
}

/// One print job within a receive-job exchange
#[derive(Debug, Clone)]
pub struct Job {
    key: JobKey,
    id: u16,
    fields: ControlFields,
    data_filename: Option<String>,
    control_filename: Option<String>,
    control_file_sent: bool,
    data_complete: bool,
}

impl Job {
    pub(crate) fn new(key: JobKey, id: u16, host: String, user: String) -> Result<Self> {
        if id > MAX_JOB_ID {
            return Err(LpdError::InvalidJobId(id));
        }
        Ok(Self {
            key,
            id,
            fields: ControlFields {
                host,
                user,
                ..ControlFields::default()
            },
            data_filename: None,
            control_filename: None,
            control_file_sent: false,
            data_complete: false,
        })
    }

    pub fn key(&self) -> JobKey {
        self.key
    }

    pub fn id(&self) -> u16 {
        self.id
    }

    pub fn fields(&self) -> &ControlFields {
        &self.fields
    }

    /// Mutable access to the control fields, refused once the control file is out
    pub fn fields_mut(&mut self) -> Result<&mut ControlFields> {
        self.ensure_editable()?;
        Ok(&mut self.fields)
    }

    /// `dfA<id><host>` unless overridden
    pub fn data_filename(&self) -> String {
        self.data_filename
            .clone()
            .unwrap_or_else(|| self.default_filename("df"))
    }

    pub fn set_data_filename(&mut self, name: impl Into<String>) -> Result<()> {
        self.ensure_editable()?;
        let name = name.into();
        check_operand(&name)?;
        self.data_filename = Some(name);
        Ok(())
    }

    /// `cfA<id><host>` unless overridden
    pub fn control_filename(&self) -> String {
        self.control_filename
            .clone()
            .unwrap_or_else(|| self.default_filename("cf"))
    }

    pub fn set_control_filename(&mut self, name: impl Into<String>) -> Result<()> {
        self.ensure_editable()?;
        let name = name.into();
        check_operand(&name)?;
        self.control_filename = Some(name);
        Ok(())
    }

    /// Both effective file names, checked as command operands. Default names
    /// embed the host, which may have been edited since the job was created.
    pub(crate) fn wire_filenames(&self) -> Result<(String, String)> {
        let control = self.control_filename();
        let data = self.data_filename();
        check_operand(&control)?;
        check_operand(&data)?;
        Ok((control, data))
    }

    pub fn control_file(&self) -> Vec<u8> {
        self.fields.encode(&self.data_filename())
    }

    pub fn control_file_sent(&self) -> bool {
        self.control_file_sent
    }

    /// Whether a sized data transfer for this job ran to completion
    pub fn data_complete(&self) -> bool {
        self.data_complete
    }

    pub(crate) fn mark_control_file_sent(&mut self) {
        self.control_file_sent = true;
    }

    pub(crate) fn mark_data_complete(&mut self) {
        self.data_complete = true;
    }

    fn ensure_editable(&self) -> Result<()> {
        if self.control_file_sent {
            Err(LpdError::ControlFileAlreadySent(self.key))
        } else {
            Ok(())
        }
    }

    fn default_filename(&self, prefix: &str) -> String {
        format!("{prefix}A{:03}{}", self.id, self.fields.host)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(id: u16) -> Job {
        Job::new(JobKey::new(1), id, "printhost".into(), "alice".into()).unwrap()
    }

    fn lines(bytes: &[u8]) -> Vec<String> {
        String::from_utf8(bytes.to_vec())
            .unwrap()
            .lines()
            .map(String::from)
            .collect()
    }

    #[test]
    fn default_filenames_pad_the_job_id() {
        let job = job(7);
        assert_eq!(job.data_filename(), "dfA007printhost");
        assert_eq!(job.control_filename(), "cfA007printhost");
    }

    #[test]
    fn default_filenames_follow_host_changes() {
        let mut job = job(42);
        job.fields_mut().unwrap().host = "other".into();
        assert_eq!(job.data_filename(), "dfA042other");
    }

    #[test]
    fn overridden_filenames_win() {
        let mut job = job(1);
        job.set_data_filename("dfB001custom").unwrap();
        job.set_control_filename("cfB001custom").unwrap();
        assert_eq!(job.data_filename(), "dfB001custom");
        assert_eq!(job.control_filename(), "cfB001custom");
    }

    #[test]
    fn filenames_that_would_split_the_command_are_refused() {
        let mut job = job(1);
        assert!(matches!(
            job.set_data_filename("df A\n\x02evil"),
            Err(LpdError::InvalidName(_))
        ));
        assert!(matches!(
            job.set_control_filename(""),
            Err(LpdError::InvalidName(_))
        ));
        assert_eq!(job.data_filename(), "dfA001printhost");
        assert_eq!(job.control_filename(), "cfA001printhost");
        assert!(job.wire_filenames().is_ok());

        job.fields_mut().unwrap().host = "bad host".into();
        assert!(matches!(
            job.wire_filenames(),
            Err(LpdError::InvalidName(ref n)) if n == "cfA001bad host"
        ));
    }

    #[test]
    fn job_id_range_is_enforced() {
        assert!(Job::new(JobKey::new(1), 999, "h".into(), "u".into()).is_ok());
        assert!(matches!(
            Job::new(JobKey::new(1), 1000, "h".into(), "u".into()),
            Err(LpdError::InvalidJobId(1000))
        ));
    }

    #[test]
    fn minimal_control_file_is_host_then_user() {
        assert_eq!(job(3).control_file(), b"Hprinthost\nPalice\n");
    }

    #[test]
    fn full_control_file_layout() {
        let mut job = job(12);
        let fields = job.fields_mut().unwrap();
        fields.source_name = Some("report.txt".into());
        fields.unlink = true;
        fields.mode = Some(PrintMode::Text(TextOptions {
            width: Some(132),
            indent: Some(4),
            no_filter: false,
        }));
        fields.set_font(TroffFont::Bold, "B.ft");
        fields.symlink = Some(Symlink {
            device: 2049,
            inode: 77,
        });
        fields.mail = Some("alice".into());
        fields.banner = Some("alice".into());
        fields.class = Some("finance".into());
        fields.job_name = Some("Q3 report".into());

        assert_eq!(
            lines(&job.control_file()),
            vec![
                "Hprinthost",
                "Palice",
                "JQ3 report",
                "Cfinance",
                "Lalice",
                "Malice",
                "S2049 77",
                "I4",
                "W132",
                "3B.ft",
                "fdfA012printhost",
                "UdfA012printhost",
                "Nreport.txt",
            ]
        );
    }

    #[test]
    fn output_is_independent_of_edit_order() {
        let mut a = job(5);
        {
            let f = a.fields_mut().unwrap();
            f.mode = Some(PrintMode::PostScript);
            f.job_name = Some("doc".into());
            f.unlink = true;
            f.class = Some("c".into());
        }
        let mut b = job(5);
        {
            let f = b.fields_mut().unwrap();
            f.class = Some("c".into());
            f.unlink = true;
            f.job_name = Some("doc".into());
            f.mode = Some(PrintMode::PostScript);
        }
        assert_eq!(a.control_file(), b.control_file());
    }

    #[test]
    fn print_mode_is_replaced_not_added() {
        let mut job = job(9);
        job.fields_mut().unwrap().mode = Some(PrintMode::Dvi);
        job.fields_mut().unwrap().mode = Some(PrintMode::Raster);
        let text = lines(&job.control_file());
        assert!(text.contains(&"vdfA009printhost".to_string()));
        assert!(!text.iter().any(|l| l.starts_with('d')));
    }

    #[test]
    fn pr_mode_carries_title_and_width() {
        let mut job = job(10);
        job.fields_mut().unwrap().mode = Some(PrintMode::Pr {
            title: Some("Listing".into()),
            width: Some(80),
        });
        assert_eq!(
            lines(&job.control_file())[2..],
            ["TListing", "W80", "pdfA010printhost"]
        );
    }

    #[test]
    fn unfiltered_text_uses_l() {
        let mut job = job(11);
        job.fields_mut().unwrap().mode = Some(PrintMode::Text(TextOptions {
            no_filter: true,
            ..TextOptions::default()
        }));
        assert_eq!(lines(&job.control_file())[2], "ldfA011printhost");
    }

    #[test]
    fn mode_tags() {
        let expected = [
            (PrintMode::Cif, b'c'),
            (PrintMode::Dvi, b'd'),
            (PrintMode::Plot, b'g'),
            (PrintMode::Ditroff, b'n'),
            (PrintMode::PostScript, b'o'),
            (PrintMode::Fortran, b'r'),
            (PrintMode::Troff, b't'),
            (PrintMode::Raster, b'v'),
        ];
        for (mode, tag) in expected {
            assert_eq!(mode.tag().to_byte(), tag, "{mode:?}");
        }
    }

    #[test]
    fn latched_job_refuses_edits() {
        let mut job = job(4);
        job.mark_control_file_sent();
        assert!(matches!(
            job.fields_mut(),
            Err(LpdError::ControlFileAlreadySent(_))
        ));
        assert!(job.set_data_filename("x").is_err());
        assert!(job.set_control_filename("y").is_err());
        assert_eq!(job.control_file(), b"Hprinthost\nPalice\n");
    }
}
