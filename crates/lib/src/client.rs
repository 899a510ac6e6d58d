use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::config::{ClientConfig, ErrorMode};
use crate::error::{LpdError, Result};
use crate::identity::{Identity, SystemIdentity};
use crate::job::{ControlFields, JobKey, PrintMode, Symlink, TextOptions, TroffFont};
use crate::protocol::QueueFormat;
use crate::session::{Mode, Session};
use crate::transfer::Transfer;
use crate::transport::{Connector, TcpConnector};

struct State<T> {
    session: Session<T>,
    last_error: Option<LpdError>,
}

/// LPD client: the one object an application holds
///
/// Calls are serialized through an internal lock, so a client can be shared
/// between threads. Every failure is remembered until [`clear_error`]; with
/// [`ErrorMode::Panic`] failures panic instead of being returned.
///
/// [`clear_error`]: LpdClient::clear_error
pub struct LpdClient<C: Connector = TcpConnector> {
    connector: C,
    config: ClientConfig,
    state: Mutex<State<C::Transport>>,
}

impl LpdClient {
    /// Client over TCP for the current user and host
    pub fn new(config: ClientConfig) -> Self {
        let connector = TcpConnector::new(config.timeout());
        Self::with_connector(connector, &SystemIdentity, config)
    }
}

impl Default for LpdClient {
    fn default() -> Self {
        Self::new(ClientConfig::default())
    }
}

impl<C: Connector> LpdClient<C> {
    pub fn with_connector(connector: C, identity: &dyn Identity, config: ClientConfig) -> Self {
        let session = Session::new(identity, config.job_id_seed());
        Self {
            connector,
            config,
            state: Mutex::new(State {
                session,
                last_error: None,
            }),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, State<C::Transport>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run one session operation, recording (or raising) its failure
    fn run<R>(&self, op: impl FnOnce(&mut Session<C::Transport>) -> Result<R>) -> Result<R> {
        let mut state = self.lock();
        let result = op(&mut state.session);
        if let Err(e) = &result {
            state.last_error = Some(e.clone());
            if self.config.error_mode == ErrorMode::Panic {
                drop(state);
                panic!("{e}");
            }
        }
        result
    }

    fn edit<R>(&self, key: JobKey, edit: impl FnOnce(&mut ControlFields) -> R) -> Result<R> {
        self.run(|s| s.edit_job(key, edit))
    }

    pub fn mode(&self) -> Mode {
        self.lock().session.mode()
    }

    /// Most recent failure, if any
    pub fn last_error(&self) -> Option<LpdError> {
        self.lock().last_error.clone()
    }

    pub fn clear_error(&self) {
        self.lock().last_error = None;
    }

    /// Connect to `host` on the configured port
    pub fn connect(&self, host: &str) -> Result<()> {
        self.connect_port(host, self.config.port)
    }

    pub fn connect_port(&self, host: &str, port: u16) -> Result<()> {
        let policy = self.config.source_port_policy();
        self.run(|s| s.connect(&self.connector, host, port, policy))
    }

    pub fn disconnect(&self) -> Result<()> {
        self.run(|s| s.disconnect())
    }

    pub fn print_waiting_jobs(&self, queue: &str) -> Result<()> {
        self.run(|s| s.print_waiting_jobs(queue))
    }

    pub fn send_jobs(&self, queue: &str) -> Result<()> {
        self.run(|s| s.send_jobs(queue))
    }

    pub fn get_queue_state(
        &self,
        queue: &str,
        format: QueueFormat,
        list: &[&str],
    ) -> Result<Vec<String>> {
        self.run(|s| s.get_queue_state(queue, format, list))
    }

    pub fn remove_jobs(&self, queue: &str, agent: &str, list: &[&str]) -> Result<()> {
        self.run(|s| s.remove_jobs(queue, agent, list))
    }

    /// New job with the next id, from the local host
    pub fn new_job(&self) -> Result<JobKey> {
        self.new_job_with(None, None)
    }

    pub fn new_job_with(&self, id: Option<u16>, host: Option<&str>) -> Result<JobKey> {
        self.run(|s| s.new_job(id, host))
    }

    pub fn job_id(&self, key: JobKey) -> Result<u16> {
        self.run(|s| s.job(key).map(|job| job.id()))
    }

    pub fn data_filename(&self, key: JobKey) -> Result<String> {
        self.run(|s| s.job(key).map(|job| job.data_filename()))
    }

    pub fn set_data_filename(&self, key: JobKey, name: &str) -> Result<()> {
        self.run(|s| s.job_mut(key)?.set_data_filename(name))
    }

    pub fn control_filename(&self, key: JobKey) -> Result<String> {
        self.run(|s| s.job(key).map(|job| job.control_filename()))
    }

    pub fn set_control_filename(&self, key: JobKey, name: &str) -> Result<()> {
        self.run(|s| s.job_mut(key)?.set_control_filename(name))
    }

    /// The control file as it would be sent now
    pub fn control_file(&self, key: JobKey) -> Result<Vec<u8>> {
        self.run(|s| s.job(key).map(|job| job.control_file()))
    }

    pub fn set_banner_class(&self, key: JobKey, class: &str) -> Result<()> {
        self.edit(key, |f| f.class = Some(class.to_string()))
    }

    /// Host the job claims to come from
    pub fn set_hostname(&self, key: JobKey, host: &str) -> Result<()> {
        self.edit(key, |f| f.host = host.to_string())
    }

    /// Job name printed on the banner page
    pub fn set_job_name(&self, key: JobKey, name: &str) -> Result<()> {
        self.edit(key, |f| f.job_name = Some(name.to_string()))
    }

    /// Print a banner page naming `user`
    pub fn enable_banner(&self, key: JobKey, user: &str) -> Result<()> {
        self.edit(key, |f| f.banner = Some(user.to_string()))
    }

    pub fn set_mail_user(&self, key: JobKey, user: &str) -> Result<()> {
        self.edit(key, |f| f.mail = Some(user.to_string()))
    }

    pub fn set_source_filename(&self, key: JobKey, name: &str) -> Result<()> {
        self.edit(key, |f| f.source_name = Some(name.to_string()))
    }

    pub fn set_user_id(&self, key: JobKey, user: &str) -> Result<()> {
        self.edit(key, |f| f.user = user.to_string())
    }

    pub fn set_symlink(&self, key: JobKey, device: u64, inode: u64) -> Result<()> {
        self.edit(key, |f| f.symlink = Some(Symlink { device, inode }))
    }

    /// Ask the daemon to delete the data file after printing
    pub fn set_unlink(&self, key: JobKey, unlink: bool) -> Result<()> {
        self.edit(key, |f| f.unlink = unlink)
    }

    pub fn set_troff_font(&self, key: JobKey, font: TroffFont, file: &str) -> Result<()> {
        self.edit(key, |f| f.set_font(font, file))
    }

    /// Replace the job's print mode
    pub fn set_print_mode(&self, key: JobKey, mode: PrintMode) -> Result<()> {
        self.edit(key, |f| f.mode = Some(mode))
    }

    pub fn set_text_mode(&self, key: JobKey) -> Result<()> {
        self.set_print_mode(key, PrintMode::Text(TextOptions::default()))
    }

    pub fn set_text_mode_with(&self, key: JobKey, options: TextOptions) -> Result<()> {
        self.set_print_mode(key, PrintMode::Text(options))
    }

    pub fn set_cif_mode(&self, key: JobKey) -> Result<()> {
        self.set_print_mode(key, PrintMode::Cif)
    }

    pub fn set_dvi_mode(&self, key: JobKey) -> Result<()> {
        self.set_print_mode(key, PrintMode::Dvi)
    }

    pub fn set_plot_mode(&self, key: JobKey) -> Result<()> {
        self.set_print_mode(key, PrintMode::Plot)
    }

    pub fn set_ditroff_mode(&self, key: JobKey) -> Result<()> {
        self.set_print_mode(key, PrintMode::Ditroff)
    }

    pub fn set_postscript_mode(&self, key: JobKey) -> Result<()> {
        self.set_print_mode(key, PrintMode::PostScript)
    }

    pub fn set_pr_mode(&self, key: JobKey, title: Option<&str>, width: Option<u32>) -> Result<()> {
        let title = title.map(String::from);
        self.set_print_mode(key, PrintMode::Pr { title, width })
    }

    pub fn set_fortran_mode(&self, key: JobKey) -> Result<()> {
        self.set_print_mode(key, PrintMode::Fortran)
    }

    pub fn set_troff_mode(&self, key: JobKey) -> Result<()> {
        self.set_print_mode(key, PrintMode::Troff)
    }

    pub fn set_raster_mode(&self, key: JobKey) -> Result<()> {
        self.set_print_mode(key, PrintMode::Raster)
    }

    pub fn send_control_file(&self, key: JobKey) -> Result<()> {
        self.run(|s| s.send_control_file(key))
    }

    /// Data without a declared size; see [`Session::send_data`]
    pub fn send_data(&self, key: JobKey, chunk: &[u8]) -> Result<()> {
        self.run(|s| s.send_data(key, chunk))
    }

    /// First chunk of a data file of `declared` bytes
    pub fn send_data_sized(&self, key: JobKey, chunk: &[u8], declared: u64) -> Result<()> {
        self.run(|s| s.send_data_sized(key, chunk, declared))
    }

    pub fn abort_job(&self) -> Result<()> {
        self.run(|s| s.abort_job())
    }

    /// Snapshot of the data transfer in flight
    pub fn transfer(&self) -> Option<Transfer> {
        self.lock().session.transfer().cloned()
    }
}
