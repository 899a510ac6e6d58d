use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::job::MAX_JOB_ID;
use crate::transport::SourcePortPolicy;

/// Well-known LPD port
pub const DEFAULT_PORT: u16 = 515;

/// What the client does with a failed operation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorMode {
    /// Return the error (and remember it)
    #[default]
    Return,
    /// Panic with the error message
    Panic,
}

/// Client configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Remote daemon port
    pub port: u16,

    /// Connect from a reserved source port (721-731)
    pub strict_rfc_ports: bool,

    /// Connect, read and write timeout in seconds
    pub timeout_secs: Option<u64>,

    /// Id of the first automatically numbered job
    pub job_id_seed: Option<u16>,

    pub error_mode: ErrorMode,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            strict_rfc_ports: false,
            timeout_secs: None,
            job_id_seed: None,
            error_mode: ErrorMode::Return,
        }
    }
}

impl ClientConfig {
    pub fn source_port_policy(&self) -> SourcePortPolicy {
        SourcePortPolicy::from_strict(self.strict_rfc_ports)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    /// Configured seed, or the process id, reduced to a valid job id
    pub fn job_id_seed(&self) -> u16 {
        let seed = self
            .job_id_seed
            .map_or(std::process::id(), u32::from);
        (seed % (u32::from(MAX_JOB_ID) + 1)) as u16
    }
}
