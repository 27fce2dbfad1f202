// src/config/model.rs

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::dispatch::DEFAULT_DISPATCH_INTERVAL;
use crate::job::{JobDescriptor, RestartPolicy};
use crate::supervisor::script::default_interpreter;
use crate::types::HumanDuration;

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [host]
/// service_name = "jobkeeper"
/// dispatch_interval = "10s"
///
/// [[process]]
/// path = "/usr/local/bin/worker"
/// args = ["--x"]
///
/// [[script]]
/// path = "/opt/jobs/report.sh"
/// requires_signed_signature = true
/// blake3 = "…"
/// ```
///
/// Every section is optional. A file with no jobs at all is valid: the
/// dispatch loops stop on their first tick.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfigFile {
    #[serde(default)]
    pub host: HostSection,

    #[serde(default)]
    pub scripts: ScriptsSection,

    /// `[[process]]` entries, in dispatch order.
    #[serde(default)]
    pub process: Vec<ProcessConfig>,

    /// `[[script]]` entries, in dispatch order.
    #[serde(default)]
    pub script: Vec<ScriptConfig>,
}

/// `[host]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HostSection {
    /// Only used in log lines.
    #[serde(default = "default_service_name")]
    pub service_name: String,

    #[serde(default = "default_dispatch_interval")]
    pub dispatch_interval: HumanDuration,

    /// How long shutdown waits for the registries to drain.
    #[serde(default = "default_grace_period")]
    pub grace_period: HumanDuration,

    /// Kill requests sent to one instance before giving up on it.
    #[serde(default = "default_kill_attempts")]
    pub kill_attempts: u32,
}

fn default_service_name() -> String {
    "jobkeeper".to_string()
}

fn default_dispatch_interval() -> HumanDuration {
    HumanDuration(DEFAULT_DISPATCH_INTERVAL)
}

fn default_grace_period() -> HumanDuration {
    HumanDuration::from_secs(15)
}

fn default_kill_attempts() -> u32 {
    5
}

impl Default for HostSection {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            dispatch_interval: default_dispatch_interval(),
            grace_period: default_grace_period(),
            kill_attempts: default_kill_attempts(),
        }
    }
}

/// `[scripts]` section: how script jobs are started.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScriptsSection {
    /// Interpreter binary; the platform default when unset.
    #[serde(default)]
    pub interpreter: Option<String>,

    /// Arguments placed before the script path. Only honoured together with
    /// `interpreter`.
    #[serde(default)]
    pub interpreter_args: Vec<String>,
}

/// One `[[process]]` entry.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProcessConfig {
    /// Executable path. An empty path disables the entry.
    #[serde(default)]
    pub path: String,

    #[serde(default)]
    pub args: Vec<String>,

    #[serde(default = "default_restart_on_failure")]
    pub restart_on_failure: bool,

    #[serde(default)]
    pub restart_delay: Option<HumanDuration>,

    /// `None` restarts forever.
    #[serde(default)]
    pub max_restarts: Option<u32>,
}

fn default_restart_on_failure() -> bool {
    true
}

/// One `[[script]]` entry.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScriptConfig {
    #[serde(default)]
    pub path: String,

    #[serde(default)]
    pub requires_signed_signature: bool,

    /// Trusted BLAKE3 digest (hex) of the script file.
    #[serde(default)]
    pub blake3: Option<String>,
}

/// Validated configuration.
///
/// Only constructed through `TryFrom<RawConfigFile>` (see `validate.rs`).
#[derive(Debug, Clone)]
pub struct ConfigFile {
    host: HostSection,
    scripts: ScriptsSection,
    process: Vec<ProcessConfig>,
    script: Vec<ScriptConfig>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(raw: RawConfigFile) -> Self {
        Self {
            host: raw.host,
            scripts: raw.scripts,
            process: raw.process,
            script: raw.script,
        }
    }

    pub fn service_name(&self) -> &str {
        &self.host.service_name
    }

    pub fn dispatch_interval(&self) -> Duration {
        self.host.dispatch_interval.get()
    }

    pub fn grace_period(&self) -> Duration {
        self.host.grace_period.get()
    }

    pub fn kill_attempts(&self) -> u32 {
        self.host.kill_attempts
    }

    /// Interpreter binary and its leading arguments for script jobs.
    pub fn interpreter(&self) -> (String, Vec<String>) {
        match &self.scripts.interpreter {
            Some(bin) => (bin.clone(), self.scripts.interpreter_args.clone()),
            None => default_interpreter(),
        }
    }

    pub fn processes(&self) -> &[ProcessConfig] {
        &self.process
    }

    pub fn scripts(&self) -> &[ScriptConfig] {
        &self.script
    }

    /// Process descriptors in configured order, disabled entries included.
    pub fn process_jobs(&self) -> Vec<Arc<JobDescriptor>> {
        self.process.iter().map(|p| Arc::new(p.to_descriptor())).collect()
    }

    /// Script descriptors in configured order, disabled entries included.
    pub fn script_jobs(&self) -> Vec<Arc<JobDescriptor>> {
        self.script.iter().map(|s| Arc::new(s.to_descriptor())).collect()
    }
}

impl ProcessConfig {
    pub fn restart_policy(&self) -> RestartPolicy {
        RestartPolicy {
            on_failure: self.restart_on_failure,
            delay: self.restart_delay.map(HumanDuration::get).unwrap_or_default(),
            max_consecutive: self.max_restarts,
        }
    }

    pub fn to_descriptor(&self) -> JobDescriptor {
        JobDescriptor::process(self.path.clone(), self.args.clone()).with_restart(self.restart_policy())
    }
}

impl ScriptConfig {
    pub fn to_descriptor(&self) -> JobDescriptor {
        let descriptor = JobDescriptor::script(self.path.clone(), self.requires_signed_signature);
        match &self.blake3 {
            Some(digest) => descriptor.with_trusted_digest(digest.trim().to_ascii_lowercase()),
            None => descriptor,
        }
    }
}
