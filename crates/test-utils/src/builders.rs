#![allow(dead_code)]

use std::time::Duration;

use jobkeeper::config::{ConfigFile, ProcessConfig, RawConfigFile, ScriptConfig};
use jobkeeper::types::HumanDuration;

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile::default(),
        }
    }

    pub fn with_process(mut self, process: ProcessConfig) -> Self {
        self.config.process.push(process);
        self
    }

    pub fn with_script(mut self, script: ScriptConfig) -> Self {
        self.config.script.push(script);
        self
    }

    pub fn service_name(mut self, name: &str) -> Self {
        self.config.host.service_name = name.to_string();
        self
    }

    pub fn dispatch_interval(mut self, interval: Duration) -> Self {
        self.config.host.dispatch_interval = HumanDuration(interval);
        self
    }

    pub fn grace_period(mut self, grace: Duration) -> Self {
        self.config.host.grace_period = HumanDuration(grace);
        self
    }

    pub fn kill_attempts(mut self, attempts: u32) -> Self {
        self.config.host.kill_attempts = attempts;
        self
    }

    pub fn interpreter(mut self, bin: &str, args: &[&str]) -> Self {
        self.config.scripts.interpreter = Some(bin.to_string());
        self.config.scripts.interpreter_args = args.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn build_raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `ProcessConfig`.
pub struct ProcessConfigBuilder {
    process: ProcessConfig,
}

impl ProcessConfigBuilder {
    pub fn new(path: &str) -> Self {
        Self {
            process: ProcessConfig {
                path: path.to_string(),
                args: vec![],
                restart_on_failure: true,
                restart_delay: None,
                max_restarts: None,
            },
        }
    }

    pub fn arg(mut self, arg: &str) -> Self {
        self.process.args.push(arg.to_string());
        self
    }

    pub fn restart_on_failure(mut self, val: bool) -> Self {
        self.process.restart_on_failure = val;
        self
    }

    pub fn restart_delay(mut self, delay: Duration) -> Self {
        self.process.restart_delay = Some(HumanDuration(delay));
        self
    }

    pub fn max_restarts(mut self, max: u32) -> Self {
        self.process.max_restarts = Some(max);
        self
    }

    pub fn build(self) -> ProcessConfig {
        self.process
    }
}

/// Builder for `ScriptConfig`.
pub struct ScriptConfigBuilder {
    script: ScriptConfig,
}

impl ScriptConfigBuilder {
    pub fn new(path: &str) -> Self {
        Self {
            script: ScriptConfig {
                path: path.to_string(),
                requires_signed_signature: false,
                blake3: None,
            },
        }
    }

    pub fn signed(mut self) -> Self {
        self.script.requires_signed_signature = true;
        self
    }

    pub fn blake3(mut self, digest: &str) -> Self {
        self.script.blake3 = Some(digest.to_string());
        self
    }

    pub fn build(self) -> ScriptConfig {
        self.script
    }
}
