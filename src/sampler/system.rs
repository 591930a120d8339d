use anyhow::Result;
use std::collections::HashSet;
use sysinfo::{Pid, System};

use super::launchable::LaunchableIndex;
use super::window::ForegroundWindows;
use super::{ApplicationId, ProcessSampler};

/// Maps the focused windows to launchable applications, looking up each
/// window's owning process through `sysinfo`
pub struct SysinfoSampler<W> {
    system: System,
    windows: W,
    /// Commands reachable from an application launcher
    index: LaunchableIndex,
}

impl<W: ForegroundWindows> SysinfoSampler<W> {
    pub fn new(windows: W, index: LaunchableIndex) -> Self {
        Self {
            system: System::new(),
            windows,
            index,
        }
    }

    fn resolve_pid(&mut self, pid: u32) -> Option<String> {
        let pid = Pid::from_u32(pid);
        if !self.system.refresh_process(pid) {
            return None;
        }
        let process = self.system.process(pid)?;
        self.index.resolve(process.name(), process.exe())
    }
}

impl<W: ForegroundWindows> ProcessSampler for SysinfoSampler<W> {
    fn sample(&mut self) -> Result<HashSet<ApplicationId>> {
        let mut apps = HashSet::new();

        for window in self.windows.foreground()? {
            let by_pid = window.pid.and_then(|pid| self.resolve_pid(pid));
            let app = by_pid.or_else(|| {
                window
                    .class
                    .as_deref()
                    .and_then(|class| self.index.resolve(&class.to_lowercase(), None))
            });

            if let Some(app) = app {
                apps.insert(ApplicationId::from(app));
            }
        }

        Ok(apps)
    }
}
