use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Linux truncates `comm` process names to this many bytes
const COMM_MAX_LEN: usize = 15;

/// Field codes in an `Exec=` value (%f, %U, %i, ...)
static RE_FIELD_CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"%[fFuUdDnNickvm%]").unwrap());

/// One argument of an `Exec=` value, quoted or bare
static RE_EXEC_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r#""([^"]*)"|(\S+)"#).unwrap());

/// `VAR=value` prefix as used after `env`
static RE_ENV_ASSIGN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*=").unwrap());

/// The launcher-relevant parts of a `.desktop` file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesktopEntry {
    pub name: Option<String>,
    /// Executable name the entry launches
    pub command: String,
}

impl DesktopEntry {
    /// Parse the `[Desktop Entry]` group of a desktop file.
    ///
    /// Returns `None` for entries a user cannot launch from a menu: non
    /// applications, hidden or `NoDisplay` entries, and entries without a
    /// usable `Exec=` line.
    pub fn parse(content: &str) -> Option<Self> {
        let mut in_main_group = false;
        let mut is_application = false;
        let mut hidden = false;
        let mut name = None;
        let mut exec = None;

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if line.starts_with('[') {
                in_main_group = line == "[Desktop Entry]";
                continue;
            }
            if !in_main_group {
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            match (key.trim(), value.trim()) {
                ("Type", value) => is_application = value == "Application",
                ("NoDisplay", "true") | ("Hidden", "true") => hidden = true,
                ("Name", value) => name = Some(value.to_string()),
                ("Exec", value) => exec = Some(value.to_string()),
                _ => {}
            }
        }

        if !is_application || hidden {
            return None;
        }

        let command = exec.as_deref().and_then(exec_command)?;
        Some(Self { name, command })
    }
}

/// Extract the executable basename from an `Exec=` value
fn exec_command(exec: &str) -> Option<String> {
    let stripped = RE_FIELD_CODE.replace_all(exec, "");

    let program = RE_EXEC_TOKEN
        .captures_iter(&stripped)
        .filter_map(|caps| caps.get(1).or_else(|| caps.get(2)))
        .map(|m| m.as_str())
        .find(|token| *token != "env" && !RE_ENV_ASSIGN.is_match(token))?;

    Path::new(program)
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .filter(|name| !name.is_empty())
}

/// Set of executable names that can be started from an application launcher
#[derive(Debug, Clone, Default)]
pub struct LaunchableIndex {
    commands: HashSet<String>,
}

impl LaunchableIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the index from every `.desktop` file below `dirs`.
    /// Missing directories are skipped.
    pub fn from_dirs(dirs: &[PathBuf]) -> Self {
        let mut index = Self::new();

        for dir in dirs {
            let entries = WalkDir::new(dir)
                .follow_links(true)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
                .filter(|e| e.path().extension().is_some_and(|ext| ext == "desktop"));

            for entry in entries {
                let Ok(content) = std::fs::read_to_string(entry.path()) else {
                    tracing::debug!("Skipping unreadable desktop file {}", entry.path().display());
                    continue;
                };
                if let Some(desktop) = DesktopEntry::parse(&content) {
                    tracing::trace!(
                        "{} launches {}",
                        desktop.name.as_deref().unwrap_or("<unnamed>"),
                        desktop.command
                    );
                    index.insert(desktop.command);
                }
            }
        }

        index
    }

    /// XDG application directories, most specific first
    pub fn default_dirs() -> Vec<PathBuf> {
        let mut dirs = Vec::new();

        if let Some(data_dir) = dirs::data_dir() {
            dirs.push(data_dir.join("applications"));
        }

        match std::env::var("XDG_DATA_DIRS") {
            Ok(value) if !value.is_empty() => {
                dirs.extend(
                    value
                        .split(':')
                        .filter(|p| !p.is_empty())
                        .map(|p| PathBuf::from(p).join("applications")),
                );
            }
            _ => {
                dirs.push(PathBuf::from("/usr/local/share/applications"));
                dirs.push(PathBuf::from("/usr/share/applications"));
            }
        }

        dirs
    }

    pub fn insert(&mut self, command: impl Into<String>) {
        self.commands.insert(command.into());
    }

    pub fn contains(&self, command: &str) -> bool {
        self.commands.contains(command)
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Map a running process to the launchable command it belongs to.
    ///
    /// The executable basename is preferred; the process name is a fallback
    /// and may be a truncated `comm` value.
    pub fn resolve(&self, process_name: &str, exe: Option<&Path>) -> Option<String> {
        if let Some(exe_name) = exe.and_then(|p| p.file_name()).map(|n| n.to_string_lossy()) {
            if self.contains(&exe_name) {
                return Some(exe_name.to_string());
            }
        }

        if self.contains(process_name) {
            return Some(process_name.to_string());
        }

        if process_name.len() == COMM_MAX_LEN {
            return self
                .commands
                .iter()
                .find(|cmd| cmd.starts_with(process_name))
                .cloned();
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_entry() {
        let content = "[Desktop Entry]\nType=Application\nName=Firefox\nExec=/usr/lib/firefox/firefox %u\n";
        let entry = DesktopEntry::parse(content).unwrap();
        assert_eq!(entry.command, "firefox");
        assert_eq!(entry.name.as_deref(), Some("Firefox"));
    }

    #[test]
    fn test_parse_strips_env_and_quotes() {
        let content = "[Desktop Entry]\nType=Application\nExec=env GDK_BACKEND=x11 \"/opt/My Editor/editor\" --new-window %F\n";
        let entry = DesktopEntry::parse(content).unwrap();
        assert_eq!(entry.command, "editor");
    }

    #[test]
    fn test_parse_rejects_hidden_and_non_applications() {
        let hidden = "[Desktop Entry]\nType=Application\nNoDisplay=true\nExec=helper\n";
        assert!(DesktopEntry::parse(hidden).is_none());

        let link = "[Desktop Entry]\nType=Link\nURL=https://example.com\n";
        assert!(DesktopEntry::parse(link).is_none());

        let no_exec = "[Desktop Entry]\nType=Application\nName=Broken\n";
        assert!(DesktopEntry::parse(no_exec).is_none());
    }

    #[test]
    fn test_parse_ignores_action_groups() {
        let content = "[Desktop Entry]\nType=Application\nExec=gimp %U\n\n[Desktop Action new]\nExec=other-tool\nNoDisplay=true\n";
        let entry = DesktopEntry::parse(content).unwrap();
        assert_eq!(entry.command, "gimp");
    }

    #[test]
    fn test_index_from_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("kde");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(
            dir.path().join("term.desktop"),
            "[Desktop Entry]\nType=Application\nExec=alacritty\n",
        )
        .unwrap();
        std::fs::write(
            nested.join("files.desktop"),
            "[Desktop Entry]\nType=Application\nExec=dolphin %u\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "Exec=not-a-desktop-file").unwrap();

        let index = LaunchableIndex::from_dirs(&[
            dir.path().to_path_buf(),
            dir.path().join("missing"),
        ]);
        assert_eq!(index.len(), 2);
        assert!(index.contains("alacritty"));
        assert!(index.contains("dolphin"));
    }

    #[test]
    fn test_resolve_prefers_exe_then_truncated_name() {
        let mut index = LaunchableIndex::new();
        index.insert("firefox");
        index.insert("gnome-system-monitor");

        assert_eq!(
            index.resolve("GeckoMain", Some(Path::new("/usr/lib/firefox/firefox"))),
            Some("firefox".to_string())
        );
        assert_eq!(
            index.resolve("gnome-system-mo", None),
            Some("gnome-system-monitor".to_string())
        );
        assert_eq!(index.resolve("sshd", Some(Path::new("/usr/sbin/sshd"))), None);
    }
}
