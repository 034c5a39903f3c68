//! Process-ancestry resolution via the host process table.
//!
//! Surface-creation notifications report the PID of the guest compositor
//! process, which is a child of the container's init — never the init
//! itself. Ownership is therefore resolved by looking up the reporting
//! process's *parent* and matching that against live init PIDs. This
//! module isolates the textual `/proc/<pid>/stat` parsing behind a trait
//! so it can be swapped for a structured host API without touching the
//! reconciler.

use std::path::PathBuf;

use nix::unistd::Pid;

/// Read-only view of the host process table.
pub trait ProcessTable: Send + Sync {
    /// Returns the parent PID of `pid`, or `None` if the process no
    /// longer exists or its status record is malformed. Callers must
    /// treat `None` as "no owning container", never as fatal.
    fn parent_of(&self, pid: Pid) -> Option<Pid>;
}

/// [`ProcessTable`] implementation over the procfs mount.
#[derive(Debug, Clone)]
pub struct ProcFs {
    root: PathBuf,
}

impl ProcFs {
    /// Creates a resolver over the standard `/proc` mount.
    #[must_use]
    pub fn new() -> Self {
        Self {
            root: PathBuf::from("/proc"),
        }
    }

    /// Creates a resolver over an alternate procfs root.
    #[must_use]
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl Default for ProcFs {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessTable for ProcFs {
    fn parent_of(&self, pid: Pid) -> Option<Pid> {
        let path = self.root.join(pid.to_string()).join("stat");
        let stat = std::fs::read_to_string(&path).ok()?;
        let ppid = parse_stat_ppid(&stat);
        if ppid.is_none() {
            tracing::debug!(%pid, path = %path.display(), "malformed process status record");
        }
        ppid.map(Pid::from_raw)
    }
}

/// Parses the parent PID from a `/proc/<pid>/stat` record.
///
/// The comm field (field 2) may itself contain spaces and parentheses,
/// so parsing starts after the *last* closing parenthesis: the next
/// field is the single-character state, then the ppid.
fn parse_stat_ppid(stat: &str) -> Option<i32> {
    let (_, rest) = stat.rsplit_once(')')?;
    let mut fields = rest.split_whitespace();
    let state = fields.next()?;
    if state.len() != 1 {
        return None;
    }
    fields.next()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_stat_ppid_plain_comm() {
        let stat = "1234 (weston) S 987 1234 1234 0 -1 4194560 1714 0 0 0";
        assert_eq!(parse_stat_ppid(stat), Some(987));
    }

    #[test]
    fn parse_stat_ppid_comm_with_spaces_and_parens() {
        let stat = "42 (tmux: client (x)) R 7 42 42 0 -1 4194304 100 0 0 0";
        assert_eq!(parse_stat_ppid(stat), Some(7));
    }

    #[test]
    fn parse_stat_ppid_malformed() {
        assert_eq!(parse_stat_ppid("no parens here"), None);
        assert_eq!(parse_stat_ppid("12 (comm) S"), None);
        assert_eq!(parse_stat_ppid("12 (comm) STATE 9"), None);
        assert_eq!(parse_stat_ppid("12 (comm) S notanumber"), None);
    }

    #[test]
    fn procfs_resolves_parent_from_stat_file() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("555");
        std::fs::create_dir(&dir).unwrap();
        std::fs::write(dir.join("stat"), "555 (guest-comp) S 444 555 555 0 -1 0 0 0").unwrap();

        let table = ProcFs::with_root(root.path());
        assert_eq!(table.parent_of(Pid::from_raw(555)), Some(Pid::from_raw(444)));
    }

    #[test]
    fn procfs_missing_process_is_none() {
        let root = tempfile::tempdir().unwrap();
        let table = ProcFs::with_root(root.path());
        assert_eq!(table.parent_of(Pid::from_raw(1)), None);
    }
}
