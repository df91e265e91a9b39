//! Process-table access via the proc filesystem.
//!
//! The informer consumes the [`ProcReader`] trait rather than `/proc`
//! directly so that tests can substitute a scripted process table. The
//! default [`ProcFsReader`] enumerates numeric entries under the procfs
//! root and resolves per-process details lazily through [`ProcHandle`]
//! accessors; a process that exits between enumeration and the detail read
//! surfaces as `NotFound`, which callers treat as non-fatal.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use super::types::Pid;

/// Accessors for one enumerated process.
///
/// Each accessor performs its own read, so failures are observed per field
/// (a process can vanish halfway through being inspected).
pub trait ProcHandle: Send {
    fn pid(&self) -> Pid;
    fn comm(&self) -> io::Result<String>;
    /// Resolved executable path. Empty for kernel threads.
    fn executable(&self) -> io::Result<PathBuf>;
    /// Cumulative CPU time (user + system) in seconds.
    fn cpu_time(&self) -> io::Result<f64>;
    /// Kernel start time in clock ticks since boot.
    fn start_time_ticks(&self) -> io::Result<u64>;
}

/// Process-table snapshot provider.
pub trait ProcReader: Send {
    fn all_procs(&self) -> io::Result<Vec<Box<dyn ProcHandle>>>;
}

/// Liveness oracle used during eviction. Separate from [`ProcReader`]
/// because existence can be answered without touching procfs.
pub trait ProcessLiveness: Send + Sync {
    fn process_exists(&self, pid: Pid) -> bool;
}

/// Checks process existence by sending signal 0.
#[derive(Debug, Default)]
pub struct SignalLiveness;

impl ProcessLiveness for SignalLiveness {
    fn process_exists(&self, pid: Pid) -> bool {
        // SAFETY: kill with signal 0 performs no action besides the
        // existence and permission checks.
        unsafe { libc::kill(pid, 0) == 0 }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StatError {
    #[error("malformed stat line: `{0}`")]
    Malformed(String),

    #[error("invalid value for field {field}: `{value}`: {source}")]
    InvalidField {
        field: &'static str,
        value: String,
        #[source]
        source: std::num::ParseIntError,
    },
}

impl From<StatError> for io::Error {
    fn from(err: StatError) -> Self {
        io::Error::new(io::ErrorKind::InvalidData, err)
    }
}

/// Fields of `/proc/<pid>/stat` the informer cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcStat {
    pub comm: String,
    pub utime_ticks: u64,
    pub stime_ticks: u64,
    pub starttime_ticks: u64,
}

// 1-indexed field numbers from proc(5), counted after the comm field.
const FIELD_UTIME: usize = 14;
const FIELD_STIME: usize = 15;
const FIELD_STARTTIME: usize = 22;

impl ProcStat {
    /// Parses a `/proc/<pid>/stat` line.
    ///
    /// The comm field is enclosed in parentheses and may itself contain
    /// spaces and parentheses, so the line is split at the *last* closing
    /// parenthesis rather than tokenized from the start.
    pub fn parse(line: &str) -> Result<Self, StatError> {
        let open = line
            .find('(')
            .ok_or_else(|| StatError::Malformed(line.to_owned()))?;
        let close = line
            .rfind(')')
            .ok_or_else(|| StatError::Malformed(line.to_owned()))?;
        if close < open {
            return Err(StatError::Malformed(line.to_owned()));
        }

        let comm = line[open + 1..close].to_owned();
        // fields after comm start at field 3 (state)
        let rest: Vec<&str> = line[close + 1..].split_whitespace().collect();

        let field = |nr: usize, name: &'static str| -> Result<u64, StatError> {
            let raw = rest
                .get(nr - 3)
                .ok_or_else(|| StatError::Malformed(line.to_owned()))?;
            raw.parse::<u64>().map_err(|source| StatError::InvalidField {
                field: name,
                value: (*raw).to_owned(),
                source,
            })
        };

        Ok(Self {
            comm,
            utime_ticks: field(FIELD_UTIME, "utime")?,
            stime_ticks: field(FIELD_STIME, "stime")?,
            starttime_ticks: field(FIELD_STARTTIME, "starttime")?,
        })
    }
}

/// A process enumerated from procfs.
#[derive(Debug)]
pub struct ProcFsProcess {
    pid: Pid,
    path: PathBuf,
    clk_tck: f64,
}

impl ProcFsProcess {
    fn read_stat(&self) -> io::Result<ProcStat> {
        let raw = fs::read_to_string(self.path.join("stat"))?;
        Ok(ProcStat::parse(raw.trim_end())?)
    }
}

impl ProcHandle for ProcFsProcess {
    fn pid(&self) -> Pid {
        self.pid
    }

    fn comm(&self) -> io::Result<String> {
        let raw = fs::read_to_string(self.path.join("comm"))?;
        Ok(raw.trim_end().to_owned())
    }

    fn executable(&self) -> io::Result<PathBuf> {
        match fs::read_link(self.path.join("exe")) {
            Ok(path) => Ok(path),
            // kernel threads have no exe link; unreadable links are treated
            // the same so restricted processes still get tracked
            Err(err)
                if err.kind() == io::ErrorKind::NotFound
                    || err.kind() == io::ErrorKind::PermissionDenied =>
            {
                Ok(PathBuf::new())
            }
            Err(err) => Err(err),
        }
    }

    fn cpu_time(&self) -> io::Result<f64> {
        let stat = self.read_stat()?;
        Ok((stat.utime_ticks + stat.stime_ticks) as f64 / self.clk_tck)
    }

    fn start_time_ticks(&self) -> io::Result<u64> {
        Ok(self.read_stat()?.starttime_ticks)
    }
}

/// Default [`ProcReader`] backed by a (possibly relocated) procfs mount.
#[derive(Debug)]
pub struct ProcFsReader {
    root: PathBuf,
    clk_tck: f64,
}

impl ProcFsReader {
    pub fn new(root: impl AsRef<Path>) -> io::Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("procfs root `{}` is not a directory", root.display()),
            ));
        }

        Ok(Self {
            root,
            clk_tck: clock_ticks_per_second(),
        })
    }
}

impl ProcReader for ProcFsReader {
    fn all_procs(&self) -> io::Result<Vec<Box<dyn ProcHandle>>> {
        let mut procs: Vec<Box<dyn ProcHandle>> = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(pid) = name.to_str().and_then(|n| n.parse::<Pid>().ok()) else {
                continue;
            };

            procs.push(Box::new(ProcFsProcess {
                pid,
                path: entry.path(),
                clk_tck: self.clk_tck,
            }));
        }

        Ok(procs)
    }
}

fn clock_ticks_per_second() -> f64 {
    // SAFETY: sysconf is async-signal-safe and has no preconditions.
    let ticks = unsafe { libc::sysconf(libc::_SC_CLK_TCK) };
    if ticks > 0 { ticks as f64 } else { 100.0 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_proc(
        root: &Path,
        pid: Pid,
        comm: &str,
        utime: u64,
        stime: u64,
        starttime: u64,
    ) {
        let dir = root.join(pid.to_string());
        fs::create_dir(&dir).unwrap();
        fs::write(dir.join("comm"), format!("{comm}\n")).unwrap();
        let mut fields = vec!["0".to_string(); 52];
        fields[0] = pid.to_string();
        fields[1] = format!("({comm})");
        fields[2] = "S".to_string();
        fields[13] = utime.to_string();
        fields[14] = stime.to_string();
        fields[21] = starttime.to_string();
        fs::write(dir.join("stat"), fields.join(" ")).unwrap();
    }

    #[test]
    fn test_parse_stat_plain_comm() {
        let mut fields = vec!["0".to_string(); 52];
        fields[0] = "42".into();
        fields[1] = "(bash)".into();
        fields[2] = "S".into();
        fields[13] = "150".into();
        fields[14] = "50".into();
        fields[21] = "987654".into();
        let stat = ProcStat::parse(&fields.join(" ")).unwrap();
        assert_eq!(stat.comm, "bash");
        assert_eq!(stat.utime_ticks, 150);
        assert_eq!(stat.stime_ticks, 50);
        assert_eq!(stat.starttime_ticks, 987654);
    }

    #[test]
    fn test_parse_stat_comm_with_spaces_and_parens() {
        let line = "1000 (tmux: server (1)) S 1 2 3 4 5 6 7 8 9 10 11 12 13 \
                    14 15 16 17 18 19 20 21 22 23 24 25 26 27 28 29 30 31 32 \
                    33 34 35 36 37 38 39 40 41 42 43 44 45 46 47 48 49";
        let stat = ProcStat::parse(line).unwrap();
        assert_eq!(stat.comm, "tmux: server (1)");
        assert_eq!(stat.utime_ticks, 11);
        assert_eq!(stat.stime_ticks, 12);
        assert_eq!(stat.starttime_ticks, 19);
    }

    #[test]
    fn test_parse_stat_rejects_garbage() {
        assert!(ProcStat::parse("not a stat line").is_err());
        assert!(ProcStat::parse("1 (x) S 1 2").is_err());
    }

    #[test]
    fn test_all_procs_skips_non_numeric_entries() {
        let tmp = tempfile::tempdir().unwrap();
        write_proc(tmp.path(), 1, "init", 10, 5, 100);
        write_proc(tmp.path(), 99, "worker", 2, 1, 200);
        fs::create_dir(tmp.path().join("sys")).unwrap();
        fs::write(tmp.path().join("uptime"), "1 2").unwrap();

        let reader = ProcFsReader::new(tmp.path()).unwrap();
        let mut pids: Vec<Pid> = reader
            .all_procs()
            .unwrap()
            .iter()
            .map(|p| p.pid())
            .collect();
        pids.sort_unstable();
        assert_eq!(pids, vec![1, 99]);
    }

    #[test]
    fn test_proc_handle_reads_fields() {
        let tmp = tempfile::tempdir().unwrap();
        write_proc(tmp.path(), 7, "sleeper", 300, 100, 4242);

        let reader = ProcFsReader::new(tmp.path()).unwrap();
        let procs = reader.all_procs().unwrap();
        let proc = procs.iter().find(|p| p.pid() == 7).unwrap();
        assert_eq!(proc.comm().unwrap(), "sleeper");
        assert_eq!(proc.start_time_ticks().unwrap(), 4242);
        // no exe link in the fixture: treated as a kernel thread
        assert_eq!(proc.executable().unwrap(), PathBuf::new());
        assert!(proc.cpu_time().unwrap() > 0.0);
    }

    #[test]
    fn test_missing_process_reads_as_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        write_proc(tmp.path(), 5, "gone", 1, 1, 1);

        let reader = ProcFsReader::new(tmp.path()).unwrap();
        let procs = reader.all_procs().unwrap();
        fs::remove_dir_all(tmp.path().join("5")).unwrap();

        let err = procs[0].cpu_time().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_signal_liveness_self() {
        let live = SignalLiveness;
        assert!(live.process_exists(std::process::id() as Pid));
        // PID near the default pid_max that is vanishingly unlikely to run
        assert!(!live.process_exists(4_194_000));
    }
}
