use std::{
    fs::{self, File},
    io::{BufRead, BufReader, ErrorKind, Write},
    num::ParseIntError,
    path::{Path, PathBuf, StripPrefixError},
    time::Duration,
};

use nix::unistd::Pid;

use crate::config::{CgroupData, Resources};
use crate::stats::Stats;

pub const CGROUP_PROCS: &str = "cgroup.procs";

pub trait CgroupManager {
    type Error;

    /// Creates the cgroups, applies limits that must be in place before a task
    /// can join and moves the task of `data` into every subsystem
    fn apply(&self, data: &CgroupData) -> Result<(), Self::Error>;

    /// Applies resource restrictions to the cgroup
    fn set(&self, resources: &Resources) -> Result<(), Self::Error>;

    /// Removes the cgroup
    fn remove(&self) -> Result<(), Self::Error>;

    /// Retrieve statistics for the cgroup
    fn stats(&self) -> Result<Stats, Self::Error>;

    /// Gets the PIDs inside the cgroup
    fn get_all_pids(&self) -> Result<Vec<Pid>, Self::Error>;
}

#[derive(thiserror::Error, Debug)]
pub enum WrappedIoError {
    #[error("failed to open {path}: {err}")]
    Open { err: std::io::Error, path: PathBuf },
    #[error("failed to write {data} to {path}: {err}")]
    Write {
        err: std::io::Error,
        path: PathBuf,
        data: String,
    },
    #[error("failed to read {path}: {err}")]
    Read { err: std::io::Error, path: PathBuf },
    #[error("failed to create dir {path}: {err}")]
    CreateDir { err: std::io::Error, path: PathBuf },
    #[error("at {path}: {err}")]
    Other { err: std::io::Error, path: PathBuf },
}

impl WrappedIoError {
    pub fn inner(&self) -> &std::io::Error {
        match self {
            WrappedIoError::Open { err, .. } => err,
            WrappedIoError::Write { err, .. } => err,
            WrappedIoError::Read { err, .. } => err,
            WrappedIoError::CreateDir { err, .. } => err,
            WrappedIoError::Other { err, .. } => err,
        }
    }

    /// Returns true if the file or directory the operation targeted does not exist
    pub fn is_not_found(&self) -> bool {
        self.inner().kind() == ErrorKind::NotFound
    }
}

#[inline]
pub fn write_cgroup_file_str<P: AsRef<Path>>(path: P, data: &str) -> Result<(), WrappedIoError> {
    let path = path.as_ref();

    fs::OpenOptions::new()
        .create(false)
        .write(true)
        .truncate(true)
        .open(path)
        .wrap_open(path)?
        .write_all(data.as_bytes())
        .wrap_write(path, data)?;

    Ok(())
}

#[inline]
pub fn write_cgroup_file<P: AsRef<Path>, T: ToString>(
    path: P,
    data: T,
) -> Result<(), WrappedIoError> {
    write_cgroup_file_str(path, &data.to_string())
}

#[inline]
pub fn read_cgroup_file<P: AsRef<Path>>(path: P) -> Result<String, WrappedIoError> {
    let path = path.as_ref();
    fs::read_to_string(path).wrap_read(path)
}

/// Reads a single valued cgroup file and returns its content without surrounding whitespace
pub fn get_cgroup_param_string(cgroup_path: &Path, file: &str) -> Result<String, WrappedIoError> {
    let content = read_cgroup_file(cgroup_path.join(file))?;
    Ok(content.trim().to_owned())
}

#[derive(thiserror::Error, Debug)]
pub enum ParseParamError {
    #[error("io error: {0}")]
    WrappedIo(#[from] WrappedIoError),
    #[error("failed to parse {value:?} from {path} as an unsigned integer: {err}")]
    Parse {
        value: String,
        path: PathBuf,
        err: ParseIntError,
    },
}

impl ParseParamError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ParseParamError::WrappedIo(err) if err.is_not_found())
    }
}

/// Reads a single valued cgroup file as an unsigned integer. The literal `max`
/// is reported as `u64::MAX`, negative values (which the kernel uses for some
/// unset limits, e.g. `-1` in `cpu.cfs_quota_us`) are reported as 0.
/// # Example
/// ```no_run
/// use std::path::Path;
/// use libcgfs::common::get_cgroup_param_uint;
///
/// let shares = get_cgroup_param_uint(Path::new("/sys/fs/cgroup/cpu/mycontainer"), "cpu.shares").unwrap();
/// ```
pub fn get_cgroup_param_uint(cgroup_path: &Path, file: &str) -> Result<u64, ParseParamError> {
    let value = get_cgroup_param_string(cgroup_path, file)?;
    parse_uint(&value).map_err(|err| ParseParamError::Parse {
        value,
        path: cgroup_path.join(file),
        err,
    })
}

fn parse_uint(value: &str) -> Result<u64, ParseIntError> {
    if value == "max" {
        return Ok(u64::MAX);
    }

    match value.parse::<u64>() {
        Ok(v) => Ok(v),
        Err(err) => match value.parse::<i64>() {
            Ok(v) if v < 0 => Ok(0),
            _ => Err(err),
        },
    }
}

/// Creates the cgroup directory if needed and moves the task into it. A pid
/// of -1 only creates the directory.
pub fn add_task(pid: Pid, cgroup_path: &Path) -> Result<(), WrappedIoError> {
    fs::create_dir_all(cgroup_path).wrap_create_dir(cgroup_path)?;
    if pid.as_raw() == -1 {
        return Ok(());
    }

    write_cgroup_file(cgroup_path.join(CGROUP_PROCS), pid)
}

pub fn get_all_pids(path: &Path) -> Result<Vec<Pid>, WrappedIoError> {
    tracing::debug!("scan pids in folder: {:?}", path);
    let mut result = vec![];
    walk_dir(path, &mut |p| {
        let file_path = p.join(CGROUP_PROCS);
        if file_path.exists() {
            let file = File::open(&file_path).wrap_open(&file_path)?;
            for line in BufReader::new(file).lines() {
                let line = line.wrap_read(&file_path)?;
                if line.trim().is_empty() {
                    continue;
                }
                result.push(Pid::from_raw(
                    line.trim()
                        .parse::<i32>()
                        .map_err(|err| std::io::Error::new(ErrorKind::InvalidData, err))
                        .wrap_other(&file_path)?,
                ))
            }
        }
        Ok::<(), WrappedIoError>(())
    })?;
    Ok(result)
}

fn walk_dir<F, E>(path: &Path, c: &mut F) -> Result<(), E>
where
    F: FnMut(&Path) -> Result<(), E>,
    E: From<WrappedIoError>,
{
    c(path)?;
    for entry in fs::read_dir(path).wrap_read(path)? {
        let entry = entry.wrap_open(path)?;
        let path = entry.path();

        if path.is_dir() {
            walk_dir(&path, c)?;
        }
    }
    Ok(())
}

pub(crate) trait PathBufExt {
    fn join_safely<P: AsRef<Path>>(&self, path: P) -> Result<PathBuf, JoinSafelyError>;
}

#[derive(thiserror::Error, Debug)]
pub enum JoinSafelyError {
    #[error("failed to strip prefix from {path}: {err}")]
    StripPrefix {
        err: StripPrefixError,
        path: PathBuf,
    },
}

impl PathBufExt for PathBuf {
    fn join_safely<P: AsRef<Path>>(&self, path: P) -> Result<PathBuf, JoinSafelyError> {
        let path = path.as_ref();
        if path.is_relative() {
            return Ok(self.join(path));
        }

        let stripped = path
            .strip_prefix("/")
            .map_err(|err| JoinSafelyError::StripPrefix {
                err,
                path: path.to_path_buf(),
            })?;
        Ok(self.join(stripped))
    }
}

/// Attempts to delete the directory the requested number of times. The kernel
/// refuses to remove a cgroup that still contains tasks, so the last error is
/// returned if every attempt fails.
pub(crate) fn delete_with_retry<P: AsRef<Path>, L: Into<Option<Duration>>>(
    path: P,
    retries: u32,
    limit_backoff: L,
) -> Result<(), WrappedIoError> {
    let mut attempts = 0;
    let mut delay = Duration::from_millis(10);
    let path = path.as_ref();
    let limit = limit_backoff.into().unwrap_or(Duration::MAX);
    let mut last_err = std::io::Error::new(ErrorKind::TimedOut, "could not delete");

    while attempts < retries {
        match fs::remove_dir(path) {
            Ok(()) => return Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(()),
            Err(err) => last_err = err,
        }

        std::thread::sleep(delay);
        attempts += 1;
        delay *= attempts;
        if delay > limit {
            delay = limit;
        }
    }

    Err(last_err).wrap_other(path)
}

pub(crate) trait WrapIoResult {
    type Target;

    fn wrap_create_dir<P: Into<PathBuf>>(self, path: P) -> Result<Self::Target, WrappedIoError>;
    fn wrap_read<P: Into<PathBuf>>(self, path: P) -> Result<Self::Target, WrappedIoError>;
    fn wrap_open<P: Into<PathBuf>>(self, path: P) -> Result<Self::Target, WrappedIoError>;
    fn wrap_write<P: Into<PathBuf>, D: Into<String>>(
        self,
        path: P,
        data: D,
    ) -> Result<Self::Target, WrappedIoError>;
    fn wrap_other<P: Into<PathBuf>>(self, path: P) -> Result<Self::Target, WrappedIoError>;
}

impl<T> WrapIoResult for Result<T, std::io::Error> {
    type Target = T;

    fn wrap_create_dir<P: Into<PathBuf>>(self, path: P) -> Result<Self::Target, WrappedIoError> {
        self.map_err(|err| WrappedIoError::CreateDir {
            err,
            path: path.into(),
        })
    }

    fn wrap_read<P: Into<PathBuf>>(self, path: P) -> Result<Self::Target, WrappedIoError> {
        self.map_err(|err| WrappedIoError::Read {
            err,
            path: path.into(),
        })
    }

    fn wrap_open<P: Into<PathBuf>>(self, path: P) -> Result<Self::Target, WrappedIoError> {
        self.map_err(|err| WrappedIoError::Open {
            err,
            path: path.into(),
        })
    }

    fn wrap_write<P: Into<PathBuf>, D: Into<String>>(
        self,
        path: P,
        data: D,
    ) -> Result<Self::Target, WrappedIoError> {
        self.map_err(|err| WrappedIoError::Write {
            err,
            path: path.into(),
            data: data.into(),
        })
    }

    fn wrap_other<P: Into<PathBuf>>(self, path: P) -> Result<Self::Target, WrappedIoError> {
        self.map_err(|err| WrappedIoError::Other {
            err,
            path: path.into(),
        })
    }
}
