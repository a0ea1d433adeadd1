use crate::error::Error;
use chrono::{Local, NaiveDateTime};
use env_logger::{Builder, Env, Target};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Copies every formatted log line to the log file and to stderr.
struct Tee {
    file: File,
}

impl Write for Tee {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write_all(buf)?;
        io::stderr().write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()?;
        io::stderr().flush()
    }
}

pub fn log_file_name(at: NaiveDateTime) -> String {
    format!("log_{}.log", at.format("%Y-%m-%d_%H-%M-%S"))
}

/// Installs the process logger. Must be called once, before any component
/// logs; a second call fails instead of registering another output.
///
/// # Returns
/// The path of the log file for this process.
pub fn init(log_dir: &Path) -> Result<PathBuf, Error> {
    fs::create_dir_all(log_dir)?;

    let path = log_dir.join(log_file_name(Local::now().naive_local()));
    let file = OpenOptions::new().create(true).append(true).open(&path)?;

    Builder::from_env(Env::default().default_filter_or("info"))
        .format(|buf, record| {
            writeln!(
                buf,
                "{} - {} - {} - {}",
                Local::now().format("%Y-%m-%d %H:%M:%S,%3f"),
                record.target(),
                record.level(),
                record.args()
            )
        })
        .target(Target::Pipe(Box::new(Tee { file })))
        .try_init()
        .map_err(|e| Error::Logging(e.to_string()))?;

    Ok(path)
}
