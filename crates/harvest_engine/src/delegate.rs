use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tempfile::NamedTempFile;

#[derive(Debug, thiserror::Error)]
pub enum DelegateError {
    #[error("failed to write media url list: {0}")]
    ListFile(#[from] io::Error),
    #[error("failed to start {program}: {source}")]
    Spawn { program: String, source: io::Error },
    #[error("{program} exited with status {code:?}")]
    ExitStatus { program: String, code: Option<i32> },
}

/// What the asset fetcher is asked to do for one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaHandoff {
    /// File with one absolute URL per line.
    pub url_list: PathBuf,
    /// Directory the fetched assets (and their archive) go to.
    pub dest_dir: PathBuf,
    /// Session-derived name for the delegate's own output.
    pub name: String,
}

/// External bulk downloader for media referenced by archived threads.
pub trait AssetFetchDelegate {
    fn fetch_assets(&mut self, handoff: &MediaHandoff) -> Result<(), DelegateError>;
}

/// Writes `urls`, one per line, to a temporary file in `dir`.
///
/// The file is removed when the returned handle is dropped.
pub fn write_url_list(dir: &Path, urls: &[String]) -> Result<NamedTempFile, DelegateError> {
    let mut file = tempfile::Builder::new()
        .prefix("media-urls-")
        .suffix(".txt")
        .tempfile_in(dir)?;
    for url in urls {
        writeln!(file, "{url}")?;
    }
    file.flush()?;
    Ok(file)
}

/// Runs an external program, e.g. `wget`, once per handoff.
///
/// Arguments may contain `{input}`, `{dest}` and `{name}`, which are replaced
/// with the handoff's URL list path, destination directory and name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandDelegate {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
}

impl CommandDelegate {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            working_dir: None,
        }
    }

    /// `wget` fetching every listed URL into a WARC of its own.
    pub fn wget() -> Self {
        Self::new(
            "wget",
            [
                "--input-file={input}",
                "--directory-prefix={dest}",
                "--warc-file={dest}/{name}",
                "--no-verbose",
                "--tries=3",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        )
    }

    pub fn expand_args(&self, handoff: &MediaHandoff) -> Vec<String> {
        let input = handoff.url_list.to_string_lossy();
        let dest = handoff.dest_dir.to_string_lossy();
        self.args
            .iter()
            .map(|arg| {
                arg.replace("{input}", &input)
                    .replace("{dest}", &dest)
                    .replace("{name}", &handoff.name)
            })
            .collect()
    }
}

impl AssetFetchDelegate for CommandDelegate {
    fn fetch_assets(&mut self, handoff: &MediaHandoff) -> Result<(), DelegateError> {
        let mut command = Command::new(&self.program);
        command
            .args(self.expand_args(handoff))
            .stdin(Stdio::null());
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }
        let status = command.status().map_err(|source| DelegateError::Spawn {
            program: self.program.clone(),
            source,
        })?;
        if status.success() {
            Ok(())
        } else {
            Err(DelegateError::ExitStatus {
                program: self.program.clone(),
                code: status.code(),
            })
        }
    }
}
