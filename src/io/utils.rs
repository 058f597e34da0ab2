//! Utilities for input/output.

use std::{
    fs,
    io::{self, Read},
    path::{Path, PathBuf},
};
use tempfile::TempPath;

/// Reads and returns the content of the specified text file.
pub fn read_text_file<P: AsRef<Path>>(file_path: P) -> io::Result<String> {
    let file = open_file_and_map_err(file_path)?;
    let mut text = String::new();
    let _ = io::BufReader::new(file).read_to_string(&mut text)?;
    Ok(text)
}

/// Opens the given file, including the path in the error message on failure.
pub fn open_file_and_map_err<P: AsRef<Path>>(file_path: P) -> io::Result<fs::File> {
    let file_path = file_path.as_ref();
    fs::File::open(file_path).map_err(|err| {
        io::Error::new(
            err.kind(),
            format!("Could not open {}: {}", file_path.display(), err),
        )
    })
}

/// Creates the parent directory of the given file path if it does not exist.
pub fn create_directory_if_missing<P: AsRef<Path>>(file_path: P) -> io::Result<()> {
    let parent = parent_directory(file_path.as_ref());
    if !parent.exists() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

fn parent_directory(file_path: &Path) -> &Path {
    file_path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
}

/// An output path that is written through a temporary file in the same
/// directory and only moved to the target path once writing has succeeded.
///
/// The temporary file is removed when the `AtomicOutputPath` is dropped
/// without calling `perform_replace`, together with any directories that were
/// created for it and are still empty.
#[derive(Debug)]
pub struct AtomicOutputPath {
    target_path: PathBuf,
    // Dropped before `created_directories`, so the directories are empty by then
    temporary_path: TempPath,
    created_directories: CreatedDirectories,
}

/// Directories created to hold an output file.
#[derive(Debug)]
struct CreatedDirectories {
    innermost: PathBuf,
    outermost: Option<PathBuf>,
}

impl AtomicOutputPath {
    /// Creates a temporary file next to the given target path, creating the
    /// parent directories if necessary.
    pub fn new<P: AsRef<Path>>(target_path: P) -> io::Result<Self> {
        let target_path = target_path.as_ref().to_path_buf();
        let file_name = target_path
            .file_name()
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("Output path {} has no file name", target_path.display()),
                )
            })?
            .to_string_lossy()
            .to_string();

        let created_directories = CreatedDirectories::create_for(&target_path)?;

        // Keep the extension so that the format can still be inferred from the path
        let suffix = target_path
            .extension()
            .map(|extension| format!(".{}", extension.to_string_lossy()))
            .unwrap_or_default();

        let temporary_path = tempfile::Builder::new()
            .prefix(&format!(".{}.", file_name))
            .suffix(&suffix)
            .tempfile_in(&created_directories.innermost)?
            .into_temp_path();

        Ok(Self {
            target_path,
            temporary_path,
            created_directories,
        })
    }

    /// Returns the path of the temporary file to write to.
    pub fn temporary_path(&self) -> &Path {
        &self.temporary_path
    }

    /// Moves the temporary file to the target path. Fails rather than
    /// replacing a file that appeared at the target path in the meantime.
    pub fn perform_replace(self) -> io::Result<()> {
        let Self {
            target_path,
            temporary_path,
            created_directories,
        } = self;
        let result = temporary_path
            .persist_noclobber(&target_path)
            .map_err(|err| err.error);
        drop(created_directories);
        result
    }
}

impl CreatedDirectories {
    fn create_for(file_path: &Path) -> io::Result<Self> {
        let innermost = parent_directory(file_path).to_path_buf();
        let outermost = innermost
            .ancestors()
            .take_while(|directory| !directory.as_os_str().is_empty() && !directory.exists())
            .last()
            .map(Path::to_path_buf);
        let directories = Self {
            innermost,
            outermost,
        };
        create_directory_if_missing(file_path)?;
        Ok(directories)
    }
}

impl Drop for CreatedDirectories {
    fn drop(&mut self) {
        let outermost = match self.outermost.as_deref() {
            Some(outermost) => outermost,
            None => return,
        };
        // Removal stops at the first directory that is not empty
        for directory in self.innermost.ancestors() {
            if fs::remove_dir(directory).is_err() || directory == outermost {
                break;
            }
        }
    }
}
