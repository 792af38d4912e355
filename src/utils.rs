//! XDG directory helpers
//!
//! - Data: `~/.local/share/fwstage/` - console configuration
//! - State: `~/.local/state/fwstage/` - audit trail and log file
//!
//! # Example
//!
//! ```
//! use fwstage::utils::{ensure_dirs, get_state_dir};
//!
//! ensure_dirs().expect("Failed to create directories");
//!
//! if let Some(state) = get_state_dir() {
//!     let _audit = state.join("audit.log");
//! }
//! ```

use directories::ProjectDirs;
use std::path::PathBuf;

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "fwstage", "fwstage")
}

pub fn get_data_dir() -> Option<PathBuf> {
    project_dirs().map(|pd| pd.data_dir().to_path_buf())
}

/// State directory; falls back to the data directory on platforms without one
pub fn get_state_dir() -> Option<PathBuf> {
    project_dirs().map(|pd| {
        pd.state_dir()
            .unwrap_or_else(|| pd.data_dir())
            .to_path_buf()
    })
}

/// Creates the data and state directories (mode 0o700 on Unix).
///
/// # Errors
///
/// Returns an I/O error if a directory cannot be created.
pub fn ensure_dirs() -> std::io::Result<()> {
    create_private_dirs([get_data_dir(), get_state_dir()].into_iter().flatten())
}

/// Creates each directory (and parents), owner-only on Unix.
///
/// # Errors
///
/// Returns the first I/O error; later directories are not attempted.
pub fn create_private_dirs(dirs: impl IntoIterator<Item = PathBuf>) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use std::fs::DirBuilder;
        use std::os::unix::fs::DirBuilderExt;

        let mut builder = DirBuilder::new();
        builder.mode(0o700);
        builder.recursive(true);
        for dir in dirs {
            builder.create(dir)?;
        }
    }

    #[cfg(not(unix))]
    for dir in dirs {
        std::fs::create_dir_all(dir)?;
    }

    Ok(())
}

/// Truncates a string to `max_len` bytes, adding an ellipsis if needed
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        s.to_string()
    } else {
        let end = s
            .char_indices()
            .map(|(idx, _)| idx)
            .take_while(|&idx| idx <= max_len.saturating_sub(3))
            .last()
            .unwrap_or(0);
        format!("{}...", &s[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_string() {
        assert_eq!(truncate_string("short", 10), "short");
        assert_eq!(truncate_string("a long rule name", 10), "a long ...");
        assert_eq!(truncate_string("ééééé", 6), "é...");
    }

    #[test]
    fn test_create_private_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("data").join("fwstage");
        create_private_dirs([nested.clone()]).unwrap();
        assert!(nested.is_dir());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&nested).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o700);
        }
    }

    #[test]
    fn test_create_private_dirs_reports_failure() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("state");
        std::fs::write(&blocker, "not a directory").unwrap();
        assert!(create_private_dirs([blocker.join("fwstage")]).is_err());
    }
}
