//! # Tree
//!
//! Recursive directory creation and removal built on listing primitives only

use crate::list::{nlst_name, EntryKind, ListingEntry};
use crate::types::{FtpError, FtpResult};

/// Directory primitives the tree operations are built on
pub trait DirectoryOps {
    /// Names in `dir` (`NLST`); `None` lists the working directory
    fn list_names(&mut self, dir: Option<&str>) -> FtpResult<Vec<String>>;

    /// Machine-readable entries of `dir` (`MLSD`), without `.` and `..`
    fn list_entries(&mut self, dir: &str) -> FtpResult<Vec<ListingEntry>>;

    fn make_dir(&mut self, path: &str) -> FtpResult<()>;

    fn remove_dir(&mut self, path: &str) -> FtpResult<()>;

    fn remove_file(&mut self, path: &str) -> FtpResult<()>;
}

/// Create `path` and any missing parent.
///
/// Each level is listed before creating the next segment, so existing directories
/// are never passed to `MKD`.
pub fn mktree<O>(ops: &mut O, path: &str) -> FtpResult<()>
where
    O: DirectoryOps + ?Sized,
{
    debug!("Creating directory tree {path}");
    let mut existing = if path.starts_with('/') {
        String::from("/")
    } else {
        String::new()
    };

    for segment in path.split('/').filter(|segment| !segment.is_empty()) {
        if segment == "." || segment == ".." {
            existing.push_str(segment);
            existing.push('/');
            continue;
        }
        let listed = match existing.as_str() {
            "" => None,
            "/" => Some("/"),
            prefix => Some(prefix.trim_end_matches('/')),
        };
        let names = ops.list_names(listed)?;
        let target = format!("{existing}{segment}");
        if names.iter().any(|name| nlst_name(name) == segment) {
            trace!("{target} already exists");
        } else {
            ops.make_dir(&target)?;
        }
        existing = target;
        existing.push('/');
    }

    Ok(())
}

/// Remove `root` with everything below it.
///
/// Depth first, with an explicit stack: a directory holding sub-directories stays on
/// the stack until its children are gone, and is removed on its second visit.
/// `/` is emptied but never removed.
pub fn rmtree<O>(ops: &mut O, root: &str) -> FtpResult<()>
where
    O: DirectoryOps + ?Sized,
{
    debug!("Removing tree {root}");
    let root = match root.trim_end_matches('/') {
        "" if root.starts_with('/') => "/",
        "" => return Err(FtpError::InvalidArgument(String::from("empty path"))),
        trimmed => trimmed,
    };

    let mut stack = vec![root.to_string()];
    while let Some(current) = stack.last().cloned() {
        let entries = ops.list_entries(&current)?;
        if entries.is_empty() {
            remove_dir_unless_root(ops, &current)?;
            stack.pop();
            continue;
        }

        let mut has_subdir = false;
        for entry in entries {
            let path = join(&current, &entry.name);
            match entry.kind {
                EntryKind::Directory => {
                    trace!("{path} queued");
                    stack.push(path);
                    has_subdir = true;
                }
                EntryKind::File => ops.remove_file(&path)?,
            }
        }

        if !has_subdir {
            remove_dir_unless_root(ops, &current)?;
            stack.pop();
        }
    }

    Ok(())
}

fn remove_dir_unless_root<O>(ops: &mut O, dir: &str) -> FtpResult<()>
where
    O: DirectoryOps + ?Sized,
{
    if dir == "/" {
        trace!("keeping root directory");
        Ok(())
    } else {
        ops.remove_dir(dir)
    }
}

fn join(dir: &str, name: &str) -> String {
    if dir.ends_with('/') {
        format!("{dir}{name}")
    } else {
        format!("{dir}/{name}")
    }
}
