//! Path Navigation
//!
//! Resolves a path string segment by segment against the inode table:
//! `.`/`..` handling, symlink expansion with per-call cycle detection,
//! and execute-permission checks on every directory traversed. The
//! canonical segment stack falls out as a byproduct, which is what
//! `realpath` and `chdir` report.

use std::collections::{HashSet, VecDeque};

use crate::constants::X_OK;
use crate::cwd::CurrentDirectory;
use crate::error::{Errno, FsResult};
use crate::inode::{INodeIndex, INodeKind, INodeManager};
use crate::permissions::Identity;

/// Read-only view of the state navigation needs.
#[derive(Clone, Copy)]
pub struct NavContext<'a> {
    pub inodes: &'a INodeManager,
    pub identity: Identity,
    pub root: INodeIndex,
    pub cwd: &'a CurrentDirectory,
}

/// Where a path landed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Navigated {
    /// Directory holding the final entry.
    pub dir: INodeIndex,
    /// The final entry, or `None` if it does not exist.
    pub target: Option<INodeIndex>,
    /// Name of the final entry within `dir`; empty for the root.
    pub name: String,
    /// Unconsumed path after a missing entry; empty when `name` was last.
    pub remaining: String,
    /// Canonical segments of the target (or of `dir` when missing).
    pub path_stack: Vec<String>,
}

impl Navigated {
    /// `/`-joined canonical path.
    pub fn canonical_path(&self) -> String {
        format!("/{}", self.path_stack.join("/"))
    }
}

/// Split into non-empty segments. A trailing slash becomes a `.` segment so
/// the last component must be a directory.
fn split_segments(path: &str) -> VecDeque<String> {
    let mut out: VecDeque<String> =
        path.split('/').filter(|s| !s.is_empty()).map(str::to_string).collect();
    if path.ends_with('/') && !out.is_empty() {
        out.push_back(".".to_string());
    }
    out
}

fn join(segments: &VecDeque<String>) -> String {
    segments.iter().map(String::as_str).collect::<Vec<_>>().join("/")
}

fn root_navigated(root: INodeIndex) -> Navigated {
    Navigated { dir: root, target: Some(root), name: String::new(), remaining: String::new(), path_stack: vec![] }
}

/// Resolve `path`. Relative paths start at the current directory.
///
/// When `resolve_last_link` is false a symlink in final position is returned
/// as itself rather than followed.
pub fn navigate(ctx: &NavContext<'_>, path: &str, resolve_last_link: bool) -> FsResult<Navigated> {
    if path.is_empty() {
        return Err(Errno::ENOENT.at(path));
    }
    let segments = split_segments(path);
    if path.starts_with('/') {
        if segments.is_empty() {
            return Ok(root_navigated(ctx.root));
        }
        navigate_from(ctx, ctx.root, segments, Vec::new(), resolve_last_link, path)
    } else {
        navigate_from(ctx, ctx.cwd.inode(), segments, ctx.cwd.path_stack().to_vec(), resolve_last_link, path)
    }
}

/// Walk `segments` starting at `dir`, whose canonical path is `path_stack`.
/// `origin` is the caller's path, used in error messages.
pub fn navigate_from(
    ctx: &NavContext<'_>,
    mut dir: INodeIndex,
    mut segments: VecDeque<String>,
    mut path_stack: Vec<String>,
    resolve_last_link: bool,
    origin: &str,
) -> FsResult<Navigated> {
    let mut visited: HashSet<INodeIndex> = HashSet::new();
    loop {
        let dir_inode = ctx.inodes.get(dir).ok_or_else(|| Errno::ENOENT.at(origin))?;
        if !ctx.identity.can(X_OK, dir_inode.stat()) {
            return Err(Errno::EACCES.at(origin));
        }
        let Some(name) = segments.pop_front() else {
            // only reachable when a symlink pointed at the root
            return Ok(Navigated {
                dir,
                target: Some(dir),
                name: String::new(),
                remaining: String::new(),
                path_stack,
            });
        };
        tracing::trace!(dir, segment = %name, "navigating");

        let Some(target) = ctx.inodes.get_entry(dir, &name)? else {
            return Ok(Navigated { dir, target: None, name, remaining: join(&segments), path_stack });
        };
        let inode = ctx.inodes.get(target).ok_or_else(|| Errno::ENOENT.at(origin))?;
        match inode.kind() {
            INodeKind::File(_) | INodeKind::CharacterDev => {
                if !segments.is_empty() {
                    return Err(Errno::ENOTDIR.at(origin));
                }
                path_stack.push(name.clone());
                return Ok(Navigated { dir, target: Some(target), name, remaining: String::new(), path_stack });
            }
            INodeKind::Directory(_) => {
                match name.as_str() {
                    "." => {}
                    ".." => {
                        path_stack.pop();
                    }
                    _ => path_stack.push(name.clone()),
                }
                if segments.is_empty() {
                    return Ok(Navigated { dir, target: Some(target), name, remaining: String::new(), path_stack });
                }
                dir = target;
            }
            INodeKind::Symlink(link) => {
                if segments.is_empty() && !resolve_last_link {
                    path_stack.push(name.clone());
                    return Ok(Navigated { dir, target: Some(target), name, remaining: String::new(), path_stack });
                }
                if !visited.insert(target) {
                    return Err(Errno::ELOOP.at(origin));
                }
                if link.is_empty() {
                    return Err(Errno::ENOENT.at(origin));
                }
                let mut expanded = split_segments(link);
                expanded.extend(segments.drain(..));
                if link.starts_with('/') {
                    dir = ctx.root;
                    path_stack.clear();
                }
                segments = expanded;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inode::{INodeProps, INodeSpec};

    struct Tree {
        inodes: INodeManager,
        cwd: CurrentDirectory,
        root: INodeIndex,
    }

    impl Tree {
        fn new() -> Self {
            let mut inodes = INodeManager::new();
            let root = inodes
                .create(INodeSpec::Directory { parent: None }, INodeProps { mode: 0o755, uid: 0, gid: 0 })
                .unwrap();
            let cwd = CurrentDirectory::new(&mut inodes, root, vec![]);
            Self { inodes, cwd, root }
        }

        fn ctx(&self, uid: u32) -> NavContext<'_> {
            NavContext { inodes: &self.inodes, identity: Identity { uid, gid: uid }, root: self.root, cwd: &self.cwd }
        }

        fn mkdir(&mut self, parent: INodeIndex, name: &str, mode: u32) -> INodeIndex {
            let dir = self
                .inodes
                .create(INodeSpec::Directory { parent: Some(parent) }, INodeProps { mode, uid: 0, gid: 0 })
                .unwrap();
            self.inodes.add_entry(parent, name, dir).unwrap();
            dir
        }

        fn file(&mut self, parent: INodeIndex, name: &str) -> INodeIndex {
            let file = self
                .inodes
                .create(INodeSpec::File { data: vec![] }, INodeProps { mode: 0o644, uid: 0, gid: 0 })
                .unwrap();
            self.inodes.add_entry(parent, name, file).unwrap();
            file
        }

        fn symlink(&mut self, parent: INodeIndex, name: &str, target: &str) -> INodeIndex {
            let link = self
                .inodes
                .create(INodeSpec::Symlink { target: target.into() }, INodeProps { mode: 0o777, uid: 0, gid: 0 })
                .unwrap();
            self.inodes.add_entry(parent, name, link).unwrap();
            link
        }
    }

    #[test]
    fn test_root() {
        let tree = Tree::new();
        let nav = navigate(&tree.ctx(0), "/", true).unwrap();
        assert_eq!(nav, root_navigated(tree.root));
        let nav = navigate(&tree.ctx(0), "///", true).unwrap();
        assert_eq!(nav.name, "");
    }

    #[test]
    fn test_empty_path_is_enoent() {
        let tree = Tree::new();
        assert_eq!(navigate(&tree.ctx(0), "", true).unwrap_err().errno(), Some(Errno::ENOENT));
    }

    #[test]
    fn test_nested_lookup_and_stack() {
        let mut tree = Tree::new();
        let a = tree.mkdir(tree.root, "a", 0o755);
        let f = tree.file(a, "f");
        let nav = navigate(&tree.ctx(0), "//a///f", true).unwrap();
        assert_eq!((nav.dir, nav.target, nav.name.as_str()), (a, Some(f), "f"));
        assert_eq!(nav.canonical_path(), "/a/f");
    }

    #[test]
    fn test_dot_and_dotdot() {
        let mut tree = Tree::new();
        let a = tree.mkdir(tree.root, "a", 0o755);
        let b = tree.mkdir(a, "b", 0o755);
        let nav = navigate(&tree.ctx(0), "/a/./b/../b/.", true).unwrap();
        assert_eq!(nav.target, Some(b));
        assert_eq!(nav.path_stack, vec!["a", "b"]);
        let nav = navigate(&tree.ctx(0), "/../..", true).unwrap();
        assert_eq!(nav.target, Some(tree.root));
        assert!(nav.path_stack.is_empty());
    }

    #[test]
    fn test_missing_entry_reports_remaining() {
        let mut tree = Tree::new();
        tree.mkdir(tree.root, "a", 0o755);
        let nav = navigate(&tree.ctx(0), "/a/missing/x/y", true).unwrap();
        assert_eq!(nav.target, None);
        assert_eq!(nav.name, "missing");
        assert_eq!(nav.remaining, "x/y");
        let nav = navigate(&tree.ctx(0), "/a/new", true).unwrap();
        assert_eq!((nav.target, nav.remaining.as_str()), (None, ""));
    }

    #[test]
    fn test_file_in_middle_is_enotdir() {
        let mut tree = Tree::new();
        tree.file(tree.root, "f");
        let err = navigate(&tree.ctx(0), "/f/x", true).unwrap_err();
        assert_eq!(err.errno(), Some(Errno::ENOTDIR));
        let err = navigate(&tree.ctx(0), "/f/", true).unwrap_err();
        assert_eq!(err.errno(), Some(Errno::ENOTDIR));
    }

    #[test]
    fn test_symlink_absolute_and_relative() {
        let mut tree = Tree::new();
        let a = tree.mkdir(tree.root, "a", 0o755);
        let f = tree.file(a, "f");
        tree.symlink(tree.root, "abs", "/a");
        tree.symlink(a, "rel", "f");

        let nav = navigate(&tree.ctx(0), "/abs/f", true).unwrap();
        assert_eq!(nav.target, Some(f));
        assert_eq!(nav.canonical_path(), "/a/f");

        let nav = navigate(&tree.ctx(0), "/a/rel", true).unwrap();
        assert_eq!(nav.target, Some(f));
        assert_eq!(nav.canonical_path(), "/a/f");
    }

    #[test]
    fn test_final_symlink_not_followed_on_request() {
        let mut tree = Tree::new();
        let a = tree.mkdir(tree.root, "a", 0o755);
        let link = tree.symlink(tree.root, "l", "/a");
        let nav = navigate(&tree.ctx(0), "/l", false).unwrap();
        assert_eq!(nav.target, Some(link));
        let nav = navigate(&tree.ctx(0), "/l", true).unwrap();
        assert_eq!(nav.target, Some(a));
        // a trailing slash always dereferences
        let nav = navigate(&tree.ctx(0), "/l/", false).unwrap();
        assert_eq!(nav.target, Some(a));
    }

    #[test]
    fn test_symlink_to_root() {
        let mut tree = Tree::new();
        tree.symlink(tree.root, "r", "/");
        let nav = navigate(&tree.ctx(0), "/r", true).unwrap();
        assert_eq!(nav.target, Some(tree.root));
        assert!(nav.path_stack.is_empty());
    }

    #[test]
    fn test_self_loop_is_eloop() {
        let mut tree = Tree::new();
        tree.symlink(tree.root, "a", "a");
        let err = navigate(&tree.ctx(0), "/a", true).unwrap_err();
        assert_eq!(err.errno(), Some(Errno::ELOOP));
    }

    #[test]
    fn test_mutual_loop_is_eloop() {
        let mut tree = Tree::new();
        tree.symlink(tree.root, "a", "/b");
        tree.symlink(tree.root, "b", "/a/x");
        let err = navigate(&tree.ctx(0), "/a", true).unwrap_err();
        assert_eq!(err.errno(), Some(Errno::ELOOP));
    }

    #[test]
    fn test_untraversable_directory_is_eacces() {
        let mut tree = Tree::new();
        let locked = tree.mkdir(tree.root, "locked", 0o700);
        tree.file(locked, "f");
        let err = navigate(&tree.ctx(1000), "/locked/f", true).unwrap_err();
        assert_eq!(err.errno(), Some(Errno::EACCES));
        assert!(navigate(&tree.ctx(0), "/locked/f", true).is_ok());
        // the directory itself is still reachable
        assert!(navigate(&tree.ctx(1000), "/locked", true).is_ok());
    }

    #[test]
    fn test_relative_to_cwd() {
        let mut tree = Tree::new();
        let a = tree.mkdir(tree.root, "a", 0o755);
        let f = tree.file(a, "f");
        tree.cwd.change_dir(&mut tree.inodes, a, vec!["a".into()]);
        let nav = navigate(&tree.ctx(0), "f", true).unwrap();
        assert_eq!(nav.target, Some(f));
        assert_eq!(nav.canonical_path(), "/a/f");
        let nav = navigate(&tree.ctx(0), "..", true).unwrap();
        assert_eq!(nav.target, Some(tree.root));
        assert_eq!(nav.canonical_path(), "/");
    }
}
