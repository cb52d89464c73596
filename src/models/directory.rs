// src/models/directory.rs

//! Transient output of the source fetchers. Never persisted.

/// A file fetched from a version control service.
#[derive(Debug, Clone, Default)]
pub struct RemoteFile {
    /// File name with no directory.
    pub name: String,

    /// Contents of the file.
    pub data: Vec<u8>,

    /// Location of the file on the service website.
    pub browse_url: String,
}

/// A directory listing on a version control service, with file bodies.
#[derive(Debug, Clone, Default)]
pub struct Directory {
    /// The import path for this package.
    pub import_path: String,

    /// Import path after resolving go-import meta tags, if any.
    pub resolved_path: String,

    /// Import-path prefix for all packages in the project.
    pub project_root: String,

    /// Name of the project.
    pub project_name: String,

    /// Project home page.
    pub project_url: String,

    /// Version control system: git, hg, bzr, svn.
    pub vcs: String,

    /// Cache-validation tag. Not necessarily an HTTP entity tag; empty when
    /// the VCS offers no meaningful validation.
    pub etag: String,

    pub files: Vec<RemoteFile>,

    /// Subdirectory names, not guaranteed to contain code.
    pub subdirectories: Vec<String>,

    /// Location of the directory on the service website.
    pub browse_url: String,

    /// Format specifier for source-line links. Example: `%s#L%d`.
    pub line_fmt: String,

    /// Repository star count when the host reports one.
    pub stars: u32,

    /// True when the host reports the repository as a fork.
    pub fork: bool,
}
