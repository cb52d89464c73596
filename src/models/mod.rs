// src/models/mod.rs

//! Data structures shared across the service.

pub mod directory;
pub mod package;

pub use directory::{Directory, RemoteFile};
pub use package::{Decl, Example, Package, PackageDoc, RequestKind, SourceFile};
