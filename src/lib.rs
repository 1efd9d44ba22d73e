// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Unpack, archive, and push project bundles as they arrive.
//!
//! Bundlesync watches a single directory for newly created bundles, i.e.,
//! compressed archives of a generated project tree. Each bundle is unpacked
//! in place, moved into a versioned archive store, and the resulting tree is
//! committed and force-pushed to a remote repository.
//!
//! # Preserved Files
//!
//! Some files in the watched directory belong to the operator rather than the
//! bundle, e.g., secrets or the Git directory itself. These are never
//! overwritten by extraction. See [`extract::PreserveList`].
//!
//! # Versioning
//!
//! Every bundle that makes it into the archive store receives the next
//! version number. The archive store is the only durable record of versions,
//! so restarting bundlesync picks up right where it left off. See
//! [`version::VersionTracker`].

pub mod archive;
pub mod config;
pub mod extract;
pub mod ingest;
pub mod path;
pub mod report;
pub mod sync;
pub mod version;
pub mod watch;
pub mod workspace;
