//! # vmount-types
//!
//! Plain data shared by every vmount crate:
//!
//! - [`VfsPath`] / [`VirtualFile`]: identity of a node in a virtual hierarchy,
//!   including nodes nested inside archives (`app.ear/web.war/WEB-INF/lib/x.jar`).
//! - [`MountOption`] / [`MountOptions`]: how a mount is materialized.
//! - [`MountOwner`]: who holds a mount alive.
//!
//! Nothing here knows how to mount anything. That lives in `vmount-kernel`.

mod error;
mod file;
mod options;
mod owner;
mod path;

pub use error::{TypesError, TypesResult};
pub use file::{Ancestors, VirtualFile};
pub use options::{MountOption, MountOptions};
pub use owner::{MountOwner, ObjectOwner};
pub use path::VfsPath;
