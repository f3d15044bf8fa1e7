//! Album target passed through to the upload operation

use serde::{Deserialize, Serialize};
use std::fmt;

/// Where uploaded media should end up on the remote side
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlbumTarget {
    /// Library only, no album
    #[default]
    None,
    /// Existing album, by remote identifier
    Id(String),
    /// Album by display name (created remotely if missing)
    Name(String),
}

impl AlbumTarget {
    /// Build a target from the optional id/name pair given on the command line
    ///
    /// An id wins over a name.
    pub fn from_options(id: Option<String>, name: Option<String>) -> Self {
        match (id, name) {
            (Some(id), _) if !id.is_empty() => AlbumTarget::Id(id),
            (_, Some(name)) if !name.is_empty() => AlbumTarget::Name(name),
            _ => AlbumTarget::None,
        }
    }
}

impl fmt::Display for AlbumTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlbumTarget::None => f.write_str("library"),
            AlbumTarget::Id(id) => write!(f, "album id {}", id),
            AlbumTarget::Name(name) => write!(f, "album '{}'", name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_options() {
        assert_eq!(AlbumTarget::from_options(None, None), AlbumTarget::None);
        assert_eq!(
            AlbumTarget::from_options(Some("abc".into()), Some("Trip".into())),
            AlbumTarget::Id("abc".into())
        );
        assert_eq!(
            AlbumTarget::from_options(Some(String::new()), Some("Trip".into())),
            AlbumTarget::Name("Trip".into())
        );
    }
}
