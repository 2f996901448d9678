use std::fmt;

/// Local name of the root element of a metadata document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RootElement {
    /// `<EntityDescriptor>`: a single entity.
    EntityDescriptor,
    /// `<EntitiesDescriptor>`: a collection of entities.
    EntitiesDescriptor,
    /// Anything else.
    Other(String),
}

impl RootElement {
    pub(crate) fn from_local_name(name: &[u8]) -> Self {
        match name {
            b"EntityDescriptor" => Self::EntityDescriptor,
            b"EntitiesDescriptor" => Self::EntitiesDescriptor,
            other => Self::Other(String::from_utf8_lossy(other).into_owned()),
        }
    }
}

impl fmt::Display for RootElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EntityDescriptor => f.write_str("<EntityDescriptor>"),
            Self::EntitiesDescriptor => f.write_str("<EntitiesDescriptor>"),
            Self::Other(name) => write!(f, "<{name}>"),
        }
    }
}

/// Errors decoding an IdP metadata document.
///
/// None of these are worth retrying: a malformed document stays malformed.
#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    #[error("metadata is not valid UTF-8: {0}")]
    Encoding(#[from] std::str::Utf8Error),

    #[error("malformed metadata XML: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("metadata document has no root element")]
    Empty,

    #[error("expected element type {expected} but have {found}")]
    UnexpectedRoot {
        expected: RootElement,
        found: RootElement,
    },

    #[error("metadata document ends before {0} is closed")]
    Truncated(RootElement),

    #[error("failed to decode EntityDescriptor: {0}")]
    Decode(String),

    #[error("no entity found with IDPSSODescriptor")]
    NoIdpEntity,

    #[error("IdP EntityDescriptor has no entityID")]
    MissingEntityId,
}
