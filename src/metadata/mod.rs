//! IdP metadata decoding.
//!
//! A metadata document is either a single `<EntityDescriptor>` or an
//! `<EntitiesDescriptor>` aggregate (the shape most federations and some
//! IdPs publish). [`parse_idp_metadata`] accepts both and always yields one
//! IdP entity.
//!
//! The root element is sniffed with a streaming reader before handing the
//! XML to samael, so the aggregate fallback is driven by
//! [`MetadataError::UnexpectedRoot`] rather than by inspecting decoder
//! messages.

mod error;

pub use error::{MetadataError, RootElement};
use quick_xml::{
    Reader,
    events::{BytesStart, Event},
};
use samael::metadata::EntityDescriptor;

/// Decode an IdP metadata document into the entity to trust.
///
/// A single `<EntityDescriptor>` is returned as-is. For an
/// `<EntitiesDescriptor>` the first member (in document order) carrying an
/// `<IDPSSODescriptor>` is returned. Any other failure is returned untouched.
pub fn parse_idp_metadata(metadata: &[u8]) -> Result<EntityDescriptor, MetadataError> {
    let xml = std::str::from_utf8(metadata)?;
    let xml = xml.trim_start_matches('\u{feff}');

    let entity = match decode_entity_descriptor(xml) {
        Ok(entity) => entity,
        Err(MetadataError::UnexpectedRoot {
            found: RootElement::EntitiesDescriptor,
            ..
        }) => {
            let members = decode_entities_descriptor(xml)?;
            tracing::debug!(
                members = members.len(),
                "Metadata is an EntitiesDescriptor, selecting first IdP entity"
            );
            members
                .into_iter()
                .find(has_idp_sso_descriptor)
                .ok_or(MetadataError::NoIdpEntity)?
        }
        Err(e) => return Err(e),
    };

    if entity_id(&entity).is_none() {
        return Err(MetadataError::MissingEntityId);
    }

    Ok(entity)
}

/// Decode a document whose root must be `<EntityDescriptor>`.
pub fn decode_entity_descriptor(xml: &str) -> Result<EntityDescriptor, MetadataError> {
    let root = open_root(xml)?;
    if root.element != RootElement::EntityDescriptor {
        return Err(MetadataError::UnexpectedRoot {
            expected: RootElement::EntityDescriptor,
            found: root.element,
        });
    }
    decode_fragment(xml)
}

/// Decode the direct `<EntityDescriptor>` children of an
/// `<EntitiesDescriptor>` document, in document order.
///
/// Nested aggregates, `<Extensions>` and signatures are skipped. Namespaces
/// declared on the root are carried over to every member, so aggregates that
/// only bind `md:` once at the top decode the same as self-contained ones.
pub fn decode_entities_descriptor(xml: &str) -> Result<Vec<EntityDescriptor>, MetadataError> {
    let Root {
        mut reader,
        element,
        self_closing,
        namespaces,
    } = open_root(xml)?;
    if element != RootElement::EntitiesDescriptor {
        return Err(MetadataError::UnexpectedRoot {
            expected: RootElement::EntitiesDescriptor,
            found: element,
        });
    }

    let mut members = Vec::new();
    if self_closing {
        return Ok(members);
    }

    loop {
        let start = position(&reader);
        match reader.read_event()? {
            Event::Start(e) => {
                let is_member = e.local_name().as_ref() == b"EntityDescriptor";
                reader.read_to_end(e.name())?;
                if is_member {
                    let end = position(&reader);
                    let fragment = with_namespaces(&xml[start..end], &e, &namespaces)?;
                    members.push(decode_fragment(&fragment)?);
                }
            }
            Event::Empty(e) if e.local_name().as_ref() == b"EntityDescriptor" => {
                let end = position(&reader);
                let fragment = with_namespaces(&xml[start..end], &e, &namespaces)?;
                members.push(decode_fragment(&fragment)?);
            }
            // Only the root can close here; members are consumed whole above
            Event::End(_) => break,
            Event::Eof => return Err(MetadataError::Truncated(element)),
            _ => {}
        }
    }

    Ok(members)
}

/// The entity's identifier, if present and non-empty.
pub fn entity_id(entity: &EntityDescriptor) -> Option<&str> {
    entity.entity_id.as_deref().filter(|id| !id.is_empty())
}

/// Whether the entity advertises at least one `<IDPSSODescriptor>`.
pub fn has_idp_sso_descriptor(entity: &EntityDescriptor) -> bool {
    entity
        .idp_sso_descriptors
        .as_ref()
        .is_some_and(|descriptors| !descriptors.is_empty())
}

/// Root element of a document and the reader positioned just past its start
/// tag.
struct Root<'a> {
    reader: Reader<&'a [u8]>,
    element: RootElement,
    self_closing: bool,
    /// `xmlns` / `xmlns:*` attributes of the root, as written.
    namespaces: Vec<(String, String)>,
}

/// Advance past the prolog to the root start tag.
fn open_root(xml: &str) -> Result<Root<'_>, MetadataError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    loop {
        let (start, self_closing) = match reader.read_event()? {
            Event::Start(e) => (e, false),
            Event::Empty(e) => (e, true),
            Event::Eof => return Err(MetadataError::Empty),
            _ => continue,
        };
        return Ok(Root {
            element: RootElement::from_local_name(start.local_name().as_ref()),
            self_closing,
            namespaces: namespace_declarations(&start)?,
            reader,
        });
    }
}

fn namespace_declarations(
    element: &BytesStart<'_>,
) -> Result<Vec<(String, String)>, MetadataError> {
    let mut declarations = Vec::new();
    for attr in element.attributes() {
        let attr = attr.map_err(quick_xml::Error::from)?;
        let key = attr.key.as_ref();
        if key == b"xmlns" || key.starts_with(b"xmlns:") {
            declarations.push((
                String::from_utf8_lossy(key).into_owned(),
                String::from_utf8_lossy(&attr.value).into_owned(),
            ));
        }
    }
    Ok(declarations)
}

/// Copy the inherited namespace declarations onto the start tag of a member
/// sliced out of an aggregate. Declarations the member makes itself win.
fn with_namespaces(
    fragment: &str,
    member: &BytesStart<'_>,
    inherited: &[(String, String)],
) -> Result<String, MetadataError> {
    let fragment = fragment.trim();
    let own = namespace_declarations(member)?;
    let missing: Vec<_> = inherited
        .iter()
        .filter(|(name, _)| !own.iter().any(|(own_name, _)| own_name == name))
        .collect();
    if missing.is_empty() {
        return Ok(fragment.to_owned());
    }

    // Fragment starts with `<` followed by the member's qualified name
    let split = 1 + member.name().as_ref().len();
    let mut out = String::with_capacity(fragment.len() + 64 * missing.len());
    out.push_str(&fragment[..split]);
    for (name, value) in missing {
        out.push_str(&format!(" {name}=\"{}\"", value.replace('"', "&quot;")));
    }
    out.push_str(&fragment[split..]);
    Ok(out)
}

fn decode_fragment(fragment: &str) -> Result<EntityDescriptor, MetadataError> {
    samael::metadata::de::from_str(fragment.trim())
        .map_err(|e| MetadataError::Decode(e.to_string()))
}

fn position(reader: &Reader<&[u8]>) -> usize {
    // Offsets into an in-memory &str always fit in usize
    usize::try_from(reader.buffer_position()).unwrap_or(usize::MAX)
}
