//! OSM XML extracts and osmChange files.
//!
//! Both formats share the `<node>`, `<way>` and `<relation>` element grammar;
//! osmChange wraps them in `<create>`, `<modify>` and `<delete>` blocks.

use std::collections::HashMap;
use std::io::BufRead;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use log::debug;
use osmsync_core::{
    Bound, Change, ChangeAction, ElementKind, Entity, Info, Member, Node, Relation, Way,
};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use super::DecodeError;

type Attributes = HashMap<String, String>;

fn attributes(start: &BytesStart<'_>) -> Result<Attributes, DecodeError> {
    let mut attributes = Attributes::new();
    for attribute in start.attributes() {
        let attribute = attribute.map_err(quick_xml::Error::from)?;
        let key = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
        let value = attribute.unescape_value()?.into_owned();
        attributes.insert(key, value);
    }
    Ok(attributes)
}

fn invalid(element: &str, message: impl Into<String>) -> DecodeError {
    DecodeError::InvalidElement {
        element: element.to_owned(),
        message: message.into(),
    }
}

fn required<T: FromStr>(
    attributes: &Attributes,
    element: &str,
    key: &str,
) -> Result<T, DecodeError> {
    optional(attributes, element, key)?
        .ok_or_else(|| invalid(element, format!("missing `{key}` attribute")))
}

fn optional<T: FromStr>(
    attributes: &Attributes,
    element: &str,
    key: &str,
) -> Result<Option<T>, DecodeError> {
    attributes
        .get(key)
        .map(|value| {
            value
                .parse()
                .map_err(|_| invalid(element, format!("invalid `{key}` value {value:?}")))
        })
        .transpose()
}

fn element_info(attributes: &Attributes, element: &str) -> Result<Info, DecodeError> {
    let timestamp = attributes
        .get("timestamp")
        .map(|value| {
            DateTime::parse_from_rfc3339(value)
                .map(|parsed| parsed.with_timezone(&Utc))
                .map_err(|_| invalid(element, format!("invalid `timestamp` value {value:?}")))
        })
        .transpose()?
        .unwrap_or_default();
    Ok(Info {
        version: optional(attributes, element, "version")?.unwrap_or_default(),
        timestamp,
        changeset: optional(attributes, element, "changeset")?.unwrap_or_default(),
        uid: optional(attributes, element, "uid")?.unwrap_or_default(),
        user: attributes.get("user").cloned().unwrap_or_default(),
    })
}

fn parse_kind(element: &str, value: &str) -> Result<ElementKind, DecodeError> {
    match value {
        "node" => Ok(ElementKind::Node),
        "way" => Ok(ElementKind::Way),
        "relation" => Ok(ElementKind::Relation),
        other => Err(invalid(element, format!("unknown member type {other:?}"))),
    }
}

/// Element under construction while its children are read.
#[derive(Debug)]
enum Pending {
    Node(Node),
    Way(Way),
    Relation(Relation),
}

impl Pending {
    /// Start an element from its opening tag. Coordinates may be absent on
    /// deleted nodes.
    fn open(
        name: &str,
        start: &BytesStart<'_>,
        coordinates_required: bool,
    ) -> Result<Option<Self>, DecodeError> {
        let attributes = attributes(start)?;
        let pending = match name {
            "node" => {
                let (lon, lat) = if coordinates_required {
                    (
                        required(&attributes, name, "lon")?,
                        required(&attributes, name, "lat")?,
                    )
                } else {
                    (
                        optional(&attributes, name, "lon")?.unwrap_or_default(),
                        optional(&attributes, name, "lat")?.unwrap_or_default(),
                    )
                };
                let id = required(&attributes, name, "id")?;
                Self::Node(Node::new(id, lon, lat).with_info(element_info(&attributes, name)?))
            }
            "way" => {
                let id = required(&attributes, name, "id")?;
                Self::Way(Way::new(id, Vec::new()).with_info(element_info(&attributes, name)?))
            }
            "relation" => {
                let id = required(&attributes, name, "id")?;
                Self::Relation(
                    Relation::new(id, Vec::new()).with_info(element_info(&attributes, name)?),
                )
            }
            _ => return Ok(None),
        };
        Ok(Some(pending))
    }

    fn child(&mut self, name: &str, start: &BytesStart<'_>) -> Result<(), DecodeError> {
        match (self, name) {
            (Self::Node(Node { tags, .. }), "tag")
            | (Self::Way(Way { tags, .. }), "tag")
            | (Self::Relation(Relation { tags, .. }), "tag") => {
                let attributes = attributes(start)?;
                let key: String = required(&attributes, name, "k")?;
                let value = attributes.get("v").cloned().unwrap_or_default();
                tags.insert(key, value);
            }
            (Self::Way(way), "nd") => {
                way.nodes.push(required(&attributes(start)?, name, "ref")?);
            }
            (Self::Relation(relation), "member") => {
                let attributes = attributes(start)?;
                let kind_name: String = required(&attributes, name, "type")?;
                relation.members.push(Member::new(
                    required(&attributes, name, "ref")?,
                    parse_kind(name, &kind_name)?,
                    attributes.get("role").cloned().unwrap_or_default(),
                ));
            }
            (_, other) => debug!("ignoring <{other}> child element"),
        }
        Ok(())
    }

    fn into_entity(self) -> Entity {
        match self {
            Self::Node(node) => node.into(),
            Self::Way(way) => way.into(),
            Self::Relation(relation) => relation.into(),
        }
    }
}

/// Something the event loop produced.
enum Parsed {
    Entity(Entity),
    Action(ChangeAction),
}

/// Pull parser shared by both readers.
struct ElementParser<R: BufRead> {
    reader: Reader<R>,
    buf: Vec<u8>,
    pending: Option<Pending>,
    finished: bool,
    lenient_coordinates: bool,
}

impl<R: BufRead> ElementParser<R> {
    fn new(reader: R) -> Self {
        Self {
            reader: Reader::from_reader(reader),
            buf: Vec::new(),
            pending: None,
            finished: false,
            lenient_coordinates: false,
        }
    }

    fn next_parsed(&mut self) -> Option<Result<Parsed, DecodeError>> {
        if self.finished {
            return None;
        }
        let parsed = self.advance();
        match &parsed {
            Err(_) | Ok(None) => self.finished = true,
            Ok(Some(_)) => {}
        }
        parsed.transpose()
    }

    fn advance(&mut self) -> Result<Option<Parsed>, DecodeError> {
        loop {
            self.buf.clear();
            let event = self.reader.read_event_into(&mut self.buf)?;
            match event {
                Event::Start(start) => {
                    let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
                    let parsed =
                        open(&mut self.pending, self.lenient_coordinates, &name, &start, false)?;
                    if let Some(parsed) = parsed {
                        return Ok(Some(parsed));
                    }
                }
                Event::Empty(start) => {
                    let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
                    let parsed =
                        open(&mut self.pending, self.lenient_coordinates, &name, &start, true)?;
                    if let Some(parsed) = parsed {
                        return Ok(Some(parsed));
                    }
                }
                Event::End(end) => match end.local_name().as_ref() {
                    b"node" | b"way" | b"relation" => {
                        if let Some(pending) = self.pending.take() {
                            return Ok(Some(Parsed::Entity(pending.into_entity())));
                        }
                    }
                    _ => {}
                },
                Event::Eof => {
                    if self.pending.is_some() {
                        return Err(invalid("osm", "document ended inside an element"));
                    }
                    return Ok(None);
                }
                _ => {}
            }
        }
    }
}

/// Route an opening tag either into the pending element or to a new record.
fn open(
    pending: &mut Option<Pending>,
    lenient_coordinates: bool,
    name: &str,
    start: &BytesStart<'_>,
    empty: bool,
) -> Result<Option<Parsed>, DecodeError> {
    if let Some(element) = pending.as_mut() {
        element.child(name, start)?;
        return Ok(None);
    }
    let action = match name {
        "create" => Some(ChangeAction::Create),
        "modify" => Some(ChangeAction::Modify),
        "delete" => Some(ChangeAction::Delete),
        _ => None,
    };
    if let Some(action) = action {
        return Ok((!empty).then_some(Parsed::Action(action)));
    }
    if name == "bounds" {
        return bound(start).map(|bound| Some(Parsed::Entity(Entity::Bound(bound))));
    }
    match Pending::open(name, start, !lenient_coordinates)? {
        Some(element) if empty => Ok(Some(Parsed::Entity(element.into_entity()))),
        Some(element) => {
            *pending = Some(element);
            Ok(None)
        }
        None => {
            debug!("ignoring <{name}> element");
            Ok(None)
        }
    }
}

fn bound(start: &BytesStart<'_>) -> Result<Bound, DecodeError> {
    let attributes = attributes(start)?;
    Bound::new(
        required(&attributes, "bounds", "minlon")?,
        required(&attributes, "bounds", "minlat")?,
        required(&attributes, "bounds", "maxlon")?,
        required(&attributes, "bounds", "maxlat")?,
    )
    .map_err(|source| DecodeError::Bound { source })
}

/// Lazy entity iterator over an `<osm>` XML document.
pub struct OsmXmlReader<R: BufRead> {
    parser: ElementParser<R>,
}

impl<R: BufRead> OsmXmlReader<R> {
    /// Parse the document read from `reader`.
    pub fn new(reader: R) -> Self {
        Self {
            parser: ElementParser::new(reader),
        }
    }
}

impl<R: BufRead> Iterator for OsmXmlReader<R> {
    type Item = Result<Entity, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.parser.next_parsed()? {
            Ok(Parsed::Entity(entity)) => Some(Ok(entity)),
            Ok(Parsed::Action(action)) => {
                self.parser.finished = true;
                Some(Err(invalid(
                    "osm",
                    format!("unexpected <{action}> block in an extract"),
                )))
            }
            Err(error) => Some(Err(error)),
        }
    }
}

/// Lazy change iterator over an `<osmChange>` document.
pub struct OsmChangeReader<R: BufRead> {
    parser: ElementParser<R>,
    action: Option<ChangeAction>,
}

impl<R: BufRead> OsmChangeReader<R> {
    /// Parse the change document read from `reader`.
    pub fn new(reader: R) -> Self {
        Self {
            parser: ElementParser::new(reader),
            action: None,
        }
    }
}

impl<R: BufRead> Iterator for OsmChangeReader<R> {
    type Item = Result<Change, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.parser.next_parsed()? {
                Ok(Parsed::Action(action)) => {
                    self.action = Some(action);
                    self.parser.lenient_coordinates = action == ChangeAction::Delete;
                }
                Ok(Parsed::Entity(Entity::Bound(_))) => {
                    debug!("ignoring <bounds> inside a change file");
                }
                Ok(Parsed::Entity(entity)) => {
                    let Some(action) = self.action else {
                        self.parser.finished = true;
                        return Some(Err(invalid(
                            "osmChange",
                            format!("{} outside of an action block", entity.kind()),
                        )));
                    };
                    return Some(Ok(Change::new(action, entity)));
                }
                Err(error) => return Some(Err(error)),
            }
        }
    }
}
