//! PBF extract decoding on top of `osmpbf`.

use std::collections::VecDeque;
use std::io::Read;

use chrono::{DateTime, Utc};
use log::debug;
use osmpbf::{BlobDecode, BlobReader, Element, PrimitiveBlock, RelMemberType};
use osmsync_core::{Bound, ElementKind, Entity, Info, Member, Node, Relation, Tags, Way};

use super::DecodeError;

/// Lazy entity iterator over a PBF stream.
///
/// Blocks are decoded one at a time; only the entities of the current block
/// are buffered.
pub struct PbfEntityReader<R: Read + Send> {
    blobs: BlobReader<R>,
    pending: VecDeque<Entity>,
    failed: bool,
}

impl<R: Read + Send> PbfEntityReader<R> {
    /// Read PBF blobs from `reader`.
    pub fn new(reader: R) -> Self {
        Self {
            blobs: BlobReader::new(reader),
            pending: VecDeque::new(),
            failed: false,
        }
    }

    fn fill(&mut self) -> Option<Result<(), DecodeError>> {
        let blob = match self.blobs.next()? {
            Ok(blob) => blob,
            Err(source) => return Some(Err(DecodeError::Pbf { source })),
        };
        let decoded = match blob.decode() {
            Ok(decoded) => decoded,
            Err(source) => return Some(Err(DecodeError::Pbf { source })),
        };
        Some(match decoded {
            BlobDecode::OsmHeader(header) => {
                if let Some(bbox) = header.bbox() {
                    match Bound::new(bbox.left, bbox.bottom, bbox.right, bbox.top) {
                        Ok(bound) => self.pending.push_back(Entity::Bound(bound)),
                        Err(source) => return Some(Err(DecodeError::Bound { source })),
                    }
                }
                Ok(())
            }
            BlobDecode::OsmData(block) => self.push_block(&block),
            BlobDecode::Unknown(kind) => {
                debug!("skipping unknown PBF blob type {kind}");
                Ok(())
            }
        })
    }

    fn push_block(&mut self, block: &PrimitiveBlock) -> Result<(), DecodeError> {
        for element in block.elements() {
            let entity = convert(element).map_err(|source| DecodeError::Pbf { source })?;
            self.pending.push_back(entity);
        }
        Ok(())
    }
}

impl<R: Read + Send> Iterator for PbfEntityReader<R> {
    type Item = Result<Entity, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(entity) = self.pending.pop_front() {
                return Some(Ok(entity));
            }
            if self.failed {
                return None;
            }
            if let Err(error) = self.fill()? {
                self.failed = true;
                self.pending.clear();
                return Some(Err(error));
            }
        }
    }
}

fn timestamp(millis: Option<i64>) -> DateTime<Utc> {
    millis
        .and_then(DateTime::from_timestamp_millis)
        .unwrap_or_default()
}

fn collect_tags<'a>(tags: impl Iterator<Item = (&'a str, &'a str)>) -> Tags {
    tags.map(|(key, value)| (key.to_owned(), value.to_owned()))
        .collect()
}

fn element_info(info: &osmpbf::Info<'_>) -> Result<Info, osmpbf::Error> {
    Ok(Info {
        version: info.version().unwrap_or_default(),
        timestamp: timestamp(info.milli_timestamp()),
        changeset: info.changeset().unwrap_or_default(),
        uid: info.uid().unwrap_or_default(),
        user: info.user().transpose()?.unwrap_or_default().to_owned(),
    })
}

fn convert(element: Element<'_>) -> Result<Entity, osmpbf::Error> {
    Ok(match element {
        Element::Node(node) => Entity::Node(Node {
            info: element_info(&node.info())?,
            tags: collect_tags(node.tags()),
            ..Node::new(node.id(), node.lon(), node.lat())
        }),
        Element::DenseNode(node) => {
            let info = match node.info() {
                Some(info) => Info {
                    version: info.version(),
                    timestamp: timestamp(Some(info.milli_timestamp())),
                    changeset: info.changeset(),
                    uid: info.uid(),
                    user: info.user()?.to_owned(),
                },
                None => Info::default(),
            };
            Entity::Node(Node {
                info,
                tags: collect_tags(node.tags()),
                ..Node::new(node.id(), node.lon(), node.lat())
            })
        }
        Element::Way(way) => Entity::Way(Way {
            info: element_info(&way.info())?,
            tags: collect_tags(way.tags()),
            ..Way::new(way.id(), way.refs().collect())
        }),
        Element::Relation(relation) => {
            let members = relation
                .members()
                .map(|member| {
                    let kind = match member.member_type {
                        RelMemberType::Node => ElementKind::Node,
                        RelMemberType::Way => ElementKind::Way,
                        RelMemberType::Relation => ElementKind::Relation,
                    };
                    Ok(Member::new(member.member_id, kind, member.role()?))
                })
                .collect::<Result<Vec<_>, osmpbf::Error>>()?;
            Entity::Relation(Relation {
                info: element_info(&relation.info())?,
                tags: collect_tags(relation.tags()),
                ..Relation::new(relation.id(), members)
            })
        }
    })
}
