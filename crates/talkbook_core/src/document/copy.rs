//! Copy, export, value equality and garbage collection.
//!
//! # Invariants
//! - Copies and exports never share media data or providers with their
//!   source; every managed payload is duplicated.
//! - Export validates every required type against the destination registry
//!   before the destination is mutated.

use super::{Document, DocumentError, DocumentResult};
use crate::data::DataError;
use crate::factory::names;
use crate::media::{Media, MediaData, MediaError};
use crate::model::{ChangeEvent, ChannelKind, ChannelsProperty, NodeId, Property, StructureProperty};
use log::info;
use std::collections::{BTreeSet, HashMap, HashSet};

/// Uids removed by one garbage collection pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GarbageReport {
    pub media_data: Vec<String>,
    pub providers: Vec<String>,
}

impl GarbageReport {
    pub fn is_empty(&self) -> bool {
        self.media_data.is_empty() && self.providers.is_empty()
    }
}

impl Document {
    /// Deep-copies `node` within this Document as a new detached node.
    ///
    /// With `deep`, children are copied recursively. With
    /// `include_properties`, properties are copied and managed media receive
    /// fresh media data and providers.
    pub fn copy_subtree(
        &mut self,
        node: NodeId,
        deep: bool,
        include_properties: bool,
    ) -> DocumentResult<NodeId> {
        self.node(node)?;
        self.ensure_creatable(names::TREE_NODE)?;
        self.copy_node(node, deep, include_properties)
    }

    fn copy_node(
        &mut self,
        node: NodeId,
        deep: bool,
        include_properties: bool,
    ) -> DocumentResult<NodeId> {
        let (properties, children) = {
            let data = self.node(node)?;
            let properties = if include_properties {
                data.properties.clone()
            } else {
                Vec::new()
            };
            let children = if deep { data.children.clone() } else { Vec::new() };
            (properties, children)
        };

        let copy = self.create_node()?;
        for property in &properties {
            let property = self.copy_property(property)?;
            self.set_property(copy, property)?;
        }
        for child in children {
            let child_copy = self.copy_node(child, deep, include_properties)?;
            self.append_child(copy, child_copy)?;
        }
        Ok(copy)
    }

    /// Unowned deep copy of a property of this Document.
    pub fn copy_property(&mut self, property: &Property) -> DocumentResult<Property> {
        if property.document() != self.id {
            return Err(DocumentError::ForeignObject);
        }
        self.ensure_creatable(property.local_name())?;
        match property {
            Property::Structure(_) => Ok(property.to_unowned()),
            Property::Channels(channels) => {
                let mut copy = ChannelsProperty::new(self.id);
                for (channel_uid, media) in channels.iter() {
                    let media = self.copy_media(media)?;
                    copy.insert_unchecked(channel_uid.to_string(), media);
                }
                Ok(Property::Channels(copy))
            }
        }
    }

    /// Deep copy of media within this Document; managed payloads are duplicated.
    pub fn copy_media(&mut self, media: &Media) -> DocumentResult<Media> {
        if !media.belongs_to(self.id) {
            return Err(DocumentError::ForeignObject);
        }
        let mut copy = media.clone();
        let mut created = Vec::new();
        let id = self.id;
        let (media_data, providers) = (&mut self.media_data, &mut self.providers);
        copy.rebind(id, &mut |uid: &str| -> DocumentResult<String> {
            let new_uid = media_data.copy(uid, providers)?;
            created.push(new_uid.clone());
            Ok(new_uid)
        })?;
        for uid in created {
            self.record(ChangeEvent::MediaDataAdded { uid });
        }
        Ok(copy)
    }

    /// Copies `node` and its subtree into `dest` as a new detached node.
    ///
    /// Channels are matched in `dest` by name and kind (an `Any` channel
    /// matches every kind) and created when missing. Media data and provider
    /// bytes are copied into `dest`'s managers.
    ///
    /// # Errors
    /// - `FactoryCannotCreateType` when `dest` lacks any type used by the
    ///   subtree.
    /// - `PcmFormatMismatch` when `dest` enforces a single PCM format the
    ///   subtree's audio does not use.
    ///
    /// Both are detected before `dest` is touched.
    pub fn export_subtree(&self, node: NodeId, dest: &mut Document) -> DocumentResult<NodeId> {
        let nodes: Vec<NodeId> = self.descendants(node)?.collect();
        let mut required = BTreeSet::new();
        required.insert(names::TREE_NODE);
        for id in &nodes {
            for property in &self.node(*id)?.properties {
                required.insert(property.local_name());
                if let Property::Channels(channels) = property {
                    required.insert(names::CHANNEL);
                    for (_, media) in channels.iter() {
                        self.collect_media_names(media, &mut required);
                        self.ensure_media_data_exportable(media, dest)?;
                    }
                }
            }
        }
        self.ensure_supported_by(dest, &required)?;

        let mut channel_map = HashMap::new();
        let exported = self.export_node(node, dest, &mut channel_map)?;
        info!(
            "event=subtree_export module=document status=ok nodes={} channels={}",
            nodes.len(),
            channel_map.len()
        );
        Ok(exported)
    }

    /// Copies media into `dest`'s factory space; the source is unchanged.
    pub fn export_media(&self, media: &Media, dest: &mut Document) -> DocumentResult<Media> {
        if !media.belongs_to(self.id) {
            return Err(DocumentError::ForeignObject);
        }
        let mut required = BTreeSet::new();
        self.collect_media_names(media, &mut required);
        self.ensure_supported_by(dest, &required)?;
        self.ensure_media_data_exportable(media, dest)?;
        self.export_media_unchecked(media, dest)
    }

    fn export_node(
        &self,
        node: NodeId,
        dest: &mut Document,
        channel_map: &mut HashMap<String, String>,
    ) -> DocumentResult<NodeId> {
        let data = self.node(node)?;
        let copy = dest.create_node()?;
        for property in &data.properties {
            let exported = match property {
                Property::Structure(structure) => {
                    Property::Structure(export_structure(structure, dest)?)
                }
                Property::Channels(channels) => {
                    let mut exported = dest.create_channels_property()?;
                    for (channel_uid, media) in channels.iter() {
                        let dest_channel = self.resolve_channel(channel_uid, dest, channel_map)?;
                        let media = self.export_media_unchecked(media, dest)?;
                        exported.insert_unchecked(dest_channel, media);
                    }
                    Property::Channels(exported)
                }
            };
            dest.set_property(copy, exported)?;
        }
        for child in &data.children {
            let child_copy = self.export_node(*child, dest, channel_map)?;
            dest.append_child(copy, child_copy)?;
        }
        Ok(copy)
    }

    fn export_media_unchecked(&self, media: &Media, dest: &mut Document) -> DocumentResult<Media> {
        let mut exported = media.clone();
        let mut created = Vec::new();
        let dest_id = dest.id;
        let (dest_media_data, dest_providers) = dest.media_stores_mut();
        exported.rebind(dest_id, &mut |uid: &str| -> DocumentResult<String> {
            let new_uid =
                self.media_data
                    .export(uid, &self.providers, dest_media_data, dest_providers)?;
            created.push(new_uid.clone());
            Ok(new_uid)
        })?;
        for uid in created {
            dest.record(ChangeEvent::MediaDataAdded { uid });
        }
        Ok(exported)
    }

    fn resolve_channel(
        &self,
        channel_uid: &str,
        dest: &mut Document,
        channel_map: &mut HashMap<String, String>,
    ) -> DocumentResult<String> {
        if let Some(mapped) = channel_map.get(channel_uid) {
            return Ok(mapped.clone());
        }
        let source = self.channel(channel_uid)?;
        let existing = dest
            .channels()
            .iter()
            .find(|channel| {
                channel.name() == source.name()
                    && (channel.kind() == source.kind() || channel.kind() == ChannelKind::Any)
            })
            .map(|channel| channel.uid().to_string());
        let resolved = match existing {
            Some(uid) => uid,
            None => {
                let uid = dest.create_channel(source.name(), source.kind())?;
                dest.channel_mut(&uid)?
                    .set_language(source.language().map(str::to_string));
                uid
            }
        };
        channel_map.insert(channel_uid.to_string(), resolved.clone());
        Ok(resolved)
    }

    fn collect_media_names(&self, media: &Media, out: &mut BTreeSet<&'static str>) {
        media.collect_local_names(out);
        for uid in media.media_data_uids() {
            if let Some(media_data) = self.media_data.get(&uid) {
                out.insert(media_data.local_name());
                out.insert(names::FILE_DATA_PROVIDER);
            }
        }
    }

    /// Media data the export would copy must exist here, and audio must fit
    /// `dest`'s format policy.
    fn ensure_media_data_exportable(&self, media: &Media, dest: &Document) -> DocumentResult<()> {
        for uid in media.media_data_uids() {
            match self.media_data.get(&uid) {
                Some(MediaData::Audio(audio)) => {
                    dest.media_data.ensure_format_allowed(audio.format())?;
                    for clip in audio.clips() {
                        self.ensure_provider_exists(clip.provider())?;
                    }
                }
                Some(MediaData::Image(image)) => self.ensure_provider_exists(image.provider())?,
                None => return Err(MediaError::MediaDataNotFound(uid).into()),
            }
        }
        Ok(())
    }

    fn ensure_provider_exists(&self, uid: &str) -> DocumentResult<()> {
        if !self.providers.contains(uid) {
            return Err(DataError::ProviderNotFound(uid.to_string()).into());
        }
        Ok(())
    }

    fn ensure_supported_by(
        &self,
        dest: &Document,
        required: &BTreeSet<&'static str>,
    ) -> DocumentResult<()> {
        for local_name in required {
            let name = self.registry.qualify(local_name);
            if !dest.registry.supports(&name) {
                return Err(DocumentError::FactoryCannotCreateType(name));
            }
        }
        Ok(())
    }

    /// Deep value equality of two subtrees, possibly in different Documents.
    ///
    /// Channels are compared by name and kind, media by content, providers
    /// by bytes. Identities (uids, node ids) are ignored.
    pub fn subtree_value_eq(
        &self,
        node: NodeId,
        other: &Document,
        other_node: NodeId,
    ) -> DocumentResult<bool> {
        let left = self.node(node)?;
        let right = other.node(other_node)?;
        if left.properties.len() != right.properties.len()
            || left.children.len() != right.children.len()
        {
            return Ok(false);
        }
        for (left_property, right_property) in left.properties.iter().zip(&right.properties) {
            if !self.property_value_eq(left_property, other, right_property)? {
                return Ok(false);
            }
        }
        for (left_child, right_child) in left.children.iter().zip(&right.children) {
            if !self.subtree_value_eq(*left_child, other, *right_child)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn property_value_eq(
        &self,
        property: &Property,
        other: &Document,
        other_property: &Property,
    ) -> DocumentResult<bool> {
        match (property, other_property) {
            (Property::Structure(left), Property::Structure(right)) => Ok(left.local_name()
                == right.local_name()
                && left.namespace() == right.namespace()
                && left.attributes().len() == right.attributes().len()
                && left.attributes().iter().all(|attribute| {
                    right.attribute(&attribute.name, &attribute.namespace)
                        == Some(attribute.value.as_str())
                })),
            (Property::Channels(left), Property::Channels(right)) => {
                if left.len() != right.len() {
                    return Ok(false);
                }
                for (channel_uid, media) in left.iter() {
                    let channel = self.channel(channel_uid)?;
                    let mut matched = None;
                    for (other_uid, other_media) in right.iter() {
                        let other_channel = other.channel(other_uid)?;
                        if other_channel.name() == channel.name()
                            && other_channel.kind() == channel.kind()
                        {
                            matched = Some(other_media);
                            break;
                        }
                    }
                    let Some(other_media) = matched else {
                        return Ok(false);
                    };
                    if !self.media_value_eq(media, other, other_media)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Content equality of two media, possibly in different Documents.
    pub fn media_value_eq(
        &self,
        media: &Media,
        other: &Document,
        other_media: &Media,
    ) -> DocumentResult<bool> {
        match (media, other_media) {
            (Media::Text(left), Media::Text(right)) => Ok(left == right),
            (Media::External(left), Media::External(right)) => Ok(left == right),
            (Media::ManagedAudio(left), Media::ManagedAudio(right)) => Ok(left.language()
                == right.language()
                && self.media_data.value_eq(
                    left.media_data(),
                    &self.providers,
                    &other.media_data,
                    &other.providers,
                    right.media_data(),
                )?),
            (Media::ManagedImage(left), Media::ManagedImage(right)) => Ok(left.width()
                == right.width()
                && left.height() == right.height()
                && left.language() == right.language()
                && self.media_data.value_eq(
                    left.media_data(),
                    &self.providers,
                    &other.media_data,
                    &other.providers,
                    right.media_data(),
                )?),
            (Media::Sequence(left), Media::Sequence(right)) => {
                if left.allow_multiple_types() != right.allow_multiple_types()
                    || left.language() != right.language()
                    || left.len() != right.len()
                {
                    return Ok(false);
                }
                for (left_item, right_item) in left.items().iter().zip(right.items()) {
                    if !self.media_value_eq(left_item, other, right_item)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Media data uids referenced by any live node, attached or detached.
    pub fn referenced_media_data(&self) -> HashSet<String> {
        let mut referenced = HashSet::new();
        for node in self.live_nodes() {
            let Ok(Some(channels)) = self.channels_property(node) else {
                continue;
            };
            for (_, media) in channels.iter() {
                referenced.extend(media.media_data_uids());
            }
        }
        referenced
    }

    /// Removes media data no live node references, then providers no
    /// remaining media data owns.
    ///
    /// # Errors
    /// - `StreamsOpen` when a doomed provider has an open stream; nothing is
    ///   removed in that case.
    pub fn collect_garbage(&mut self) -> DocumentResult<GarbageReport> {
        let referenced = self.referenced_media_data();
        let doomed_media: Vec<String> = self
            .media_data
            .uids()
            .into_iter()
            .filter(|uid| !referenced.contains(uid))
            .collect();
        let kept_providers: HashSet<String> = self
            .media_data
            .iter()
            .filter(|media_data| referenced.contains(media_data.uid()))
            .flat_map(|media_data| media_data.provider_uids())
            .collect();
        for provider in self.providers.iter() {
            if !kept_providers.contains(provider.uid()) && !provider.is_closed() {
                return Err(DataError::StreamsOpen {
                    uid: provider.uid().to_string(),
                    readers: provider.open_readers(),
                    writer: provider.has_open_writer(),
                }
                .into());
            }
        }

        for uid in &doomed_media {
            self.media_data.remove(uid);
            self.record(ChangeEvent::MediaDataRemoved { uid: uid.clone() });
        }
        let removed_providers = self.providers.remove_unreferenced(&kept_providers)?;
        for uid in &removed_providers {
            self.record(ChangeEvent::DataProviderRemoved { uid: uid.clone() });
        }
        info!(
            "event=garbage_collect module=document status=ok media_data={} providers={}",
            doomed_media.len(),
            removed_providers.len()
        );
        Ok(GarbageReport {
            media_data: doomed_media,
            providers: removed_providers,
        })
    }
}

fn export_structure(
    structure: &StructureProperty,
    dest: &Document,
) -> DocumentResult<StructureProperty> {
    let mut exported = dest.create_structure_property(structure.local_name(), structure.namespace())?;
    for attribute in structure.attributes() {
        exported.set_attribute(&attribute.name, &attribute.namespace, attribute.value.clone())?;
    }
    Ok(exported)
}

#[cfg(test)]
mod tests {
    use crate::document::Document;
    use crate::media::{Media, PcmFormat};
    use crate::model::ChannelKind;

    fn document() -> (tempfile::TempDir, Document) {
        let dir = tempfile::tempdir().unwrap();
        let document = Document::new(dir.path()).unwrap();
        (dir, document)
    }

    #[test]
    fn copy_media_duplicates_managed_audio() {
        let (_dir, mut doc) = document();
        let uid = doc
            .create_audio_media_data(Some(PcmFormat::new(1, 8_000, 8).unwrap()))
            .unwrap();
        doc.append_audio(&uid, &[1, 2, 3, 4]).unwrap();
        let media = doc.create_managed_audio(&uid).unwrap();

        let copy = doc.copy_media(&media).unwrap();
        let Media::ManagedAudio(copied) = &copy else {
            panic!("copy must stay managed audio");
        };
        assert_ne!(copied.media_data(), uid);
        assert!(doc.media_value_eq(&media, &doc, &copy).unwrap());
        assert_eq!(doc.media_data().len(), 2);
    }

    #[test]
    fn garbage_collection_keeps_referenced_media() {
        let (_dir, mut doc) = document();
        let root = doc.create_node().unwrap();
        doc.set_root(root).unwrap();
        let channel = doc.create_channel("image", ChannelKind::Image).unwrap();
        let kept = doc.create_image_media_data("image/png", b"keep").unwrap();
        let dropped = doc.create_image_media_data("image/png", b"drop").unwrap();
        let media = doc.create_managed_image(&kept).unwrap();
        doc.set_media(root, &channel, media).unwrap();

        let report = doc.collect_garbage().unwrap();
        assert_eq!(report.media_data, vec![dropped]);
        assert_eq!(report.providers.len(), 1);
        assert!(doc.media_data().contains(&kept));
        assert_eq!(doc.providers().len(), 1);
        assert!(doc.collect_garbage().unwrap().is_empty());
    }
}
