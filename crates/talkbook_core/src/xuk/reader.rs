//! XUK markup reader.

use super::{tags, XukConfig, XukError, XukResult};
use crate::data::DataProviderManager;
use crate::document::Document;
use crate::factory::{names, TypeRegistry};
use crate::media::{
    ExternalKind, ImageMediaData, Media, MediaData, PcmFormat, Time, WavAudioMediaData, WavClip,
};
use crate::model::{ChannelKind, NodeId};
use crate::project::Project;
use log::trace;
use roxmltree::Node;
use std::path::Path;
use std::str::FromStr;
use url::Url;

struct Reader<'a> {
    namespace: &'a str,
    xuk_dir: &'a Path,
    config: &'a XukConfig,
}

/// Parses XUK markup of a file located in `xuk_dir`.
pub(crate) fn read_project(text: &str, xuk_dir: &Path, config: &XukConfig) -> XukResult<Project> {
    let xml = roxmltree::Document::parse(text)?;
    let reader = Reader {
        namespace: &config.namespace,
        xuk_dir,
        config,
    };
    let root = xml.root_element();
    if !reader.is(root, tags::XUK) {
        return Err(XukError::UnexpectedRoot(format!(
            "{{{}}}{}",
            root.tag_name().namespace().unwrap_or_default(),
            root.tag_name().name()
        )));
    }
    let project_element = reader.required_child(root, tags::PROJECT)?;
    reader.read_project_element(project_element)
}

impl Reader<'_> {
    fn is(&self, node: Node<'_, '_>, local_name: &str) -> bool {
        node.is_element()
            && node.tag_name().name() == local_name
            && node.tag_name().namespace() == Some(self.namespace)
    }

    /// Element children in the configured namespace; others are skipped.
    fn elements<'b, 'input>(&self, node: Node<'b, 'input>) -> Vec<Node<'b, 'input>> {
        node.children()
            .filter(|child| {
                if !child.is_element() {
                    return false;
                }
                let in_namespace = child.tag_name().namespace() == Some(self.namespace);
                if !in_namespace {
                    trace!(
                        "event=xuk_skip module=xuk status=ok element={} reason=foreign_namespace",
                        child.tag_name().name()
                    );
                }
                in_namespace
            })
            .collect()
    }

    fn child<'b, 'input>(&self, node: Node<'b, 'input>, local_name: &str) -> Option<Node<'b, 'input>> {
        self.elements(node)
            .into_iter()
            .find(|child| child.tag_name().name() == local_name)
    }

    fn required_child<'b, 'input>(
        &self,
        node: Node<'b, 'input>,
        local_name: &'static str,
    ) -> XukResult<Node<'b, 'input>> {
        self.child(node, local_name)
            .ok_or_else(|| XukError::MissingChild {
                element: node.tag_name().name().to_string(),
                child: local_name,
            })
    }

    fn read_project_element(&self, element: Node<'_, '_>) -> XukResult<Project> {
        let mut project = Project::new();
        if let Some(metadata) = self.child(element, tags::METADATA) {
            for (name, content) in self.read_metadata(metadata)? {
                project.add_metadata(&name, &content);
            }
        }
        if let Some(presentations) = self.child(element, tags::PRESENTATIONS) {
            for presentation in self.elements(presentations) {
                if presentation.tag_name().name() != tags::PRESENTATION {
                    skip_unknown(presentation);
                    continue;
                }
                project.add_document(self.read_presentation(presentation)?);
            }
        }
        Ok(project)
    }

    fn read_metadata(&self, element: Node<'_, '_>) -> XukResult<Vec<(String, String)>> {
        let mut entries = Vec::new();
        for meta in self.elements(element) {
            if meta.tag_name().name() != tags::META {
                skip_unknown(meta);
                continue;
            }
            entries.push((
                required_attr(meta, "name")?.to_string(),
                meta.attribute("content").unwrap_or_default().to_string(),
            ));
        }
        Ok(entries)
    }

    fn read_presentation(&self, element: Node<'_, '_>) -> XukResult<Document> {
        let dir_url = Url::from_directory_path(self.xuk_dir).map_err(|_| XukError::InvalidValue {
            element: tags::PRESENTATION.to_string(),
            attribute: "baseUri",
            value: self.xuk_dir.display().to_string(),
        })?;
        let base_uri = match element.attribute("baseUri") {
            Some(value) => dir_url.join(value).map_err(|_| XukError::InvalidValue {
                element: tags::PRESENTATION.to_string(),
                attribute: "baseUri",
                value: value.to_string(),
            })?,
            None => dir_url,
        };

        let providers_element = self.child(element, tags::DATA_PROVIDER_MANAGER);
        let data_dir = match providers_element {
            Some(providers) => self.xuk_dir.join(required_attr(providers, "dataDirectory")?),
            None => self.xuk_dir.join(&self.config.data_dir_name),
        };
        let mut document = Document::from_parts(
            TypeRegistry::with_builtin_types(self.namespace),
            DataProviderManager::new(data_dir),
            Some(base_uri),
        );

        if let Some(metadata) = self.child(element, tags::METADATA) {
            for (name, content) in self.read_metadata(metadata)? {
                document.add_metadata(&name, &content);
            }
        }
        if let Some(channels) = self.child(element, tags::CHANNELS_MANAGER) {
            self.read_channels(channels, &mut document)?;
        }
        if let Some(providers) = providers_element {
            self.read_providers(providers, &mut document)?;
        }
        if let Some(media_data) = self.child(element, tags::MEDIA_DATA_MANAGER) {
            self.read_media_data(media_data, &mut document)?;
        }
        let root_node = self.required_child(element, tags::ROOT_NODE)?;
        if let Some(tree_node) = self.child(root_node, names::TREE_NODE) {
            let root = self.read_tree_node(tree_node, &mut document)?;
            document.set_root(root)?;
        }
        document.drain_changes();
        Ok(document)
    }

    fn read_channels(&self, element: Node<'_, '_>, document: &mut Document) -> XukResult<()> {
        for channel in self.elements(element) {
            if channel.tag_name().name() != names::CHANNEL {
                skip_unknown(channel);
                continue;
            }
            document.ensure_creatable(names::CHANNEL)?;
            let uid = required_attr(channel, "uid")?;
            let name = channel.attribute("name").unwrap_or_default();
            let kind = parse_attr::<ChannelKind>(channel, "kind")?.unwrap_or(ChannelKind::Any);
            let language = channel.attribute("language").map(str::to_string);
            if !document
                .channels_mut()
                .register_existing(uid, name, language, kind)
            {
                return Err(invalid(channel, "uid", uid));
            }
        }
        Ok(())
    }

    fn read_providers(&self, element: Node<'_, '_>, document: &mut Document) -> XukResult<()> {
        for provider in self.elements(element) {
            if provider.tag_name().name() != names::FILE_DATA_PROVIDER {
                skip_unknown(provider);
                continue;
            }
            document.ensure_creatable(names::FILE_DATA_PROVIDER)?;
            document.providers_mut().register_existing(
                required_attr(provider, "uid")?,
                required_attr(provider, "mimeType")?,
                required_attr(provider, "dataFile")?,
            )?;
        }
        Ok(())
    }

    fn read_media_data(&self, element: Node<'_, '_>, document: &mut Document) -> XukResult<()> {
        if let Some(default_format) = self.child(element, tags::DEFAULT_PCM_FORMAT) {
            let format = self.read_pcm_format(self.required_child(default_format, tags::PCM_FORMAT)?)?;
            document.media_data_mut().set_default_pcm_format(format)?;
        }

        for media_data in self.elements(element) {
            let parsed = match media_data.tag_name().name() {
                names::WAV_AUDIO_MEDIA_DATA => {
                    document.ensure_creatable(names::WAV_AUDIO_MEDIA_DATA)?;
                    let format =
                        self.read_pcm_format(self.required_child(media_data, tags::PCM_FORMAT)?)?;
                    let mut audio =
                        WavAudioMediaData::new(required_attr(media_data, "uid")?.to_string(), format);
                    if let Some(clips) = self.child(media_data, tags::WAV_CLIPS) {
                        for clip in self.elements(clips) {
                            if clip.tag_name().name() != tags::WAV_CLIP {
                                skip_unknown(clip);
                                continue;
                            }
                            let provider = required_attr(clip, "dataProvider")?;
                            require_provider(document, provider)?;
                            let clip_begin = parse_attr::<i64>(clip, "clipBegin")?.unwrap_or(0);
                            let clip_end = parse_attr::<i64>(clip, "clipEnd")?;
                            audio.push_clip(WavClip::new(
                                provider,
                                Time::from_ticks(clip_begin),
                                clip_end.map(Time::from_ticks),
                            ));
                        }
                    }
                    audio.validate_clips(document.providers())?;
                    MediaData::Audio(audio)
                }
                names::IMAGE_MEDIA_DATA => {
                    document.ensure_creatable(names::IMAGE_MEDIA_DATA)?;
                    let provider = required_attr(media_data, "dataProvider")?;
                    require_provider(document, provider)?;
                    MediaData::Image(ImageMediaData::new(
                        required_attr(media_data, "uid")?.to_string(),
                        provider.to_string(),
                    ))
                }
                tags::DEFAULT_PCM_FORMAT => continue,
                _ => {
                    skip_unknown(media_data);
                    continue;
                }
            };
            document.media_data_mut().insert(parsed)?;
        }

        let enforce = parse_attr::<bool>(element, "enforceSinglePCMFormat")?.unwrap_or(false);
        document.media_data_mut().set_enforce_single_pcm_format(enforce)?;
        Ok(())
    }

    fn read_pcm_format(&self, element: Node<'_, '_>) -> XukResult<PcmFormat> {
        let channels = required_parsed::<u16>(element, "channels")?;
        let sample_rate = required_parsed::<u32>(element, "sampleRate")?;
        let bit_depth = required_parsed::<u16>(element, "bitDepth")?;
        PcmFormat::new(channels, sample_rate, bit_depth).map_err(|_| {
            invalid(
                element,
                "bitDepth",
                &format!("{channels}ch/{sample_rate}Hz/{bit_depth}bit"),
            )
        })
    }

    fn read_tree_node(&self, element: Node<'_, '_>, document: &mut Document) -> XukResult<NodeId> {
        let node = document.create_node()?;
        let properties = self.required_child(element, tags::PROPERTIES)?;
        for property in self.elements(properties) {
            match property.tag_name().name() {
                names::CHANNELS_PROPERTY => self.read_channels_property(property, node, document)?,
                names::STRUCTURE_PROPERTY => {
                    let mut structure = document.create_structure_property(
                        required_attr(property, "localName")?,
                        property.attribute("namespace").unwrap_or_default(),
                    )?;
                    if let Some(attributes) = self.child(property, tags::ATTRIBUTES) {
                        for attribute in self.elements(attributes) {
                            if attribute.tag_name().name() != tags::ATTRIBUTE {
                                skip_unknown(attribute);
                                continue;
                            }
                            structure.set_attribute(
                                required_attr(attribute, "name")?,
                                attribute.attribute("namespace").unwrap_or_default(),
                                attribute.attribute("value").unwrap_or_default(),
                            )?;
                        }
                    }
                    document.set_property(node, structure)?;
                }
                _ => skip_unknown(property),
            }
        }

        let children = self.required_child(element, tags::CHILDREN)?;
        for child in self.elements(children) {
            if child.tag_name().name() != names::TREE_NODE {
                skip_unknown(child);
                continue;
            }
            let child_node = self.read_tree_node(child, document)?;
            document.append_child(node, child_node)?;
        }
        Ok(node)
    }

    fn read_channels_property(
        &self,
        element: Node<'_, '_>,
        node: NodeId,
        document: &mut Document,
    ) -> XukResult<()> {
        let mut property = document.create_channels_property()?;
        if let Some(mappings) = self.child(element, tags::CHANNEL_MAPPINGS) {
            for mapping in self.elements(mappings) {
                if mapping.tag_name().name() != tags::CHANNEL_MAPPING {
                    skip_unknown(mapping);
                    continue;
                }
                let channel_uid = required_attr(mapping, "channel")?;
                let channel = document
                    .channels()
                    .get(channel_uid)
                    .ok_or_else(|| XukError::UnresolvedUid {
                        kind: "channel",
                        uid: channel_uid.to_string(),
                    })?;
                let media_element = self
                    .elements(mapping)
                    .into_iter()
                    .find(|child| is_media_name(child.tag_name().name()))
                    .ok_or_else(|| XukError::MissingChild {
                        element: tags::CHANNEL_MAPPING.to_string(),
                        child: "media",
                    })?;
                let media = self.read_media(media_element, document)?;
                property.set_media(channel, media)?;
            }
        }
        document.set_property(node, property)?;
        Ok(())
    }

    fn read_media(&self, element: Node<'_, '_>, document: &Document) -> XukResult<Media> {
        let mut media = match element.tag_name().name() {
            names::TEXT_MEDIA => document.create_text_media(element.text().unwrap_or_default())?,
            names::EXTERNAL_TEXT_MEDIA => {
                document.create_external_media(ExternalKind::Text, required_attr(element, "src")?)?
            }
            names::EXTERNAL_AUDIO_MEDIA => {
                let kind = ExternalKind::Audio {
                    clip_begin: clip_time(element, "clipBegin")?.unwrap_or(Time::ZERO),
                    clip_end: clip_time(element, "clipEnd")?,
                };
                document.create_external_media(kind, required_attr(element, "src")?)?
            }
            names::EXTERNAL_IMAGE_MEDIA => {
                let kind = ExternalKind::Image {
                    width: parse_attr::<u32>(element, "width")?.unwrap_or(0),
                    height: parse_attr::<u32>(element, "height")?.unwrap_or(0),
                };
                document.create_external_media(kind, required_attr(element, "src")?)?
            }
            names::EXTERNAL_VIDEO_MEDIA => {
                let kind = ExternalKind::Video {
                    width: parse_attr::<u32>(element, "width")?.unwrap_or(0),
                    height: parse_attr::<u32>(element, "height")?.unwrap_or(0),
                    clip_begin: clip_time(element, "clipBegin")?.unwrap_or(Time::ZERO),
                    clip_end: clip_time(element, "clipEnd")?,
                };
                document.create_external_media(kind, required_attr(element, "src")?)?
            }
            names::MANAGED_AUDIO_MEDIA => {
                let uid = required_attr(element, "mediaData")?;
                require_media_data(document, uid)?;
                document.create_managed_audio(uid)?
            }
            names::MANAGED_IMAGE_MEDIA => {
                let uid = required_attr(element, "mediaData")?;
                require_media_data(document, uid)?;
                let mut media = document.create_managed_image(uid)?;
                if let Media::ManagedImage(image) = &mut media {
                    image.set_size(
                        parse_attr::<u32>(element, "width")?.unwrap_or(0),
                        parse_attr::<u32>(element, "height")?.unwrap_or(0),
                    );
                }
                media
            }
            names::SEQUENCE_MEDIA => {
                let allow = parse_attr::<bool>(element, "allowMultipleTypes")?.unwrap_or(false);
                let mut sequence = document.create_sequence_media(allow)?;
                if let Some(items) = self.child(element, tags::ITEMS) {
                    for item in self.elements(items) {
                        if !is_media_name(item.tag_name().name()) {
                            skip_unknown(item);
                            continue;
                        }
                        sequence.push(self.read_media(item, document)?)?;
                    }
                }
                Media::Sequence(sequence)
            }
            other => {
                return Err(XukError::InvalidValue {
                    element: tags::CHANNEL_MAPPING.to_string(),
                    attribute: "media",
                    value: other.to_string(),
                })
            }
        };
        media.set_language(element.attribute("language").map(str::to_string));
        Ok(media)
    }
}

fn is_media_name(local_name: &str) -> bool {
    matches!(
        local_name,
        names::TEXT_MEDIA
            | names::EXTERNAL_TEXT_MEDIA
            | names::EXTERNAL_AUDIO_MEDIA
            | names::EXTERNAL_IMAGE_MEDIA
            | names::EXTERNAL_VIDEO_MEDIA
            | names::MANAGED_AUDIO_MEDIA
            | names::MANAGED_IMAGE_MEDIA
            | names::SEQUENCE_MEDIA
    )
}

fn skip_unknown(node: Node<'_, '_>) {
    trace!(
        "event=xuk_skip module=xuk status=ok element={} reason=unknown_element",
        node.tag_name().name()
    );
}

fn required_attr<'a>(node: Node<'a, '_>, name: &'static str) -> XukResult<&'a str> {
    node.attribute(name).ok_or_else(|| XukError::MissingAttribute {
        element: node.tag_name().name().to_string(),
        attribute: name,
    })
}

fn parse_attr<T: FromStr>(node: Node<'_, '_>, name: &'static str) -> XukResult<Option<T>> {
    match node.attribute(name) {
        Some(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| invalid(node, name, value)),
        None => Ok(None),
    }
}

fn required_parsed<T: FromStr>(node: Node<'_, '_>, name: &'static str) -> XukResult<T> {
    let value = required_attr(node, name)?;
    value.trim().parse::<T>().map_err(|_| invalid(node, name, value))
}

fn clip_time(node: Node<'_, '_>, name: &'static str) -> XukResult<Option<Time>> {
    Ok(parse_attr::<i64>(node, name)?.map(Time::from_ticks))
}

fn invalid(node: Node<'_, '_>, attribute: &'static str, value: &str) -> XukError {
    XukError::InvalidValue {
        element: node.tag_name().name().to_string(),
        attribute,
        value: value.to_string(),
    }
}

fn require_provider(document: &Document, uid: &str) -> XukResult<()> {
    if !document.providers().contains(uid) {
        return Err(XukError::UnresolvedUid {
            kind: "data provider",
            uid: uid.to_string(),
        });
    }
    Ok(())
}

fn require_media_data(document: &Document, uid: &str) -> XukResult<()> {
    if !document.media_data().contains(uid) {
        return Err(XukError::UnresolvedUid {
            kind: "media data",
            uid: uid.to_string(),
        });
    }
    Ok(())
}
