//! XUK markup writer.

use super::{tags, XukConfig, XukError, XukResult};
use crate::document::Document;
use crate::factory::names;
use crate::media::{ExternalKind, Media, MediaData, PcmFormat, Time};
use crate::model::{Metadata, NodeId, Property};
use crate::project::Project;
use std::path::Path;
use url::Url;

/// In-memory element rendered once the whole tree is built.
#[derive(Debug, Default)]
struct Element {
    name: &'static str,
    attributes: Vec<(&'static str, String)>,
    children: Vec<Element>,
    text: Option<String>,
}

impl Element {
    fn new(name: &'static str) -> Self {
        Self {
            name,
            ..Self::default()
        }
    }

    fn attr(mut self, name: &'static str, value: impl ToString) -> Self {
        self.attributes.push((name, value.to_string()));
        self
    }

    fn opt_attr(self, name: &'static str, value: Option<impl ToString>) -> Self {
        match value {
            Some(value) => self.attr(name, value),
            None => self,
        }
    }

    fn child(mut self, child: Element) -> Self {
        self.children.push(child);
        self
    }

    fn text(mut self, text: &str) -> Self {
        self.text = Some(text.to_string());
        self
    }

    fn render(&self, out: &mut String, indent: usize, depth: usize) {
        pad(out, indent, depth);
        out.push('<');
        out.push_str(self.name);
        for (name, value) in &self.attributes {
            out.push(' ');
            out.push_str(name);
            out.push_str("=\"");
            escape_into(value, true, out);
            out.push('"');
        }
        let text = self.text.as_deref().filter(|text| !text.is_empty());
        if self.children.is_empty() && text.is_none() {
            out.push_str("/>");
            newline(out, indent);
            return;
        }
        out.push('>');
        if let Some(text) = text {
            escape_into(text, false, out);
        }
        if !self.children.is_empty() {
            newline(out, indent);
            for child in &self.children {
                child.render(out, indent, depth + 1);
            }
            pad(out, indent, depth);
        }
        out.push_str("</");
        out.push_str(self.name);
        out.push('>');
        newline(out, indent);
    }
}

fn pad(out: &mut String, indent: usize, depth: usize) {
    for _ in 0..indent * depth {
        out.push(' ');
    }
}

fn newline(out: &mut String, indent: usize) {
    if indent > 0 {
        out.push('\n');
    }
}

fn escape_into(value: &str, attribute: bool, out: &mut String) {
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if attribute => out.push_str("&quot;"),
            '\n' if attribute => out.push_str("&#10;"),
            '\t' if attribute => out.push_str("&#9;"),
            '\r' => out.push_str("&#13;"),
            other => out.push(other),
        }
    }
}

/// Renders `project` as XUK markup for a file inside `xuk_dir`.
pub(crate) fn write_project(project: &Project, xuk_dir: &Path, config: &XukConfig) -> XukResult<String> {
    let mut presentations = Element::new(tags::PRESENTATIONS);
    for document in project.documents() {
        presentations = presentations.child(presentation_element(document, xuk_dir)?);
    }
    let root = Element::new(tags::XUK)
        .attr("xmlns", &config.namespace)
        .child(
            Element::new(tags::PROJECT)
                .child(metadata_element(project.metadata()))
                .child(presentations),
        );

    let mut out = String::from("<?xml version=\"1.0\" encoding=\"utf-8\"?>");
    newline(&mut out, config.indent);
    root.render(&mut out, config.indent, 0);
    Ok(out)
}

fn presentation_element(document: &Document, xuk_dir: &Path) -> XukResult<Element> {
    let default_base = Url::from_directory_path(xuk_dir).ok();
    let base_uri = document
        .base_uri()
        .filter(|base| Some(*base) != default_base.as_ref())
        .map(Url::as_str);

    ensure_references_resolve(document)?;
    let mut root_node = Element::new(tags::ROOT_NODE);
    if let Some(root) = document.root() {
        root_node = root_node.child(tree_node_element(document, root)?);
    }

    Ok(Element::new(tags::PRESENTATION)
        .opt_attr("baseUri", base_uri)
        .child(root_node)
        .child(metadata_element(document.metadata()))
        .child(channels_element(document))
        .child(providers_element(document, xuk_dir))
        .child(media_data_element(document)))
}

/// Refuses to emit markup that would not read back: every media data the
/// tree maps, and every provider a media data uses, must be registered.
fn ensure_references_resolve(document: &Document) -> XukResult<()> {
    if let Some(root) = document.root() {
        for node in document.descendants(root)? {
            let Some(channels) = document.channels_property(node)? else {
                continue;
            };
            for (_, media) in channels.iter() {
                for uid in media.media_data_uids() {
                    if !document.media_data().contains(&uid) {
                        return Err(XukError::UnresolvedUid {
                            kind: "media data",
                            uid,
                        });
                    }
                }
            }
        }
    }
    for media_data in document.media_data().iter() {
        for uid in media_data.provider_uids() {
            if !document.providers().contains(&uid) {
                return Err(XukError::UnresolvedUid {
                    kind: "data provider",
                    uid,
                });
            }
        }
    }
    Ok(())
}

fn metadata_element(entries: &[Metadata]) -> Element {
    let mut element = Element::new(tags::METADATA);
    for entry in entries {
        element = element.child(
            Element::new(tags::META)
                .attr("name", &entry.name)
                .attr("content", &entry.content),
        );
    }
    element
}

fn channels_element(document: &Document) -> Element {
    let mut element = Element::new(tags::CHANNELS_MANAGER);
    for channel in document.channels().iter() {
        element = element.child(
            Element::new(names::CHANNEL)
                .attr("uid", channel.uid())
                .attr("name", channel.name())
                .opt_attr("language", channel.language())
                .attr("kind", channel.kind()),
        );
    }
    element
}

fn providers_element(document: &Document, xuk_dir: &Path) -> Element {
    let providers = document.providers();
    let data_dir = providers
        .data_dir()
        .strip_prefix(xuk_dir)
        .unwrap_or(providers.data_dir());
    let mut element = Element::new(tags::DATA_PROVIDER_MANAGER)
        .attr("dataDirectory", data_dir.to_string_lossy().replace('\\', "/"));
    for provider in providers.iter() {
        element = element.child(
            Element::new(names::FILE_DATA_PROVIDER)
                .attr("uid", provider.uid())
                .attr("mimeType", provider.mime_type())
                .attr("dataFile", provider.file_name()),
        );
    }
    element
}

fn pcm_format_element(format: &PcmFormat) -> Element {
    Element::new(tags::PCM_FORMAT)
        .attr("channels", format.channels)
        .attr("sampleRate", format.sample_rate)
        .attr("bitDepth", format.bit_depth)
}

fn media_data_element(document: &Document) -> Element {
    let manager = document.media_data();
    let mut element = Element::new(tags::MEDIA_DATA_MANAGER)
        .attr("enforceSinglePCMFormat", manager.enforce_single_pcm_format())
        .child(
            Element::new(tags::DEFAULT_PCM_FORMAT)
                .child(pcm_format_element(manager.default_pcm_format())),
        );
    for media_data in manager.iter() {
        let child = match media_data {
            MediaData::Audio(audio) => {
                let mut clips = Element::new(tags::WAV_CLIPS);
                for clip in audio.clips() {
                    clips = clips.child(
                        Element::new(tags::WAV_CLIP)
                            .attr("dataProvider", clip.provider())
                            .attr("clipBegin", clip.clip_begin().ticks())
                            .opt_attr("clipEnd", clip.clip_end().map(Time::ticks)),
                    );
                }
                Element::new(names::WAV_AUDIO_MEDIA_DATA)
                    .attr("uid", audio.uid())
                    .child(pcm_format_element(audio.format()))
                    .child(clips)
            }
            MediaData::Image(image) => Element::new(names::IMAGE_MEDIA_DATA)
                .attr("uid", image.uid())
                .attr("dataProvider", image.provider()),
        };
        element = element.child(child);
    }
    element
}

fn tree_node_element(document: &Document, node: NodeId) -> XukResult<Element> {
    let mut properties = Element::new(tags::PROPERTIES);
    for property in document.properties(node)? {
        properties = properties.child(property_element(property));
    }
    let mut children = Element::new(tags::CHILDREN);
    for child in document.children(node)? {
        children = children.child(tree_node_element(document, *child)?);
    }
    Ok(Element::new(names::TREE_NODE)
        .child(properties)
        .child(children))
}

fn property_element(property: &Property) -> Element {
    match property {
        Property::Channels(channels) => {
            let mut mappings = Element::new(tags::CHANNEL_MAPPINGS);
            for (channel, media) in channels.iter() {
                mappings = mappings.child(
                    Element::new(tags::CHANNEL_MAPPING)
                        .attr("channel", channel)
                        .child(media_element(media)),
                );
            }
            Element::new(names::CHANNELS_PROPERTY).child(mappings)
        }
        Property::Structure(structure) => {
            let mut attributes = Element::new(tags::ATTRIBUTES);
            for attribute in structure.attributes() {
                attributes = attributes.child(
                    Element::new(tags::ATTRIBUTE)
                        .attr("name", &attribute.name)
                        .attr("namespace", &attribute.namespace)
                        .attr("value", &attribute.value),
                );
            }
            Element::new(names::STRUCTURE_PROPERTY)
                .attr("localName", structure.local_name())
                .attr("namespace", structure.namespace())
                .child(attributes)
        }
    }
}

fn media_element(media: &Media) -> Element {
    let element = Element::new(media.local_name()).opt_attr("language", media.language());
    match media {
        Media::Text(text) => element.text(text.text()),
        Media::External(external) => {
            let element = element.attr("src", external.src());
            match *external.kind() {
                ExternalKind::Text => element,
                ExternalKind::Audio {
                    clip_begin,
                    clip_end,
                } => clip_attributes(element, clip_begin, clip_end),
                ExternalKind::Image { width, height } => {
                    element.attr("width", width).attr("height", height)
                }
                ExternalKind::Video {
                    width,
                    height,
                    clip_begin,
                    clip_end,
                } => clip_attributes(
                    element.attr("width", width).attr("height", height),
                    clip_begin,
                    clip_end,
                ),
            }
        }
        Media::ManagedAudio(audio) => element.attr("mediaData", audio.media_data()),
        Media::ManagedImage(image) => element
            .attr("mediaData", image.media_data())
            .attr("width", image.width())
            .attr("height", image.height()),
        Media::Sequence(sequence) => {
            let mut items = Element::new(tags::ITEMS);
            for item in sequence.items() {
                items = items.child(media_element(item));
            }
            element
                .attr("allowMultipleTypes", sequence.allow_multiple_types())
                .child(items)
        }
    }
}

fn clip_attributes(element: Element, clip_begin: Time, clip_end: Option<Time>) -> Element {
    element
        .attr("clipBegin", clip_begin.ticks())
        .opt_attr("clipEnd", clip_end.map(Time::ticks))
}

#[cfg(test)]
mod tests {
    use super::{escape_into, Element};

    #[test]
    fn escapes_markup_and_attribute_whitespace() {
        let mut out = String::new();
        escape_into("a<b & \"c\"\nd", true, &mut out);
        assert_eq!(out, "a&lt;b &amp; &quot;c&quot;&#10;d");

        let mut out = String::new();
        escape_into("line\nbreak", false, &mut out);
        assert_eq!(out, "line\nbreak");
    }

    #[test]
    fn renders_nested_elements_with_indentation() {
        let element = Element::new("A")
            .attr("x", 1)
            .child(Element::new("B").text("hi"))
            .child(Element::new("C"));
        let mut out = String::new();
        element.render(&mut out, 2, 0);
        assert_eq!(out, "<A x=\"1\">\n  <B>hi</B>\n  <C/>\n</A>\n");

        let mut compact = String::new();
        element.render(&mut compact, 0, 0);
        assert_eq!(compact, "<A x=\"1\"><B>hi</B><C/></A>");
    }
}
