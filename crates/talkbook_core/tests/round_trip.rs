use std::path::Path;
use talkbook_core::media::{ExternalKind, SequenceMedia};
use talkbook_core::{
    ChannelKind, DataError, Document, DocumentError, Media, PcmFormat, Project, Time, XukConfig,
    XukError,
};

fn english_text_project(dir: &Path) -> Project {
    let mut document = Document::new(dir).unwrap();
    let node = document.create_node().unwrap();
    document.set_root(node).unwrap();

    let channel = document.create_channel("EnglishText", ChannelKind::Text).unwrap();
    let text = document.create_text_media("hello").unwrap();
    let mut property = document.create_channels_property().unwrap();
    property
        .set_media(document.channel(&channel).unwrap(), text)
        .unwrap();
    document.set_property(node, property).unwrap();

    let mut project = Project::new();
    project.add_document(document);
    project
}

#[test]
fn english_text_mapping_survives_save_and_open() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("book.xuk");
    english_text_project(dir.path())
        .save(&path, &XukConfig::default())
        .unwrap();

    let reopened = Project::open(&path, &XukConfig::default()).unwrap();
    let document = reopened.document(0).unwrap();
    let root = document.require_root().unwrap();
    let media = document
        .media_by_channel_name(root, "EnglishText")
        .unwrap()
        .unwrap();
    assert_eq!(media.as_text().unwrap().text(), "hello");
}

#[test]
fn rich_document_is_value_equal_after_reload() {
    let dir = tempfile::tempdir().unwrap();
    let mut document = Document::new(dir.path()).unwrap();
    document.add_metadata("dc:title", "Field Notes & <Drafts>");

    let text_channel = document.create_channel("Text", ChannelKind::Text).unwrap();
    let audio_channel = document.create_channel("Narration", ChannelKind::Audio).unwrap();
    let image_channel = document.create_channel("Pictures", ChannelKind::Image).unwrap();
    let mixed_channel = document.create_channel("Mixed", ChannelKind::Any).unwrap();
    document
        .channel_mut(&text_channel)
        .unwrap()
        .set_language(Some("en".to_string()));

    let format = PcmFormat::new(1, 22_050, 16).unwrap();
    let audio = document.create_audio_media_data(Some(format)).unwrap();
    document.append_audio(&audio, &[1, 0, 2, 0, 3, 0, 4, 0]).unwrap();
    document.append_audio(&audio, &[5, 0, 6, 0]).unwrap();
    let image = document
        .create_image_media_data("image/png", &[0x89, b'P', b'N', b'G'])
        .unwrap();

    let root = document.create_node().unwrap();
    document.set_root(root).unwrap();
    let chapter = document.create_node().unwrap();
    let paragraph = document.create_node().unwrap();
    document.append_child(root, chapter).unwrap();
    document.append_child(chapter, paragraph).unwrap();

    let mut structure = document.create_structure_property("level1", "").unwrap();
    structure
        .set_attribute("id", "", "ch1\twith\ttabs\nand lines")
        .unwrap();
    document.set_property(chapter, structure).unwrap();

    let mut text = document.create_text_media("Once upon a time").unwrap();
    text.set_language(Some("en-GB".to_string()));
    document.set_media(paragraph, &text_channel, text).unwrap();
    let narration = document.create_managed_audio(&audio).unwrap();
    document.set_media(paragraph, &audio_channel, narration).unwrap();
    let mut picture = document.create_managed_image(&image).unwrap();
    if let Media::ManagedImage(picture) = &mut picture {
        picture.set_size(640, 480);
    }
    document.set_media(chapter, &image_channel, picture).unwrap();

    let mut sequence: SequenceMedia = document.create_sequence_media(true).unwrap();
    sequence
        .push(document.create_text_media("caption").unwrap())
        .unwrap();
    sequence
        .push(
            document
                .create_external_media(
                    ExternalKind::Audio {
                        clip_begin: Time::from_millis(250),
                        clip_end: Some(Time::from_millis(1_500)),
                    },
                    "audio/intro.mp3",
                )
                .unwrap(),
        )
        .unwrap();
    document
        .set_media(root, &mixed_channel, Media::Sequence(sequence))
        .unwrap();

    let mut project = Project::new();
    project.set_metadata("dc:creator", "Tester");
    project.add_document(document);
    let path = dir.path().join("rich.xuk");
    project.save(&path, &XukConfig::default()).unwrap();

    let reopened = Project::open(&path, &XukConfig::default()).unwrap();
    assert_eq!(reopened.metadata_content("dc:creator"), Some("Tester"));
    let original = project.document(0).unwrap();
    let loaded = reopened.document(0).unwrap();
    assert_ne!(original.id(), loaded.id());
    assert_eq!(loaded.metadata(), original.metadata());
    assert_eq!(loaded.channels().len(), 4);
    assert_eq!(
        loaded
            .channels()
            .find_by_name("Text")
            .unwrap()
            .language(),
        Some("en")
    );
    assert!(original
        .subtree_value_eq(
            original.require_root().unwrap(),
            loaded,
            loaded.require_root().unwrap()
        )
        .unwrap());

    let loaded_audio = loaded.media_data().audio(&audio).unwrap();
    assert_eq!(loaded_audio.clips().len(), 2);
    assert_eq!(
        loaded.audio_duration(&audio).unwrap(),
        format.duration_for_bytes(12)
    );
}

#[test]
fn custom_namespace_and_data_directory_are_honoured() {
    let dir = tempfile::tempdir().unwrap();
    let config = XukConfig {
        namespace: "urn:example:talkbook".to_string(),
        data_dir_name: "media".to_string(),
        indent: 0,
    };
    let mut document = Document::with_config(dir.path(), &config).unwrap();
    let audio = document.create_audio_media_data(None).unwrap();
    let format = *document.media_data().default_pcm_format();
    let block = vec![0_u8; format.block_align() as usize];
    document.append_audio(&audio, &block).unwrap();
    let root = document.create_node().unwrap();
    document.set_root(root).unwrap();

    let mut project = Project::new();
    project.add_document(document);
    let path = dir.path().join("custom.xuk");
    project.save(&path, &config).unwrap();

    let markup = std::fs::read_to_string(&path).unwrap();
    assert!(markup.contains("xmlns=\"urn:example:talkbook\""));
    assert!(markup.contains("dataDirectory=\"media\""));
    assert!(dir.path().join("media").is_dir());

    let reopened = Project::open(&path, &config).unwrap();
    assert_eq!(reopened.document(0).unwrap().media_data().len(), 1);

    let wrong_namespace = Project::open(&path, &XukConfig::default()).unwrap_err();
    assert!(matches!(wrong_namespace, XukError::UnexpectedRoot(_)));
}

#[test]
fn missing_provider_file_fails_open() {
    let dir = tempfile::tempdir().unwrap();
    let mut document = Document::new(dir.path()).unwrap();
    let image = document.create_image_media_data("image/jpeg", &[1, 2, 3]).unwrap();
    let provider = document.media_data().image(&image).unwrap().provider().to_string();
    let file = document.providers().get(&provider).unwrap().path().to_path_buf();

    let mut project = Project::new();
    project.add_document(document);
    let path = dir.path().join("broken.xuk");
    project.save(&path, &XukConfig::default()).unwrap();
    std::fs::remove_file(file).unwrap();

    let err = Project::open(&path, &XukConfig::default()).unwrap_err();
    assert!(matches!(
        err,
        XukError::Document(DocumentError::Data(DataError::MissingFile { .. }))
    ));
}

#[test]
fn unresolved_channel_reference_is_a_format_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dangling.xuk");
    let markup = r#"<?xml version="1.0" encoding="utf-8"?>
<Xuk xmlns="http://www.daisy.org/urakawa/xuk/2.0">
  <Project>
    <Presentations>
      <Presentation>
        <RootNode>
          <TreeNode>
            <Properties>
              <ChannelsProperty>
                <ChannelMappings>
                  <ChannelMapping channel="CH9">
                    <TextMedia>orphan</TextMedia>
                  </ChannelMapping>
                </ChannelMappings>
              </ChannelsProperty>
            </Properties>
            <Children/>
          </TreeNode>
        </RootNode>
        <ChannelsManager/>
      </Presentation>
    </Presentations>
  </Project>
</Xuk>
"#;
    std::fs::write(&path, markup).unwrap();

    let err = Project::open(&path, &XukConfig::default()).unwrap_err();
    assert!(matches!(err, XukError::UnresolvedUid { .. }));
}

#[test]
fn presentation_without_root_node_is_a_format_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rootless.xuk");
    let markup = r#"<?xml version="1.0" encoding="utf-8"?>
<Xuk xmlns="http://www.daisy.org/urakawa/xuk/2.0">
  <Project>
    <Presentations>
      <Presentation/>
    </Presentations>
  </Project>
</Xuk>
"#;
    std::fs::write(&path, markup).unwrap();

    let err = Project::open(&path, &XukConfig::default()).unwrap_err();
    assert!(matches!(
        err,
        XukError::MissingChild { child: "RootNode", .. }
    ));
}

#[test]
fn empty_document_round_trips_with_an_empty_root_node() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("empty.xuk");
    let mut project = Project::new();
    project.add_document(Document::new(dir.path().join("Data")).unwrap());
    project.save(&path, &XukConfig::default()).unwrap();

    let reopened = Project::open(&path, &XukConfig::default()).unwrap();
    assert_eq!(reopened.len(), 1);
    assert_eq!(reopened.document(0).unwrap().root(), None);
}

#[test]
fn save_refuses_unregistered_media_data_on_the_tree() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dangling.xuk");
    let mut document = Document::new(dir.path().join("Data")).unwrap();
    let root = document.create_node().unwrap();
    document.set_root(root).unwrap();
    let channel = document.create_channel("Pictures", ChannelKind::Image).unwrap();
    let image = document
        .create_image_media_data("image/png", &[0x89, b'P', b'N', b'G'])
        .unwrap();
    let media = document.create_managed_image(&image).unwrap();
    document.set_media(root, &channel, media).unwrap();
    document.media_data_mut().remove(&image);

    let mut project = Project::new();
    project.add_document(document);
    let err = project.save(&path, &XukConfig::default()).unwrap_err();
    assert!(matches!(
        err,
        XukError::UnresolvedUid { kind: "media data", ref uid } if *uid == image
    ));
    assert!(!path.exists());
}

#[test]
fn save_refuses_media_data_whose_provider_was_deleted() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dangling.xuk");
    let mut document = Document::new(dir.path().join("Data")).unwrap();
    let audio = document.create_audio_media_data(None).unwrap();
    let block = document.media_data().default_pcm_format().block_align() as usize;
    document.append_audio(&audio, &vec![0; block * 2]).unwrap();
    let provider = document.media_data().audio(&audio).unwrap().clips()[0]
        .provider()
        .to_string();
    document.media_stores_mut().1.delete(&provider).unwrap();

    let mut project = Project::new();
    project.add_document(document);
    let err = project.save(&path, &XukConfig::default()).unwrap_err();
    assert!(matches!(
        err,
        XukError::UnresolvedUid { kind: "data provider", ref uid } if *uid == provider
    ));
}
