use talkbook_core::{ChangeEvent, ChannelKind, Document, DocumentError};

#[test]
fn removing_a_channel_clears_every_mapping_to_it() {
    let dir = tempfile::tempdir().unwrap();
    let mut document = Document::new(dir.path()).unwrap();
    let english = document.create_channel("English", ChannelKind::Text).unwrap();
    let french = document.create_channel("French", ChannelKind::Text).unwrap();

    let root = document.create_node().unwrap();
    document.set_root(root).unwrap();
    let mut mapped = Vec::new();
    for index in 0..3 {
        let node = document.create_node().unwrap();
        document.append_child(root, node).unwrap();
        let en = document.create_text_media(&format!("line {index}")).unwrap();
        let fr = document.create_text_media(&format!("ligne {index}")).unwrap();
        document.set_media(node, &english, en).unwrap();
        document.set_media(node, &french, fr).unwrap();
        mapped.push(node);
    }
    let detached = document.create_node().unwrap();
    let orphan = document.create_text_media("detached").unwrap();
    document.set_media(detached, &english, orphan).unwrap();
    document.drain_changes();

    let removed = document.remove_channel(&english).unwrap();
    assert_eq!(removed.name(), "English");
    assert!(document.channels().get(&english).is_none());

    for node in mapped.iter().copied().chain([detached]) {
        assert!(document.media(node, &english).unwrap().is_none());
    }
    for node in &mapped {
        assert!(document.media(*node, &french).unwrap().is_some());
    }

    let changes = document.drain_changes();
    let cleared = changes
        .iter()
        .filter(|event| {
            matches!(event, ChangeEvent::MediaRemoved { channel, .. } if *channel == english)
        })
        .count();
    assert_eq!(cleared, 4);
    assert!(matches!(
        changes.last(),
        Some(ChangeEvent::ChannelRemoved { channel }) if *channel == english
    ));
}

#[test]
fn removed_channel_cannot_be_mapped_again() {
    let dir = tempfile::tempdir().unwrap();
    let mut document = Document::new(dir.path()).unwrap();
    let channel = document.create_channel("Notes", ChannelKind::Text).unwrap();
    let node = document.create_node().unwrap();
    document.remove_channel(&channel).unwrap();

    let media = document.create_text_media("late").unwrap();
    assert!(matches!(
        document.set_media(node, &channel, media),
        Err(DocumentError::ChannelNotFound(uid)) if uid == channel
    ));
    assert!(matches!(
        document.remove_channel(&channel),
        Err(DocumentError::ChannelNotFound(_))
    ));
}

#[test]
fn channel_kind_gates_media() {
    let dir = tempfile::tempdir().unwrap();
    let mut document = Document::new(dir.path()).unwrap();
    let audio = document.create_channel("Audio", ChannelKind::Audio).unwrap();
    let any = document.create_channel("Anything", ChannelKind::Any).unwrap();
    let node = document.create_node().unwrap();

    let text = document.create_text_media("not audio").unwrap();
    assert!(matches!(
        document.set_media(node, &audio, text.clone()),
        Err(DocumentError::IncompatibleMedia { .. })
    ));
    document.set_media(node, &any, text).unwrap();
    assert!(document.media(node, &audio).unwrap().is_none());
}
