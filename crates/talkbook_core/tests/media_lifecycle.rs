use std::path::{Path, PathBuf};
use talkbook_core::media::WavHeader;
use talkbook_core::{
    ChannelKind, ConversionError, ConversionSession, DataError, Document, DocumentError, PcmFormat,
    Time, WavFileConverter,
};

fn write_wav(dir: &Path, name: &str, format: &PcmFormat, pcm: &[u8]) -> PathBuf {
    let mut bytes = Vec::new();
    WavHeader::write(format, pcm.len() as u64, &mut bytes).unwrap();
    bytes.extend_from_slice(pcm);
    let path = dir.join(name);
    std::fs::write(&path, bytes).unwrap();
    path
}

#[test]
fn conversion_session_memoizes_and_cleans_up_unused_imports() {
    let sources = tempfile::tempdir().unwrap();
    let format = PcmFormat::new(1, 16_000, 16).unwrap();
    let intro = write_wav(sources.path(), "intro.wav", &format, &[1, 0, 2, 0, 3, 0]);
    let outro = write_wav(sources.path(), "outro.wav", &format, &[9, 0]);

    let dir = tempfile::tempdir().unwrap();
    let mut document = Document::new(dir.path()).unwrap();
    let channel = document.create_channel("Narration", ChannelKind::Audio).unwrap();
    let root = document.create_node().unwrap();
    document.set_root(root).unwrap();

    let mut session = ConversionSession::new(WavFileConverter);
    let first = session.import_audio(&mut document, &intro).unwrap();
    let unused = session.import_audio(&mut document, &intro).unwrap();
    let last = session.import_audio(&mut document, &outro).unwrap();
    assert_eq!(session.conversions(), 2);
    assert_eq!(session.created_media_data().len(), 3);
    assert!(document.media_value_eq(&first, &document, &unused).unwrap());

    let first_uid = first.media_data_uids()[0].clone();
    let unused_uid = unused.media_data_uids()[0].clone();
    assert_eq!(
        document
            .read_audio(&first_uid, Time::ZERO, None)
            .unwrap(),
        vec![1, 0, 2, 0, 3, 0]
    );

    let second_node = document.create_node().unwrap();
    document.append_child(root, second_node).unwrap();
    document.set_media(root, &channel, first).unwrap();
    document.set_media(second_node, &channel, last).unwrap();
    assert_eq!(document.providers().len(), 3);

    let removed = session.finish(&mut document).unwrap();
    assert_eq!(removed, vec![unused_uid.clone()]);
    assert!(!document.media_data().contains(&unused_uid));
    assert!(document.media_data().contains(&first_uid));
    assert_eq!(document.providers().len(), 2);
}

#[test]
fn invalid_source_fails_without_creating_media_data() {
    let sources = tempfile::tempdir().unwrap();
    let bogus = sources.path().join("bogus.wav");
    std::fs::write(&bogus, b"definitely not riff").unwrap();

    let dir = tempfile::tempdir().unwrap();
    let mut document = Document::new(dir.path()).unwrap();
    let mut session = ConversionSession::new(WavFileConverter);
    assert!(session.import_audio(&mut document, &bogus).is_err());
    assert_eq!(session.conversions(), 0);
    assert!(document.media_data().is_empty());
}

#[test]
fn garbage_collection_drops_unreferenced_media_and_providers() {
    let dir = tempfile::tempdir().unwrap();
    let mut document = Document::new(dir.path()).unwrap();
    let channel = document.create_channel("Audio", ChannelKind::Audio).unwrap();
    let kept = document.create_audio_media_data(None).unwrap();
    let dropped = document.create_audio_media_data(None).unwrap();
    let block = document.media_data().default_pcm_format().block_align() as usize;
    document.append_audio(&kept, &vec![1; block * 4]).unwrap();
    document.append_audio(&dropped, &vec![2; block * 2]).unwrap();
    document.append_audio(&dropped, &vec![3; block * 2]).unwrap();
    let stray = document
        .create_image_media_data("image/gif", b"GIF89a")
        .unwrap();

    let detached = document.create_node().unwrap();
    let media = document.create_managed_audio(&kept).unwrap();
    document.set_media(detached, &channel, media).unwrap();
    assert_eq!(document.providers().len(), 4);

    let report = document.collect_garbage().unwrap();
    let mut removed_media = report.media_data.clone();
    removed_media.sort();
    let mut expected = vec![dropped.clone(), stray.clone()];
    expected.sort();
    assert_eq!(removed_media, expected);
    assert_eq!(report.providers.len(), 3);
    assert_eq!(document.media_data().len(), 1);
    assert_eq!(document.providers().len(), 1);

    assert!(document.collect_garbage().unwrap().is_empty());
}

#[test]
fn garbage_collection_refuses_while_a_doomed_stream_is_open() {
    let dir = tempfile::tempdir().unwrap();
    let mut document = Document::new(dir.path()).unwrap();
    let image = document
        .create_image_media_data("image/png", &[0x89, b'P'])
        .unwrap();
    let provider = document
        .media_data()
        .image(&image)
        .unwrap()
        .provider()
        .to_string();

    let reader = document.providers().open_read(&provider).unwrap();
    let err = document.collect_garbage().unwrap_err();
    assert!(matches!(
        err,
        DocumentError::Data(DataError::StreamsOpen { .. })
    ));
    assert!(document.media_data().contains(&image));

    drop(reader);
    let report = document.collect_garbage().unwrap();
    assert_eq!(report.media_data, vec![image]);
    assert_eq!(report.providers, vec![provider]);
}

#[test]
fn session_finish_refuses_while_a_doomed_stream_is_open() {
    let sources = tempfile::tempdir().unwrap();
    let format = PcmFormat::new(1, 16_000, 16).unwrap();
    let intro = write_wav(sources.path(), "intro.wav", &format, &[4, 0, 5, 0]);

    let dir = tempfile::tempdir().unwrap();
    let mut document = Document::new(dir.path()).unwrap();
    let mut session = ConversionSession::new(WavFileConverter);
    let imported = session.import_audio(&mut document, &intro).unwrap();
    let uid = imported.media_data_uids()[0].clone();
    let provider = document.media_data().audio(&uid).unwrap().clips()[0]
        .provider()
        .to_string();
    document.drain_changes();

    let reader = document.providers().open_read(&provider).unwrap();
    let err = session.finish(&mut document).unwrap_err();
    assert!(matches!(
        err,
        ConversionError::Document(DocumentError::Data(DataError::StreamsOpen { .. }))
    ));
    assert!(document.media_data().contains(&uid));
    assert!(document.providers().contains(&provider));
    assert!(document.changes().is_empty());
    drop(reader);
}
