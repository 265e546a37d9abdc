use std::io::{Read, Write};
use talkbook_core::{DataError, DataProviderManager};

fn manager() -> (tempfile::TempDir, DataProviderManager) {
    let dir = tempfile::tempdir().unwrap();
    let providers = DataProviderManager::new(dir.path().join("Data"));
    (dir, providers)
}

#[test]
fn bytes_written_are_read_back_exactly() {
    let (_dir, mut providers) = manager();
    let uid = providers.create("application/octet-stream").unwrap();
    let payload: Vec<u8> = (0..=255).cycle().take(4_099).collect();

    let mut writer = providers.open_write(&uid).unwrap();
    writer.write_all(&payload).unwrap();
    writer.finish().unwrap();

    let mut reader = providers.open_read(&uid).unwrap();
    let mut read_back = Vec::new();
    reader.read_to_end(&mut read_back).unwrap();
    assert_eq!(read_back, payload);
    assert_eq!(providers.len_bytes(&uid).unwrap(), payload.len() as u64);
}

#[test]
fn second_writer_is_refused_until_the_first_closes() {
    let (_dir, mut providers) = manager();
    let uid = providers.create("audio/x-wav").unwrap();

    let writer = providers.open_write(&uid).unwrap();
    assert!(matches!(
        providers.open_write(&uid),
        Err(DataError::WriterAlreadyOpen(_))
    ));
    assert!(matches!(
        providers.open_read(&uid),
        Err(DataError::WriterOpen(_))
    ));
    drop(writer);
    assert!(providers.open_write(&uid).is_ok());
}

#[test]
fn readers_block_writers_but_not_each_other() {
    let (_dir, mut providers) = manager();
    let uid = providers.create("text/plain").unwrap();
    providers.write_all(&uid, b"abc").unwrap();

    let first = providers.open_read(&uid).unwrap();
    let second = providers.open_read(&uid).unwrap();
    assert_eq!(providers.get(&uid).unwrap().open_readers(), 2);
    assert!(matches!(
        providers.open_append(&uid),
        Err(DataError::ReadersOpen { readers: 2, .. })
    ));
    drop(first);
    drop(second);
    providers.append(&uid, b"def").unwrap();
    assert_eq!(providers.read_all(&uid).unwrap(), b"abcdef");
}

#[test]
fn delete_waits_for_open_streams() {
    let (_dir, mut providers) = manager();
    let uid = providers.create("image/png").unwrap();
    providers.write_all(&uid, &[1, 2, 3]).unwrap();
    let path = providers.get(&uid).unwrap().path().to_path_buf();

    let reader = providers.open_read(&uid).unwrap();
    match providers.delete(&uid) {
        Err(DataError::StreamsOpen {
            readers, writer, ..
        }) => {
            assert_eq!(readers, 1);
            assert!(!writer);
        }
        other => panic!("unexpected delete result: {other:?}"),
    }
    assert!(providers.contains(&uid));

    drop(reader);
    providers.delete(&uid).unwrap();
    assert!(!providers.contains(&uid));
    assert!(!path.exists());
    assert!(matches!(
        providers.open_read(&uid),
        Err(DataError::ProviderNotFound(_))
    ));
}
