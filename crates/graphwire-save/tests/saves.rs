//! Save files on disk: shared graphs, header checks, and integrity
//! validation against control copies.

use std::path::Path;
use std::sync::Arc;

use graphwire_core::{
    Endianness, FORMAT_VERSION, Ptr, SerializerConfig, TypeRegistry, persist_fields,
};
use graphwire_save::{
    IntegrityValidator, SAVEGAME_MAGIC, SaveConfig, SaveError, SaveReader, SaveWriter,
    ValidationOutcome,
};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

#[derive(Debug, Default, PartialEq)]
struct Commander {
    name: String,
    rank: u8,
}

persist_fields!(Commander { name, rank });

#[derive(Debug, Default)]
struct Hero {
    name: String,
    level: u16,
    commander: Ptr<Commander>,
}

persist_fields!(Hero {
    name,
    level,
    commander
});

fn registry() -> Arc<TypeRegistry> {
    Arc::new(TypeRegistry::new())
}

fn heroes() -> Vec<Hero> {
    let marshal = Ptr::new(Commander {
        name: "Marshal".into(),
        rank: 3,
    });
    let scout = Ptr::new(Commander {
        name: "Scout".into(),
        rank: 1,
    });
    vec![
        Hero {
            name: "Ayden".into(),
            level: 12,
            commander: marshal.clone(),
        },
        Hero {
            name: "Brissa".into(),
            level: 7,
            commander: scout,
        },
        Hero {
            name: "Crag".into(),
            level: 21,
            commander: marshal,
        },
    ]
}

fn write_values(path: &Path, values: &[u32]) {
    let mut writer = SaveWriter::create(path, registry()).expect("create save");
    for value in values {
        writer.write(value).expect("write value");
    }
    writer.finish().expect("finish save");
}

fn raw_header(version: [u8; 4]) -> Vec<u8> {
    let mut bytes = SAVEGAME_MAGIC.to_vec();
    bytes.extend_from_slice(&version);
    bytes
}

// ---------------------------------------------------------------------------
// Round trips
// ---------------------------------------------------------------------------

#[test]
fn test_shared_commander_loads_once() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("campaign.gws");

    let mut writer = SaveWriter::create(&path, registry()).unwrap();
    writer.write(&heroes()).unwrap();
    writer.finish().unwrap();

    let mut reader = SaveReader::open(&path, registry(), SaveConfig::default()).unwrap();
    let loaded: Vec<Hero> = reader.read().unwrap();
    assert!(reader.at_end().unwrap());

    assert_eq!(loaded.len(), 3);
    assert_eq!(loaded[2].level, 21);
    let first = loaded[0].commander.get().unwrap();
    let third = loaded[2].commander.get().unwrap();
    let second = loaded[1].commander.get().unwrap();
    assert!(Arc::ptr_eq(first, third));
    assert!(!Arc::ptr_eq(first, second));
    assert_eq!(first.read().unwrap().name, "Marshal");

    first.write().unwrap().rank = 4;
    assert_eq!(third.read().unwrap().rank, 4);
}

#[test]
fn test_other_byte_order_is_detected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("foreign.gws");

    let mut writer = SaveWriter::create_with(
        &path,
        registry(),
        SerializerConfig::default(),
        Endianness::native().flipped(),
    )
    .unwrap();
    writer.write(&0x0102_0304u32).unwrap();
    writer.write(&heroes()).unwrap();
    writer.finish().unwrap();

    let mut reader = SaveReader::open(&path, registry(), SaveConfig::default()).unwrap();
    assert!(reader.reverse_endianness());
    assert_eq!(reader.version(), FORMAT_VERSION);
    assert_eq!(reader.read::<u32>().unwrap(), 0x0102_0304);
    let loaded: Vec<Hero> = reader.read().unwrap();
    assert_eq!(loaded[1].name, "Brissa");
    assert!(loaded[0].commander.ptr_eq(&loaded[2].commander));
}

// ---------------------------------------------------------------------------
// Header checks
// ---------------------------------------------------------------------------

#[test]
fn test_bad_magic_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bogus.gws");
    let mut bytes = b"NOTASAV".to_vec();
    bytes.extend_from_slice(&FORMAT_VERSION.to_ne_bytes());
    std::fs::write(&path, bytes).unwrap();

    let err = SaveReader::open(&path, registry(), SaveConfig::default()).unwrap_err();
    assert!(err.is_corrupt());
    assert!(err.to_string().contains("bad save magic"));
}

#[test]
fn test_old_version_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("old.gws");
    std::fs::write(&path, raw_header(3u32.to_ne_bytes())).unwrap();

    let err = SaveReader::open(&path, registry(), SaveConfig::default()).unwrap_err();
    assert!(matches!(err, SaveError::Header { .. }));
    assert!(err.to_string().contains("older than minimum"));
}

#[test]
fn test_minimum_version_is_configurable() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("previous.gws");
    std::fs::write(&path, raw_header((FORMAT_VERSION - 1).to_ne_bytes())).unwrap();

    let reader = SaveReader::open(&path, registry(), SaveConfig::default()).unwrap();
    assert_eq!(reader.version(), FORMAT_VERSION - 1);
    assert!(SaveReader::open(&path, registry(), SaveConfig::current_only()).is_err());
}

#[test]
fn test_newer_version_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("future.gws");
    std::fs::write(&path, raw_header((FORMAT_VERSION + 1).to_ne_bytes())).unwrap();

    let err = SaveReader::open(&path, registry(), SaveConfig::default()).unwrap_err();
    assert!(err.to_string().contains("newer than supported"));
}

#[test]
fn test_truncated_header_is_channel_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("short.gws");
    std::fs::write(&path, &SAVEGAME_MAGIC[..3]).unwrap();

    let err = SaveReader::open(&path, registry(), SaveConfig::default()).unwrap_err();
    assert!(matches!(err, SaveError::Channel(_)));
}

// ---------------------------------------------------------------------------
// Integrity validation
// ---------------------------------------------------------------------------

#[test]
fn test_identical_saves_do_not_diverge() {
    let dir = tempfile::tempdir().unwrap();
    let primary = dir.path().join("primary.gws");
    let control = dir.path().join("control.gws");
    write_values(&primary, &[1, 2, 3]);
    write_values(&control, &[1, 2, 3]);

    let mut validator =
        IntegrityValidator::open(&primary, &control, registry(), SaveConfig::default()).unwrap();
    for expected in 1..=3u32 {
        assert_eq!(validator.read::<u32>().unwrap(), expected);
    }
    assert_eq!(validator.finish().unwrap(), ValidationOutcome::NoDivergence);
}

#[test]
fn test_first_divergence_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let primary = dir.path().join("primary.gws");
    let control = dir.path().join("control.gws");
    write_values(&primary, &[1, 5, 9]);
    write_values(&control, &[1, 6, 10]);

    let mut validator =
        IntegrityValidator::open(&primary, &control, registry(), SaveConfig::default()).unwrap();
    assert_eq!(validator.read::<u32>().unwrap(), 1);
    assert_eq!(validator.outcome().unwrap(), ValidationOutcome::NoDivergence);

    // Values still come from the primary after the divergence.
    assert_eq!(validator.read::<u32>().unwrap(), 5);
    let differing = 5u32
        .to_ne_bytes()
        .iter()
        .zip(6u32.to_ne_bytes())
        .position(|(a, b)| *a != b)
        .unwrap() as u64;
    let header = (SAVEGAME_MAGIC.len() + 4) as u64;
    let expected = ValidationOutcome::DivergenceFound {
        primary_offset: header + 4 + differing,
        control_offset: header + 4 + differing,
    };
    assert_eq!(validator.outcome().unwrap(), expected);

    // Later differences don't overwrite the first one.
    assert_eq!(validator.read::<u32>().unwrap(), 9);
    assert_eq!(validator.finish().unwrap(), expected);
}

#[test]
fn test_longer_control_diverges_at_end() {
    let dir = tempfile::tempdir().unwrap();
    let primary = dir.path().join("primary.gws");
    let control = dir.path().join("control.gws");
    write_values(&primary, &[1, 2]);
    write_values(&control, &[1, 2, 3]);

    let mut validator =
        IntegrityValidator::open(&primary, &control, registry(), SaveConfig::default()).unwrap();
    validator.read::<u32>().unwrap();
    validator.read::<u32>().unwrap();
    let end = (SAVEGAME_MAGIC.len() + 4 + 8) as u64;
    assert_eq!(
        validator.finish().unwrap(),
        ValidationOutcome::DivergenceFound {
            primary_offset: end,
            control_offset: end,
        }
    );
}

#[test]
fn test_decay_continues_on_primary() {
    let dir = tempfile::tempdir().unwrap();
    let primary = dir.path().join("primary.gws");
    let control = dir.path().join("control.gws");
    write_values(&primary, &[7, 8]);
    write_values(&control, &[7]);

    let mut validator =
        IntegrityValidator::open(&primary, &control, registry(), SaveConfig::default()).unwrap();
    assert_eq!(validator.read::<u32>().unwrap(), 7);

    let mut reader = validator.decay().unwrap();
    assert_eq!(reader.read::<u32>().unwrap(), 8);
    assert!(reader.at_end().unwrap());
}
