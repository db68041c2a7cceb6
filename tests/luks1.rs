//! LUKS1 containers end to end: parse, unseal, read.

mod common;

use common::{Luks1, UUID};
use luks_volume::config::luks1;
use luks_volume::crypto::HashAlgorithm;
use luks_volume::{Device, Error, ErrorKind, LuksVersion, VolumeReader};

fn zeros(sectors: usize) -> Vec<u8> {
    vec![0u8; sectors * 512]
}

fn three_slots() -> Luks1 {
    Luks1 {
        passphrases: vec![(0, "foobar"), (2, "second"), (5, "fifth")],
        ..Luks1::default()
    }
}

#[test]
fn test_open_reports_header() {
    let fixture = three_slots().build(&zeros(2));
    let device = Device::open(&fixture.image).expect("Failed to open container");

    assert_eq!(device.version(), LuksVersion::V1);
    assert_eq!(device.uuid(), UUID);
    assert_eq!(device.label(), None);
    assert_eq!(device.slots(), vec![0, 2, 5]);
    assert!(device.tokens().is_empty());
    assert_eq!(device.metadata().header_size, fixture.payload_offset);
}

#[test]
fn test_every_slot_unseals_same_key() {
    let fixture = three_slots().build(&zeros(2));
    let device = Device::open(&fixture.image).unwrap();

    for (slot, passphrase) in [(0, "foobar"), (2, "second"), (5, "fifth")] {
        let volume = device
            .unseal_volume(slot, passphrase.as_bytes())
            .expect("Failed to unseal");
        assert_eq!(volume.key(), &fixture.key[..]);
        assert_eq!(volume.luks_type(), "LUKS1");
        assert_eq!(volume.cipher().name(), "aes-xts-plain64");
        assert_eq!(volume.sector_size(), 512);
        assert_eq!(volume.offset(), fixture.payload_offset);
        assert_eq!(volume.size(), 1024);
    }
}

#[test]
fn test_unseal_is_deterministic() {
    let fixture = Luks1::default().build(&zeros(1));
    let device = Device::open(&fixture.image).unwrap();
    let first = device.unseal_volume(0, b"foobar").unwrap();
    let second = device.unseal_volume(0, b"foobar").unwrap();
    assert_eq!(first.key(), second.key());
}

#[test]
fn test_wrong_passphrase() {
    let fixture = three_slots().build(&zeros(1));
    let device = Device::open(&fixture.image).unwrap();

    let err = device.unseal_volume(2, b"foobar").unwrap_err();
    assert!(matches!(err, Error::Authentication { slot: 2 }));
    assert_eq!(err.kind(), ErrorKind::Authentication);

    // A failed attempt leaves the device usable.
    assert!(device.unseal_volume(2, b"second").is_ok());
}

#[test]
fn test_disabled_slot_not_found() {
    let fixture = three_slots().build(&zeros(1));
    let device = Device::open(&fixture.image).unwrap();

    let err = device.unseal_volume(1, b"foobar").unwrap_err();
    assert!(matches!(err, Error::SlotNotFound(1)));
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(device.unseal_volume(8, b"foobar").is_err());
    assert!(matches!(device.token(0), Err(Error::TokenNotFound(0))));
}

#[test]
fn test_unseal_any() {
    let fixture = three_slots().build(&zeros(1));
    let device = Device::open(&fixture.image).unwrap();

    let (slot, volume) = device.unseal_any(b"fifth").unwrap();
    assert_eq!(slot, 5);
    assert_eq!(volume.key(), &fixture.key[..]);
    assert!(matches!(
        device.unseal_any(b"nothing"),
        Err(Error::NoMatchingSlot)
    ));
}

#[test]
fn test_zero_payload_for_cipher_and_hash_combinations() {
    let combos = [
        ("xts-plain64", HashAlgorithm::Sha256, 64),
        ("xts-plain64", HashAlgorithm::Sha1, 32),
        ("xts-plain", HashAlgorithm::Sha512, 64),
        ("cbc-essiv:sha256", HashAlgorithm::Sha1, 32),
        ("cbc-plain64", HashAlgorithm::Ripemd160, 16),
        ("cbc-plain", HashAlgorithm::Sha256, 24),
    ];

    for (mode, hash, key_size) in combos {
        let fixture = Luks1 {
            cipher_mode: mode,
            hash,
            key_size,
            stripes: 64,
            ..Luks1::default()
        }
        .build(&zeros(4));

        let device = Device::open(&fixture.image).unwrap();
        let volume = device.unseal_volume(0, b"foobar").unwrap();
        assert_eq!(volume.key(), &fixture.key[..], "{} {}", mode, hash);

        let mut reader = VolumeReader::new(&fixture.image, &volume).unwrap();
        let mut buf = vec![0xAAu8; 4 * 512];
        assert_eq!(reader.read_at(&mut buf, 0).unwrap(), buf.len());
        assert!(buf.iter().all(|&b| b == 0), "{} {}", mode, hash);
    }
}

#[test]
fn test_corrupt_slot_state_is_format_error() {
    let mut fixture = Luks1::default().build(&zeros(1));
    let record = luks1::KEY_SLOTS_OFFSET + 3 * luks1::KEY_SLOT_SIZE;
    fixture.image[record..record + 4].copy_from_slice(&[0xDE, 0xAD, 0xBE, 0xEF]);

    let err = Device::open(&fixture.image).err().unwrap();
    assert_eq!(err.kind(), ErrorKind::Format);
}

#[test]
fn test_damaged_key_material_fails_authentication() {
    let mut fixture = Luks1::default().build(&zeros(1));
    let device = Device::open(&fixture.image).unwrap();
    let offset = device.slot(0).unwrap().area.offset as usize;
    drop(device);

    fixture.image[offset + 1000] ^= 0x01;
    let device = Device::open(&fixture.image).unwrap();
    assert!(device.unseal_volume(0, b"foobar").unwrap_err().is_authentication());
}

#[test]
fn test_truncated_container() {
    let fixture = Luks1::default().build(&zeros(1));
    let device = Device::open(&fixture.image[..4096]).unwrap();
    let err = device.unseal_volume(0, b"foobar").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Format);
}

#[test]
fn test_bad_magic() {
    let mut fixture = Luks1::default().build(&zeros(1));
    fixture.image[0] = b'X';
    assert!(matches!(
        Device::open(&fixture.image),
        Err(Error::InvalidMagic)
    ));
}
