//! Integration tests: objects reachable through alternate object stores.

use std::io::Write;
use std::path::Path;

use flate2::write::ZlibEncoder;
use flate2::Compression;
use sha1::{Digest, Sha1};
use vergit_hash::ObjectId;
use vergit_object::ObjectType;
use vergit_odb::ObjectDatabase;

fn write_loose(objects_dir: &Path, obj_type: &str, content: &[u8]) -> ObjectId {
    let mut hasher = Sha1::new();
    hasher.update(format!("{} {}\0", obj_type, content.len()).as_bytes());
    hasher.update(content);
    let digest = hasher.finalize();
    let oid = ObjectId::from_bytes(digest.as_slice()).unwrap();

    let mut raw = Vec::new();
    raw.extend_from_slice(obj_type.as_bytes());
    raw.push(b' ');
    raw.extend_from_slice(content.len().to_string().as_bytes());
    raw.push(0);
    raw.extend_from_slice(content);

    let mut compressed = Vec::new();
    let mut enc = ZlibEncoder::new(&mut compressed, Compression::default());
    enc.write_all(&raw).unwrap();
    enc.finish().unwrap();

    let hex = oid.to_hex();
    let dir = objects_dir.join(&hex[..2]);
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join(&hex[2..]), compressed).unwrap();
    oid
}

fn link_alternate(objects_dir: &Path, target: &Path) {
    let info = objects_dir.join("info");
    std::fs::create_dir_all(&info).unwrap();
    std::fs::write(info.join("alternates"), format!("{}\n", target.display())).unwrap();
}

#[test]
fn object_found_through_alternate() {
    let dir = tempfile::tempdir().unwrap();
    let main = dir.path().join("main-objects");
    let shared = dir.path().join("shared-objects");
    std::fs::create_dir_all(&main).unwrap();
    std::fs::create_dir_all(&shared).unwrap();

    let oid = write_loose(&shared, "blob", b"shared object content\n");
    link_alternate(&main, &shared);

    let odb = ObjectDatabase::open(&main).unwrap();
    let stream = odb
        .try_get(&oid, Some(ObjectType::Blob))
        .unwrap()
        .expect("object should be visible through the alternate");
    assert_eq!(stream.into_vec().unwrap(), b"shared object content\n");
    assert!(odb.contains(&oid));
}

#[test]
fn own_store_wins_before_alternates() {
    let dir = tempfile::tempdir().unwrap();
    let main = dir.path().join("main-objects");
    let shared = dir.path().join("shared-objects");
    std::fs::create_dir_all(&main).unwrap();
    std::fs::create_dir_all(&shared).unwrap();

    // The identical object exists in both stores; either copy must yield
    // identical bytes, so the first match is taken.
    let content = b"same bytes in both stores\n";
    let oid_main = write_loose(&main, "blob", content);
    let oid_shared = write_loose(&shared, "blob", content);
    assert_eq!(oid_main, oid_shared);
    link_alternate(&main, &shared);

    let odb = ObjectDatabase::open(&main).unwrap();
    let stream = odb.try_get(&oid_main, None).unwrap().unwrap();
    assert_eq!(stream.into_vec().unwrap(), content);
}

#[test]
fn chained_alternates_resolve() {
    let dir = tempfile::tempdir().unwrap();
    let a = dir.path().join("a");
    let b = dir.path().join("b");
    let c = dir.path().join("c");
    for d in [&a, &b, &c] {
        std::fs::create_dir_all(d).unwrap();
    }

    let oid = write_loose(&c, "blob", b"deeply shared\n");
    link_alternate(&a, &b);
    link_alternate(&b, &c);

    let odb = ObjectDatabase::open(&a).unwrap();
    assert!(odb.contains(&oid));
    let stream = odb.try_get(&oid, None).unwrap().unwrap();
    assert_eq!(stream.into_vec().unwrap(), b"deeply shared\n");
}

#[test]
fn prefix_search_spans_alternates() {
    let dir = tempfile::tempdir().unwrap();
    let main = dir.path().join("main-objects");
    let shared = dir.path().join("shared-objects");
    std::fs::create_dir_all(&main).unwrap();
    std::fs::create_dir_all(&shared).unwrap();

    let oid = write_loose(&shared, "blob", b"only in the alternate\n");
    link_alternate(&main, &shared);

    let odb = ObjectDatabase::open(&main).unwrap();
    let hex = oid.to_hex();
    assert_eq!(odb.resolve_prefix(&hex[..10]).unwrap(), Some(oid));
}

#[test]
fn missing_alternate_entries_are_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let main = dir.path().join("main-objects");
    std::fs::create_dir_all(&main).unwrap();
    link_alternate(&main, &dir.path().join("does-not-exist"));

    let odb = ObjectDatabase::open(&main).unwrap();
    assert!(odb.alternates().is_empty());
}
